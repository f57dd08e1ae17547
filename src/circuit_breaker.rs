//! # Circuit Breaker Module
//!
//! Stops calling the text generator after repeated failures so that requests
//! fail fast instead of each waiting for the full timeout.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::BreakerConfig;

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Circuit breaker for text generation calls
///
/// # State Machine
///
/// - **Closed**: calls pass through
/// - **Open**: `failure_threshold` consecutive failures; calls fail fast
/// - **Half-Open**: after `reset_secs` one call is let through; its outcome
///   closes or reopens the breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    config: BreakerConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    ///
    /// ```rust
    /// use recipe_planner::circuit_breaker::CircuitBreaker;
    /// use recipe_planner::config::BreakerConfig;
    ///
    /// let breaker = CircuitBreaker::new(BreakerConfig::default());
    /// assert!(!breaker.is_open());
    /// ```
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            config,
        }
    }

    fn state(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `true` while the failure threshold is reached and the reset window has not elapsed
    pub fn is_open(&self) -> bool {
        let state = self.state();
        if state.failure_count < self.config.failure_threshold {
            return false;
        }
        match state.last_failure_time {
            Some(last) => last.elapsed() < Duration::from_secs(self.config.reset_secs),
            None => false,
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.state();
        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure_time = Some(Instant::now());
    }

    pub fn record_success(&self) {
        let mut state = self.state();
        state.failure_count = 0;
        state.last_failure_time = None;
    }

    pub fn failure_count(&self) -> u32 {
        self.state().failure_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, reset_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: threshold,
            reset_secs,
        })
    }

    #[test]
    fn test_opens_at_threshold() {
        let breaker = breaker(3, 60);
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());
        breaker.record_failure();
        assert!(breaker.is_open());
        assert_eq!(breaker.failure_count(), 3);
    }

    #[test]
    fn test_success_closes() {
        let breaker = breaker(1, 60);
        breaker.record_failure();
        assert!(breaker.is_open());
        breaker.record_success();
        assert!(!breaker.is_open());
        assert_eq!(breaker.failure_count(), 0);
    }

    #[test]
    fn test_half_open_after_reset_window() {
        let breaker = breaker(1, 0);
        breaker.record_failure();
        // Zero-length window: the next call is allowed through
        assert!(!breaker.is_open());
        breaker.record_failure();
        assert_eq!(breaker.failure_count(), 2);
    }
}
