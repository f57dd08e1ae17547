//! # Error Types Module
//!
//! Errors surfaced by the recipe services. Parsing and unit conversion never
//! fail; only invalid requests and collaborator failures reach callers.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum RecipeError {
    /// Request rejected before any work was done
    InvalidInput(String),
    /// Text generation failed or returned nothing usable
    Generation(String),
    /// Text generation did not answer in time
    Timeout(Duration),
    /// Text generation is failing repeatedly and calls are short-circuited
    CircuitOpen,
    /// Store read or write failed
    Persistence(String),
    NotFound(String),
    Config(String),
}

impl RecipeError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        RecipeError::InvalidInput(msg.into())
    }

    pub fn persistence(err: anyhow::Error) -> Self {
        RecipeError::Persistence(format!("{err:#}"))
    }
}

impl std::fmt::Display for RecipeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecipeError::InvalidInput(msg) => write!(f, "Invalid input: {msg}"),
            RecipeError::Generation(msg) => write!(f, "Recipe generation failed: {msg}"),
            RecipeError::Timeout(limit) => {
                write!(f, "Recipe generation timed out after {}s", limit.as_secs())
            }
            RecipeError::CircuitOpen => write!(
                f,
                "Recipe generation is temporarily unavailable after repeated failures"
            ),
            RecipeError::Persistence(msg) => write!(f, "Failed to save or load data: {msg}"),
            RecipeError::NotFound(msg) => write!(f, "Not found: {msg}"),
            RecipeError::Config(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for RecipeError {}

impl From<anyhow::Error> for RecipeError {
    fn from(err: anyhow::Error) -> Self {
        RecipeError::persistence(err)
    }
}
