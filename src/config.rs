//! # Configuration Module
//!
//! Settings for text generation, failure isolation and collaborators, read from
//! the environment (a `.env` file is loaded first by the binary).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::RecipeError;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_BATCH_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_SINGLE_TEMPERATURE: f32 = 0.8;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BUDGET: f64 = 20.0;
pub const DEFAULT_RECIPE_COUNT: usize = 3;
pub const MAX_RECIPE_COUNT: usize = 10;

/// Circuit breaker settings for the text generation client
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens
    pub failure_threshold: u32,
    /// Seconds the breaker stays open before letting a call through
    pub reset_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_secs: 60, // 1 minute
        }
    }
}

/// How recipes are requested from the text generator
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub model: String,
    /// Temperature for multi-recipe batches
    pub batch_temperature: f32,
    /// Temperature for single recipe regeneration
    pub single_temperature: f32,
    pub timeout_secs: u64,
    /// Budget used when neither the request nor stored preferences give one
    pub default_budget: f64,
    pub default_recipe_count: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            batch_temperature: DEFAULT_BATCH_TEMPERATURE,
            single_temperature: DEFAULT_SINGLE_TEMPERATURE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            default_budget: DEFAULT_BUDGET,
            default_recipe_count: DEFAULT_RECIPE_COUNT,
        }
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), RecipeError> {
        if self.timeout_secs == 0 {
            return Err(RecipeError::Config("generation timeout must be positive".into()));
        }
        for temperature in [self.batch_temperature, self.single_temperature] {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(RecipeError::Config(format!(
                    "temperature {temperature} is outside 0.0..=2.0"
                )));
            }
        }
        if self.default_recipe_count == 0 || self.default_recipe_count > MAX_RECIPE_COUNT {
            return Err(RecipeError::Config(format!(
                "default recipe count must be between 1 and {MAX_RECIPE_COUNT}"
            )));
        }
        Ok(())
    }
}

/// Full application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub database_url: Option<String>,
    pub price_table_path: Option<PathBuf>,
    pub generation: GenerationConfig,
    pub breaker: BreakerConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, RecipeError> {
        let generation = GenerationConfig {
            model: env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            timeout_secs: parse_var("GENERATION_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
            ..GenerationConfig::default()
        };
        generation.validate()?;

        let defaults = BreakerConfig::default();
        let breaker = BreakerConfig {
            failure_threshold: parse_var("BREAKER_FAILURE_THRESHOLD", defaults.failure_threshold)?,
            reset_secs: parse_var("BREAKER_RESET_SECS", defaults.reset_secs)?,
        };
        if breaker.failure_threshold == 0 {
            return Err(RecipeError::Config("breaker threshold must be positive".into()));
        }

        Ok(Self {
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            openai_base_url: non_empty_var("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            database_url: non_empty_var("DATABASE_URL"),
            price_table_path: price_table_path_from_env(),
            generation,
            breaker,
        })
    }

    /// API key, required only by commands that call the text generator
    pub fn require_api_key(&self) -> Result<&str, RecipeError> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| RecipeError::Config("OPENAI_API_KEY must be set".into()))
    }
}

/// `PRICE_TABLE_PATH`, readable without loading the rest of the configuration
pub fn price_table_path_from_env() -> Option<PathBuf> {
    non_empty_var("PRICE_TABLE_PATH").map(PathBuf::from)
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, RecipeError> {
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| RecipeError::Config(format!("{name} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}
