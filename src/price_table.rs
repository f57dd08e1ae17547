//! # Price Table
//!
//! Static `ingredient name -> unit price` lookup used to estimate grocery costs.
//! The table is loaded once at startup, either from a JSON object on disk or from
//! a small built-in set, and is read-only afterwards.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Unit price used for ingredients missing from the table
pub const FALLBACK_UNIT_PRICE: f64 = 1.00;

/// Rough per-unit prices for common staples
const BUILTIN_PRICES: &[(&str, f64)] = &[
    ("chicken", 3.00),
    ("beef", 5.00),
    ("pork", 4.00),
    ("fish", 6.00),
    ("salmon", 8.00),
    ("rice", 0.50),
    ("pasta", 1.00),
    ("bread", 2.00),
    ("eggs", 0.25),
    ("milk", 0.15),
    ("cheese", 4.00),
    ("tomato", 1.00),
    ("onion", 0.75),
    ("garlic", 2.00),
    ("oil", 1.00),
    ("butter", 3.00),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceTable {
    prices: HashMap<String, f64>,
}

impl PriceTable {
    /// Empty table: every lookup falls back to [`FALLBACK_UNIT_PRICE`]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        BUILTIN_PRICES
            .iter()
            .fold(Self::new(), |table, (name, price)| table.with_price(name, *price))
    }

    /// Parse a JSON object such as `{"flour": 0.4, "eggs": 0.25}`
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: HashMap<String, f64> =
            serde_json::from_str(json).context("Price table must be a JSON object of numbers")?;
        Ok(raw
            .into_iter()
            .fold(Self::new(), |table, (name, price)| table.with_price(&name, price)))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read price table at {}", path.display()))?;
        let table = Self::from_json_str(&json)?;
        info!(path = %path.display(), entries = table.len(), "Loaded price table");
        Ok(table)
    }

    pub fn with_price(mut self, name: &str, price: f64) -> Self {
        self.prices.insert(name.trim().to_lowercase(), price);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.prices.get(&name.trim().to_lowercase()).copied()
    }

    /// Price for one unit of `name`, or the fallback price when unknown
    pub fn unit_price(&self, name: &str) -> f64 {
        self.get(name).unwrap_or(FALLBACK_UNIT_PRICE)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}
