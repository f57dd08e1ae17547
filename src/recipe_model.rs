//! # Recipe Data Model
//!
//! Data structures shared by the parser, the grocery estimator and the services:
//!
//! - **Ingredient**: a name, a unit (possibly empty) and a non-negative quantity
//! - **ParsedRecipe**: everything extracted from one block of generated text
//! - **Macros**: calories plus protein/carbs/fat/fiber amounts
//! - **GroceryLine**: a priced shopping line derived from an ingredient
//! - **StoredRecipe**: the persisted form of a recipe in the `recipes` table
//!
//! ## Usage
//!
//! ```rust
//! use recipe_planner::recipe_model::{Ingredient, MacroAmount};
//!
//! let flour = Ingredient::new("flour", "cup", 1.5);
//! assert_eq!(flour.to_string(), "1.5 cup flour");
//!
//! let protein = MacroAmount::from_raw("25g");
//! assert_eq!(protein.value(), 25.0);
//! assert_eq!(protein.unit(), "g");
//! ```

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Cuisine and diet value used when the text does not name one
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Servings assumed for recipes that never recorded a serving count
pub const DEFAULT_SERVINGS: u32 = 4;

lazy_static! {
    static ref NUMBER: Regex = Regex::new(r"\d*\.?\d+").expect("Number pattern should be valid");
    static ref UNIT_WORD: Regex =
        Regex::new(r"^\s*([A-Za-z]+)").expect("Unit word pattern should be valid");
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// First numeric substring of `text`, if any
pub fn first_number(text: &str) -> Option<f64> {
    NUMBER.find(text).and_then(|m| m.as_str().parse().ok())
}

/// One ingredient line of a recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    /// Lower-cased ingredient name (e.g. "flour", "olive oil")
    pub name: String,

    /// Unit of measure; empty means "each" or unspecified
    #[serde(default)]
    pub unit: String,

    #[serde(default = "one", deserialize_with = "flexible_f64")]
    pub quantity: f64,
}

fn one() -> f64 {
    1.0
}

impl Ingredient {
    pub fn new(name: &str, unit: &str, quantity: f64) -> Self {
        Self {
            name: name.to_string(),
            unit: unit.to_string(),
            quantity,
        }
    }
}

impl fmt::Display for Ingredient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.is_empty() {
            write!(f, "{} {}", self.quantity, self.name)
        } else {
            write!(f, "{} {} {}", self.quantity, self.unit, self.name)
        }
    }
}

/// A macro-nutrient amount such as "25g".
///
/// The text as written is kept for display and serialization, while the
/// numeric value and unit are available for aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "MacroValue", into = "String")]
pub struct MacroAmount {
    raw: String,
    value: f64,
    unit: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MacroValue {
    Number(f64),
    Text(String),
    Missing(Option<()>),
}

impl From<MacroValue> for MacroAmount {
    fn from(value: MacroValue) -> Self {
        match value {
            MacroValue::Number(grams) => MacroAmount::grams(grams),
            MacroValue::Text(text) => MacroAmount::from_raw(&text),
            MacroValue::Missing(_) => MacroAmount::default(),
        }
    }
}

impl From<MacroAmount> for String {
    fn from(amount: MacroAmount) -> Self {
        amount.raw
    }
}

impl MacroAmount {
    /// Interpret text like "25g", "12 grams" or "about 3.5 g".
    /// Text without a number is worth 0; a missing unit is taken as grams.
    pub fn from_raw(raw: &str) -> Self {
        let raw = raw.trim().to_string();
        let (value, unit) = match NUMBER.find(&raw) {
            Some(m) => {
                let value = m.as_str().parse().unwrap_or(0.0);
                let unit = UNIT_WORD
                    .captures(&raw[m.end()..])
                    .map(|caps| caps[1].to_lowercase())
                    .unwrap_or_else(|| "g".to_string());
                (value, unit)
            }
            None => (0.0, "g".to_string()),
        };
        Self { raw, value, unit }
    }

    pub fn grams(value: f64) -> Self {
        Self {
            raw: format!("{value}g"),
            value,
            unit: "g".to_string(),
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Default for MacroAmount {
    fn default() -> Self {
        MacroAmount::from_raw("0g")
    }
}

impl fmt::Display for MacroAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Nutrition facts for a whole recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Macros {
    #[serde(default, deserialize_with = "flexible_f64")]
    pub calories: f64,
    #[serde(default)]
    pub protein: MacroAmount,
    #[serde(default)]
    pub carbs: MacroAmount,
    #[serde(default)]
    pub fat: MacroAmount,
    #[serde(default)]
    pub fiber: MacroAmount,
}

impl Default for Macros {
    fn default() -> Self {
        Self {
            calories: 0.0,
            protein: MacroAmount::default(),
            carbs: MacroAmount::default(),
            fat: MacroAmount::default(),
            fiber: MacroAmount::default(),
        }
    }
}

/// A priced shopping line derived from one ingredient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroceryLine {
    pub item: String,
    pub quantity: f64,
    pub estimated_cost: f64,
}

/// Structured result of parsing one block of generated recipe text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRecipe {
    /// Assigned once the recipe has been persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe_id: Option<i64>,
    pub recipe_name: String,
    /// The block of text the recipe was parsed from
    #[serde(default)]
    pub recipe_text: String,
    pub ingredients: Vec<Ingredient>,
    pub directions: Vec<String>,
    pub macros: Macros,
    pub tags: Vec<String>,
    pub cuisine: String,
    pub diet: String,
    pub cost_estimate: f64,
    pub grocery_list: Vec<GroceryLine>,
}

/// A recipe row in the `recipes` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecipe {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub directions: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "unknown_label")]
    pub cuisine: String,
    #[serde(default = "unknown_label")]
    pub diet: String,
    #[serde(default)]
    pub macro_estimate: Macros,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub cost_estimate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servings: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

fn unknown_label() -> String {
    UNKNOWN_LABEL.to_string()
}

impl StoredRecipe {
    pub fn from_parsed(user_id: &str, recipe: &ParsedRecipe) -> Self {
        Self {
            id: None,
            user_id: user_id.to_string(),
            title: recipe.recipe_name.clone(),
            ingredients: recipe.ingredients.clone(),
            directions: recipe.directions.clone(),
            tags: recipe.tags.clone(),
            cuisine: recipe.cuisine.clone(),
            diet: recipe.diet.clone(),
            macro_estimate: recipe.macros.clone(),
            cost_estimate: recipe.cost_estimate,
            servings: None,
            created_at: Some(Utc::now()),
        }
    }
}

/// Accept a number, a numeric string ("450 kcal") or null
pub(crate) fn flexible_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flexible {
        Number(f64),
        Text(String),
        Missing(Option<()>),
    }

    Ok(match Flexible::deserialize(deserializer)? {
        Flexible::Number(value) => value,
        Flexible::Text(text) => first_number(&text).unwrap_or(0.0),
        Flexible::Missing(_) => 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ingredient_display() {
        assert_eq!(Ingredient::new("flour", "cup", 1.5).to_string(), "1.5 cup flour");
        assert_eq!(Ingredient::new("eggs", "", 2.0).to_string(), "2 eggs");
    }

    #[test]
    fn test_macro_amount_from_raw() {
        let protein = MacroAmount::from_raw(" 25g ");
        assert_eq!(protein.as_str(), "25g");
        assert_eq!(protein.value(), 25.0);
        assert_eq!(protein.unit(), "g");

        let fiber = MacroAmount::from_raw("about 3.5 grams");
        assert_eq!(fiber.value(), 3.5);
        assert_eq!(fiber.unit(), "grams");

        let missing = MacroAmount::from_raw("n/a");
        assert_eq!(missing.value(), 0.0);
        assert_eq!(missing.as_str(), "n/a");
    }

    #[test]
    fn test_macros_default_has_all_fields() {
        let macros = Macros::default();
        assert_eq!(macros.calories, 0.0);
        assert_eq!(macros.protein.as_str(), "0g");
        assert_eq!(macros.carbs.as_str(), "0g");
        assert_eq!(macros.fat.as_str(), "0g");
        assert_eq!(macros.fiber.as_str(), "0g");
    }

    #[test]
    fn test_macros_accept_strings_and_numbers() -> anyhow::Result<()> {
        let macros: Macros = serde_json::from_value(json!({
            "calories": "520 kcal",
            "protein": 30,
            "carbs": "45g",
            "fat": null,
        }))?;
        assert_eq!(macros.calories, 520.0);
        assert_eq!(macros.protein.value(), 30.0);
        assert_eq!(macros.protein.as_str(), "30g");
        assert_eq!(macros.carbs.value(), 45.0);
        assert_eq!(macros.fat.as_str(), "0g");
        assert_eq!(macros.fiber.as_str(), "0g");
        Ok(())
    }

    #[test]
    fn test_macros_serialize_as_raw_strings() -> anyhow::Result<()> {
        let macros = Macros {
            calories: 450.0,
            protein: MacroAmount::from_raw("25g"),
            ..Macros::default()
        };
        let value = serde_json::to_value(&macros)?;
        assert_eq!(value["calories"], json!(450.0));
        assert_eq!(value["protein"], json!("25g"));
        assert_eq!(value["fiber"], json!("0g"));
        Ok(())
    }

    #[test]
    fn test_stored_recipe_tolerates_sparse_rows() -> anyhow::Result<()> {
        let stored: StoredRecipe = serde_json::from_value(json!({
            "id": 7,
            "user_id": "u1",
            "title": "Soup",
            "cost_estimate": "12.50",
        }))?;
        assert_eq!(stored.id, Some(7));
        assert_eq!(stored.cuisine, UNKNOWN_LABEL);
        assert_eq!(stored.cost_estimate, 12.5);
        assert_eq!(stored.servings, None);
        assert!(stored.ingredients.is_empty());
        Ok(())
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(7.004, 2), 7.0);
        assert_eq!(round_to(1.23456, 4), 1.2346);
        assert_eq!(round_to(2.5, 0), 3.0);
    }
}
