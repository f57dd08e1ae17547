//! # Unit Converter
//!
//! Converts quantities between measurement units of the same family.
//!
//! Units are grouped into four families:
//!
//! - **Volume** (base unit: milliliter)
//! - **Weight** (base unit: gram)
//! - **Length** (base unit: millimeter)
//! - **Count** (pieces, cloves, heads, ...) which pass through unchanged
//!
//! Conversion across families, or involving an unrecognized unit, yields `None`
//! rather than an error.
//!
//! ```rust
//! use recipe_planner::unit_converter::UnitConverter;
//!
//! let converter = UnitConverter::new();
//! let ml = converter.convert(2.0, "cup", "ml").unwrap();
//! assert!((ml - 473.176).abs() < 1e-9);
//! assert!(converter.convert(1.0, "cup", "gram").is_none());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Volume units and their size in milliliters, in display order
const VOLUME_UNITS: &[(&str, f64)] = &[
    ("ml", 1.0),
    ("milliliter", 1.0),
    ("milliliters", 1.0),
    ("l", 1000.0),
    ("liter", 1000.0),
    ("liters", 1000.0),
    ("cup", 236.588),
    ("cups", 236.588),
    ("tbsp", 14.787),
    ("tablespoon", 14.787),
    ("tablespoons", 14.787),
    ("tsp", 4.929),
    ("teaspoon", 4.929),
    ("teaspoons", 4.929),
    ("fl oz", 29.574),
    ("fluid ounce", 29.574),
    ("fluid ounces", 29.574),
    ("pint", 473.176),
    ("pints", 473.176),
    ("quart", 946.353),
    ("quarts", 946.353),
    ("gallon", 3785.41),
    ("gallons", 3785.41),
];

/// Weight units and their size in grams
const WEIGHT_UNITS: &[(&str, f64)] = &[
    ("g", 1.0),
    ("gram", 1.0),
    ("grams", 1.0),
    ("kg", 1000.0),
    ("kilogram", 1000.0),
    ("kilograms", 1000.0),
    ("oz", 28.35),
    ("ounce", 28.35),
    ("ounces", 28.35),
    ("lb", 453.592),
    ("pound", 453.592),
    ("pounds", 453.592),
    ("lbs", 453.592),
];

/// Length units and their size in millimeters
const LENGTH_UNITS: &[(&str, f64)] = &[
    ("mm", 1.0),
    ("millimeter", 1.0),
    ("millimeters", 1.0),
    ("cm", 10.0),
    ("centimeter", 10.0),
    ("centimeters", 10.0),
    ("inch", 25.4),
    ("inches", 25.4),
    ("in", 25.4),
    ("ft", 304.8),
    ("foot", 304.8),
    ("feet", 304.8),
];

const COUNT_UNITS: &[&str] = &[
    "piece", "pieces", "item", "items", "whole", "large", "medium", "small", "clove", "cloves",
    "head", "heads", "bunch", "bunches", "sheet", "sheets",
];

/// Lookup index from unit name to its family and base multiplier
static UNIT_INDEX: LazyLock<HashMap<&'static str, (UnitType, f64)>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    for (name, factor) in VOLUME_UNITS {
        map.insert(*name, (UnitType::Volume, *factor));
    }
    for (name, factor) in WEIGHT_UNITS {
        map.insert(*name, (UnitType::Weight, *factor));
    }
    for (name, factor) in LENGTH_UNITS {
        map.insert(*name, (UnitType::Length, *factor));
    }
    for name in COUNT_UNITS {
        map.insert(*name, (UnitType::Count, 1.0));
    }
    map
});

/// Measurement family a unit belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    Volume,
    Weight,
    Length,
    Count,
    Unknown,
}

impl UnitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitType::Volume => "volume",
            UnitType::Weight => "weight",
            UnitType::Length => "length",
            UnitType::Count => "count",
            UnitType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a conversion request, suitable for returning to callers as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitConversion {
    pub original_quantity: f64,
    pub original_unit: String,
    pub converted_quantity: Option<f64>,
    pub converted_unit: String,
    pub conversion_successful: bool,
    pub compatible_units: Vec<String>,
}

/// Stateless converter over the static unit tables
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitConverter;

fn canonical(unit: &str) -> String {
    unit.trim().to_lowercase()
}

impl UnitConverter {
    pub fn new() -> Self {
        Self
    }

    /// Classify a unit string by table membership (case-insensitive, trimmed)
    pub fn unit_type(&self, unit: &str) -> UnitType {
        UNIT_INDEX
            .get(canonical(unit).as_str())
            .map(|(unit_type, _)| *unit_type)
            .unwrap_or(UnitType::Unknown)
    }

    /// Convert `quantity` from one unit to another.
    ///
    /// Returns `None` when the units belong to different families or either is
    /// unknown. Count units pass the quantity through unchanged.
    pub fn convert(&self, quantity: f64, from_unit: &str, to_unit: &str) -> Option<f64> {
        let from = canonical(from_unit);
        let to = canonical(to_unit);

        if from == to {
            return Some(quantity);
        }

        let (from_type, from_factor) = UNIT_INDEX.get(from.as_str())?;
        let (to_type, to_factor) = UNIT_INDEX.get(to.as_str())?;

        if from_type != to_type {
            return None;
        }

        match from_type {
            // "1 head" to "3 cloves" is not modeled
            UnitType::Count => Some(quantity),
            _ => Some(quantity * from_factor / to_factor),
        }
    }

    /// Every unit name in the same family as `unit`, in table order
    pub fn compatible_units(&self, unit: &str) -> Vec<String> {
        let names: Vec<&str> = match self.unit_type(unit) {
            UnitType::Volume => VOLUME_UNITS.iter().map(|(name, _)| *name).collect(),
            UnitType::Weight => WEIGHT_UNITS.iter().map(|(name, _)| *name).collect(),
            UnitType::Length => LENGTH_UNITS.iter().map(|(name, _)| *name).collect(),
            UnitType::Count => COUNT_UNITS.to_vec(),
            UnitType::Unknown => Vec::new(),
        };
        names.into_iter().map(String::from).collect()
    }

    /// Convert and package the result together with the unit choices for `from_unit`
    pub fn convert_detailed(
        &self,
        quantity: f64,
        from_unit: &str,
        to_unit: &str,
    ) -> UnitConversion {
        let converted = self.convert(quantity, from_unit, to_unit);
        UnitConversion {
            original_quantity: quantity,
            original_unit: from_unit.to_string(),
            converted_quantity: converted,
            converted_unit: to_unit.to_string(),
            conversion_successful: converted.is_some(),
            compatible_units: self.compatible_units(from_unit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9 * b.abs().max(1.0)
    }

    #[test]
    fn test_unit_type_classification() {
        let converter = UnitConverter::new();
        assert_eq!(converter.unit_type("cup"), UnitType::Volume);
        assert_eq!(converter.unit_type("  Cups "), UnitType::Volume);
        assert_eq!(converter.unit_type("fl oz"), UnitType::Volume);
        assert_eq!(converter.unit_type("LBS"), UnitType::Weight);
        assert_eq!(converter.unit_type("inch"), UnitType::Length);
        assert_eq!(converter.unit_type("cloves"), UnitType::Count);
        assert_eq!(converter.unit_type("handful"), UnitType::Unknown);
        assert_eq!(converter.unit_type(""), UnitType::Unknown);
    }

    #[test]
    fn test_known_conversions() {
        let converter = UnitConverter::new();
        assert!(approx(converter.convert(2.0, "cup", "ml").unwrap(), 473.176));
        assert!(approx(converter.convert(1.0, "lb", "kg").unwrap(), 0.453592));
        assert!(approx(converter.convert(1.0, "ft", "cm").unwrap(), 30.48));
        assert!(approx(converter.convert(3.0, "tsp", "teaspoons").unwrap(), 3.0));
    }

    #[test]
    fn test_identical_units_pass_through_even_when_unknown() {
        let converter = UnitConverter::new();
        assert_eq!(converter.convert(2.5, "Handful", "handful"), Some(2.5));
    }

    #[test]
    fn test_cross_family_is_not_convertible() {
        let converter = UnitConverter::new();
        assert_eq!(converter.convert(1.0, "cup", "gram"), None);
        assert_eq!(converter.convert(1.0, "inch", "oz"), None);
        assert_eq!(converter.convert(1.0, "cup", "handful"), None);
        assert_eq!(converter.convert(1.0, "pinch", "tsp"), None);
    }

    #[test]
    fn test_count_units_pass_through() {
        let converter = UnitConverter::new();
        assert_eq!(converter.convert(1.0, "head", "cloves"), Some(1.0));
        assert_eq!(converter.convert(4.0, "pieces", "items"), Some(4.0));
    }

    #[test]
    fn test_round_trip_within_family() {
        let converter = UnitConverter::new();
        for family in [VOLUME_UNITS, WEIGHT_UNITS, LENGTH_UNITS] {
            for (a, _) in family {
                for (b, _) in family {
                    let there = converter.convert(7.25, a, b).unwrap();
                    let back = converter.convert(there, b, a).unwrap();
                    assert!(approx(back, 7.25), "{a} -> {b} -> {a} gave {back}");
                }
            }
        }
    }

    #[test]
    fn test_compatible_units_follow_table_order() {
        let converter = UnitConverter::new();
        let weight = converter.compatible_units("kg");
        assert_eq!(weight.first().map(String::as_str), Some("g"));
        assert!(weight.contains(&"lbs".to_string()));
        assert_eq!(weight.len(), WEIGHT_UNITS.len());

        assert_eq!(converter.compatible_units("clove").len(), COUNT_UNITS.len());
        assert!(converter.compatible_units("smidgen").is_empty());
    }

    #[test]
    fn test_convert_detailed_reports_failure() {
        let converter = UnitConverter::new();
        let result = converter.convert_detailed(1.0, "cup", "gram");
        assert!(!result.conversion_successful);
        assert_eq!(result.converted_quantity, None);
        assert!(result.compatible_units.contains(&"ml".to_string()));
    }
}
