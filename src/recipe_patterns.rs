//! # Recipe Patterns Module
//!
//! Regex patterns used to pull sections and fields out of generated recipe text.
//! Section patterns capture everything up to the next known heading or the end
//! of the text.

use lazy_static::lazy_static;
use regex::Regex;

/// Literal line that separates recipes in a multi-recipe response
pub const RECIPE_DELIMITER: &str = "---";

lazy_static! {
    /// "RECIPE 2: Name" or "RECIPE: Name" (keyword is case-sensitive)
    pub static ref RECIPE_HEADER: Regex =
        Regex::new(r"RECIPE\s*\d*:\s*(.+)").expect("Recipe header pattern should be valid");

    /// Start of a numbered recipe header, used to split responses without delimiters
    pub static ref NUMBERED_HEADER: Regex =
        Regex::new(r"RECIPE\s*\d+:").expect("Numbered header pattern should be valid");

    pub static ref INGREDIENTS_SECTION: Regex = Regex::new(
        r"(?is)Ingredients:\s*\n(.*?)(?:\n\s*Directions:|\n\s*Nutrition|\z)"
    )
    .expect("Ingredients section pattern should be valid");

    pub static ref DIRECTIONS_SECTION: Regex =
        Regex::new(r"(?is)Directions:\s*\n(.*?)(?:\n\s*Nutrition|\n\s*Tags:|\z)")
            .expect("Directions section pattern should be valid");

    pub static ref NUTRITION_SECTION: Regex =
        Regex::new(r"(?is)Nutrition Facts:\s*\n(.*?)(?:\n\s*Tags:|\n\s*Cuisine:|\z)")
            .expect("Nutrition section pattern should be valid");

    /// Single-line fields; values never continue onto the next line
    pub static ref TAGS_LINE: Regex =
        Regex::new(r"(?i)Tags:[ \t]*(.+)").expect("Tags pattern should be valid");
    pub static ref CUISINE_LINE: Regex =
        Regex::new(r"(?i)Cuisine:[ \t]*(.+)").expect("Cuisine pattern should be valid");
    pub static ref DIET_LINE: Regex =
        Regex::new(r"(?i)Diet:[ \t]*(.+)").expect("Diet pattern should be valid");
    pub static ref COST_LINE: Regex = Regex::new(r"Cost Estimate:\s*\$?(\d*\.?\d+)")
        .expect("Cost pattern should be valid");

    /// Leading "-", "•" or "*" marker
    pub static ref BULLET_PREFIX: Regex =
        Regex::new(r"^[-•*]\s*").expect("Bullet pattern should be valid");
    /// Leading "1." step number
    pub static ref STEP_NUMBER: Regex =
        Regex::new(r"^\d+\.\s*").expect("Step number pattern should be valid");

    pub static ref WHITESPACE: Regex =
        Regex::new(r"\s+").expect("Whitespace pattern should be valid");

    /// Plain decimal ("2", "0.5", ".5")
    pub static ref DECIMAL: Regex =
        Regex::new(r"^(\d+(?:\.\d*)?|\.\d+)$").expect("Decimal pattern should be valid");
    /// Simple fraction ("1/2")
    pub static ref FRACTION: Regex =
        Regex::new(r"^(\d+)[⁄/](\d+)$").expect("Fraction pattern should be valid");
    /// Whole number that may start a mixed number ("1" in "1 1/2")
    pub static ref WHOLE_NUMBER: Regex =
        Regex::new(r"^\d+$").expect("Whole number pattern should be valid");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_stops_at_next_heading() {
        let text = "Ingredients:\n- 1 cup rice\n- 2 eggs\n\nDirections:\n1. Cook";
        let caps = INGREDIENTS_SECTION.captures(text).unwrap();
        assert_eq!(caps[1].trim(), "- 1 cup rice\n- 2 eggs");
    }

    #[test]
    fn test_section_runs_to_end_of_text() {
        let text = "Directions:\n1. Boil water\n2. Add pasta";
        let caps = DIRECTIONS_SECTION.captures(text).unwrap();
        assert_eq!(caps[1].trim(), "1. Boil water\n2. Add pasta");
    }

    #[test]
    fn test_header_with_and_without_index() {
        let numbered = RECIPE_HEADER.captures("RECIPE 2: Lentil Soup").unwrap();
        assert_eq!(&numbered[1], "Lentil Soup");
        let single = RECIPE_HEADER.captures("RECIPE: Tofu Stir Fry").unwrap();
        assert_eq!(&single[1], "Tofu Stir Fry");
        assert!(RECIPE_HEADER.captures("Recipe 1: lowercase keyword").is_none());
    }

    #[test]
    fn test_quantity_patterns() {
        assert!(DECIMAL.is_match("2"));
        assert!(DECIMAL.is_match("0.25"));
        assert!(DECIMAL.is_match(".5"));
        assert!(!DECIMAL.is_match("cup"));
        assert!(!DECIMAL.is_match("-1"));
        assert!(FRACTION.is_match("3/4"));
        assert!(!FRACTION.is_match("3/"));
    }
}
