//! # Ingredient Normalizer
//!
//! Maps free-text ingredient names to a canonical key used to consolidate
//! grocery items, and to a display name shown to the user.
//!
//! ```rust
//! use recipe_planner::ingredient_normalizer::{display_name, normalize_ingredient_name};
//!
//! assert_eq!(normalize_ingredient_name("Fresh Yellow Onion"), "onion");
//! assert_eq!(display_name("onion", "yellow onion"), "Onion");
//! ```

use log::debug;
use regex::Regex;
use std::sync::LazyLock;

/// Canonical key used for empty input
pub const UNKNOWN_INGREDIENT: &str = "unknown";

/// Cosmetic words that do not change what has to be bought
const DESCRIPTORS: &[&str] = &[
    "diced",
    "chopped",
    "sliced",
    "minced",
    "crushed",
    "grated",
    "fresh",
    "dried",
    "frozen",
    "canned",
    "cooked",
    "raw",
    "boneless",
    "skinless",
    "lean",
    "ground",
    "whole",
    "large",
    "medium",
    "small",
    "extra",
    "jumbo",
    "organic",
    "free-range",
    "grass-fed",
];

/// Variant to base mappings, scanned in order; the first substring match wins.
/// Rice and pasta varietals are intentionally absent so they stay distinct.
const VARIANT_MAPPINGS: &[(&str, &str)] = &[
    ("chicken breast", "chicken"),
    ("chicken thigh", "chicken"),
    ("chicken thighs", "chicken"),
    ("ground beef", "beef"),
    ("beef chuck", "beef"),
    ("yellow onion", "onion"),
    ("white onion", "onion"),
    ("red onion", "onion"),
    ("roma tomato", "tomato"),
    ("cherry tomato", "tomato"),
    ("bell pepper", "bell pepper"),
    ("red bell pepper", "bell pepper"),
    ("garlic clove", "garlic"),
];

/// Canonical names that are shown as the grouped label rather than the original text
const COMMON_INGREDIENTS: &[&str] = &[
    "chicken", "beef", "pork", "fish", "turkey", "lamb", "onion", "tomato", "garlic", "carrot",
    "celery", "rice", "pasta", "bread", "cheese", "milk", "eggs",
];

static DESCRIPTOR_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    DESCRIPTORS
        .iter()
        .map(|word| {
            Regex::new(&format!(r"(?i)\b{}\s+", regex::escape(word)))
                .expect("Descriptor pattern should be valid")
        })
        .collect()
});

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Whitespace pattern should be valid"));

/// Canonical consolidation key for an ingredient name.
///
/// Applying it twice gives the same result as applying it once.
pub fn normalize_ingredient_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    if lowered.is_empty() {
        return UNKNOWN_INGREDIENT.to_string();
    }

    let mut normalized = lowered.clone();
    for pattern in DESCRIPTOR_PATTERNS.iter() {
        normalized = pattern.replace_all(&normalized, "").into_owned();
    }

    if let Some((variant, base)) = VARIANT_MAPPINGS
        .iter()
        .find(|(variant, _)| normalized.contains(variant))
    {
        debug!("Mapped ingredient variant '{}' to '{}'", variant, base);
        normalized = (*base).to_string();
    }

    let collapsed = WHITESPACE_RUN.replace_all(&normalized, " ").trim().to_string();
    if collapsed.is_empty() {
        lowered
    } else {
        collapsed
    }
}

/// Human-friendly label for a consolidated item
pub fn display_name(normalized: &str, original: &str) -> String {
    if COMMON_INGREDIENTS.contains(&normalized) {
        capitalize(normalized)
    } else {
        capitalize(original)
    }
}

/// Upper-case the first character and lower-case the rest
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
