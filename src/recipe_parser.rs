//! # Recipe Text Parser
//!
//! Turns generated recipe text into [`ParsedRecipe`] values.
//!
//! Parsing is best-effort and never fails: every field has a default that is
//! used when the text does not follow the expected template.
//!
//! ## Features
//!
//! - Split a multi-recipe response on `---` lines or on `RECIPE n:` headers
//! - Parse ingredient lines with decimal, fractional and mixed quantities ("1 1/2")
//! - Extract numbered directions, nutrition facts, tags, cuisine and diet
//! - Use an explicit cost estimate when present, otherwise price the ingredients
//!
//! ## Usage
//!
//! ```rust
//! use recipe_planner::price_table::PriceTable;
//! use recipe_planner::recipe_parser::parse_recipe_block;
//!
//! let text = "RECIPE 1: Pancakes\n\nIngredients:\n- 1 1/2 cup flour\n- 2 eggs\n";
//! let recipe = parse_recipe_block(text, 0, &PriceTable::new());
//!
//! assert_eq!(recipe.recipe_name, "Pancakes");
//! assert_eq!(recipe.ingredients[0].quantity, 1.5);
//! assert!(recipe.tags.is_empty());
//! ```

use crate::grocery::{calculate_recipe_cost, estimate_grocery_list};
use crate::price_table::PriceTable;
use crate::recipe_model::{
    first_number, round_to, Ingredient, MacroAmount, Macros, ParsedRecipe, UNKNOWN_LABEL,
};
use crate::recipe_patterns::{
    BULLET_PREFIX, COST_LINE, CUISINE_LINE, DECIMAL, DIET_LINE, DIRECTIONS_SECTION, FRACTION,
    INGREDIENTS_SECTION, NUMBERED_HEADER, NUTRITION_SECTION, RECIPE_DELIMITER, RECIPE_HEADER,
    STEP_NUMBER, TAGS_LINE, WHITESPACE, WHOLE_NUMBER,
};
use log::{debug, trace};
use regex::Regex;

/// Blocks this short or shorter are treated as noise between recipes
pub const MIN_BLOCK_CHARS: usize = 50;

const BULLET_MARKERS: [char; 3] = ['-', '•', '*'];

/// Split a model response into at most `expected` recipe blocks.
///
/// Splits on `---` first; when that yields fewer than `expected` blocks the
/// response is split before each `RECIPE n:` header instead.
pub fn split_recipe_blocks(content: &str, expected: usize) -> Vec<String> {
    let mut blocks: Vec<&str> = content
        .split(RECIPE_DELIMITER)
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .collect();

    if blocks.len() < expected {
        debug!(
            "Delimiter split gave {} of {} blocks, splitting on headers",
            blocks.len(),
            expected
        );
        blocks = split_before_headers(content)
            .into_iter()
            .map(str::trim)
            .filter(|block| !block.is_empty())
            .collect();
    }

    blocks
        .into_iter()
        .filter(|block| block.chars().count() > MIN_BLOCK_CHARS)
        .take(expected)
        .map(String::from)
        .collect()
}

fn split_before_headers(content: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for header in NUMBERED_HEADER.find_iter(content) {
        if header.start() > start {
            pieces.push(&content[start..header.start()]);
        }
        start = header.start();
    }
    pieces.push(&content[start..]);
    pieces
}

/// Split and parse a full response, keeping the order of the recipes
pub fn parse_recipes(content: &str, expected: usize, prices: &PriceTable) -> Vec<ParsedRecipe> {
    split_recipe_blocks(content, expected)
        .iter()
        .enumerate()
        .map(|(index, block)| parse_recipe_block(block, index, prices))
        .collect()
}

/// Parse one recipe block; `index` is its zero-based position in the response
pub fn parse_recipe_block(text: &str, index: usize, prices: &PriceTable) -> ParsedRecipe {
    let recipe_name = extract_recipe_name(text, index);
    let ingredients = parse_ingredients(text);
    let cost_estimate = parse_cost_estimate(text, &ingredients, prices);
    let grocery_list = estimate_grocery_list(&ingredients, prices);

    let recipe = ParsedRecipe {
        recipe_id: None,
        recipe_name,
        recipe_text: text.to_string(),
        directions: parse_directions(text),
        macros: parse_macros(text),
        tags: parse_tags(text),
        cuisine: single_line_field(&CUISINE_LINE, text),
        diet: single_line_field(&DIET_LINE, text),
        cost_estimate,
        grocery_list,
        ingredients,
    };

    debug!(
        "Parsed recipe '{}': {} ingredients, {} steps, cost {:.2}",
        recipe.recipe_name,
        recipe.ingredients.len(),
        recipe.directions.len(),
        recipe.cost_estimate
    );
    recipe
}

pub fn extract_recipe_name(text: &str, index: usize) -> String {
    RECIPE_HEADER
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("Recipe {}", index + 1))
}

/// Ingredients from the bulleted lines of the `Ingredients:` section
pub fn parse_ingredients(text: &str) -> Vec<Ingredient> {
    let Some(section) = INGREDIENTS_SECTION.captures(text) else {
        return Vec::new();
    };

    section[1]
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with(BULLET_MARKERS))
        .filter_map(parse_ingredient_line)
        .collect()
}

/// Parse a single ingredient line such as `- 2 cups rice`.
///
/// Returns `None` only for lines with no content after the bullet.
pub fn parse_ingredient_line(line: &str) -> Option<Ingredient> {
    let line = BULLET_PREFIX.replace(line.trim(), "");
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let tokens: Vec<&str> = WHITESPACE.splitn(line, 3).collect();
    let ingredient = match tokens.as_slice() {
        [whole, fraction, rest] => match mixed_number(whole, fraction) {
            Some(quantity) => {
                let parts: Vec<&str> = WHITESPACE.splitn(rest, 2).collect();
                match parts.as_slice() {
                    [unit, name] => Ingredient::new(name, unit, quantity),
                    _ => Ingredient::new(rest, "", quantity),
                }
            }
            None => match parse_quantity(whole) {
                Some(quantity) => Ingredient::new(rest, fraction, quantity),
                None => Ingredient::new(&format!("{fraction} {rest}"), whole, 1.0),
            },
        },
        [first, name] => match parse_quantity(first) {
            Some(quantity) => Ingredient::new(name, "", quantity),
            None => Ingredient::new(name, first, 1.0),
        },
        _ => Ingredient::new(line, "", 1.0),
    };

    trace!("Ingredient line '{}' -> {:?}", line, ingredient);
    Some(Ingredient {
        name: ingredient.name.trim().to_lowercase(),
        unit: ingredient.unit.trim().to_string(),
        quantity: ingredient.quantity,
    })
}

/// Parse a quantity token: "2", "0.5", "1/2" or a vulgar fraction like "½"
pub fn parse_quantity(token: &str) -> Option<f64> {
    let token = token.trim();
    if DECIMAL.is_match(token) {
        return token.parse().ok();
    }
    if let Some(caps) = FRACTION.captures(token) {
        let numerator: f64 = caps[1].parse().ok()?;
        let denominator: f64 = caps[2].parse().ok()?;
        if denominator == 0.0 {
            return None;
        }
        return Some(numerator / denominator);
    }
    vulgar_fraction(token)
}

fn vulgar_fraction(token: &str) -> Option<f64> {
    let value = match token {
        "½" => 1.0 / 2.0,
        "⅓" => 1.0 / 3.0,
        "⅔" => 2.0 / 3.0,
        "¼" => 1.0 / 4.0,
        "¾" => 3.0 / 4.0,
        "⅕" => 1.0 / 5.0,
        "⅙" => 1.0 / 6.0,
        "⅛" => 1.0 / 8.0,
        "⅜" => 3.0 / 8.0,
        "⅝" => 5.0 / 8.0,
        "⅞" => 7.0 / 8.0,
        _ => return None,
    };
    Some(value)
}

/// "1" followed by "1/2" (or "½") reads as 1.5
fn mixed_number(whole: &str, fraction: &str) -> Option<f64> {
    if !WHOLE_NUMBER.is_match(whole) || DECIMAL.is_match(fraction) {
        return None;
    }
    let whole: f64 = whole.parse().ok()?;
    parse_quantity(fraction).map(|part| whole + part)
}

/// Steps from the `Directions:` section, in order, without their markers
pub fn parse_directions(text: &str) -> Vec<String> {
    let Some(section) = DIRECTIONS_SECTION.captures(text) else {
        return Vec::new();
    };

    section[1]
        .lines()
        .map(str::trim)
        .filter(|line| STEP_NUMBER.is_match(line) || line.starts_with(BULLET_MARKERS))
        .map(|line| {
            let without_number = STEP_NUMBER.replace(line, "");
            BULLET_PREFIX.replace(&without_number, "").trim().to_string()
        })
        .filter(|step| !step.is_empty())
        .collect()
}

/// Nutrition facts; any value missing from the text keeps its default
pub fn parse_macros(text: &str) -> Macros {
    let mut macros = Macros::default();
    let Some(section) = NUTRITION_SECTION.captures(text) else {
        return macros;
    };

    for line in section[1].lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key: String = key
            .to_lowercase()
            .chars()
            .filter(|c| !BULLET_MARKERS.contains(c))
            .collect();
        let value = value.trim();

        match key.trim() {
            "calories" => macros.calories = first_number(value).unwrap_or(0.0),
            "protein" => macros.protein = MacroAmount::from_raw(value),
            "carbs" => macros.carbs = MacroAmount::from_raw(value),
            "fat" => macros.fat = MacroAmount::from_raw(value),
            "fiber" => macros.fiber = MacroAmount::from_raw(value),
            other => trace!("Ignoring nutrition key '{}'", other),
        }
    }
    macros
}

pub fn parse_tags(text: &str) -> Vec<String> {
    TAGS_LINE
        .captures(text)
        .map(|caps| {
            caps[1]
                .split(',')
                .map(|tag| tag.trim().to_lowercase())
                .filter(|tag| !tag.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn single_line_field(pattern: &Regex, text: &str) -> String {
    pattern
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
}

/// Explicit `Cost Estimate: $X` when present, otherwise the priced ingredient total
pub fn parse_cost_estimate(text: &str, ingredients: &[Ingredient], prices: &PriceTable) -> f64 {
    let stated = COST_LINE
        .captures(text)
        .and_then(|caps| caps[1].parse::<f64>().ok());

    match stated {
        Some(cost) => round_to(cost, 2),
        None => calculate_recipe_cost(ingredients, prices),
    }
}
