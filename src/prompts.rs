//! # Prompt Construction
//!
//! Turns a meal request, the user's stored constraints and anything learned
//! from their ratings into the text sent to the generator. The layout asked
//! for here is the one the recipe parser understands.

use std::fmt::Write;

use crate::ratings::LearnedPreferences;

/// Constraints shared by batch and single-recipe prompts
#[derive(Debug, Clone, PartialEq)]
pub struct PromptConstraints<'a> {
    pub title: &'a str,
    pub budget: f64,
    pub allergies: &'a str,
    pub diet: &'a str,
    pub learned: Option<&'a LearnedPreferences>,
}

fn or_none(value: &str) -> &str {
    let value = value.trim();
    if value.is_empty() {
        "None"
    } else {
        value
    }
}

const RECIPE_BODY_TEMPLATE: &str = "Ingredients:
- [quantity] [unit] [ingredient]
- [quantity] [unit] [ingredient]

Directions:
1. [Step one]
2. [Step two]

Nutrition Facts:
- Calories: [number]
- Protein: [number]g
- Carbs: [number]g
- Fat: [number]g
- Fiber: [number]g

Tags: [tag1], [tag2], [tag3]
Cuisine: [cuisine]
Diet: [diet]
Cost Estimate: $[amount]";

fn write_constraints(prompt: &mut String, constraints: &PromptConstraints<'_>) {
    let _ = writeln!(prompt, "Constraints:");
    let _ = writeln!(prompt, "- Budget: ${:.2} per recipe", constraints.budget);
    let _ = writeln!(prompt, "- Allergies: {}", or_none(constraints.allergies));
    let _ = writeln!(prompt, "- Diet: {}", or_none(constraints.diet));

    if let Some(learned) = constraints.learned.filter(|learned| !learned.is_empty()) {
        prompt.push('\n');
        prompt.push_str(&learned_section(learned));
    }
}

/// Preference hints derived from past ratings
pub fn learned_section(learned: &LearnedPreferences) -> String {
    let mut section = String::from("Based on this user's past ratings:\n");
    if !learned.liked_cuisines.is_empty() {
        let _ = writeln!(section, "- They enjoy: {}", learned.liked_cuisines.join(", "));
    }
    if !learned.disliked_cuisines.is_empty() {
        let _ = writeln!(section, "- Avoid: {}", learned.disliked_cuisines.join(", "));
    }
    if !learned.favorite_tags.is_empty() {
        let _ = writeln!(section, "- Favourite styles: {}", learned.favorite_tags.join(", "));
    }
    section
}

/// Prompt asking for `count` distinct recipes separated by `---`
pub fn build_batch_prompt(constraints: &PromptConstraints<'_>, count: usize) -> String {
    let mut prompt = format!(
        "You are a professional chef and nutritionist. \
         Generate exactly {count} distinct recipes for: \"{}\".\n\n",
        constraints.title.trim()
    );
    write_constraints(&mut prompt, constraints);

    prompt.push_str("\nUse exactly this format for every recipe:\n\n");
    for n in 1..=count {
        let _ = writeln!(prompt, "RECIPE {n}: [Recipe Name]");
        if n == 1 {
            prompt.push('\n');
            prompt.push_str(RECIPE_BODY_TEMPLATE);
            prompt.push('\n');
        } else {
            prompt.push_str("[Same format as above]\n");
        }
        if n < count {
            prompt.push_str("\n---\n\n");
        }
    }
    prompt.push_str("\nMake sure each recipe is complete with all sections.");
    prompt
}

/// Prompt asking for one recipe unlike any of `excluded_names`
pub fn build_single_prompt(
    constraints: &PromptConstraints<'_>,
    excluded_names: &[String],
) -> String {
    let mut prompt = format!(
        "You are a professional chef and nutritionist. \
         Generate exactly ONE unique recipe for: \"{}\".\n\n",
        constraints.title.trim()
    );
    write_constraints(&mut prompt, constraints);

    if !excluded_names.is_empty() {
        let _ = write!(
            prompt,
            "\nIMPORTANT: Do NOT generate any recipe similar to these existing ones: {}. \
             Create something completely different.\n",
            excluded_names.join(", ")
        );
    }

    prompt.push_str("\nUse exactly this format:\n\nRECIPE: [Recipe Name]\n\n");
    prompt.push_str(RECIPE_BODY_TEMPLATE);
    prompt.push_str("\n\nMake the recipe completely unique and different from common variations.");
    prompt
}
