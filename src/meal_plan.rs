//! # Meal Plan Groceries
//!
//! Builds a shopping list from a plan of meals grouped by date. Ingredients are
//! aggregated by name and unit (unlike the grocery list, no canonical-name
//! merging happens here) and the result is merged into the user's grocery list.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::{to_record, Filter, Store, GROCERY_ITEMS_TABLE};
use crate::errors::RecipeError;
use crate::grocery::{additive_merge, GroceryItem};
use crate::ingredient_normalizer::normalize_ingredient_name;
use crate::price_table::PriceTable;
use crate::recipe_model::{round_to, Ingredient};

pub const MEAL_PLAN_CATEGORY: &str = "Meal Plan Generated";

/// One meal in a plan; only its ingredients matter here
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannedMeal {
    #[serde(default)]
    pub recipe_name: String,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
}

/// Meals keyed by date (`YYYY-MM-DD`)
pub type MealPlan = BTreeMap<String, Vec<PlannedMeal>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPlanGroceryItem {
    /// Title-cased, e.g. "Olive Oil"
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    pub estimated_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPlanGroceries {
    pub items: Vec<MealPlanGroceryItem>,
    pub meal_count: usize,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPlanGroceryReport {
    pub message: String,
    pub items_added: usize,
    pub items_merged: usize,
    pub total_cost: f64,
    pub meal_count: usize,
    pub unique_ingredients: usize,
}

pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Aggregate every ingredient of every planned meal by lower-cased name and unit.
/// Items keep the order in which they first appear.
pub fn consolidate_meal_plan(plan: &MealPlan, prices: &PriceTable) -> MealPlanGroceries {
    let mut items: Vec<(String, MealPlanGroceryItem)> = Vec::new();
    let mut positions: HashMap<(String, String), usize> = HashMap::new();
    let mut meal_count = 0;

    for meals in plan.values() {
        for meal in meals {
            meal_count += 1;
            for ingredient in &meal.ingredients {
                let name = ingredient.name.trim().to_lowercase();
                if name.is_empty() {
                    continue;
                }
                let key = (name.clone(), ingredient.unit.trim().to_lowercase());
                match positions.get(&key) {
                    Some(&index) => items[index].1.quantity += ingredient.quantity,
                    None => {
                        positions.insert(key, items.len());
                        items.push((
                            name.clone(),
                            MealPlanGroceryItem {
                                name: title_case(&name),
                                quantity: ingredient.quantity,
                                unit: ingredient.unit.trim().to_string(),
                                estimated_cost: 0.0,
                            },
                        ));
                    }
                }
            }
        }
    }

    let items: Vec<MealPlanGroceryItem> = items
        .into_iter()
        .map(|(name, mut item)| {
            item.estimated_cost = round_to(prices.unit_price(&name) * item.quantity, 2);
            item
        })
        .collect();

    MealPlanGroceries {
        total_cost: round_to(items.iter().map(|item| item.estimated_cost).sum(), 2),
        items,
        meal_count,
    }
}

/// Writes meal-plan groceries into `grocery_items`
#[derive(Clone)]
pub struct MealPlanService {
    store: Arc<dyn Store>,
    prices: Arc<PriceTable>,
}

impl MealPlanService {
    pub fn new(store: Arc<dyn Store>, prices: Arc<PriceTable>) -> Self {
        Self { store, prices }
    }

    /// Merge the plan's groceries into the user's unpurchased items with the same name and unit
    pub async fn save_meal_plan_grocery(
        &self,
        user_id: &str,
        plan: &MealPlan,
    ) -> Result<MealPlanGroceryReport, RecipeError> {
        if user_id.trim().is_empty() {
            return Err(RecipeError::invalid("user_id is required"));
        }

        let groceries = consolidate_meal_plan(plan, &self.prices);
        let now = Utc::now();
        let mut items_added = 0;
        let mut items_merged = 0;

        for item in &groceries.items {
            let row = GroceryItem {
                id: None,
                user_id: user_id.to_string(),
                name: item.name.clone(),
                item_name: item.name.clone(),
                normalized_name: normalize_ingredient_name(&item.name),
                quantity: item.quantity,
                unit: item.unit.clone(),
                category: MEAL_PLAN_CATEGORY.to_string(),
                is_purchased: false,
                estimated_cost: item.estimated_cost,
                original_names: vec![item.name.clone()],
                created_at: Some(now),
                updated_at: Some(now),
                purchased_at: None,
            };
            let key = [
                Filter::eq("user_id", user_id),
                Filter::eq("item_name", item.name.as_str()),
                Filter::eq("unit", item.unit.as_str()),
                Filter::eq("is_purchased", false),
            ];
            let merge = additive_merge(item.quantity, item.estimated_cost, now);

            let outcome = self
                .store
                .upsert_with(GROCERY_ITEMS_TABLE, &key, to_record(&row)?, &merge)
                .await
                .map_err(RecipeError::persistence)?;
            if outcome.is_merged() {
                items_merged += 1;
            } else {
                items_added += 1;
            }
        }

        info!(
            user_id = %user_id,
            meals = groceries.meal_count,
            added = items_added,
            merged = items_merged,
            "Saved meal plan groceries"
        );

        Ok(MealPlanGroceryReport {
            message: format!("Generated grocery list from {} planned meals", groceries.meal_count),
            items_added,
            items_merged,
            total_cost: groceries.total_cost,
            meal_count: groceries.meal_count,
            unique_ingredients: groceries.items.len(),
        })
    }
}
