//! # Recipe Scaling
//!
//! Scales saved recipes to a new number of servings, converts their units and
//! derives grocery lists, nutrition comparisons and cost analytics from them.
//!
//! A saved recipe that does not record its servings is treated as serving
//! [`DEFAULT_SERVINGS`]; a warning is logged whenever that assumption is made.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::{from_record, record_id, to_record, Filter, Record, Store, RECIPES_TABLE};
use crate::errors::RecipeError;
use crate::price_table::PriceTable;
use crate::recipe_model::{
    flexible_f64, round_to, Ingredient, Macros, StoredRecipe, DEFAULT_SERVINGS, UNKNOWN_LABEL,
};
use crate::recipe_service::load_recipe_by_title;
use crate::unit_converter::UnitConverter;

/// Servings the recipe was written for
pub fn original_servings(recipe: &StoredRecipe) -> u32 {
    match recipe.servings.filter(|&servings| servings > 0) {
        Some(servings) => servings,
        None => {
            warn!(
                recipe = %recipe.title,
                default = DEFAULT_SERVINGS,
                "Recipe has no recorded servings, assuming the default"
            );
            DEFAULT_SERVINGS
        }
    }
}

pub fn scale_ingredients(ingredients: &[Ingredient], factor: f64) -> Vec<Ingredient> {
    ingredients
        .iter()
        .map(|ingredient| Ingredient {
            quantity: ingredient.quantity * factor,
            ..ingredient.clone()
        })
        .collect()
}

/// Apply `conversions` (ingredient name fragment to target unit) to matching ingredients.
///
/// The first fragment contained in an ingredient's name decides its target
/// unit; ingredients whose unit cannot be converted are left as they are.
pub fn convert_ingredients(
    ingredients: &[Ingredient],
    conversions: &BTreeMap<String, String>,
    converter: &UnitConverter,
) -> Vec<Ingredient> {
    ingredients
        .iter()
        .map(|ingredient| {
            let name = ingredient.name.to_lowercase();
            let target = conversions
                .iter()
                .find(|(fragment, _)| name.contains(&fragment.to_lowercase()))
                .map(|(_, unit)| unit);

            match target.and_then(|unit| {
                converter
                    .convert(ingredient.quantity, &ingredient.unit, unit)
                    .map(|quantity| (quantity, unit))
            }) {
                Some((quantity, unit)) => Ingredient {
                    name: ingredient.name.clone(),
                    unit: unit.clone(),
                    quantity,
                },
                None => ingredient.clone(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaledRecipe {
    pub recipe_name: String,
    pub servings: u32,
    pub ingredients: Vec<Ingredient>,
    pub directions: Vec<String>,
    pub cuisine: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleResult {
    pub recipe: ScaledRecipe,
    pub scaling_factor: f64,
    pub original_servings: u32,
    pub new_servings: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaledGroceryLine {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    pub unit_price: f64,
    pub total_cost: f64,
    /// Units this line could be shown in instead
    pub compatible_units: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaledGroceryList {
    pub grocery_list: Vec<ScaledGroceryLine>,
    pub total_cost: f64,
    pub total_items: usize,
    /// Servings covered; summed across recipes for a combined list
    pub servings: u64,
}

/// Numeric nutrition values, rounded to one decimal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionValues {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
}

impl NutritionValues {
    fn from_macros(macros: &Macros) -> Self {
        Self {
            calories: macros.calories,
            protein: macros.protein.value(),
            carbs: macros.carbs.value(),
            fat: macros.fat.value(),
            fiber: macros.fiber.value(),
        }
    }

    fn scaled(&self, factor: f64) -> Self {
        Self {
            calories: round_to(self.calories * factor, 1),
            protein: round_to(self.protein * factor, 1),
            carbs: round_to(self.carbs * factor, 1),
            fat: round_to(self.fat * factor, 1),
            fiber: round_to(self.fiber * factor, 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServingComparison {
    pub total_servings: u32,
    pub per_serving: NutritionValues,
    pub total_recipe: NutritionValues,
    pub total_cost: f64,
    pub cost_per_serving: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionComparison {
    pub recipe_name: String,
    pub comparisons: Vec<ServingComparison>,
}

/// Share of macro energy, in percent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroPercentages {
    pub protein_percent: f64,
    pub carbs_percent: f64,
    pub fat_percent: f64,
}

/// Energy split of protein, carbs and fat (4, 4 and 9 kcal per gram).
/// `None` when the recipe has no macro energy at all.
pub fn macro_percentages(nutrition: &NutritionValues) -> Option<MacroPercentages> {
    let protein = nutrition.protein * 4.0;
    let carbs = nutrition.carbs * 4.0;
    let fat = nutrition.fat * 9.0;
    let total = protein + carbs + fat;
    if total <= 0.0 {
        return None;
    }
    Some(MacroPercentages {
        protein_percent: round_to(protein / total * 100.0, 1),
        carbs_percent: round_to(carbs / total * 100.0, 1),
        fat_percent: round_to(fat / total * 100.0, 1),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostAnalysis {
    pub total_cost: f64,
    pub cost_per_serving: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeAnalytics {
    pub recipe_name: String,
    pub servings: u32,
    pub cost_analysis: CostAnalysis,
    pub nutrition_per_serving: NutritionValues,
    pub total_nutrition: NutritionValues,
    pub macro_percentages: Option<MacroPercentages>,
    pub ingredient_count: usize,
    pub cost_per_calorie: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchScaleResult {
    pub new_servings: u32,
    /// Keyed by the requested recipe name; unknown recipes are absent
    pub results: BTreeMap<String, ScaleResult>,
}

pub const IMPORTED_RECIPE_NAME: &str = "Imported Recipe";

/// Portable form of a saved recipe, used for export and import.
///
/// Field names follow common recipe formats: `name` for the title and
/// `instructions` for the directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedRecipe {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servings: Option<u32>,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub cuisine: String,
    #[serde(default)]
    pub diet: String,
    #[serde(default)]
    pub nutrition: Macros,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub cost_estimate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<DateTime<Utc>>,
}

fn label_or_unknown(label: &str) -> String {
    match label.trim() {
        "" => UNKNOWN_LABEL.to_string(),
        label => label.to_string(),
    }
}

impl ExportedRecipe {
    pub fn from_stored(recipe: &StoredRecipe) -> Self {
        Self {
            name: recipe.title.clone(),
            servings: Some(original_servings(recipe)),
            ingredients: recipe.ingredients.clone(),
            instructions: recipe.directions.clone(),
            tags: recipe.tags.clone(),
            cuisine: recipe.cuisine.clone(),
            diet: recipe.diet.clone(),
            nutrition: recipe.macro_estimate.clone(),
            cost_estimate: recipe.cost_estimate,
            created_date: recipe.created_at,
        }
    }

    /// Row for the `recipes` table owned by `user_id`
    pub fn to_stored(&self, user_id: &str) -> StoredRecipe {
        let name = self.name.trim();
        StoredRecipe {
            id: None,
            user_id: user_id.to_string(),
            title: if name.is_empty() {
                IMPORTED_RECIPE_NAME.to_string()
            } else {
                name.to_string()
            },
            ingredients: self.ingredients.clone(),
            directions: self.instructions.clone(),
            tags: self.tags.clone(),
            cuisine: label_or_unknown(&self.cuisine),
            diet: label_or_unknown(&self.diet),
            macro_estimate: self.nutrition.clone(),
            cost_estimate: round_to(self.cost_estimate, 2),
            servings: self.servings.filter(|&servings| servings > 0),
            created_at: Some(Utc::now()),
        }
    }

    fn validate(&self) -> Result<(), RecipeError> {
        if self.cost_estimate < 0.0 {
            return Err(RecipeError::invalid("cost estimate cannot be negative"));
        }
        if let Some(ingredient) = self.ingredients.iter().find(|i| i.quantity < 0.0) {
            return Err(RecipeError::invalid(format!(
                "ingredient '{}' has a negative quantity",
                ingredient.name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeExport {
    pub recipe_data: ExportedRecipe,
    pub exported_at: DateTime<Utc>,
}

/// Scaling and analytics over saved recipes
#[derive(Clone)]
pub struct ScalingService {
    store: Arc<dyn Store>,
    prices: Arc<PriceTable>,
    converter: UnitConverter,
}

impl ScalingService {
    pub fn new(store: Arc<dyn Store>, prices: Arc<PriceTable>) -> Self {
        Self {
            store,
            prices,
            converter: UnitConverter::new(),
        }
    }

    async fn recipe(&self, user_id: &str, recipe_name: &str) -> Result<StoredRecipe, RecipeError> {
        load_recipe_by_title(self.store.as_ref(), user_id, recipe_name).await
    }

    pub async fn scale_recipe(
        &self,
        user_id: &str,
        recipe_name: &str,
        new_servings: u32,
    ) -> Result<ScaleResult, RecipeError> {
        if new_servings == 0 {
            return Err(RecipeError::invalid("servings must be at least 1"));
        }
        let recipe = self.recipe(user_id, recipe_name).await?;
        Ok(scale(&recipe, new_servings))
    }

    /// Rewrite the saved recipe's ingredients in the requested units
    pub async fn convert_recipe_units(
        &self,
        user_id: &str,
        recipe_name: &str,
        conversions: &BTreeMap<String, String>,
    ) -> Result<StoredRecipe, RecipeError> {
        let recipe = self.recipe(user_id, recipe_name).await?;
        let id = recipe
            .id
            .ok_or_else(|| RecipeError::Persistence("stored recipe has no id".into()))?;
        let ingredients = convert_ingredients(&recipe.ingredients, conversions, &self.converter);

        let mut patch = Record::new();
        let ingredients = serde_json::to_value(&ingredients)
            .map_err(|e| RecipeError::Persistence(format!("Failed to encode ingredients: {e}")))?;
        patch.insert("ingredients".into(), ingredients);
        let updated = self
            .store
            .update(RECIPES_TABLE, &[Filter::eq("id", id), Filter::eq("user_id", user_id)], patch)
            .await
            .map_err(RecipeError::persistence)?;
        let record = updated
            .into_iter()
            .next()
            .ok_or_else(|| RecipeError::NotFound(format!("recipe '{recipe_name}'")))?;

        info!(
            user_id = %user_id,
            recipe = %recipe_name,
            conversions = conversions.len(),
            "Converted recipe units"
        );
        Ok(from_record(record)?)
    }

    /// Grocery list for the recipe scaled to `servings`
    pub async fn scaled_grocery_list(
        &self,
        user_id: &str,
        recipe_name: &str,
        servings: u32,
        preferred_units: &BTreeMap<String, String>,
    ) -> Result<ScaledGroceryList, RecipeError> {
        let scaled = self.scale_recipe(user_id, recipe_name, servings).await?;
        Ok(self.grocery_list_for(&scaled.recipe.ingredients, u64::from(servings), preferred_units))
    }

    fn grocery_list_for(
        &self,
        ingredients: &[Ingredient],
        servings: u64,
        preferred_units: &BTreeMap<String, String>,
    ) -> ScaledGroceryList {
        let mut lines: Vec<ScaledGroceryLine> = ingredients
            .iter()
            .map(|ingredient| {
                let mut quantity = ingredient.quantity;
                let mut unit = ingredient.unit.clone();
                let mut unit_price = self.prices.unit_price(&ingredient.name);

                if let Some(preferred) = preferred_units.get(&ingredient.name) {
                    if let Some(converted) = self.converter.convert(quantity, &unit, preferred) {
                        if quantity > 0.0 && converted > 0.0 {
                            unit_price /= converted / quantity;
                        }
                        quantity = converted;
                        unit = preferred.clone();
                    }
                }

                ScaledGroceryLine {
                    name: ingredient.name.clone(),
                    total_cost: round_to(quantity * unit_price, 2),
                    quantity: round_to(quantity, 2),
                    compatible_units: self.converter.compatible_units(&unit),
                    unit,
                    unit_price,
                }
            })
            .collect();
        lines.sort_by(|a, b| a.name.cmp(&b.name));

        ScaledGroceryList {
            total_cost: round_to(lines.iter().map(|line| line.total_cost).sum(), 2),
            total_items: lines.len(),
            grocery_list: lines,
            servings,
        }
    }

    /// One list for several recipes, merging lines with the same name and unit.
    /// Recipes that do not exist are skipped.
    pub async fn combined_grocery_list(
        &self,
        user_id: &str,
        servings_by_recipe: &BTreeMap<String, u32>,
        preferred_units: &BTreeMap<String, String>,
    ) -> Result<ScaledGroceryList, RecipeError> {
        let mut combined: Vec<ScaledGroceryLine> = Vec::new();
        let mut positions: HashMap<(String, String), usize> = HashMap::new();

        for (recipe_name, &servings) in servings_by_recipe {
            let list = match self
                .scaled_grocery_list(user_id, recipe_name, servings, preferred_units)
                .await
            {
                Ok(list) => list,
                Err(RecipeError::NotFound(_)) => {
                    warn!(user_id = %user_id, recipe = %recipe_name, "Skipping unknown recipe");
                    continue;
                }
                Err(err) => return Err(err),
            };

            for line in list.grocery_list {
                let key = (line.name.clone(), line.unit.clone());
                match positions.get(&key) {
                    Some(&index) => {
                        combined[index].quantity += line.quantity;
                        combined[index].total_cost += line.total_cost;
                    }
                    None => {
                        positions.insert(key, combined.len());
                        combined.push(line);
                    }
                }
            }
        }

        for line in &mut combined {
            line.quantity = round_to(line.quantity, 2);
            line.total_cost = round_to(line.total_cost, 2);
        }
        combined.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.unit.cmp(&b.unit)));

        Ok(ScaledGroceryList {
            total_cost: round_to(combined.iter().map(|line| line.total_cost).sum(), 2),
            total_items: combined.len(),
            grocery_list: combined,
            servings: servings_by_recipe.values().map(|&servings| u64::from(servings)).sum(),
        })
    }

    pub async fn nutrition_comparison(
        &self,
        user_id: &str,
        recipe_name: &str,
        serving_sizes: &[u32],
    ) -> Result<NutritionComparison, RecipeError> {
        let recipe = self.recipe(user_id, recipe_name).await?;
        let original = f64::from(original_servings(&recipe));
        let totals = NutritionValues::from_macros(&recipe.macro_estimate);

        let comparisons = serving_sizes
            .iter()
            .map(|&servings| {
                let factor = f64::from(servings) / original;
                let total_cost = recipe.cost_estimate * factor;
                let (per_serving, cost_per_serving) = if servings > 0 {
                    (
                        totals.scaled(factor / f64::from(servings)),
                        total_cost / f64::from(servings),
                    )
                } else {
                    (NutritionValues::default(), 0.0)
                };
                ServingComparison {
                    total_servings: servings,
                    per_serving,
                    total_recipe: totals.scaled(factor),
                    total_cost: round_to(total_cost, 2),
                    cost_per_serving: round_to(cost_per_serving, 2),
                }
            })
            .collect();

        Ok(NutritionComparison {
            recipe_name: recipe.title,
            comparisons,
        })
    }

    /// Servings that bring each portion closest to `target_calories_per_serving`.
    /// `None` when the recipe has no calorie estimate.
    pub async fn optimize_serving_size(
        &self,
        user_id: &str,
        recipe_name: &str,
        target_calories_per_serving: f64,
    ) -> Result<Option<u32>, RecipeError> {
        if target_calories_per_serving.is_nan() || target_calories_per_serving <= 0.0 {
            return Err(RecipeError::invalid("target calories must be positive"));
        }
        let recipe = self.recipe(user_id, recipe_name).await?;
        Ok(optimal_servings(recipe.macro_estimate.calories, target_calories_per_serving))
    }

    pub async fn recipe_analytics(
        &self,
        user_id: &str,
        recipe_name: &str,
    ) -> Result<RecipeAnalytics, RecipeError> {
        let recipe = self.recipe(user_id, recipe_name).await?;
        Ok(analytics(&recipe))
    }

    /// Scale several recipes to the same servings, skipping unknown ones
    pub async fn batch_scale_recipes(
        &self,
        user_id: &str,
        recipe_names: &[String],
        new_servings: u32,
    ) -> Result<BatchScaleResult, RecipeError> {
        if new_servings == 0 {
            return Err(RecipeError::invalid("servings must be at least 1"));
        }

        let mut results = BTreeMap::new();
        for recipe_name in recipe_names {
            match self.recipe(user_id, recipe_name).await {
                Ok(recipe) => {
                    results.insert(recipe_name.clone(), scale(&recipe, new_servings));
                }
                Err(RecipeError::NotFound(_)) => {
                    warn!(user_id = %user_id, recipe = %recipe_name, "Skipping unknown recipe");
                }
                Err(err) => return Err(err),
            }
        }

        info!(
            user_id = %user_id,
            requested = recipe_names.len(),
            scaled = results.len(),
            new_servings,
            "Batch scaled recipes"
        );
        Ok(BatchScaleResult {
            new_servings,
            results,
        })
    }

    pub async fn export_recipe(
        &self,
        user_id: &str,
        recipe_name: &str,
    ) -> Result<RecipeExport, RecipeError> {
        let recipe = self.recipe(user_id, recipe_name).await?;
        Ok(RecipeExport {
            recipe_data: ExportedRecipe::from_stored(&recipe),
            exported_at: Utc::now(),
        })
    }

    /// Check `recipe` and, when `save` is set, store it for the user.
    /// Returns the new recipe id when saved.
    pub async fn import_recipe(
        &self,
        user_id: &str,
        recipe: &ExportedRecipe,
        save: bool,
    ) -> Result<Option<i64>, RecipeError> {
        if user_id.trim().is_empty() {
            return Err(RecipeError::invalid("user_id is required"));
        }
        recipe.validate()?;
        if !save {
            return Ok(None);
        }

        let row = recipe.to_stored(user_id);
        let saved = self
            .store
            .insert(RECIPES_TABLE, to_record(&row)?)
            .await
            .map_err(RecipeError::persistence)?;
        let id = record_id(&saved)
            .ok_or_else(|| RecipeError::Persistence("imported recipe has no id".into()))?;
        info!(user_id = %user_id, recipe_id = id, recipe = %row.title, "Imported recipe");
        Ok(Some(id))
    }

    pub async fn delete_recipe(&self, user_id: &str, recipe_name: &str) -> Result<(), RecipeError> {
        let filters = [Filter::eq("user_id", user_id), Filter::eq("title", recipe_name)];
        let deleted = self
            .store
            .delete(RECIPES_TABLE, &filters)
            .await
            .map_err(RecipeError::persistence)?;
        if deleted == 0 {
            return Err(RecipeError::NotFound(format!("recipe '{recipe_name}'")));
        }
        info!(user_id = %user_id, recipe = %recipe_name, deleted, "Deleted recipe");
        Ok(())
    }
}

fn scale(recipe: &StoredRecipe, new_servings: u32) -> ScaleResult {
    let original = original_servings(recipe);
    let factor = f64::from(new_servings) / f64::from(original);
    ScaleResult {
        recipe: ScaledRecipe {
            recipe_name: format!("{} (for {new_servings} servings)", recipe.title),
            servings: new_servings,
            ingredients: scale_ingredients(&recipe.ingredients, factor),
            directions: recipe.directions.clone(),
            cuisine: recipe.cuisine.clone(),
            tags: recipe.tags.clone(),
        },
        scaling_factor: factor,
        original_servings: original,
        new_servings,
    }
}

/// `max(1, round(total / target))`, or `None` without a positive total
pub fn optimal_servings(total_calories: f64, target_calories_per_serving: f64) -> Option<u32> {
    if total_calories <= 0.0 || target_calories_per_serving <= 0.0 {
        return None;
    }
    let servings = (total_calories / target_calories_per_serving).round();
    Some(servings.clamp(1.0, f64::from(u32::MAX)) as u32)
}

pub fn analytics(recipe: &StoredRecipe) -> RecipeAnalytics {
    let servings = original_servings(recipe);
    let per = f64::from(servings);
    let totals = NutritionValues::from_macros(&recipe.macro_estimate);
    let cost_per_serving = recipe.cost_estimate / per;
    let calories_per_serving = totals.calories / per;

    RecipeAnalytics {
        recipe_name: recipe.title.clone(),
        servings,
        cost_analysis: CostAnalysis {
            total_cost: round_to(recipe.cost_estimate, 2),
            cost_per_serving: round_to(cost_per_serving, 2),
        },
        nutrition_per_serving: totals.scaled(1.0 / per),
        macro_percentages: macro_percentages(&totals),
        total_nutrition: totals.scaled(1.0),
        ingredient_count: recipe.ingredients.len(),
        cost_per_calorie: if calories_per_serving > 0.0 {
            round_to(cost_per_serving / calories_per_serving, 4)
        } else {
            0.0
        },
    }
}
