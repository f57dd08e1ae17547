//! # Grocery Estimator
//!
//! Prices ingredients into grocery lines and keeps a per-user grocery list.
//!
//! Items saved to the list are first consolidated by canonical ingredient name
//! ("Chicken Breast" and "chicken thigh" both count as "chicken"), then merged
//! into any not-yet-purchased row for the same user and canonical name. The
//! merge is a single atomic upsert in the store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::db::{from_record, to_record, Filter, Record, Store, GROCERY_ITEMS_TABLE};
use crate::errors::RecipeError;
use crate::ingredient_normalizer::{display_name, normalize_ingredient_name};
use crate::price_table::PriceTable;
use crate::recipe_model::{flexible_f64, round_to, GroceryLine, Ingredient};

/// Category given to items that arrive without one
pub const RECIPE_GENERATED_CATEGORY: &str = "Recipe Generated";

/// Decimal places kept on consolidated quantities
pub const QUANTITY_DECIMALS: i32 = 3;

/// One priced line per ingredient
pub fn estimate_grocery_list(ingredients: &[Ingredient], prices: &PriceTable) -> Vec<GroceryLine> {
    ingredients
        .iter()
        .map(|ingredient| {
            let item = ingredient.name.to_lowercase();
            let estimated_cost = round_to(prices.unit_price(&item) * ingredient.quantity, 2);
            GroceryLine {
                item,
                quantity: ingredient.quantity,
                estimated_cost,
            }
        })
        .collect()
}

/// Total price of the ingredients, rounded to cents
pub fn calculate_recipe_cost(ingredients: &[Ingredient], prices: &PriceTable) -> f64 {
    let total: f64 = ingredients
        .iter()
        .map(|ingredient| prices.unit_price(&ingredient.name) * ingredient.quantity)
        .sum();
    round_to(total, 2)
}

fn one() -> f64 {
    1.0
}

/// A grocery item as submitted by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroceryItemInput {
    pub item_name: String,
    #[serde(default = "one")]
    pub quantity: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub estimated_cost: f64,
    #[serde(default)]
    pub category: Option<String>,
}

impl GroceryItemInput {
    pub fn new(item_name: &str, quantity: f64, estimated_cost: f64) -> Self {
        Self {
            item_name: item_name.to_string(),
            quantity,
            unit: String::new(),
            estimated_cost,
            category: None,
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = unit.to_string();
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }
}

impl From<&GroceryLine> for GroceryItemInput {
    fn from(line: &GroceryLine) -> Self {
        GroceryItemInput::new(&line.item, line.quantity, line.estimated_cost)
    }
}

/// Items sharing a canonical name, summed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedGroceryItem {
    pub normalized_name: String,
    /// Display label, e.g. "Chicken"
    pub item_name: String,
    pub quantity: f64,
    pub unit: String,
    pub estimated_cost: f64,
    pub category: String,
    /// Names as submitted, in submission order
    pub original_names: Vec<String>,
}

/// Group items by canonical name, summing quantity and cost.
///
/// Groups appear in order of first occurrence. Quantities are rounded to
/// [`QUANTITY_DECIMALS`] places and costs to cents, so the totals do not depend
/// on the order of `items`.
pub fn consolidate_grocery_items(items: &[GroceryItemInput]) -> Vec<ConsolidatedGroceryItem> {
    let mut consolidated: Vec<ConsolidatedGroceryItem> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for item in items {
        let normalized = normalize_ingredient_name(&item.item_name);
        match positions.get(&normalized) {
            Some(&index) => {
                let entry = &mut consolidated[index];
                entry.quantity += item.quantity;
                entry.estimated_cost += item.estimated_cost;
                entry.original_names.push(item.item_name.clone());
            }
            None => {
                positions.insert(normalized.clone(), consolidated.len());
                consolidated.push(ConsolidatedGroceryItem {
                    item_name: display_name(&normalized, &item.item_name),
                    normalized_name: normalized,
                    quantity: item.quantity,
                    unit: item.unit.clone(),
                    estimated_cost: item.estimated_cost,
                    category: item
                        .category
                        .clone()
                        .unwrap_or_else(|| RECIPE_GENERATED_CATEGORY.to_string()),
                    original_names: vec![item.item_name.clone()],
                });
            }
        }
    }

    for entry in &mut consolidated {
        entry.quantity = round_to(entry.quantity, QUANTITY_DECIMALS);
        entry.estimated_cost = round_to(entry.estimated_cost, 2);
    }
    debug!(
        "Consolidated {} grocery items into {}",
        items.len(),
        consolidated.len()
    );
    consolidated
}

fn recipe_generated() -> String {
    RECIPE_GENERATED_CATEGORY.to_string()
}

/// A row of the `grocery_items` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroceryItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub item_name: String,
    #[serde(default)]
    pub normalized_name: String,
    #[serde(default = "one", deserialize_with = "flexible_f64")]
    pub quantity: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default = "recipe_generated")]
    pub category: String,
    #[serde(default)]
    pub is_purchased: bool,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub estimated_cost: f64,
    #[serde(default)]
    pub original_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchased_at: Option<DateTime<Utc>>,
}

impl GroceryItem {
    fn from_consolidated(
        user_id: &str,
        item: &ConsolidatedGroceryItem,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            user_id: user_id.to_string(),
            name: item.item_name.clone(),
            item_name: item.item_name.clone(),
            normalized_name: item.normalized_name.clone(),
            quantity: item.quantity,
            unit: item.unit.clone(),
            category: item.category.clone(),
            is_purchased: false,
            estimated_cost: item.estimated_cost,
            original_names: item.original_names.clone(),
            created_at: Some(now),
            updated_at: Some(now),
            purchased_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationSummary {
    pub original_items: usize,
    pub consolidated_items: usize,
    pub items_saved: usize,
}

/// Outcome of saving items to a grocery list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveGroceryReport {
    pub message: String,
    pub inserted_items: usize,
    pub updated_items: usize,
    pub total_cost: f64,
    pub consolidation_summary: ConsolidationSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroceryListSummary {
    pub items: Vec<GroceryItem>,
    pub total_items: usize,
    pub total_cost: f64,
}

/// Per-user grocery list backed by the `grocery_items` table
#[derive(Clone)]
pub struct GroceryListService {
    store: Arc<dyn Store>,
}

fn number_field(record: &Record, field: &str) -> f64 {
    match record.get(field) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Merge step for grocery upserts: add quantity and cost to the existing row
pub(crate) fn additive_merge(
    quantity: f64,
    cost: f64,
    now: DateTime<Utc>,
) -> impl Fn(&mut Record) + Send + Sync {
    let timestamp = json!(now);
    move |existing: &mut Record| {
        let merged_quantity = number_field(existing, "quantity") + quantity;
        let merged_cost = round_to(number_field(existing, "estimated_cost") + cost, 2);
        existing.insert("quantity".into(), json!(merged_quantity));
        existing.insert("estimated_cost".into(), json!(merged_cost));
        existing.insert("updated_at".into(), timestamp.clone());
    }
}

impl GroceryListService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Consolidate `items` and merge them into the user's unpurchased list
    pub async fn save_grocery_list(
        &self,
        user_id: &str,
        items: &[GroceryItemInput],
    ) -> Result<SaveGroceryReport, RecipeError> {
        if user_id.trim().is_empty() {
            return Err(RecipeError::invalid("user_id is required"));
        }
        if items.is_empty() {
            return Err(RecipeError::invalid("no grocery items provided"));
        }

        let consolidated = consolidate_grocery_items(items);
        let now = Utc::now();
        let mut inserted_items = 0;
        let mut updated_items = 0;

        for item in &consolidated {
            let key = [
                Filter::eq("user_id", user_id),
                Filter::eq("normalized_name", item.normalized_name.as_str()),
                Filter::eq("is_purchased", false),
            ];
            let row = to_record(&GroceryItem::from_consolidated(user_id, item, now))?;
            let merge = additive_merge(item.quantity, item.estimated_cost, now);

            let outcome = self
                .store
                .upsert_with(GROCERY_ITEMS_TABLE, &key, row, &merge)
                .await
                .map_err(RecipeError::persistence)?;
            if outcome.is_merged() {
                updated_items += 1;
            } else {
                inserted_items += 1;
            }
        }

        let total_cost = round_to(consolidated.iter().map(|item| item.estimated_cost).sum(), 2);
        info!(
            user_id = %user_id,
            original = items.len(),
            consolidated = consolidated.len(),
            inserted = inserted_items,
            updated = updated_items,
            "Saved grocery list"
        );

        Ok(SaveGroceryReport {
            message: format!(
                "Successfully processed {} items into {} unique ingredients",
                items.len(),
                consolidated.len()
            ),
            inserted_items,
            updated_items,
            total_cost,
            consolidation_summary: ConsolidationSummary {
                original_items: items.len(),
                consolidated_items: consolidated.len(),
                items_saved: items.len() - consolidated.len(),
            },
        })
    }

    /// The user's items, unpurchased only unless `include_purchased`
    pub async fn grocery_list(
        &self,
        user_id: &str,
        include_purchased: bool,
    ) -> Result<GroceryListSummary, RecipeError> {
        let mut filters = vec![Filter::eq("user_id", user_id)];
        if !include_purchased {
            filters.push(Filter::eq("is_purchased", false));
        }

        let records = self
            .store
            .select(GROCERY_ITEMS_TABLE, &filters)
            .await
            .map_err(RecipeError::persistence)?;
        let items = records
            .into_iter()
            .map(from_record::<GroceryItem>)
            .collect::<anyhow::Result<Vec<_>>>()?;

        let total_cost = round_to(items.iter().map(|item| item.estimated_cost).sum(), 2);
        Ok(GroceryListSummary {
            total_items: items.len(),
            total_cost,
            items,
        })
    }

    pub async fn mark_purchased(
        &self,
        user_id: &str,
        item_id: i64,
    ) -> Result<GroceryItem, RecipeError> {
        let mut patch = Record::new();
        patch.insert("is_purchased".into(), json!(true));
        patch.insert("purchased_at".into(), json!(Utc::now()));

        let updated = self
            .store
            .update(GROCERY_ITEMS_TABLE, &owned_item(user_id, item_id), patch)
            .await
            .map_err(RecipeError::persistence)?;
        let record = updated
            .into_iter()
            .next()
            .ok_or_else(|| RecipeError::NotFound(format!("grocery item {item_id}")))?;
        Ok(from_record(record)?)
    }

    pub async fn delete_item(&self, user_id: &str, item_id: i64) -> Result<(), RecipeError> {
        let deleted = self
            .store
            .delete(GROCERY_ITEMS_TABLE, &owned_item(user_id, item_id))
            .await
            .map_err(RecipeError::persistence)?;
        if deleted == 0 {
            return Err(RecipeError::NotFound(format!("grocery item {item_id}")));
        }
        Ok(())
    }

    /// Remove every purchased item; returns how many were removed
    pub async fn clear_purchased(&self, user_id: &str) -> Result<u64, RecipeError> {
        let filters = [Filter::eq("user_id", user_id), Filter::eq("is_purchased", true)];
        let cleared = self
            .store
            .delete(GROCERY_ITEMS_TABLE, &filters)
            .await
            .map_err(RecipeError::persistence)?;
        info!(user_id = %user_id, cleared, "Cleared purchased grocery items");
        Ok(cleared)
    }
}

fn owned_item(user_id: &str, item_id: i64) -> [Filter; 2] {
    [Filter::eq("id", item_id), Filter::eq("user_id", user_id)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;

    fn service() -> GroceryListService {
        GroceryListService::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_estimate_grocery_list_uses_fallback_price() {
        let prices = PriceTable::new().with_price("rice", 0.5);
        let ingredients = vec![
            Ingredient::new("Rice", "cup", 3.0),
            Ingredient::new("saffron", "pinch", 2.0),
        ];

        let lines = estimate_grocery_list(&ingredients, &prices);
        assert_eq!(
            lines[0],
            GroceryLine {
                item: "rice".into(),
                quantity: 3.0,
                estimated_cost: 1.5
            }
        );
        assert_eq!(lines[1].estimated_cost, 2.0);
        assert_eq!(calculate_recipe_cost(&ingredients, &prices), 3.5);
    }

    #[test]
    fn test_consolidation_groups_variants() {
        let items = vec![
            GroceryItemInput::new("Chicken Breast", 1.0, 3.00),
            GroceryItemInput::new("chicken thigh", 2.0, 4.00),
        ];

        let consolidated = consolidate_grocery_items(&items);
        assert_eq!(consolidated.len(), 1);
        let chicken = &consolidated[0];
        assert_eq!(chicken.item_name, "Chicken");
        assert_eq!(chicken.normalized_name, "chicken");
        assert_eq!(chicken.quantity, 3.0);
        assert_eq!(chicken.estimated_cost, 7.00);
        assert_eq!(chicken.category, RECIPE_GENERATED_CATEGORY);
        assert_eq!(chicken.original_names, vec!["Chicken Breast", "chicken thigh"]);
    }

    #[test]
    fn test_consolidation_totals_ignore_order() {
        let a = GroceryItemInput::new("yellow onion", 1.0, 0.75);
        let b = GroceryItemInput::new("Red Onion", 2.0, 1.5);
        let c = GroceryItemInput::new("basmati rice", 1.0, 2.25);
        let orders = [
            vec![a.clone(), b.clone(), c.clone()],
            vec![c.clone(), b.clone(), a.clone()],
            vec![b.clone(), c.clone(), a.clone()],
        ];

        let totals = |items: &[GroceryItemInput]| {
            let mut totals: Vec<(String, f64, f64)> = consolidate_grocery_items(items)
                .into_iter()
                .map(|item| (item.normalized_name, item.quantity, item.estimated_cost))
                .collect();
            totals.sort_by(|x, y| x.0.cmp(&y.0));
            totals
        };

        let expected = totals(&orders[0]);
        assert_eq!(expected.len(), 2);
        for order in &orders[1..] {
            assert_eq!(totals(order), expected);
        }
    }

    #[test]
    fn test_fractional_quantities_sum_the_same_in_any_order() {
        let items = vec![
            GroceryItemInput::new("chicken", 0.1, 0.3),
            GroceryItemInput::new("chicken breast", 0.2, 0.6),
            GroceryItemInput::new("Chicken", 0.3, 0.9),
        ];
        let mut reversed = items.clone();
        reversed.reverse();

        let forward = consolidate_grocery_items(&items);
        let backward = consolidate_grocery_items(&reversed);
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].quantity, 0.6);
        assert_eq!(backward[0].quantity, forward[0].quantity);
        assert_eq!(backward[0].estimated_cost, forward[0].estimated_cost);
        assert_eq!(forward[0].estimated_cost, 1.8);
    }

    #[tokio::test]
    async fn test_save_merges_with_existing_unpurchased_row() -> anyhow::Result<()> {
        let service = service();
        let first = service
            .save_grocery_list("u1", &[GroceryItemInput::new("Chicken Breast", 1.0, 3.0)])
            .await?;
        assert_eq!(first.inserted_items, 1);

        let second = service
            .save_grocery_list(
                "u1",
                &[
                    GroceryItemInput::new("chicken thigh", 2.0, 4.0),
                    GroceryItemInput::new("Garlic Clove", 3.0, 0.6),
                ],
            )
            .await?;
        assert_eq!(second.updated_items, 1);
        assert_eq!(second.inserted_items, 1);
        assert_eq!(second.total_cost, 4.6);

        let list = service.grocery_list("u1", false).await?;
        assert_eq!(list.total_items, 2);
        let chicken = list.items.iter().find(|item| item.normalized_name == "chicken").unwrap();
        assert_eq!(chicken.quantity, 3.0);
        assert_eq!(chicken.estimated_cost, 7.0);
        assert_eq!(list.total_cost, 7.6);
        Ok(())
    }

    #[tokio::test]
    async fn test_report_counts_consolidation() -> anyhow::Result<()> {
        let report = service()
            .save_grocery_list(
                "u1",
                &[
                    GroceryItemInput::new("yellow onion", 1.0, 0.75),
                    GroceryItemInput::new("white onion", 1.0, 0.75),
                    GroceryItemInput::new("eggs", 12.0, 3.0),
                ],
            )
            .await?;

        assert_eq!(report.message, "Successfully processed 3 items into 2 unique ingredients");
        assert_eq!(report.consolidation_summary.items_saved, 1);
        assert_eq!(report.total_cost, 4.5);
        Ok(())
    }

    #[tokio::test]
    async fn test_purchased_rows_are_not_merged() -> anyhow::Result<()> {
        let service = service();
        service
            .save_grocery_list("u1", &[GroceryItemInput::new("milk", 1.0, 0.15)])
            .await?;
        let list = service.grocery_list("u1", false).await?;
        let id = list.items[0].id.unwrap();

        let purchased = service.mark_purchased("u1", id).await?;
        assert!(purchased.is_purchased);
        assert!(purchased.purchased_at.is_some());

        let report = service
            .save_grocery_list("u1", &[GroceryItemInput::new("milk", 2.0, 0.3)])
            .await?;
        assert_eq!(report.inserted_items, 1);

        assert_eq!(service.grocery_list("u1", true).await?.total_items, 2);
        assert_eq!(service.grocery_list("u1", false).await?.total_items, 1);
        assert_eq!(service.clear_purchased("u1").await?, 1);
        assert_eq!(service.grocery_list("u1", true).await?.total_items, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_other_users_items_are_untouched() -> anyhow::Result<()> {
        let service = service();
        service
            .save_grocery_list("owner", &[GroceryItemInput::new("bread", 1.0, 2.0)])
            .await?;
        let id = service.grocery_list("owner", false).await?.items[0].id.unwrap();

        assert!(matches!(
            service.delete_item("intruder", id).await,
            Err(RecipeError::NotFound(_))
        ));
        assert!(matches!(
            service.mark_purchased("intruder", id).await,
            Err(RecipeError::NotFound(_))
        ));
        service.delete_item("owner", id).await?;
        assert_eq!(service.grocery_list("owner", true).await?.total_items, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_rejects_empty_requests() {
        let service = service();
        assert!(matches!(
            service.save_grocery_list("", &[GroceryItemInput::new("milk", 1.0, 0.15)]).await,
            Err(RecipeError::InvalidInput(_))
        ));
        assert!(matches!(
            service.save_grocery_list("u1", &[]).await,
            Err(RecipeError::InvalidInput(_))
        ));
    }
}
