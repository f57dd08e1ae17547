//! # Recipe Generation
//!
//! [`RecipeService`] turns a meal request into parsed, priced and (optionally)
//! saved recipes:
//!
//! 1. validate the request
//! 2. combine stored preferences and learned tastes into a prompt
//! 3. call the text generator (bounded by its own timeout)
//! 4. split and parse the completion in response order
//! 5. save each recipe, assigning `recipe_id`
//!
//! Every collaborator is injected, so the whole flow runs against a scripted
//! generator and the in-memory store in tests.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::config::{GenerationConfig, MAX_RECIPE_COUNT};
use crate::db::{
    from_record, record_id, to_record, Filter, Record, Store, RECIPES_TABLE, USER_PREFERENCES_TABLE,
};
use crate::errors::RecipeError;
use crate::price_table::PriceTable;
use crate::prompts::{build_batch_prompt, build_single_prompt, PromptConstraints};
use crate::ratings::{LearnedPreferences, RatingService};
use crate::recipe_model::{flexible_f64, ParsedRecipe, StoredRecipe};
use crate::recipe_parser::{parse_recipe_block, parse_recipes};
use crate::text_generator::TextGenerator;

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Stored per-user constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default, deserialize_with = "flexible_f64")]
    pub budget: f64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub allergies: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub diet: String,
}

impl UserPreferences {
    pub fn with_default_budget(budget: f64) -> Self {
        Self {
            budget,
            allergies: String::new(),
            diet: String::new(),
        }
    }
}

/// Stored budget when positive, else the requested one when positive, else `default`
pub fn effective_budget(stored: f64, requested: f64, default: f64) -> f64 {
    if stored > 0.0 {
        stored
    } else if requested > 0.0 {
        requested
    } else {
        default
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeRequest {
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub budget: f64,
    pub count: usize,
    /// Save each parsed recipe to the `recipes` table
    #[serde(default = "persist_by_default")]
    pub persist: bool,
}

fn persist_by_default() -> bool {
    true
}

/// A recipe the regenerated one must differ from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExcludedRecipe {
    Named {
        recipe_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recipe_text: Option<String>,
    },
    Text { recipe_text: String },
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}

impl ExcludedRecipe {
    pub fn named(recipe_name: &str) -> Self {
        ExcludedRecipe::Named {
            recipe_name: recipe_name.to_string(),
            recipe_text: None,
        }
    }

    /// Name for the prompt; the first line of the text when the name is blank
    pub fn label(&self) -> Option<&str> {
        let label = match self {
            ExcludedRecipe::Named {
                recipe_name,
                recipe_text,
            } => match recipe_name.trim() {
                "" => recipe_text.as_deref().map(first_line).unwrap_or(""),
                name => name,
            },
            ExcludedRecipe::Text { recipe_text } => first_line(recipe_text),
        };
        (!label.is_empty()).then_some(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleRecipeRequest {
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub budget: f64,
    #[serde(default)]
    pub exclusions: Vec<ExcludedRecipe>,
}

/// Search over a user's saved recipes; every criterion is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeSearch {
    pub keyword: Option<String>,
    pub max_cost: Option<f64>,
    pub tag: Option<String>,
    pub cuisine: Option<String>,
    pub diet: Option<String>,
}

impl RecipeSearch {
    fn matches(&self, recipe: &StoredRecipe) -> bool {
        let keyword = self.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty());
        if let Some(keyword) = keyword {
            if !recipe.title.to_lowercase().contains(&keyword.to_lowercase()) {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !recipe.tags.iter().any(|t| t.eq_ignore_ascii_case(tag.trim())) {
                return false;
            }
        }
        if let Some(cuisine) = &self.cuisine {
            if !recipe.cuisine.eq_ignore_ascii_case(cuisine.trim()) {
                return false;
            }
        }
        if let Some(diet) = &self.diet {
            if !recipe.diet.eq_ignore_ascii_case(diet.trim()) {
                return false;
            }
        }
        true
    }
}

pub(crate) async fn load_recipe_by_title(
    store: &dyn Store,
    user_id: &str,
    title: &str,
) -> Result<StoredRecipe, RecipeError> {
    let filters = [Filter::eq("user_id", user_id), Filter::eq("title", title)];
    let record = store
        .select(RECIPES_TABLE, &filters)
        .await
        .map_err(RecipeError::persistence)?
        .into_iter()
        .next()
        .ok_or_else(|| RecipeError::NotFound(format!("recipe '{title}'")))?;
    Ok(from_record(record)?)
}

fn newest_first(recipes: &mut [StoredRecipe]) {
    recipes.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
}

/// Recipe generation orchestrator
#[derive(Clone)]
pub struct RecipeService {
    generator: Arc<dyn TextGenerator>,
    store: Arc<dyn Store>,
    prices: Arc<PriceTable>,
    ratings: RatingService,
    config: GenerationConfig,
}

impl RecipeService {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn Store>,
        prices: Arc<PriceTable>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            ratings: RatingService::new(Arc::clone(&store)),
            generator,
            store,
            prices,
            config,
        }
    }

    /// Stored preferences, or defaults when there are none or they cannot be read
    pub async fn user_preferences(&self, user_id: &str) -> UserPreferences {
        let defaults = UserPreferences::with_default_budget(self.config.default_budget);
        let rows = match self
            .store
            .select(USER_PREFERENCES_TABLE, &[Filter::eq("user_id", user_id)])
            .await
        {
            Ok(rows) => rows,
            Err(err) => {
                let error = format!("{err:#}");
                warn!(
                    user_id = %user_id,
                    error = %error,
                    "Failed to load user preferences, using defaults"
                );
                return defaults;
            }
        };

        match rows.into_iter().next().map(from_record::<UserPreferences>) {
            Some(Ok(prefs)) => prefs,
            Some(Err(err)) => {
                let error = format!("{err:#}");
                warn!(
                    user_id = %user_id,
                    error = %error,
                    "Unreadable user preferences, using defaults"
                );
                defaults
            }
            None => {
                info!(user_id = %user_id, "No stored preferences, using defaults");
                defaults
            }
        }
    }

    pub async fn set_user_preferences(
        &self,
        user_id: &str,
        prefs: &UserPreferences,
    ) -> Result<(), RecipeError> {
        let mut record = to_record(prefs)?;
        record.insert("user_id".into(), json!(user_id));
        let replacement = record.clone();
        let merge = move |existing: &mut Record| {
            for (field, value) in &replacement {
                existing.insert(field.clone(), value.clone());
            }
        };
        self.store
            .upsert_with(USER_PREFERENCES_TABLE, &[Filter::eq("user_id", user_id)], record, &merge)
            .await
            .map_err(RecipeError::persistence)?;
        Ok(())
    }

    async fn learned(&self, user_id: &str) -> Option<LearnedPreferences> {
        match self.ratings.learned_preferences(user_id).await {
            Ok(learned) if !learned.is_empty() => Some(learned),
            Ok(_) => None,
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "Failed to load learned preferences");
                None
            }
        }
    }

    /// Generate `request.count` recipes, in the order the generator wrote them
    pub async fn generate_recipes(
        &self,
        request: &RecipeRequest,
    ) -> Result<Vec<ParsedRecipe>, RecipeError> {
        validate_common(&request.user_id, &request.title, request.budget)?;
        if request.count == 0 || request.count > MAX_RECIPE_COUNT {
            return Err(RecipeError::invalid(format!(
                "count must be between 1 and {MAX_RECIPE_COUNT}"
            )));
        }

        let prefs = self.user_preferences(&request.user_id).await;
        let budget = effective_budget(prefs.budget, request.budget, self.config.default_budget);
        let learned = self.learned(&request.user_id).await;
        let prompt = build_batch_prompt(
            &PromptConstraints {
                title: &request.title,
                budget,
                allergies: &prefs.allergies,
                diet: &prefs.diet,
                learned: learned.as_ref(),
            },
            request.count,
        );

        info!(
            user_id = %request.user_id,
            title = %request.title,
            count = request.count,
            budget,
            "Generating recipes"
        );
        let content = self
            .generator
            .generate(&prompt, self.config.batch_temperature)
            .await?;

        let mut recipes = parse_recipes(&content, request.count, &self.prices);
        if recipes.is_empty() {
            return Err(RecipeError::Generation("response contained no recipes".into()));
        }
        if recipes.len() < request.count {
            warn!(
                requested = request.count,
                parsed = recipes.len(),
                "Fewer recipes than requested"
            );
        }

        if request.persist {
            for recipe in &mut recipes {
                let id = self.save_recipe(&request.user_id, recipe).await?;
                recipe.recipe_id = Some(id);
            }
        }

        info!(user_id = %request.user_id, recipes = recipes.len(), "Generated recipes");
        Ok(recipes)
    }

    /// Generate and save one recipe unlike the excluded ones
    pub async fn generate_single_recipe(
        &self,
        request: &SingleRecipeRequest,
    ) -> Result<ParsedRecipe, RecipeError> {
        validate_common(&request.user_id, &request.title, request.budget)?;

        let prefs = self.user_preferences(&request.user_id).await;
        let budget = effective_budget(prefs.budget, request.budget, self.config.default_budget);
        let learned = self.learned(&request.user_id).await;
        let excluded: Vec<String> = request
            .exclusions
            .iter()
            .filter_map(ExcludedRecipe::label)
            .map(String::from)
            .collect();
        let prompt = build_single_prompt(
            &PromptConstraints {
                title: &request.title,
                budget,
                allergies: &prefs.allergies,
                diet: &prefs.diet,
                learned: learned.as_ref(),
            },
            &excluded,
        );

        info!(
            user_id = %request.user_id,
            title = %request.title,
            excluded = excluded.len(),
            "Regenerating single recipe"
        );
        let content = self
            .generator
            .generate(&prompt, self.config.single_temperature)
            .await?;

        let mut recipe = parse_recipe_block(content.trim(), 0, &self.prices);
        let id = self.save_recipe(&request.user_id, &recipe).await?;
        recipe.recipe_id = Some(id);
        Ok(recipe)
    }

    /// Insert a parsed recipe into `recipes`, returning its id
    pub async fn save_recipe(
        &self,
        user_id: &str,
        recipe: &ParsedRecipe,
    ) -> Result<i64, RecipeError> {
        let row = to_record(&StoredRecipe::from_parsed(user_id, recipe))?;
        let saved = self
            .store
            .insert(RECIPES_TABLE, row)
            .await
            .map_err(RecipeError::persistence)?;
        let id = record_id(&saved)
            .ok_or_else(|| RecipeError::Persistence("saved recipe has no id".into()))?;
        info!(user_id = %user_id, recipe_id = id, recipe = %recipe.recipe_name, "Saved recipe");
        Ok(id)
    }

    /// The user's saved recipes, newest first
    pub async fn user_recipes(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredRecipe>, RecipeError> {
        let mut recipes = self.load_recipes(&[Filter::eq("user_id", user_id)]).await?;
        newest_first(&mut recipes);
        recipes.truncate(limit);
        Ok(recipes)
    }

    pub async fn search_recipes(
        &self,
        user_id: &str,
        search: &RecipeSearch,
    ) -> Result<Vec<StoredRecipe>, RecipeError> {
        let mut filters = vec![Filter::eq("user_id", user_id)];
        if let Some(max_cost) = search.max_cost {
            filters.push(Filter::lte("cost_estimate", max_cost));
        }

        let mut recipes = self.load_recipes(&filters).await?;
        recipes.retain(|recipe| search.matches(recipe));
        newest_first(&mut recipes);
        info!(user_id = %user_id, results = recipes.len(), "Searched recipes");
        Ok(recipes)
    }

    pub async fn recipe_by_title(
        &self,
        user_id: &str,
        title: &str,
    ) -> Result<StoredRecipe, RecipeError> {
        load_recipe_by_title(self.store.as_ref(), user_id, title).await
    }

    async fn load_recipes(&self, filters: &[Filter]) -> Result<Vec<StoredRecipe>, RecipeError> {
        let records = self
            .store
            .select(RECIPES_TABLE, filters)
            .await
            .map_err(RecipeError::persistence)?;
        Ok(records
            .into_iter()
            .map(from_record::<StoredRecipe>)
            .collect::<anyhow::Result<Vec<_>>>()?)
    }
}

fn validate_common(user_id: &str, title: &str, budget: f64) -> Result<(), RecipeError> {
    if user_id.trim().is_empty() {
        return Err(RecipeError::invalid("user_id is required"));
    }
    if title.trim().is_empty() {
        return Err(RecipeError::invalid("title is required"));
    }
    if !budget.is_finite() || budget < 0.0 {
        return Err(RecipeError::invalid("budget must be a non-negative number"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const TWO_RECIPES: &str = "RECIPE 1: Chickpea Curry

Ingredients:
- 2 cup chickpeas
- 1 onion

Directions:
1. Simmer everything.

Nutrition Facts:
- Calories: 520
- Protein: 22g

Tags: vegan, spicy
Cuisine: Indian
Diet: Vegan
Cost Estimate: $6.40

---

RECIPE 2: Lentil Soup

Ingredients:
- 1 cup lentils
- 2 carrots

Directions:
1. Boil the lentils.

Tags: soup
Cuisine: French
Diet: Vegan
Cost Estimate: $4.10
";

    /// Returns a fixed completion and records the prompts it was given
    struct FixedGenerator {
        response: Result<String, RecipeError>,
        prompts: Mutex<Vec<(String, f32)>>,
    }

    impl FixedGenerator {
        fn new(response: Result<&str, RecipeError>) -> Arc<Self> {
            Arc::new(Self {
                response: response.map(String::from),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn last_prompt(&self) -> (String, f32) {
            self.prompts.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, prompt: &str, temperature: f32) -> Result<String, RecipeError> {
            self.prompts.lock().unwrap().push((prompt.to_string(), temperature));
            self.response.clone()
        }
    }

    fn service(generator: Arc<FixedGenerator>) -> (RecipeService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = RecipeService::new(
            generator,
            store.clone(),
            Arc::new(PriceTable::builtin()),
            GenerationConfig::default(),
        );
        (service, store)
    }

    fn request(count: usize) -> RecipeRequest {
        RecipeRequest {
            user_id: "u1".into(),
            title: "vegan dinner".into(),
            budget: 15.0,
            count,
            persist: true,
        }
    }

    #[test]
    fn test_effective_budget() {
        assert_eq!(effective_budget(25.0, 10.0, 20.0), 25.0);
        assert_eq!(effective_budget(0.0, 10.0, 20.0), 10.0);
        assert_eq!(effective_budget(0.0, 0.0, 20.0), 20.0);
    }

    #[test]
    fn test_excluded_recipe_labels() -> anyhow::Result<()> {
        let exclusions: Vec<ExcludedRecipe> = serde_json::from_value(json!([
            {"recipe_name": "Tofu Stir Fry"},
            {"recipe_text": "RECIPE: Lentil Curry\nIngredients:"},
            {"recipe_name": "   "},
            {"recipe_name": "", "recipe_text": "RECIPE: Bean Chili\nIngredients:"},
            {"recipe_name": "Pad Thai", "recipe_text": "RECIPE: Something Else"}
        ]))?;
        let labels: Vec<&str> = exclusions.iter().filter_map(ExcludedRecipe::label).collect();
        assert_eq!(
            labels,
            vec!["Tofu Stir Fry", "RECIPE: Lentil Curry", "RECIPE: Bean Chili", "Pad Thai"]
        );

        assert!(serde_json::from_value::<ExcludedRecipe>(json!({"name": "x"})).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_generate_parses_and_saves_in_order() -> anyhow::Result<()> {
        let generator = FixedGenerator::new(Ok(TWO_RECIPES));
        let (service, store) = service(generator.clone());

        let recipes = service.generate_recipes(&request(2)).await?;
        assert_eq!(recipes.len(), 2);
        assert_eq!(recipes[0].recipe_name, "Chickpea Curry");
        assert_eq!(recipes[1].recipe_name, "Lentil Soup");
        assert_eq!(recipes[0].cost_estimate, 6.40);
        assert!(recipes[0].recipe_id.unwrap() < recipes[1].recipe_id.unwrap());
        assert_eq!(store.count(RECIPES_TABLE).await, 2);

        let (prompt, temperature) = generator.last_prompt();
        assert!(prompt.contains("Generate exactly 2 distinct recipes"));
        assert!(prompt.contains("- Budget: $15.00 per recipe"));
        assert!((temperature - 0.7).abs() < f32::EPSILON);
        Ok(())
    }

    #[tokio::test]
    async fn test_stored_preferences_shape_the_prompt() -> anyhow::Result<()> {
        let generator = FixedGenerator::new(Ok(TWO_RECIPES));
        let (service, _) = service(generator.clone());
        service
            .set_user_preferences(
                "u1",
                &UserPreferences {
                    budget: 30.0,
                    allergies: "peanuts".into(),
                    diet: "vegan".into(),
                },
            )
            .await?;

        service.generate_recipes(&request(1)).await?;
        let (prompt, _) = generator.last_prompt();
        assert!(prompt.contains("- Budget: $30.00 per recipe"));
        assert!(prompt.contains("- Allergies: peanuts"));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_preferences_fall_back_to_defaults() {
        let (service, _) = service(FixedGenerator::new(Ok(TWO_RECIPES)));
        let prefs = service.user_preferences("nobody").await;
        assert_eq!(prefs, UserPreferences::with_default_budget(20.0));
    }

    #[tokio::test]
    async fn test_invalid_requests_never_reach_the_generator() {
        let generator = FixedGenerator::new(Ok(TWO_RECIPES));
        let (service, _) = service(generator.clone());

        for bad in [
            RecipeRequest { count: 0, ..request(1) },
            RecipeRequest { count: 11, ..request(1) },
            RecipeRequest { title: " ".into(), ..request(1) },
            RecipeRequest { budget: -1.0, ..request(1) },
        ] {
            assert!(matches!(
                service.generate_recipes(&bad).await,
                Err(RecipeError::InvalidInput(_))
            ));
        }
        assert!(generator.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generator_failure_propagates() {
        let (service, store) = service(FixedGenerator::new(Err(RecipeError::Timeout(
            std::time::Duration::from_secs(30),
        ))));
        assert_eq!(
            service.generate_recipes(&request(3)).await,
            Err(RecipeError::Timeout(std::time::Duration::from_secs(30)))
        );
        assert_eq!(store.count(RECIPES_TABLE).await, 0);
    }

    #[tokio::test]
    async fn test_unpersisted_generation_saves_nothing() -> anyhow::Result<()> {
        let (service, store) = service(FixedGenerator::new(Ok(TWO_RECIPES)));
        let recipes = service
            .generate_recipes(&RecipeRequest { persist: false, ..request(2) })
            .await?;
        assert!(recipes.iter().all(|recipe| recipe.recipe_id.is_none()));
        assert_eq!(store.count(RECIPES_TABLE).await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_single_recipe_uses_exclusions_and_full_parser() -> anyhow::Result<()> {
        let single = "RECIPE: Smoky Black Bean Tacos\n\n\
            Ingredients:\n- 1 1/2 cup black beans\n- 4 tortillas\n\n\
            Directions:\n1. Warm the beans.\n\n\
            Cuisine: Mexican\nDiet: Vegan\n";
        let generator = FixedGenerator::new(Ok(single));
        let (service, store) = service(generator.clone());

        let recipe = service
            .generate_single_recipe(&SingleRecipeRequest {
                user_id: "u1".into(),
                title: "tacos".into(),
                budget: 0.0,
                exclusions: vec![ExcludedRecipe::named("Fish Tacos")],
            })
            .await?;

        assert_eq!(recipe.recipe_name, "Smoky Black Bean Tacos");
        assert_eq!(recipe.ingredients[0].quantity, 1.5);
        assert_eq!(recipe.cuisine, "Mexican");
        assert!(recipe.recipe_id.is_some());
        assert_eq!(store.count(RECIPES_TABLE).await, 1);

        let (prompt, temperature) = generator.last_prompt();
        assert!(prompt.contains("existing ones: Fish Tacos."));
        assert!(prompt.contains("- Budget: $20.00 per recipe"));
        assert!((temperature - 0.8).abs() < f32::EPSILON);
        Ok(())
    }

    #[tokio::test]
    async fn test_search_and_list_saved_recipes() -> anyhow::Result<()> {
        let (service, _) = service(FixedGenerator::new(Ok(TWO_RECIPES)));
        service.generate_recipes(&request(2)).await?;

        let all = service.user_recipes("u1", 10).await?;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].title, "Lentil Soup");
        assert_eq!(service.user_recipes("u1", 1).await?.len(), 1);

        let cheap = service
            .search_recipes("u1", &RecipeSearch { max_cost: Some(5.0), ..RecipeSearch::default() })
            .await?;
        assert_eq!(cheap.len(), 1);
        assert_eq!(cheap[0].title, "Lentil Soup");

        let spicy = service
            .search_recipes(
                "u1",
                &RecipeSearch {
                    keyword: Some("CURRY".into()),
                    tag: Some("Spicy".into()),
                    cuisine: Some("indian".into()),
                    ..RecipeSearch::default()
                },
            )
            .await?;
        assert_eq!(spicy.len(), 1);

        assert!(service.search_recipes("u2", &RecipeSearch::default()).await?.is_empty());
        assert!(matches!(
            service.recipe_by_title("u1", "Missing").await,
            Err(RecipeError::NotFound(_))
        ));
        Ok(())
    }
}
