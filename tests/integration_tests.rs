//! # Integration Tests
//!
//! End-to-end flows over the in-memory store and a scripted text generator:
//! generate recipes, shop for them, rate them and scale them.

mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use common::{test_app, THREE_RECIPES};
use recipe_planner::errors::RecipeError;
use recipe_planner::grocery::{GroceryItemInput, GroceryListService};
use recipe_planner::ratings::{RateRecipeRequest, RatedRecipe, RatingService};
use recipe_planner::recipe_service::{ExcludedRecipe, RecipeRequest, SingleRecipeRequest};
use recipe_planner::scaling::ScalingService;

fn request(count: usize) -> RecipeRequest {
    RecipeRequest {
        user_id: "chef".into(),
        title: "weeknight dinners".into(),
        budget: 12.0,
        count,
        persist: true,
    }
}

#[tokio::test]
async fn test_generated_recipes_feed_the_grocery_list() -> anyhow::Result<()> {
    let app = test_app();
    app.generator.push(THREE_RECIPES);

    let recipes = app.recipes.generate_recipes(&request(3)).await?;
    assert_eq!(recipes.len(), 3);
    assert!(recipes.iter().all(|recipe| recipe.recipe_id.is_some()));

    let items: Vec<GroceryItemInput> = recipes
        .iter()
        .flat_map(|recipe| recipe.grocery_list.iter().map(GroceryItemInput::from))
        .collect();
    let groceries = GroceryListService::new(app.store.clone());
    let report = groceries.save_grocery_list("chef", &items).await?;

    // rice appears in two recipes
    assert!(report.consolidation_summary.consolidated_items < items.len());
    let list = groceries.grocery_list("chef", false).await?;
    let rice = list.items.iter().find(|item| item.normalized_name == "rice").unwrap();
    assert_eq!(rice.quantity, 2.5);
    assert_eq!(rice.original_names, vec!["rice", "rice"]);
    Ok(())
}

#[tokio::test]
async fn test_ratings_shape_the_next_prompt() -> anyhow::Result<()> {
    let app = test_app();
    app.generator.push(THREE_RECIPES);
    app.generator.push(THREE_RECIPES);

    let recipes = app.recipes.generate_recipes(&request(3)).await?;
    let ratings = RatingService::new(app.store.clone());
    ratings
        .rate_recipe(&RateRecipeRequest {
            user_id: "chef".into(),
            recipe: RatedRecipe::Saved {
                recipe_id: recipes[0].recipe_id.unwrap(),
            },
            rating: 5,
            feedback_reason: None,
        })
        .await?;
    ratings
        .rate_recipe(&RateRecipeRequest {
            user_id: "chef".into(),
            recipe: RatedRecipe::Generated {
                recipe: (&recipes[1]).into(),
            },
            rating: 1,
            feedback_reason: Some("too bland".into()),
        })
        .await?;

    app.recipes.generate_recipes(&request(1)).await?;
    let prompts = app.generator.prompts();
    assert!(!prompts[0].contains("past ratings"));
    assert!(prompts[1].contains("- They enjoy: american"));
    assert!(prompts[1].contains("- Avoid: chinese"));
    assert!(prompts[1].contains("- Favourite styles: high-protein, quick, gluten-free"));
    Ok(())
}

#[tokio::test]
async fn test_regeneration_excludes_previous_recipes() -> anyhow::Result<()> {
    let app = test_app();
    app.generator.push(THREE_RECIPES);
    app.generator.push(
        "RECIPE: Miso Glazed Tofu\n\n\
         Ingredients:\n- 1 lb tofu\n\n\
         Directions:\n1. Glaze and bake.\n",
    );

    let recipes = app.recipes.generate_recipes(&request(3)).await?;
    let exclusions = recipes
        .iter()
        .map(|recipe| ExcludedRecipe::named(&recipe.recipe_name))
        .collect();

    let single = app
        .recipes
        .generate_single_recipe(&SingleRecipeRequest {
            user_id: "chef".into(),
            title: "weeknight dinners".into(),
            budget: 12.0,
            exclusions,
        })
        .await?;

    assert_eq!(single.recipe_name, "Miso Glazed Tofu");
    assert!(app.generator.prompts()[1]
        .contains("Garlic Butter Salmon, Tomato Egg Scramble, Simple Rice Bowl"));
    assert_eq!(app.recipes.user_recipes("chef", 10).await?.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_saved_recipes_can_be_scaled() -> anyhow::Result<()> {
    let app = test_app();
    app.generator.push(THREE_RECIPES);
    app.recipes.generate_recipes(&request(3)).await?;

    let scaling = ScalingService::new(app.store.clone(), app.prices.clone());
    let scaled = scaling.scale_recipe("chef", "Garlic Butter Salmon", 2).await?;
    assert_eq!(scaled.original_servings, 4);
    assert_eq!(scaled.recipe.recipe_name, "Garlic Butter Salmon (for 2 servings)");
    assert_eq!(scaled.recipe.ingredients[0].quantity, 0.5);

    let analytics = scaling.recipe_analytics("chef", "Garlic Butter Salmon").await?;
    assert_eq!(analytics.nutrition_per_serving.calories, 160.0);
    assert_eq!(analytics.cost_analysis.cost_per_serving, 3.63);

    let mut preferred = BTreeMap::new();
    preferred.insert("rice".to_string(), "ml".to_string());
    let list = scaling
        .scaled_grocery_list("chef", "Simple Rice Bowl", 4, &preferred)
        .await?;
    let rice = list.grocery_list.iter().find(|line| line.name == "rice").unwrap();
    assert_eq!(rice.unit, "ml");
    assert_eq!(rice.quantity, 473.18);
    assert_eq!(rice.total_cost, 1.0);
    Ok(())
}

#[tokio::test]
async fn test_generator_timeout_is_reported() {
    let app = test_app();
    app.generator.push_error(RecipeError::Timeout(Duration::from_secs(30)));

    let err = app.recipes.generate_recipes(&request(3)).await.unwrap_err();
    assert_eq!(err.to_string(), "Recipe generation timed out after 30s");
    assert!(app.recipes.user_recipes("chef", 10).await.unwrap().is_empty());
}
