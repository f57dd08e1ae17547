//! # Recipe Ratings
//!
//! Stores 1-5 star ratings for saved or freshly generated recipes and derives
//! the preferences fed back into generation prompts.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::{from_record, to_record, Filter, Store, RECIPES_TABLE, RECIPE_RATINGS_TABLE};
use crate::errors::RecipeError;
use crate::recipe_model::{round_to, Ingredient, ParsedRecipe, StoredRecipe, UNKNOWN_LABEL};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;
/// Ratings at or above this count as liked
pub const LIKED_RATING: u8 = 4;
/// Ratings at or below this count as disliked
pub const DISLIKED_RATING: u8 = 2;
pub const FAVORITE_TAG_LIMIT: usize = 5;

/// The parts of a generated recipe a rating needs to remember
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeSnapshot {
    #[serde(default)]
    pub recipe_name: String,
    #[serde(default)]
    pub cuisine: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
}

impl From<&ParsedRecipe> for RecipeSnapshot {
    fn from(recipe: &ParsedRecipe) -> Self {
        Self {
            recipe_name: recipe.recipe_name.clone(),
            cuisine: recipe.cuisine.clone(),
            tags: recipe.tags.clone(),
            ingredients: recipe.ingredients.clone(),
        }
    }
}

impl From<&StoredRecipe> for RecipeSnapshot {
    fn from(recipe: &StoredRecipe) -> Self {
        Self {
            recipe_name: recipe.title.clone(),
            cuisine: recipe.cuisine.clone(),
            tags: recipe.tags.clone(),
            ingredients: recipe.ingredients.clone(),
        }
    }
}

/// Which recipe is being rated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum RatedRecipe {
    /// A recipe already in the `recipes` table
    Saved { recipe_id: i64 },
    /// A recipe that was generated but never saved
    Generated { recipe: RecipeSnapshot },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecipeRequest {
    pub user_id: String,
    pub recipe: RatedRecipe,
    pub rating: u8,
    #[serde(default)]
    pub feedback_reason: Option<String>,
}

/// A row of the `recipe_ratings` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeRating {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub user_id: String,
    #[serde(default)]
    pub recipe_id: Option<i64>,
    pub recipe_name: String,
    #[serde(default)]
    pub cuisine: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub rating: u8,
    #[serde(default)]
    pub feedback_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl RecipeRating {
    pub fn is_liked(&self) -> bool {
        self.rating >= LIKED_RATING
    }

    pub fn is_disliked(&self) -> bool {
        self.rating <= DISLIKED_RATING
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearnedPreferences {
    pub liked_cuisines: Vec<String>,
    pub disliked_cuisines: Vec<String>,
    pub favorite_tags: Vec<String>,
    pub average_rating: f64,
    pub total_ratings: usize,
}

impl LearnedPreferences {
    /// `true` when nothing useful for a prompt was learned
    pub fn is_empty(&self) -> bool {
        self.liked_cuisines.is_empty()
            && self.disliked_cuisines.is_empty()
            && self.favorite_tags.is_empty()
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    let value = value.trim().to_lowercase();
    if value.is_empty() || value == UNKNOWN_LABEL.to_lowercase() || list.contains(&value) {
        return;
    }
    list.push(value);
}

/// Summarize ratings, given newest first
pub fn learned_preferences(ratings: &[RecipeRating]) -> LearnedPreferences {
    if ratings.is_empty() {
        return LearnedPreferences::default();
    }

    let mut learned = LearnedPreferences {
        total_ratings: ratings.len(),
        ..LearnedPreferences::default()
    };
    let mut tag_counts: HashMap<String, (usize, usize)> = HashMap::new();

    for rating in ratings {
        if rating.is_liked() {
            push_unique(&mut learned.liked_cuisines, &rating.cuisine);
            for tag in &rating.tags {
                let tag = tag.trim().to_lowercase();
                if tag.is_empty() {
                    continue;
                }
                let first_seen = tag_counts.len();
                tag_counts.entry(tag).or_insert((0, first_seen)).0 += 1;
            }
        } else if rating.is_disliked() {
            push_unique(&mut learned.disliked_cuisines, &rating.cuisine);
        }
    }

    let mut tags: Vec<(String, (usize, usize))> = tag_counts.into_iter().collect();
    tags.sort_by_key(|(_, (count, first_seen))| (Reverse(*count), *first_seen));
    learned.favorite_tags = tags
        .into_iter()
        .take(FAVORITE_TAG_LIMIT)
        .map(|(tag, _)| tag)
        .collect();

    let sum: f64 = ratings.iter().map(|rating| f64::from(rating.rating)).sum();
    learned.average_rating = round_to(sum / ratings.len() as f64, 2);
    learned
}

/// Rating intake and history backed by the `recipe_ratings` table
#[derive(Clone)]
pub struct RatingService {
    store: Arc<dyn Store>,
}

impl RatingService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn rate_recipe(
        &self,
        request: &RateRecipeRequest,
    ) -> Result<RecipeRating, RecipeError> {
        if !(MIN_RATING..=MAX_RATING).contains(&request.rating) {
            return Err(RecipeError::invalid(format!(
                "Rating must be between {MIN_RATING} and {MAX_RATING}"
            )));
        }
        if request.user_id.trim().is_empty() {
            return Err(RecipeError::invalid("user_id is required"));
        }

        let (recipe_id, snapshot) = match &request.recipe {
            RatedRecipe::Saved { recipe_id } => {
                let filters = [
                    Filter::eq("id", *recipe_id),
                    Filter::eq("user_id", request.user_id.as_str()),
                ];
                let record = self
                    .store
                    .select(RECIPES_TABLE, &filters)
                    .await
                    .map_err(RecipeError::persistence)?
                    .into_iter()
                    .next()
                    .ok_or_else(|| RecipeError::NotFound(format!("recipe {recipe_id}")))?;
                let stored: StoredRecipe = from_record(record)?;
                (Some(*recipe_id), RecipeSnapshot::from(&stored))
            }
            RatedRecipe::Generated { recipe } => (None, recipe.clone()),
        };

        let rating = RecipeRating {
            id: None,
            user_id: request.user_id.clone(),
            recipe_id,
            recipe_name: snapshot.recipe_name,
            cuisine: snapshot.cuisine,
            tags: snapshot.tags,
            rating: request.rating,
            feedback_reason: request.feedback_reason.clone(),
            created_at: Some(Utc::now()),
        };

        let saved = self
            .store
            .insert(RECIPE_RATINGS_TABLE, to_record(&rating)?)
            .await
            .map_err(RecipeError::persistence)?;
        info!(
            user_id = %request.user_id,
            rating = request.rating,
            recipe = %rating.recipe_name,
            "Recorded recipe rating"
        );
        Ok(from_record(saved)?)
    }

    /// The user's ratings, newest first
    pub async fn user_ratings(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<RecipeRating>, RecipeError> {
        let records = self
            .store
            .select(RECIPE_RATINGS_TABLE, &[Filter::eq("user_id", user_id)])
            .await
            .map_err(RecipeError::persistence)?;
        let mut ratings = records
            .into_iter()
            .map(from_record::<RecipeRating>)
            .collect::<anyhow::Result<Vec<_>>>()?;

        ratings.sort_by_key(|rating| Reverse((rating.created_at, rating.id)));
        ratings.truncate(limit);
        Ok(ratings)
    }

    pub async fn learned_preferences(
        &self,
        user_id: &str,
    ) -> Result<LearnedPreferences, RecipeError> {
        let ratings = self.user_ratings(user_id, usize::MAX).await?;
        Ok(learned_preferences(&ratings))
    }
}
