//! Shared helpers for integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use recipe_planner::config::GenerationConfig;
use recipe_planner::db::Store;
use recipe_planner::errors::RecipeError;
use recipe_planner::memory_store::MemoryStore;
use recipe_planner::price_table::PriceTable;
use recipe_planner::recipe_service::RecipeService;
use recipe_planner::text_generator::TextGenerator;

pub const THREE_RECIPES: &str = include_str!("../fixtures/three_recipes.txt");

/// Text generator that replays queued responses in order
#[derive(Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<String, RecipeError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, response: &str) {
        self.responses.lock().unwrap().push_back(Ok(response.to_string()));
    }

    pub fn push_error(&self, error: RecipeError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, _temperature: f32) -> Result<String, RecipeError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RecipeError::Generation("no scripted response left".into())))
    }
}

pub struct TestApp {
    pub generator: Arc<ScriptedGenerator>,
    pub store: Arc<dyn Store>,
    pub prices: Arc<PriceTable>,
    pub recipes: RecipeService,
}

pub fn test_app() -> TestApp {
    let generator = ScriptedGenerator::new();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let prices = Arc::new(PriceTable::builtin());
    let recipes = RecipeService::new(
        generator.clone(),
        store.clone(),
        prices.clone(),
        GenerationConfig::default(),
    );
    TestApp {
        generator,
        store,
        prices,
        recipes,
    }
}
