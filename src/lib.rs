//! # Recipe Planner
//!
//! Recipe-management core: asks a text generator for recipes, parses the
//! semi-structured completions into typed recipes, prices and consolidates
//! grocery lists, converts units and scales saved recipes.

pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod errors;
pub mod grocery;
pub mod ingredient_normalizer;
pub mod meal_plan;
pub mod memory_store;
pub mod price_table;
pub mod prompts;
pub mod ratings;
pub mod recipe_model;
pub mod recipe_parser;
pub mod recipe_patterns;
pub mod recipe_service;
pub mod scaling;
pub mod text_generator;
pub mod unit_converter;

pub use errors::RecipeError;
pub use recipe_model::{Ingredient, ParsedRecipe};
