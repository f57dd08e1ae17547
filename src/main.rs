use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use recipe_planner::config::{price_table_path_from_env, AppConfig};
use recipe_planner::db::{PgStore, Store};
use recipe_planner::grocery::GroceryListService;
use recipe_planner::ingredient_normalizer::{display_name, normalize_ingredient_name};
use recipe_planner::memory_store::MemoryStore;
use recipe_planner::price_table::PriceTable;
use recipe_planner::recipe_parser::parse_recipes;
use recipe_planner::recipe_service::{RecipeRequest, RecipeService};
use recipe_planner::text_generator::OpenAiClient;
use recipe_planner::unit_converter::UnitConverter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate, parse and price recipes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a saved model response and print the recipes as JSON
    Parse {
        file: PathBuf,
        #[arg(long, default_value_t = 3)]
        count: usize,
    },
    /// Convert a quantity between units
    Convert {
        quantity: f64,
        from: String,
        to: String,
    },
    /// Show canonical and display names for ingredient names
    Normalize {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Generate recipes with the configured text generator
    Generate {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value_t = 0.0)]
        budget: f64,
        #[arg(long)]
        count: Option<usize>,
        /// Do not save the generated recipes
        #[arg(long)]
        no_save: bool,
    },
    /// Print a user's grocery list
    Groceries {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        include_purchased: bool,
    },
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    // stdout is reserved for command output
    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_prices(path: Option<&Path>) -> Result<PriceTable> {
    match path {
        Some(path) => PriceTable::from_file(path),
        None => Ok(PriceTable::builtin()),
    }
}

async fn open_store(config: &AppConfig) -> Result<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            info!("Connecting to PostgreSQL store");
            Arc::new(PgStore::connect(url).await?)
        }
        None => {
            info!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    init_logging();

    let cli = Cli::parse();

    // Only the commands that reach the store or the generator read the full configuration
    match cli.command {
        Command::Parse { file, count } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let prices = load_prices(price_table_path_from_env().as_deref())?;
            print_json(&parse_recipes(&content, count, &prices))?;
        }
        Command::Convert { quantity, from, to } => {
            let conversion = UnitConverter::new().convert_detailed(quantity, &from, &to);
            match conversion.converted_quantity {
                Some(converted) => println!("{quantity} {from} = {converted} {to}"),
                None => println!(
                    "{from} cannot be converted to {to}; compatible units: {}",
                    conversion.compatible_units.join(", ")
                ),
            }
        }
        Command::Normalize { names } => {
            for name in names {
                let canonical = normalize_ingredient_name(&name);
                println!("{name} -> {canonical} ({})", display_name(&canonical, &name));
            }
        }
        Command::Generate {
            user_id,
            title,
            budget,
            count,
            no_save,
        } => {
            let config = AppConfig::from_env()?;
            let generator = Arc::new(OpenAiClient::from_config(&config)?);
            let store = open_store(&config).await?;
            let prices = Arc::new(load_prices(config.price_table_path.as_deref())?);
            let service = RecipeService::new(generator, store, prices, config.generation.clone());

            let request = RecipeRequest {
                user_id,
                title,
                budget,
                count: count.unwrap_or(config.generation.default_recipe_count),
                persist: !no_save,
            };
            print_json(&service.generate_recipes(&request).await?)?;
        }
        Command::Groceries {
            user_id,
            include_purchased,
        } => {
            let config = AppConfig::from_env()?;
            let store = open_store(&config).await?;
            let list = GroceryListService::new(store)
                .grocery_list(&user_id, include_purchased)
                .await?;
            print_json(&list)?;
        }
    }

    Ok(())
}
