//! # Database Module
//!
//! Generic record persistence used by every service.
//!
//! Records are JSON objects stored per logical table (`recipes`, `grocery_items`,
//! `user_preferences`, `recipe_ratings`). The store assigns each record an
//! integer `id`. [`PgStore`] keeps them in a single PostgreSQL table with a
//! JSONB payload; [`crate::memory_store::MemoryStore`] keeps them in process.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info};

/// A stored row: a JSON object that carries its `id` once persisted
pub type Record = Map<String, Value>;

/// Field holding the store-assigned identifier
pub const ID_FIELD: &str = "id";

pub const RECIPES_TABLE: &str = "recipes";
pub const GROCERY_ITEMS_TABLE: &str = "grocery_items";
pub const USER_PREFERENCES_TABLE: &str = "user_preferences";
pub const RECIPE_RATINGS_TABLE: &str = "recipe_ratings";

/// Row filter applied to a record field
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Lte(String, f64),
    Gte(String, f64),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn lte(field: &str, bound: f64) -> Self {
        Filter::Lte(field.to_string(), bound)
    }

    pub fn gte(field: &str, bound: f64) -> Self {
        Filter::Gte(field.to_string(), bound)
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::Eq(field, expected) => record.get(field) == Some(expected),
            Filter::Lte(field, bound) => numeric_field(record, field).is_some_and(|n| n <= *bound),
            Filter::Gte(field, bound) => numeric_field(record, field).is_some_and(|n| n >= *bound),
        }
    }
}

/// Range filters only compare JSON numbers
fn numeric_field(record: &Record, field: &str) -> Option<f64> {
    record.get(field).and_then(Value::as_f64)
}

pub fn matches_all(filters: &[Filter], record: &Record) -> bool {
    filters.iter().all(|filter| filter.matches(record))
}

/// Identifier of a persisted record
pub fn record_id(record: &Record) -> Option<i64> {
    record.get(ID_FIELD).and_then(Value::as_i64)
}

/// Result of [`Store::upsert_with`]
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Inserted(Record),
    Merged(Record),
}

impl UpsertOutcome {
    pub fn record(&self) -> &Record {
        match self {
            UpsertOutcome::Inserted(record) | UpsertOutcome::Merged(record) => record,
        }
    }

    pub fn is_merged(&self) -> bool {
        matches!(self, UpsertOutcome::Merged(_))
    }
}

/// Applied to the existing record when an upsert finds a match
pub type MergeFn<'a> = &'a (dyn Fn(&mut Record) + Send + Sync);

/// Persistence collaborator.
///
/// `upsert_with` is atomic: concurrent calls with the same key never both insert.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert(&self, table: &str, record: Record) -> Result<Record>;

    /// Matching records in insertion order
    async fn select(&self, table: &str, filters: &[Filter]) -> Result<Vec<Record>>;

    /// Shallow-merge `patch` into every matching record and return the updated records
    async fn update(&self, table: &str, filters: &[Filter], patch: Record) -> Result<Vec<Record>>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64>;

    /// Merge into the first record matching `key`, or insert `record` when none does
    async fn upsert_with(
        &self,
        table: &str,
        key: &[Filter],
        record: Record,
        merge: MergeFn<'_>,
    ) -> Result<UpsertOutcome>;
}

/// Serialize a value into a record
pub fn to_record<T: Serialize>(value: &T) -> Result<Record> {
    match serde_json::to_value(value).context("Failed to serialize record")? {
        Value::Object(map) => Ok(map),
        other => Err(anyhow!("Expected a JSON object, got {other}")),
    }
}

/// Deserialize a record into a typed row
pub fn from_record<T: DeserializeOwned>(record: Record) -> Result<T> {
    serde_json::from_value(Value::Object(record)).context("Failed to decode record")
}

/// PostgreSQL-backed store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS store_records (
            id BIGSERIAL PRIMARY KEY,
            table_name TEXT NOT NULL,
            data JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create store_records table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS store_records_table_idx ON store_records (table_name)")
        .execute(pool)
        .await
        .context("Failed to create table_name index")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS store_records_data_idx ON store_records USING GIN (data)",
    )
    .execute(pool)
    .await
    .context("Failed to create data index")?;

    info!("Database schema initialized successfully");
    Ok(())
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the schema exists
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        init_database_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, table: &str, filters: &[Filter]) {
    builder.push(" WHERE table_name = ").push_bind(table.to_string());
    for filter in filters {
        builder.push(" AND ");
        match filter {
            Filter::Eq(field, value) if field == ID_FIELD => {
                let id = value
                    .as_i64()
                    .or_else(|| value.as_str().and_then(|s| s.parse().ok()));
                builder.push("id = ").push_bind(id);
            }
            Filter::Eq(field, value) => {
                builder
                    .push("data -> ")
                    .push_bind(field.clone())
                    .push(" = ")
                    .push_bind(Json(value.clone()));
            }
            Filter::Lte(field, bound) => {
                push_number(builder, field);
                builder.push(" <= ").push_bind(*bound);
            }
            Filter::Gte(field, bound) => {
                push_number(builder, field);
                builder.push(" >= ").push_bind(*bound);
            }
        }
    }
}

/// The field as float8 when it holds a JSON number, NULL otherwise
fn push_number(builder: &mut QueryBuilder<'_, Postgres>, field: &str) {
    builder
        .push("(CASE WHEN jsonb_typeof(data -> ")
        .push_bind(field.to_string())
        .push(") = 'number' THEN (data ->> ")
        .push_bind(field.to_string())
        .push(")::float8 END)");
}

const INSERT_RECORD: &str =
    "INSERT INTO store_records (table_name, data) VALUES ($1, $2) RETURNING id, data";

fn row_to_record(row: &PgRow) -> Result<Record> {
    let id: i64 = row.try_get("id").context("Missing id column")?;
    let Json(data): Json<Value> = row.try_get("data").context("Missing data column")?;
    let mut record = match data {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    record.insert(ID_FIELD.to_string(), Value::from(id));
    Ok(record)
}

#[async_trait]
impl Store for PgStore {
    async fn insert(&self, table: &str, mut record: Record) -> Result<Record> {
        record.remove(ID_FIELD);
        let row = sqlx::query(INSERT_RECORD)
            .bind(table)
            .bind(Json(Value::Object(record)))
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to insert into {table}"))?;

        let record = row_to_record(&row)?;
        debug!(table, id = ?record_id(&record), "Inserted record");
        Ok(record)
    }

    async fn select(&self, table: &str, filters: &[Filter]) -> Result<Vec<Record>> {
        let mut builder = QueryBuilder::new("SELECT id, data FROM store_records");
        push_filters(&mut builder, table, filters);
        builder.push(" ORDER BY id");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to select from {table}"))?;
        rows.iter().map(row_to_record).collect()
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        mut patch: Record,
    ) -> Result<Vec<Record>> {
        patch.remove(ID_FIELD);
        let mut builder = QueryBuilder::new("UPDATE store_records SET data = data || ");
        builder.push_bind(Json(Value::Object(patch)));
        push_filters(&mut builder, table, filters);
        builder.push(" RETURNING id, data");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to update {table}"))?;
        rows.iter().map(row_to_record).collect()
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64> {
        let mut builder = QueryBuilder::new("DELETE FROM store_records");
        push_filters(&mut builder, table, filters);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete from {table}"))?;
        Ok(result.rows_affected())
    }

    async fn upsert_with(
        &self,
        table: &str,
        key: &[Filter],
        mut record: Record,
        merge: MergeFn<'_>,
    ) -> Result<UpsertOutcome> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        // Serializes writers for the same key, including the insert-when-missing path
        let lock_key = format!("{table}:{key:?}");
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&lock_key)
            .execute(&mut *tx)
            .await
            .context("Failed to acquire upsert lock")?;

        let mut builder = QueryBuilder::new("SELECT id, data FROM store_records");
        push_filters(&mut builder, table, key);
        builder.push(" ORDER BY id LIMIT 1 FOR UPDATE");
        let existing = builder
            .build()
            .fetch_optional(&mut *tx)
            .await
            .with_context(|| format!("Failed to look up existing record in {table}"))?;

        let outcome = match existing {
            Some(row) => {
                let mut current = row_to_record(&row)?;
                let id = record_id(&current).context("Existing record has no id")?;
                merge(&mut current);
                current.remove(ID_FIELD);
                let row = sqlx::query(
                    "UPDATE store_records SET data = $1 WHERE id = $2 RETURNING id, data",
                )
                .bind(Json(Value::Object(current)))
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .with_context(|| format!("Failed to merge record in {table}"))?;
                UpsertOutcome::Merged(row_to_record(&row)?)
            }
            None => {
                record.remove(ID_FIELD);
                let row = sqlx::query(INSERT_RECORD)
                    .bind(table)
                    .bind(Json(Value::Object(record)))
                    .fetch_one(&mut *tx)
                    .await
                    .with_context(|| format!("Failed to insert into {table}"))?;
                UpsertOutcome::Inserted(row_to_record(&row)?)
            }
        };

        tx.commit().await.context("Failed to commit upsert")?;
        Ok(outcome)
    }
}
