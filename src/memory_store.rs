//! # In-Memory Store
//!
//! [`Store`] implementation that keeps records in process memory. Used when no
//! `DATABASE_URL` is configured and throughout the test suite.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::db::{matches_all, Filter, MergeFn, Record, Store, UpsertOutcome, ID_FIELD};

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    rows: HashMap<String, Vec<Record>>,
}

impl Tables {
    fn insert(&mut self, table: &str, mut record: Record) -> Record {
        self.next_id += 1;
        record.insert(ID_FIELD.to_string(), Value::from(self.next_id));
        self.rows
            .entry(table.to_string())
            .or_default()
            .push(record.clone());
        record
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held in `table`
    pub async fn count(&self, table: &str) -> usize {
        self.tables
            .lock()
            .await
            .rows
            .get(table)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert(&self, table: &str, record: Record) -> Result<Record> {
        Ok(self.tables.lock().await.insert(table, record))
    }

    async fn select(&self, table: &str, filters: &[Filter]) -> Result<Vec<Record>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .rows
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_all(filters, row))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Record) -> Result<Vec<Record>> {
        let mut tables = self.tables.lock().await;
        let Some(rows) = tables.rows.get_mut(table) else {
            return Ok(Vec::new());
        };

        let mut updated = Vec::new();
        for row in rows.iter_mut().filter(|row| matches_all(filters, row)) {
            for (field, value) in &patch {
                if field != ID_FIELD {
                    row.insert(field.clone(), value.clone());
                }
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let Some(rows) = tables.rows.get_mut(table) else {
            return Ok(0);
        };

        let before = rows.len();
        rows.retain(|row| !matches_all(filters, row));
        Ok((before - rows.len()) as u64)
    }

    async fn upsert_with(
        &self,
        table: &str,
        key: &[Filter],
        record: Record,
        merge: MergeFn<'_>,
    ) -> Result<UpsertOutcome> {
        let mut tables = self.tables.lock().await;

        let existing = tables
            .rows
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|row| matches_all(key, row)));

        if let Some(row) = existing {
            let id = row.get(ID_FIELD).cloned();
            merge(row);
            if let Some(id) = id {
                row.insert(ID_FIELD.to_string(), id);
            }
            return Ok(UpsertOutcome::Merged(row.clone()));
        }

        Ok(UpsertOutcome::Inserted(tables.insert(table, record)))
    }
}
