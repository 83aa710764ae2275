//! In-memory external store.
//!
//! Dev-mode fallback when no Supabase credentials are configured, and the
//! test double for the sync engine.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{record_id, ExternalStore, StoreError};
use crate::mapper::ExternalRecord;

/// Mutex-guarded per-table row maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, BTreeMap<i64, ExternalRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct row lookup, for tests and dev inspection.
    pub fn get(&self, table: &str, id: i64) -> Option<ExternalRecord> {
        let tables = self.tables.lock().expect("memory store lock poisoned");
        tables.get(table).and_then(|rows| rows.get(&id)).cloned()
    }

    /// Place a row directly, bypassing the trait; for seeding tests.
    pub fn put(&self, table: &str, id: i64, mut record: ExternalRecord) {
        record.insert("id".to_string(), Value::from(id));
        let mut tables = self.tables.lock().expect("memory store lock poisoned");
        tables.entry(table.to_string()).or_default().insert(id, record);
    }

    pub fn row_count(&self, table: &str) -> usize {
        let tables = self.tables.lock().expect("memory store lock poisoned");
        tables.get(table).map(|rows| rows.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ExternalStore for MemoryStore {
    async fn fetch_by_id(&self, table: &str, id: i64) -> Result<Option<ExternalRecord>, StoreError> {
        Ok(self.get(table, id))
    }

    async fn insert(&self, table: &str, mut record: ExternalRecord) -> Result<ExternalRecord, StoreError> {
        let mut tables = self.tables.lock().expect("memory store lock poisoned");
        let rows = tables.entry(table.to_string()).or_default();
        // Preserve a pre-specified identity; otherwise assign the next one.
        let id = record_id(&record)
            .unwrap_or_else(|| rows.keys().next_back().copied().unwrap_or(0) + 1);
        record.insert("id".to_string(), Value::from(id));
        rows.insert(id, record.clone());
        Ok(record)
    }

    async fn update_by_id(
        &self,
        table: &str,
        id: i64,
        record: ExternalRecord,
    ) -> Result<ExternalRecord, StoreError> {
        let mut tables = self.tables.lock().expect("memory store lock poisoned");
        let rows = tables.entry(table.to_string()).or_default();
        let merged = match rows.get(&id) {
            Some(existing) => {
                let mut merged = existing.clone();
                for (key, value) in record {
                    merged.insert(key, value);
                }
                merged
            }
            None => {
                let mut merged = record;
                merged.insert("id".to_string(), Value::from(id));
                merged
            }
        };
        rows.insert(id, merged.clone());
        Ok(merged)
    }

    async fn delete_by_id(&self, table: &str, id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().expect("memory store lock poisoned");
        if let Some(rows) = tables.get_mut(table) {
            rows.remove(&id);
        }
        Ok(())
    }

    async fn select_all(
        &self,
        table: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ExternalRecord>, StoreError> {
        let tables = self.tables.lock().expect("memory store lock poisoned");
        let rows = tables
            .get(table)
            .map(|rows| rows.values().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        Ok(match limit {
            Some(limit) => rows.into_iter().take(limit).collect(),
            None => rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_preserves_prespecified_id() {
        let store = MemoryStore::new();
        let record: ExternalRecord = [
            ("id".to_string(), json!(99)),
            ("name".to_string(), json!("Community Church")),
        ]
        .into_iter()
        .collect();

        let saved = store.insert("churches", record).await.unwrap();
        assert_eq!(saved.get("id"), Some(&json!(99)));
        assert!(store.get("churches", 99).is_some());
    }

    #[tokio::test]
    async fn test_insert_assigns_next_id_when_missing() {
        let store = MemoryStore::new();
        store.put("tasks", 5, ExternalRecord::new());

        let record: ExternalRecord = [("title".to_string(), json!("Follow up"))]
            .into_iter()
            .collect();
        let saved = store.insert("tasks", record).await.unwrap();
        assert_eq!(saved.get("id"), Some(&json!(6)));
    }

    #[tokio::test]
    async fn test_update_merges_over_existing_row() {
        let store = MemoryStore::new();
        store.put(
            "people",
            1,
            [("first_name".to_string(), json!("John"))].into_iter().collect(),
        );

        let patch: ExternalRecord = [("last_name".to_string(), json!("Mark"))]
            .into_iter()
            .collect();
        let merged = store.update_by_id("people", 1, patch).await.unwrap();
        assert_eq!(merged.get("first_name"), Some(&json!("John")));
        assert_eq!(merged.get("last_name"), Some(&json!("Mark")));
    }

    #[tokio::test]
    async fn test_select_all_respects_limit() {
        let store = MemoryStore::new();
        for id in 1..=4 {
            store.put("people", id, ExternalRecord::new());
        }
        let rows = store.select_all("people", Some(2)).await.unwrap();
        assert_eq!(rows.len(), 2);
        let all = store.select_all("people", None).await.unwrap();
        assert_eq!(all.len(), 4);
    }
}
