//! External row store abstraction.
//!
//! The sync engine addresses the external store as a plain tabular service:
//! rows keyed by a numeric-or-string `id`, no transactions, no joins. The
//! client is constructed once at startup and injected into the engine, so a
//! missing client is a wiring error at construction time rather than a
//! runtime check at every call site.

mod memory;
mod rest;

pub use memory::MemoryStore;
pub use rest::RestStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::mapper::ExternalRecord;

/// Failure talking to the external store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("external store transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("external store returned {status}: {message}")]
    Http { status: u16, message: String },
    #[error("malformed external record: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The row operations the sync engine relies on.
#[async_trait]
pub trait ExternalStore: Send + Sync {
    async fn fetch_by_id(&self, table: &str, id: i64) -> Result<Option<ExternalRecord>, StoreError>;

    /// Insert a record; an `id` already present in the record is preserved.
    async fn insert(&self, table: &str, record: ExternalRecord) -> Result<ExternalRecord, StoreError>;

    async fn update_by_id(
        &self,
        table: &str,
        id: i64,
        record: ExternalRecord,
    ) -> Result<ExternalRecord, StoreError>;

    async fn delete_by_id(&self, table: &str, id: i64) -> Result<(), StoreError>;

    async fn select_all(
        &self,
        table: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ExternalRecord>, StoreError>;
}

/// Read a record's `id`, tolerating the numeric-or-string duality of the
/// external schema.
pub fn record_id(record: &ExternalRecord) -> Option<i64> {
    match record.get("id") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_id_accepts_numeric_and_string() {
        let mut record = ExternalRecord::new();
        record.insert("id".to_string(), json!(12));
        assert_eq!(record_id(&record), Some(12));

        record.insert("id".to_string(), json!("34"));
        assert_eq!(record_id(&record), Some(34));

        record.insert("id".to_string(), json!("not-an-id"));
        assert_eq!(record_id(&record), None);

        record.remove("id");
        assert_eq!(record_id(&record), None);
    }
}
