//! Record reconciliation against the external store.
//!
//! The engine reconciles one entity at a time, in both directions, with a
//! conflict model on top. Single-record operations return typed results so
//! callers can tell "nothing to do", "succeeded", and "failed" apart without
//! log-scraping; only the batch drivers degrade leniently, logging each bad
//! record and carrying on, because one bad record must not abort a
//! multi-hundred-record run.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::db::Repository;
use crate::errors::AppError;
use crate::external::{record_id, ExternalStore, StoreError};
use crate::mapper::{
    descriptor, EntityKind, ExternalRecord, InternalRecord, RecordTranslator, SyncEntity,
    TranslateError,
};
use crate::models::ContactType;

/// Bookkeeping timestamps that never count as real conflicts.
pub const CONFLICT_EXCLUDED_FIELDS: &[&str] = &["last_synced_at", "updated_at"];

/// Failure of a single sync operation.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("external store failure: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Translate(#[from] TranslateError),
    #[error("local store failure: {0}")]
    Database(String),
    #[error("external record has no usable id")]
    MissingId,
}

impl From<AppError> for SyncError {
    fn from(err: AppError) -> Self {
        SyncError::Database(err.to_string())
    }
}

/// One field's diverging values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConflict {
    pub local_value: Value,
    pub external_value: Value,
}

/// Field name -> diverging values, as returned by conflict detection.
pub type ConflictMap = BTreeMap<String, FieldConflict>;

/// Which side wins a conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Local,
    External,
}

/// Result of a successful push.
#[derive(Debug, Clone)]
pub struct PushOutcome {
    /// The external-shape record as confirmed by the store.
    pub record: ExternalRecord,
    pub created: bool,
}

/// Result of a successful pull.
#[derive(Debug, Clone, Copy)]
pub struct PullOutcome {
    pub id: i64,
    pub created: bool,
}

/// Per-record failure inside a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncFailureDetail {
    pub id: Option<i64>,
    pub reason: String,
}

/// Summary of one batch reconciliation run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub entity: &'static str,
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
    pub errors: Vec<SyncFailureDetail>,
}

impl SyncReport {
    fn new(run_id: Uuid, entity: &'static str) -> Self {
        Self {
            run_id,
            entity,
            total: 0,
            created: 0,
            updated: 0,
            failed: 0,
            errors: Vec::new(),
        }
    }
}

/// Reconciles entities against the external store.
///
/// The store client is injected at construction; there is no global client
/// and no "client not initialized" state to check at call sites.
pub struct SyncEngine {
    repo: Repository,
    store: Arc<dyn ExternalStore>,
    translator: RecordTranslator,
    entity_locks: Mutex<HashMap<(EntityKind, i64), Arc<Mutex<()>>>>,
}

impl SyncEngine {
    pub fn new(repo: Repository, store: Arc<dyn ExternalStore>) -> Self {
        Self {
            repo,
            store,
            translator: RecordTranslator::standard(),
            entity_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Serialize operations on one entity: concurrent pulls or resolutions
    /// for the same (kind, id) run one at a time within this process.
    async fn entity_lock(&self, kind: EntityKind, id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.entity_locks.lock().await;
            locks
                .entry((kind, id))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Fetch the external record backing an entity, if any.
    pub async fn fetch_external(
        &self,
        kind: EntityKind,
        id: i64,
    ) -> Result<Option<ExternalRecord>, SyncError> {
        Ok(self.store.fetch_by_id(descriptor(kind).table, id).await?)
    }

    /// Push one entity to the external store.
    ///
    /// An existing same-identity external record is updated; otherwise the
    /// record is inserted, preserving a locally pre-assigned identity (the
    /// backfill case).
    pub async fn push<T: SyncEntity>(&self, instance: &T) -> Result<PushOutcome, SyncError> {
        let desc = descriptor(T::KIND);
        let mut record = self.translator.to_external(instance)?;
        let now = Utc::now().to_rfc3339();
        record.insert(
            desc.external_name("last_synced_at").to_string(),
            Value::String(now.clone()),
        );

        let outcome = match instance.id() {
            Some(id) => {
                if self.store.fetch_by_id(desc.table, id).await?.is_some() {
                    let saved = self.store.update_by_id(desc.table, id, record).await?;
                    tracing::debug!(entity = desc.name, id, "pushed update to external store");
                    PushOutcome {
                        record: saved,
                        created: false,
                    }
                } else {
                    let saved = self.store.insert(desc.table, record).await?;
                    tracing::debug!(entity = desc.name, id, "pushed insert to external store");
                    PushOutcome {
                        record: saved,
                        created: true,
                    }
                }
            }
            None => {
                record.remove("id");
                let saved = self.store.insert(desc.table, record).await?;
                PushOutcome {
                    record: saved,
                    created: true,
                }
            }
        };

        if let Some(id) = instance.id().or_else(|| record_id(&outcome.record)) {
            self.repo.mark_synced(T::KIND, id, &now).await?;
        }

        Ok(outcome)
    }

    /// Pull one external record into the local store.
    ///
    /// Specialization entities first ensure the backing contact row exists
    /// (created with the explicit identity when missing) and then
    /// create-or-update their detail row; the flat entities are a simple
    /// create-or-update.
    pub async fn pull(
        &self,
        kind: EntityKind,
        record: &ExternalRecord,
    ) -> Result<PullOutcome, SyncError> {
        let desc = descriptor(kind);
        let internal = self.translator.from_external(desc, record)?;
        let id = internal
            .get("id")
            .and_then(coerce_id)
            .ok_or(SyncError::MissingId)?;

        let _guard = self.entity_lock(kind, id).await;

        let created = match kind {
            EntityKind::Person => {
                let created = self
                    .repo
                    .ensure_contact(id, ContactType::Person, &internal)
                    .await?;
                self.repo.upsert_person_details(id, &internal).await?;
                created
            }
            EntityKind::Church => {
                let created = self
                    .repo
                    .ensure_contact(id, ContactType::Church, &internal)
                    .await?;
                self.repo.upsert_church_details(id, &internal).await?;
                created
            }
            EntityKind::Task => self.repo.upsert_task(id, &internal).await?,
            EntityKind::Communication => self.repo.upsert_communication(id, &internal).await?,
        };

        let now = Utc::now().to_rfc3339();
        self.repo.mark_synced(kind, id, &now).await?;
        tracing::debug!(entity = desc.name, id, created, "pulled record from external store");

        Ok(PullOutcome { id, created })
    }

    /// Compare an entity against an external record field by field.
    ///
    /// The bookkeeping timestamps are excluded, and a null or absent external
    /// value is never reported as a conflict: local data is trusted over
    /// absence.
    pub fn detect_conflicts<T: SyncEntity>(
        &self,
        instance: &T,
        record: &ExternalRecord,
    ) -> Result<ConflictMap, SyncError> {
        let desc = descriptor(T::KIND);
        let external = self.translator.from_external(desc, record)?;
        let local = instance_record(instance)?;

        let mut conflicts = ConflictMap::new();
        for field in desc.fields {
            if CONFLICT_EXCLUDED_FIELDS.contains(field) {
                continue;
            }
            let Some(external_value) = external.get(*field) else {
                continue;
            };
            if external_value.is_null() {
                continue;
            }
            let local_value = local.get(*field).cloned().unwrap_or(Value::Null);
            if &local_value != external_value {
                conflicts.insert(
                    field.to_string(),
                    FieldConflict {
                        local_value,
                        external_value: external_value.clone(),
                    },
                );
            }
        }
        Ok(conflicts)
    }

    /// Fetch the entity's external record, detect conflicts, and persist the
    /// conflict flag for contact-backed kinds. An absent external record
    /// yields an empty map.
    pub async fn check_remote_conflicts<T: SyncEntity>(
        &self,
        instance: &T,
    ) -> Result<ConflictMap, SyncError> {
        let Some(id) = instance.id() else {
            return Ok(ConflictMap::new());
        };
        let Some(record) = self.fetch_external(T::KIND, id).await? else {
            return Ok(ConflictMap::new());
        };
        let conflicts = self.detect_conflicts(instance, &record)?;
        if T::KIND.is_contact() && !conflicts.is_empty() {
            let json = serde_json::to_string(&conflicts)
                .map_err(|e| SyncError::Translate(TranslateError::Shape(e.to_string())))?;
            self.repo.set_conflict(id, &json).await?;
        }
        Ok(conflicts)
    }

    /// Apply a resolution strategy to a detected conflict map.
    ///
    /// `Local` keeps every local value (the conflict map is discarded);
    /// `External` overwrites each conflicting field from the external side.
    /// Both clear the conflict flag and details and stamp a fresh sync
    /// timestamp in a single transaction, and both update the in-memory
    /// instance to match.
    pub async fn resolve_conflicts<T: SyncEntity>(
        &self,
        instance: &mut T,
        conflicts: &ConflictMap,
        strategy: Resolution,
    ) -> Result<(), SyncError> {
        let id = instance.id().ok_or(SyncError::MissingId)?;
        let _guard = self.entity_lock(T::KIND, id).await;
        let now = Utc::now().to_rfc3339();

        let mut winning = InternalRecord::new();
        if strategy == Resolution::External {
            for (field, conflict) in conflicts {
                winning.insert(field.clone(), conflict.external_value.clone());
            }
        }

        let mut map = instance_record(instance)?;
        for (field, value) in &winning {
            map.insert(field.clone(), value.clone());
        }
        map.insert("last_synced_at".to_string(), Value::String(now.clone()));
        *instance = serde_json::from_value(Value::Object(map))
            .map_err(|e| SyncError::Translate(TranslateError::Shape(e.to_string())))?;

        self.repo
            .apply_resolution(T::KIND, id, &winning, &now)
            .await?;

        tracing::info!(
            entity = descriptor(T::KIND).name,
            id,
            ?strategy,
            resolved = conflicts.len(),
            "resolved conflicts"
        );
        Ok(())
    }

    /// Push a batch sequentially, in input order.
    ///
    /// Per-record failures are logged and collected; there is no cross-record
    /// transactionality, so earlier records stay committed when a later one
    /// fails.
    pub async fn push_batch<T: SyncEntity>(&self, instances: &[T]) -> SyncReport {
        let run_id = Uuid::new_v4();
        let desc = descriptor(T::KIND);
        let mut report = SyncReport::new(run_id, desc.table);

        for instance in instances {
            report.total += 1;
            match self.push(instance).await {
                Ok(outcome) if outcome.created => report.created += 1,
                Ok(_) => report.updated += 1,
                Err(e) => {
                    tracing::warn!(
                        run_id = %run_id,
                        entity = desc.name,
                        id = ?instance.id(),
                        "push failed: {e}"
                    );
                    report.failed += 1;
                    report.errors.push(SyncFailureDetail {
                        id: instance.id(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            run_id = %run_id,
            entity = desc.name,
            total = report.total,
            created = report.created,
            updated = report.updated,
            failed = report.failed,
            "push batch finished"
        );
        report
    }

    /// Pull every external record of a kind, sequentially, in store order.
    pub async fn pull_all(
        &self,
        kind: EntityKind,
        limit: Option<usize>,
    ) -> Result<SyncReport, SyncError> {
        let desc = descriptor(kind);
        let records = self.store.select_all(desc.table, limit).await?;

        let run_id = Uuid::new_v4();
        let mut report = SyncReport::new(run_id, desc.table);

        for record in &records {
            report.total += 1;
            match self.pull(kind, record).await {
                Ok(outcome) if outcome.created => report.created += 1,
                Ok(_) => report.updated += 1,
                Err(e) => {
                    tracing::warn!(
                        run_id = %run_id,
                        entity = desc.name,
                        id = ?record_id(record),
                        "pull failed: {e}"
                    );
                    report.failed += 1;
                    report.errors.push(SyncFailureDetail {
                        id: record_id(record),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            run_id = %run_id,
            entity = desc.name,
            total = report.total,
            created = report.created,
            updated = report.updated,
            failed = report.failed,
            "pull batch finished"
        );
        Ok(report)
    }
}

/// Serialize an instance into its internal-shape record.
fn instance_record<T: SyncEntity>(instance: &T) -> Result<InternalRecord, SyncError> {
    match serde_json::to_value(instance) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(SyncError::Translate(TranslateError::Shape(
            "entity did not serialize to an object".to_string(),
        ))),
        Err(e) => Err(SyncError::Translate(TranslateError::Shape(e.to_string()))),
    }
}

/// Read an id value that may be numeric or a decimal string.
fn coerce_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
