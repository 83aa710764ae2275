//! Sync API endpoints: batch reconciliation with the external store.

use axum::extract::{Path, Query, State};
use serde::Deserialize;

use super::{success, ApiResult};
use crate::access::Filter;
use crate::errors::AppError;
use crate::mapper::EntityKind;
use crate::sync::SyncReport;
use crate::AppState;

fn entity_kind(entity: &str) -> Result<EntityKind, AppError> {
    EntityKind::from_table(entity)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown entity: {}", entity)))
}

/// POST /api/sync/:entity/push - Push every local record of an entity.
pub async fn push_entity(
    State(state): State<AppState>,
    Path(entity): Path<String>,
) -> ApiResult<SyncReport> {
    let report = match entity_kind(&entity)? {
        EntityKind::Person => {
            let people = state.repo.list_people(&Filter::All).await?;
            state.sync.push_batch(&people).await
        }
        EntityKind::Church => {
            let churches = state.repo.list_churches(&Filter::All).await?;
            state.sync.push_batch(&churches).await
        }
        EntityKind::Task => {
            let tasks = state.repo.list_tasks(&Filter::All).await?;
            state.sync.push_batch(&tasks).await
        }
        EntityKind::Communication => {
            let communications = state.repo.list_communications(&Filter::All).await?;
            state.sync.push_batch(&communications).await
        }
    };
    success(report)
}

/// Query parameters for a pull run.
#[derive(Debug, Deserialize)]
pub struct PullQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// POST /api/sync/:entity/pull - Pull external records of an entity.
pub async fn pull_entity(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(query): Query<PullQuery>,
) -> ApiResult<SyncReport> {
    let kind = entity_kind(&entity)?;
    let report = state.sync.pull_all(kind, query.limit).await?;
    success(report)
}
