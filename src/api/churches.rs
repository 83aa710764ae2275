//! Church API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{resolve_scope, success, ApiResult, ResolveConflictsRequest, ScopeQuery};
use crate::errors::AppError;
use crate::models::{Church, CreateChurchRequest};
use crate::sync::ConflictMap;
use crate::AppState;

/// GET /api/churches - List churches visible to the acting user.
pub async fn list_churches(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> ApiResult<Vec<Church>> {
    let scope = resolve_scope(&state, &query).await?;
    let churches = state.repo.list_churches(&scope.churches_filter()).await?;
    success(churches)
}

/// GET /api/churches/:id - Get a single church.
pub async fn get_church(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Church> {
    match state.repo.get_church(id).await? {
        Some(church) => success(church),
        None => Err(AppError::NotFound(format!("Church {} not found", id))),
    }
}

/// POST /api/churches - Create a new church.
pub async fn create_church(
    State(state): State<AppState>,
    Json(request): Json<CreateChurchRequest>,
) -> ApiResult<Church> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }

    let church = state.repo.create_church(&request).await?;
    success(church)
}

/// GET /api/churches/:id/conflicts - Detect conflicts against the external
/// record, recording them on the contact when present.
pub async fn church_conflicts(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ConflictMap> {
    let church = state
        .repo
        .get_church(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Church {} not found", id)))?;

    let conflicts = state.sync.check_remote_conflicts(&church).await?;
    success(conflicts)
}

/// POST /api/churches/:id/conflicts/resolve - Apply a stored conflict map.
pub async fn resolve_church_conflicts(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<ResolveConflictsRequest>,
) -> ApiResult<Church> {
    let mut church = state
        .repo
        .get_church(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Church {} not found", id)))?;

    let stored = state
        .repo
        .conflict_data(id)
        .await?
        .ok_or_else(|| AppError::Validation(format!("No recorded conflicts for church {}", id)))?;
    let conflicts: ConflictMap = serde_json::from_str(&stored)?;

    state
        .sync
        .resolve_conflicts(&mut church, &conflicts, request.strategy)
        .await?;
    success(church)
}
