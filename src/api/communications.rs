//! Communication API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{resolve_scope, success, ApiResult, ScopeQuery};
use crate::errors::AppError;
use crate::models::{Communication, CreateCommunicationRequest};
use crate::AppState;

/// GET /api/communications - List communications visible to the acting user.
pub async fn list_communications(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> ApiResult<Vec<Communication>> {
    let scope = resolve_scope(&state, &query).await?;
    let communications = state
        .repo
        .list_communications(&scope.communications_filter())
        .await?;
    success(communications)
}

/// GET /api/communications/:id - Get a single communication.
pub async fn get_communication(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Communication> {
    match state.repo.get_communication(id).await? {
        Some(communication) => success(communication),
        None => Err(AppError::NotFound(format!(
            "Communication {} not found",
            id
        ))),
    }
}

/// POST /api/communications - Log a new communication.
pub async fn create_communication(
    State(state): State<AppState>,
    Json(request): Json<CreateCommunicationRequest>,
) -> ApiResult<Communication> {
    if request.comm_type.trim().is_empty() {
        return Err(AppError::Validation("Type is required".to_string()));
    }

    let communication = state.repo.create_communication(&request).await?;
    success(communication)
}
