//! People API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{resolve_scope, success, ApiResult, ScopeQuery};
use crate::errors::AppError;
use crate::models::{CreatePersonRequest, Person};
use crate::sync::{ConflictMap, Resolution};
use crate::AppState;

/// GET /api/people - List people visible to the acting user.
pub async fn list_people(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> ApiResult<Vec<Person>> {
    let scope = resolve_scope(&state, &query).await?;
    let people = state.repo.list_people(&scope.people_filter()).await?;
    success(people)
}

/// GET /api/people/:id - Get a single person.
pub async fn get_person(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Person> {
    match state.repo.get_person(id).await? {
        Some(person) => success(person),
        None => Err(AppError::NotFound(format!("Person {} not found", id))),
    }
}

/// POST /api/people - Create a new person.
pub async fn create_person(
    State(state): State<AppState>,
    Json(request): Json<CreatePersonRequest>,
) -> ApiResult<Person> {
    if request.first_name.trim().is_empty() {
        return Err(AppError::Validation("First name is required".to_string()));
    }

    let person = state.repo.create_person(&request).await?;
    success(person)
}

/// GET /api/people/:id/conflicts - Detect conflicts against the external
/// record, recording them on the contact when present.
pub async fn person_conflicts(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<ConflictMap> {
    let person = state
        .repo
        .get_person(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Person {} not found", id)))?;

    let conflicts = state.sync.check_remote_conflicts(&person).await?;
    success(conflicts)
}

/// Request body selecting a conflict resolution strategy.
#[derive(Debug, serde::Deserialize)]
pub struct ResolveConflictsRequest {
    pub strategy: Resolution,
}

/// POST /api/people/:id/conflicts/resolve - Apply a stored conflict map.
pub async fn resolve_person_conflicts(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<ResolveConflictsRequest>,
) -> ApiResult<Person> {
    let mut person = state
        .repo
        .get_person(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Person {} not found", id)))?;

    let stored = state
        .repo
        .conflict_data(id)
        .await?
        .ok_or_else(|| AppError::Validation(format!("No recorded conflicts for person {}", id)))?;
    let conflicts: ConflictMap = serde_json::from_str(&stored)?;

    state
        .sync
        .resolve_conflicts(&mut person, &conflicts, request.strategy)
        .await?;
    success(person)
}
