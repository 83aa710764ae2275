//! Principal administration endpoints: users, offices, memberships.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::{success, ApiResult};
use crate::access::{AccessScope, ViewMode};
use crate::errors::AppError;
use crate::models::{
    AddOfficeMemberRequest, CreateOfficeRequest, CreateUserRequest, Office, OfficeMembership, Role,
    User,
};
use crate::AppState;

/// POST /api/users - Create a new user.
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<User> {
    if request.username.trim().is_empty() {
        return Err(AppError::Validation("Username is required".to_string()));
    }

    let user = state.repo.create_user(&request).await?;
    success(user)
}

/// POST /api/offices - Create a new office.
pub async fn create_office(
    State(state): State<AppState>,
    Json(request): Json<CreateOfficeRequest>,
) -> ApiResult<Office> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }

    let office = state.repo.create_office(&request).await?;
    success(office)
}

/// POST /api/offices/:id/members - Add a user to an office.
pub async fn add_office_member(
    State(state): State<AppState>,
    Path(office_id): Path<i64>,
    Json(request): Json<AddOfficeMemberRequest>,
) -> ApiResult<OfficeMembership> {
    let user = state.repo.get_user(request.user_id).await?;
    if user.is_none() {
        return Err(AppError::NotFound(format!(
            "User {} not found",
            request.user_id
        )));
    }

    let membership = state
        .repo
        .add_office_member(office_id, request.user_id)
        .await?;
    success(membership)
}

/// Query parameter selecting a view mode for the scope summary.
#[derive(Debug, Deserialize)]
pub struct ScopeDisplayQuery {
    #[serde(default)]
    pub view_mode: Option<String>,
}

/// Summary of a user's effective scope.
#[derive(Debug, Serialize)]
pub struct ScopeInfo {
    pub role: Role,
    pub can_view_all_data: bool,
    pub view_mode_display: String,
}

/// GET /api/users/:id/scope - Describe the user's effective scope.
pub async fn user_scope(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<ScopeDisplayQuery>,
) -> ApiResult<ScopeInfo> {
    let user = state
        .repo
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;

    let view_mode = ViewMode::parse(query.view_mode.as_deref().unwrap_or("default"));
    let scope = AccessScope::for_user(&state.repo, &user, view_mode).await;
    success(ScopeInfo {
        role: scope.role(),
        can_view_all_data: scope.can_view_all_data(),
        view_mode_display: scope.view_mode_display(),
    })
}
