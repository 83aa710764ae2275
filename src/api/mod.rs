//! REST API module.
//!
//! Thin handlers over the core: they resolve the acting user's access scope,
//! call the repository or the sync engine, and wrap the result in the
//! response envelope.

mod admin;
mod churches;
mod communications;
mod people;
mod sync;
mod tasks;

pub use admin::*;
pub use churches::*;
pub use communications::*;
pub use people::*;
pub use sync::*;
pub use tasks::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::access::{AccessScope, ViewMode};
use crate::errors::AppError;
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// Query parameters identifying the acting principal and view mode.
#[derive(Debug, Deserialize)]
pub struct ScopeQuery {
    pub user_id: i64,
    #[serde(default)]
    pub view_mode: Option<String>,
}

/// Resolve the acting user's access scope from the request parameters.
pub async fn resolve_scope(state: &AppState, query: &ScopeQuery) -> Result<AccessScope, AppError> {
    let user = state
        .repo
        .get_user(query.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", query.user_id)))?;
    let view_mode = ViewMode::parse(query.view_mode.as_deref().unwrap_or("default"));
    Ok(AccessScope::for_user(&state.repo, &user, view_mode).await)
}
