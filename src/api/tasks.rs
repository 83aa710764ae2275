//! Task API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{resolve_scope, success, ApiResult, ScopeQuery};
use crate::errors::AppError;
use crate::models::{CreateTaskRequest, Task};
use crate::AppState;

/// GET /api/tasks - List tasks visible to the acting user.
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> ApiResult<Vec<Task>> {
    let scope = resolve_scope(&state, &query).await?;
    let tasks = state.repo.list_tasks(&scope.tasks_filter()).await?;
    success(tasks)
}

/// GET /api/tasks/:id - Get a single task.
pub async fn get_task(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Task> {
    match state.repo.get_task(id).await? {
        Some(task) => success(task),
        None => Err(AppError::NotFound(format!("Task {} not found", id))),
    }
}

/// POST /api/tasks - Create a new task.
pub async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<CreateTaskRequest>,
) -> ApiResult<Task> {
    if request.title.trim().is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }

    let task = state.repo.create_task(&request).await?;
    success(task)
}
