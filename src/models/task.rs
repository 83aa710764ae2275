//! Task model: a work item optionally tied to a person or church.

use serde::{Deserialize, Serialize};

/// A task, always associated with an acting user through
/// `assigned_to_id`/`created_by_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub completed: bool,
    pub person_id: Option<i64>,
    pub church_id: Option<i64>,
    pub office_id: Option<i64>,
    pub assigned_to_id: Option<i64>,
    pub created_by_id: Option<i64>,
    pub last_synced_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for creating a new task.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub person_id: Option<i64>,
    #[serde(default)]
    pub church_id: Option<i64>,
    #[serde(default)]
    pub office_id: Option<i64>,
    #[serde(default)]
    pub assigned_to_id: Option<i64>,
    #[serde(default)]
    pub created_by_id: Option<i64>,
}
