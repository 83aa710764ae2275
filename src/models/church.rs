//! Church model: a contact row joined with its church detail row.

use serde::{Deserialize, Serialize};

/// A church, flattened to the shape the record translator consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Church {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub notes: Option<String>,
    pub status: String,
    pub user_id: Option<i64>,
    pub office_id: Option<i64>,
    pub denomination: Option<String>,
    pub pastor_name: Option<String>,
    pub pastor_email: Option<String>,
    pub pastor_phone: Option<String>,
    pub congregation_size: Option<i64>,
    pub pipeline_stage: Option<String>,
    pub last_synced_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for creating a new church.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateChurchRequest {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub street_address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub office_id: Option<i64>,
    #[serde(default)]
    pub denomination: Option<String>,
    #[serde(default)]
    pub pastor_name: Option<String>,
    #[serde(default)]
    pub pastor_email: Option<String>,
    #[serde(default)]
    pub pastor_phone: Option<String>,
    #[serde(default)]
    pub congregation_size: Option<i64>,
    #[serde(default)]
    pub pipeline_stage: Option<String>,
}
