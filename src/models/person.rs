//! Person model: a contact row joined with its person detail row.

use serde::{Deserialize, Serialize};

/// A person, flattened to the shape the record translator consumes.
///
/// Every declared sync field serializes even when null; the translator relies
/// on the full field set being present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
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
    pub birthday: Option<String>,
    pub marital_status: Option<String>,
    pub spouse_name: Option<String>,
    pub facebook_url: Option<String>,
    pub pipeline_stage: Option<String>,
    pub assignment: Option<String>,
    pub last_synced_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for creating a new person.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePersonRequest {
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
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
    pub birthday: Option<String>,
    #[serde(default)]
    pub marital_status: Option<String>,
    #[serde(default)]
    pub spouse_name: Option<String>,
    #[serde(default)]
    pub facebook_url: Option<String>,
    #[serde(default)]
    pub pipeline_stage: Option<String>,
    #[serde(default)]
    pub assignment: Option<String>,
}
