//! Communication model: a message record tied to a contact and an owning user.

use serde::{Deserialize, Serialize};

/// A logged communication (email, call, letter, text).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Communication {
    pub id: i64,
    pub comm_type: String,
    pub subject: Option<String>,
    pub message: Option<String>,
    pub direction: Option<String>,
    pub person_id: Option<i64>,
    pub church_id: Option<i64>,
    pub office_id: Option<i64>,
    pub user_id: Option<i64>,
    pub sent_at: Option<String>,
    pub last_synced_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for logging a new communication.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommunicationRequest {
    pub comm_type: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub person_id: Option<i64>,
    #[serde(default)]
    pub church_id: Option<i64>,
    #[serde(default)]
    pub office_id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub sent_at: Option<String>,
}
