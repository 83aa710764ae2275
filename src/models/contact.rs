//! Shared contact identity record.

use serde::{Deserialize, Serialize};

/// Discriminator for the two contact specializations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactType {
    Person,
    Church,
}

impl ContactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactType::Person => "person",
            ContactType::Church => "church",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "person" => Some(ContactType::Person),
            "church" => Some(ContactType::Church),
            _ => None,
        }
    }
}

/// A contact identity row as stored, including conflict bookkeeping.
///
/// Contacts are soft-stated through `status`; rows are not hard-deleted in
/// normal operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub contact_type: ContactType,
    pub first_name: String,
    pub last_name: String,
    pub name: Option<String>,
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
    pub has_conflict: bool,
    /// JSON-encoded conflict map, present only while `has_conflict` is set.
    pub conflict_data: Option<String>,
    pub last_synced_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}
