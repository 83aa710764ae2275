//! Principal identity: users, roles, offices, office memberships.

use serde::{Deserialize, Serialize};

/// The four user roles, ordered from widest to narrowest default scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    OfficeAdmin,
    StandardUser,
    LimitedUser,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::OfficeAdmin => "office_admin",
            Role::StandardUser => "standard_user",
            Role::LimitedUser => "limited_user",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "super_admin" => Some(Role::SuperAdmin),
            "office_admin" => Some(Role::OfficeAdmin),
            "standard_user" => Some(Role::StandardUser),
            "limited_user" => Some(Role::LimitedUser),
            _ => None,
        }
    }
}

/// An application user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub role: Role,
    /// Primary office, used as the membership fallback when the membership
    /// lookup fails.
    pub office_id: Option<i64>,
    pub created_at: String,
}

/// An organizational grouping that partitions data visibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Office {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

/// Explicit user/office membership.
///
/// The `user_id` column is TEXT in storage even though user ids are numeric;
/// lookups compare against the stringified id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfficeMembership {
    pub id: i64,
    pub user_id: String,
    pub office_id: i64,
}

/// Request body for creating a new user.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default)]
    pub office_id: Option<i64>,
}

fn default_role() -> Role {
    Role::StandardUser
}

/// Request body for creating a new office.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOfficeRequest {
    pub name: String,
}

/// Request body for adding a user to an office.
#[derive(Debug, Clone, Deserialize)]
pub struct AddOfficeMemberRequest {
    pub user_id: i64,
}
