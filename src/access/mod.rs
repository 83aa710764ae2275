//! Role- and office-scoped data access.
//!
//! An [`AccessScope`] is computed once per request from the acting user and
//! the requested view mode, and yields one visibility filter per collection.
//! A view mode can narrow a super admin's or office admin's default scope but
//! never widens a standard or limited user's scope; a failed office lookup
//! fails closed (office-scoped collections become empty, not unfiltered).
//!
//! The scope is read-only: it computes filters, it never mutates data and it
//! never talks to the sync engine.

use crate::db::Repository;
use crate::models::{Role, User};

/// Requested visibility narrowing, parsed from the request parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Default,
    MyOnly,
    /// A specific office; `None` when the office id did not parse, which
    /// degrades to no office narrowing.
    Office(Option<i64>),
}

impl ViewMode {
    /// Parse a view mode string: `default`, `my_only`, or `office_<id>`.
    /// Unknown values degrade to `default`.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "my_only" => ViewMode::MyOnly,
            s => match s.strip_prefix("office_") {
                Some(id) => ViewMode::Office(id.parse().ok()),
                None => ViewMode::Default,
            },
        }
    }
}

/// A visibility predicate over one entity collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    All,
    OwnedBy(i64),
    OfficeIn(Vec<i64>),
    /// Office members plus the user's own records (union, deduplicated by
    /// the query itself).
    OfficeOrOwned { offices: Vec<i64>, owner: i64 },
    AssignedOrCreated(i64),
    /// Records in the office, or attached to a person/church in the office.
    OfficeOrRelated(i64),
    Nothing,
}

/// Visibility scope for one principal and view mode.
#[derive(Debug, Clone)]
pub struct AccessScope {
    user_id: i64,
    role: Role,
    view_mode: ViewMode,
    offices: Vec<i64>,
}

impl AccessScope {
    /// Build a scope from already-resolved office memberships.
    pub fn new(user_id: i64, role: Role, view_mode: ViewMode, offices: Vec<i64>) -> Self {
        Self {
            user_id,
            role,
            view_mode,
            offices,
        }
    }

    /// Build a scope for a user, resolving office memberships.
    ///
    /// A failed membership lookup falls back to the user's primary office
    /// when present, else the empty set.
    pub async fn for_user(repo: &Repository, user: &User, view_mode: ViewMode) -> Self {
        let offices = match repo.office_ids_for_user(user.id).await {
            Ok(ids) if !ids.is_empty() => ids,
            Ok(_) => user.office_id.into_iter().collect(),
            Err(e) => {
                tracing::warn!(
                    user_id = user.id,
                    "office membership lookup failed, falling back to primary office: {e}"
                );
                user.office_id.into_iter().collect()
            }
        };
        Self::new(user.id, user.role, view_mode, offices)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Offices in effect after view-mode narrowing, for the privileged roles.
    /// Narrowing to an office outside the admin's membership is ignored
    /// rather than widening the scope.
    fn scoped_offices(&self) -> Vec<i64> {
        if let ViewMode::Office(Some(id)) = self.view_mode {
            if self.offices.contains(&id) {
                return vec![id];
            }
        }
        self.offices.clone()
    }

    /// Visibility filter for people.
    pub fn people_filter(&self) -> Filter {
        match self.role {
            Role::SuperAdmin => match self.view_mode {
                ViewMode::MyOnly => Filter::OwnedBy(self.user_id),
                ViewMode::Office(Some(id)) => Filter::OfficeIn(vec![id]),
                _ => Filter::All,
            },
            Role::OfficeAdmin => match self.view_mode {
                ViewMode::MyOnly => Filter::OwnedBy(self.user_id),
                _ => {
                    let offices = self.scoped_offices();
                    if offices.is_empty() {
                        Filter::OwnedBy(self.user_id)
                    } else {
                        Filter::OfficeOrOwned {
                            offices,
                            owner: self.user_id,
                        }
                    }
                }
            },
            Role::StandardUser | Role::LimitedUser => Filter::OwnedBy(self.user_id),
        }
    }

    /// Visibility filter for churches.
    ///
    /// There is no my-only view of churches; for a super admin that mode
    /// falls through to the office rule.
    pub fn churches_filter(&self) -> Filter {
        match self.role {
            Role::SuperAdmin => match self.view_mode {
                ViewMode::Office(Some(id)) => Filter::OfficeIn(vec![id]),
                _ => Filter::All,
            },
            Role::OfficeAdmin | Role::StandardUser | Role::LimitedUser => {
                let offices = if self.role == Role::OfficeAdmin {
                    self.scoped_offices()
                } else {
                    self.offices.clone()
                };
                if offices.is_empty() {
                    Filter::Nothing
                } else {
                    Filter::OfficeIn(offices)
                }
            }
        }
    }

    /// Visibility filter for tasks.
    pub fn tasks_filter(&self) -> Filter {
        match self.role {
            Role::SuperAdmin => match self.view_mode {
                ViewMode::MyOnly => Filter::AssignedOrCreated(self.user_id),
                ViewMode::Office(Some(id)) => Filter::OfficeOrRelated(id),
                _ => Filter::All,
            },
            _ => Filter::AssignedOrCreated(self.user_id),
        }
    }

    /// Visibility filter for communications.
    pub fn communications_filter(&self) -> Filter {
        match self.role {
            Role::SuperAdmin => match self.view_mode {
                ViewMode::MyOnly => Filter::OwnedBy(self.user_id),
                ViewMode::Office(Some(id)) => Filter::OfficeOrRelated(id),
                _ => Filter::All,
            },
            _ => Filter::OwnedBy(self.user_id),
        }
    }

    /// Whether this principal may see unscoped data at all.
    pub fn can_view_all_data(&self) -> bool {
        matches!(self.role, Role::SuperAdmin | Role::OfficeAdmin)
    }

    /// Human label for the resolved scope.
    pub fn view_mode_display(&self) -> String {
        match self.role {
            Role::SuperAdmin | Role::OfficeAdmin => match self.view_mode {
                ViewMode::MyOnly => "My records only".to_string(),
                ViewMode::Office(Some(id)) => format!("Office #{id}"),
                _ => {
                    if self.role == Role::SuperAdmin {
                        "All offices".to_string()
                    } else {
                        "My offices".to_string()
                    }
                }
            },
            Role::StandardUser | Role::LimitedUser => "My records".to_string(),
        }
    }
}
