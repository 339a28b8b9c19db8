use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Admin account. The hash never leaves the server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub user_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub journal_name: Option<String>,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// What an account may touch, derived from its `journal_name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "camelCase")]
pub enum Role {
    SuperAdmin,
    #[serde(rename_all = "camelCase")]
    JournalAdmin { journal_id: i64 },
}

impl Role {
    pub fn can_access_journal(&self, journal_id: i64) -> bool {
        match self {
            Role::SuperAdmin => true,
            Role::JournalAdmin { journal_id: own } => *own == journal_id,
        }
    }

    pub fn is_super_admin(&self) -> bool {
        matches!(self, Role::SuperAdmin)
    }

    /// Journal every query is pinned to, if any.
    pub fn journal_scope(&self) -> Option<i64> {
        match self {
            Role::SuperAdmin => None,
            Role::JournalAdmin { journal_id } => Some(*journal_id),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "User name is required"))]
    pub user_name: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[validate(length(min = 3, max = 64, message = "User name must be 3-64 characters"))]
    pub user_name: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub journal_name: Option<String>,
    pub category: Option<String>,
}

/// Account plus resolved role, as returned by `/admin/me` and login.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    #[serde(flatten)]
    pub user: User,
    #[serde(flatten)]
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_admins_are_scoped() {
        let role = Role::JournalAdmin { journal_id: 3 };
        assert!(role.can_access_journal(3));
        assert!(!role.can_access_journal(4));
        assert_eq!(role.journal_scope(), Some(3));
        assert!(Role::SuperAdmin.can_access_journal(4));
    }

    #[test]
    fn role_serializes_with_tag() {
        let json = serde_json::to_value(Role::JournalAdmin { journal_id: 3 }).unwrap();
        assert_eq!(json["role"], "journalAdmin");
        assert_eq!(json["journalId"], 3);
    }
}
