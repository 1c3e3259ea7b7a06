use chrono::{DateTime, Utc};
use serde::Serialize;

/// Administrator row from `users`
#[derive(Clone, sqlx::FromRow)]
pub struct Administrator {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Administrator {
    /// The externally visible record, with the password hash scrubbed
    pub fn profile(&self) -> AdminProfile {
        AdminProfile {
            id: self.id,
            username: self.username.clone(),
            role: self.role.clone(),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            is_active: self.is_active,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl std::fmt::Debug for Administrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Administrator")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .field("role", &self.role)
            .field("email", &self.email)
            .field("is_active", &self.is_active)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AdminProfile {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for a new administrator row; always inserted with is_active=true
#[derive(Clone)]
pub struct NewAdministrator {
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

/// Session row from `user_sessions`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl Session {
    /// Usable for authentication: not revoked and `expires_at` still ahead
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && self.expires_at > now
    }
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}
