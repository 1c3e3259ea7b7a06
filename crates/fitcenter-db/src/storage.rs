use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fitcenter_error::AppError;
use thiserror::Error;

use crate::models::{Administrator, NewAdministrator, NewSession, Session};
use crate::pagination::Pagination;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures at the store boundary, tagged so callers never inspect messages
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique column already holds this value ("username", "email" or
    /// "token_hash")
    #[error("duplicate {0}")]
    Duplicate(&'static str),

    /// Inserting one more active administrator would exceed the cap
    #[error("active administrator limit of {limit} reached")]
    CapReached { limit: usize },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(field) => AppError::Conflict(format!("{} already exists", field)),
            StoreError::CapReached { limit } => AppError::Conflict(cap_reached_message(limit)),
            StoreError::Database(e) => AppError::Database(e),
        }
    }
}

/// Operator- and client-facing message for a refused registration
pub fn cap_reached_message(limit: usize) -> String {
    format!(
        "Maximum number of active administrators ({}) reached",
        limit
    )
}

/// Storage interface for administrator and session records
///
/// Implementations:
/// - PostgreSQL (production)
/// - In-memory (local development and tests)
#[async_trait]
pub trait AuthStorage: Send + Sync {
    /// Round-trip to the backing store (health probes)
    async fn ping(&self) -> StoreResult<()>;

    /// Find an administrator by exact (case-sensitive) username, active or not
    async fn find_admin_by_username(&self, username: &str) -> StoreResult<Option<Administrator>>;

    /// Find an administrator by username among active rows only
    async fn find_active_admin_by_username(
        &self,
        username: &str,
    ) -> StoreResult<Option<Administrator>>;

    async fn find_admin_by_id(&self, id: i64) -> StoreResult<Option<Administrator>>;

    async fn count_active_admins(&self) -> StoreResult<i64>;

    /// Insert a new active administrator unless `max_active` active rows
    /// already exist. The count and the insert are atomic with respect to
    /// other calls of this method.
    async fn create_admin(
        &self,
        admin: NewAdministrator,
        max_active: usize,
    ) -> StoreResult<Administrator>;

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()>;

    /// Replace the password hash only if it still equals `current_hash`.
    /// Returns false when the row changed underneath (or is gone).
    async fn swap_password_hash(
        &self,
        id: i64,
        current_hash: &str,
        new_hash: &str,
    ) -> StoreResult<bool>;

    /// Set is_active=false. Returns false when no such username exists.
    async fn deactivate_admin(&self, username: &str) -> StoreResult<bool>;

    /// One page of administrators ordered by id, plus the total row count
    async fn list_admins(&self, pagination: Pagination) -> StoreResult<(Vec<Administrator>, i64)>;

    async fn insert_session(&self, session: NewSession) -> StoreResult<Session>;

    async fn find_session_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Session>>;

    /// Mark the session revoked. Returns false when no session has this hash.
    async fn revoke_session(&self, token_hash: &str) -> StoreResult<bool>;

    /// Delete sessions with `expires_at < now` or `is_revoked`.
    /// Returns the number of deleted rows.
    async fn purge_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}
