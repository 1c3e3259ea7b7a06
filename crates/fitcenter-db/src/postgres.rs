use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Administrator, NewAdministrator, NewSession, Session};
use crate::pagination::Pagination;
use crate::pool::DbPool;
use crate::storage::{AuthStorage, StoreError, StoreResult};

const ADMIN_COLUMNS: &str = "id, username, password_hash, role, email, full_name, is_active, \
                             last_login_at, created_at, updated_at";

const SESSION_COLUMNS: &str =
    "id, user_id, token_hash, expires_at, created_at, is_revoked, user_agent, ip_address";

/// Advisory lock key serializing administrator inserts, so the active count
/// read inside `create_admin` cannot go stale before the insert commits.
const ADMIN_CAP_LOCK_KEY: i64 = 0x6669_7463_6170;

/// PostgreSQL implementation of AuthStorage
pub struct PostgresAuthStorage {
    pool: DbPool,
}

impl PostgresAuthStorage {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Unique violations become tagged duplicates; the constraint name tells
/// which column collided.
fn map_insert_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let column = match db_err.constraint() {
                Some(name) if name.contains("email") => "email",
                Some(name) if name.contains("token_hash") => "token_hash",
                _ => "username",
            };
            return StoreError::Duplicate(column);
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl AuthStorage for PostgresAuthStorage {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_admin_by_username(&self, username: &str) -> StoreResult<Option<Administrator>> {
        let admin = sqlx::query_as::<_, Administrator>(&format!(
            "SELECT {ADMIN_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(admin)
    }

    async fn find_active_admin_by_username(
        &self,
        username: &str,
    ) -> StoreResult<Option<Administrator>> {
        let admin = sqlx::query_as::<_, Administrator>(&format!(
            "SELECT {ADMIN_COLUMNS} FROM users WHERE username = $1 AND is_active = TRUE"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(admin)
    }

    async fn find_admin_by_id(&self, id: i64) -> StoreResult<Option<Administrator>> {
        let admin = sqlx::query_as::<_, Administrator>(&format!(
            "SELECT {ADMIN_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(admin)
    }

    async fn count_active_admins(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE is_active = TRUE")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn create_admin(
        &self,
        admin: NewAdministrator,
        max_active: usize,
    ) -> StoreResult<Administrator> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(ADMIN_CAP_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let active: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE is_active = TRUE")
            .fetch_one(&mut *tx)
            .await?;
        if active >= max_active as i64 {
            // dropping the transaction rolls it back and releases the lock
            return Err(StoreError::CapReached { limit: max_active });
        }

        let created = sqlx::query_as::<_, Administrator>(&format!(
            r#"
            INSERT INTO users (username, password_hash, role, email, full_name, is_active,
                               created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, TRUE, NOW(), NOW())
            RETURNING {ADMIN_COLUMNS}
            "#
        ))
        .bind(&admin.username)
        .bind(&admin.password_hash)
        .bind(&admin.role)
        .bind(&admin.email)
        .bind(&admin.full_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_insert_error)?;

        tx.commit().await?;
        Ok(created)
    }

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE users SET last_login_at = $1, updated_at = NOW() WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn swap_password_hash(
        &self,
        id: i64,
        current_hash: &str,
        new_hash: &str,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $1, updated_at = NOW()
            WHERE id = $2 AND password_hash = $3
            "#,
        )
        .bind(new_hash)
        .bind(id)
        .bind(current_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn deactivate_admin(&self, username: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET is_active = FALSE, updated_at = NOW() WHERE username = $1",
        )
        .bind(username)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_admins(&self, pagination: Pagination) -> StoreResult<(Vec<Administrator>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        let admins = sqlx::query_as::<_, Administrator>(&format!(
            "SELECT {ADMIN_COLUMNS} FROM users ORDER BY id LIMIT $1 OFFSET $2"
        ))
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((admins, total))
    }

    async fn insert_session(&self, session: NewSession) -> StoreResult<Session> {
        let created = sqlx::query_as::<_, Session>(&format!(
            r#"
            INSERT INTO user_sessions (user_id, token_hash, expires_at, created_at, is_revoked,
                                       user_agent, ip_address)
            VALUES ($1, $2, $3, NOW(), FALSE, $4, $5)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(session.expires_at)
        .bind(&session.user_agent)
        .bind(&session.ip_address)
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_error)?;
        Ok(created)
    }

    async fn find_session_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM user_sessions WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn revoke_session(&self, token_hash: &str) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE user_sessions SET is_revoked = TRUE WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result =
            sqlx::query("DELETE FROM user_sessions WHERE expires_at < $1 OR is_revoked = TRUE")
                .bind(now)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}
