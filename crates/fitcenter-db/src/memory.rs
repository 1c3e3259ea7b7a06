use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::models::{Administrator, NewAdministrator, NewSession, Session};
use crate::pagination::Pagination;
use crate::storage::{AuthStorage, StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    admins: Vec<Administrator>,
    sessions: Vec<Session>,
    next_admin_id: i64,
    next_session_id: i64,
}

/// Process-local implementation of AuthStorage
///
/// All tables sit behind one mutex, so every method is atomic. Contents are
/// lost when the process exits.
#[derive(Default)]
pub struct InMemoryAuthStorage {
    tables: Mutex<Tables>,
}

impl InMemoryAuthStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthStorage for InMemoryAuthStorage {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn find_admin_by_username(&self, username: &str) -> StoreResult<Option<Administrator>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .admins
            .iter()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn find_active_admin_by_username(
        &self,
        username: &str,
    ) -> StoreResult<Option<Administrator>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .admins
            .iter()
            .find(|a| a.username == username && a.is_active)
            .cloned())
    }

    async fn find_admin_by_id(&self, id: i64) -> StoreResult<Option<Administrator>> {
        let tables = self.tables.lock().await;
        Ok(tables.admins.iter().find(|a| a.id == id).cloned())
    }

    async fn count_active_admins(&self) -> StoreResult<i64> {
        let tables = self.tables.lock().await;
        Ok(tables.admins.iter().filter(|a| a.is_active).count() as i64)
    }

    async fn create_admin(
        &self,
        admin: NewAdministrator,
        max_active: usize,
    ) -> StoreResult<Administrator> {
        let mut tables = self.tables.lock().await;

        if tables.admins.iter().filter(|a| a.is_active).count() >= max_active {
            return Err(StoreError::CapReached { limit: max_active });
        }
        if tables.admins.iter().any(|a| a.username == admin.username) {
            return Err(StoreError::Duplicate("username"));
        }
        if admin.email.is_some() && tables.admins.iter().any(|a| a.email == admin.email) {
            return Err(StoreError::Duplicate("email"));
        }

        tables.next_admin_id += 1;
        let now = Utc::now();
        let created = Administrator {
            id: tables.next_admin_id,
            username: admin.username,
            password_hash: admin.password_hash,
            role: admin.role,
            email: admin.email,
            full_name: admin.full_name,
            is_active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.admins.push(created.clone());
        Ok(created)
    }

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        if let Some(admin) = tables.admins.iter_mut().find(|a| a.id == id) {
            admin.last_login_at = Some(at);
            admin.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn swap_password_hash(
        &self,
        id: i64,
        current_hash: &str,
        new_hash: &str,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables
            .admins
            .iter_mut()
            .find(|a| a.id == id && a.password_hash == current_hash)
        {
            Some(admin) => {
                admin.password_hash = new_hash.to_string();
                admin.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn deactivate_admin(&self, username: &str) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables.admins.iter_mut().find(|a| a.username == username) {
            Some(admin) => {
                admin.is_active = false;
                admin.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_admins(&self, pagination: Pagination) -> StoreResult<(Vec<Administrator>, i64)> {
        let tables = self.tables.lock().await;
        let page = tables
            .admins
            .iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit() as usize)
            .cloned()
            .collect();
        Ok((page, tables.admins.len() as i64))
    }

    async fn insert_session(&self, session: NewSession) -> StoreResult<Session> {
        let mut tables = self.tables.lock().await;
        if tables
            .sessions
            .iter()
            .any(|s| s.token_hash == session.token_hash)
        {
            return Err(StoreError::Duplicate("token_hash"));
        }
        tables.next_session_id += 1;
        let created = Session {
            id: tables.next_session_id,
            user_id: session.user_id,
            token_hash: session.token_hash,
            expires_at: session.expires_at,
            created_at: Utc::now(),
            is_revoked: false,
            user_agent: session.user_agent,
            ip_address: session.ip_address,
        };
        tables.sessions.push(created.clone());
        Ok(created)
    }

    async fn find_session_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Session>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .iter()
            .find(|s| s.token_hash == token_hash)
            .cloned())
    }

    async fn revoke_session(&self, token_hash: &str) -> StoreResult<bool> {
        let mut tables = self.tables.lock().await;
        let mut found = false;
        for session in tables.sessions.iter_mut().filter(|s| s.token_hash == token_hash) {
            session.is_revoked = true;
            found = true;
        }
        Ok(found)
    }

    async fn purge_sessions(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.tables.lock().await;
        let before = tables.sessions.len();
        tables
            .sessions
            .retain(|s| !(s.expires_at < now || s.is_revoked));
        Ok((before - tables.sessions.len()) as u64)
    }
}
