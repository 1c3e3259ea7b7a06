// ============================================================================
// Auth Operations
// ============================================================================
//
// Credential, token and session lifecycle, independent of HTTP. Failures
// surface as AppError so handlers can return them unchanged:
// - bad credentials, bad tokens         -> Auth (401)
// - username taken, cap reached         -> Conflict (409)
// - store failures                      -> Database (500)
//
// A token is only returned once its session row is persisted.
//
// ============================================================================

use chrono::{DateTime, Duration, Utc};
use fitcenter_db::{
    cap_reached_message, AdminProfile, Administrator, NewAdministrator, NewSession, Page,
    Pagination, StoreError,
};
use fitcenter_error::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use super::AuthServiceContext;
use crate::auth::{token_hash, Claims};

/// Identical for unknown users, inactive users and wrong passwords
pub const INVALID_CREDENTIALS: &str = "Invalid credentials";
pub const INVALID_TOKEN: &str = "Invalid or expired token";

const ADMIN_ROLE: &str = "admin";

/// bcrypt only reads the first 72 bytes of its input
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Tokens issued in the same second for the same account are identical, so a
/// login that collides with an existing session moves its issue time forward
const MAX_SESSION_ATTEMPTS: i64 = 5;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: AdminProfile,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<AdminProfile>,
}

/// Where a login came from, recorded on the session row
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Outcome of a successful validation
#[derive(Debug, Clone)]
pub struct ValidatedToken {
    pub claims: Claims,
    pub admin: Administrator,
    pub expires_at: DateTime<Utc>,
}

async fn hash_password(password: String, cost: u32) -> AppResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::internal(format!("password hashing task failed: {}", e)))?
        .map_err(|e| AppError::internal(format!("password hashing failed: {}", e)))
}

async fn verify_password(password: String, hash: String) -> AppResult<bool> {
    let outcome = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::internal(format!("password verification task failed: {}", e)))?;

    match outcome {
        Ok(matches) => Ok(matches),
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash could not be verified");
            Ok(false)
        }
    }
}

/// Longer input would be silently truncated by bcrypt
fn check_password_length(password: &str) -> AppResult<()> {
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AppError::validation(format!(
            "password must not exceed {} bytes",
            MAX_PASSWORD_BYTES
        )));
    }
    Ok(())
}

fn full_name(first: Option<&str>, last: Option<&str>) -> Option<String> {
    let parts: Vec<&str> = [first, last]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

impl AuthServiceContext {
    /// Exchange credentials for a token backed by a session row
    pub async fn login(&self, req: LoginRequest, client: ClientInfo) -> AppResult<LoginResponse> {
        if req.username.trim().is_empty() || req.password.is_empty() {
            return Err(AppError::validation("username and password are required"));
        }
        if req.password.len() > MAX_PASSWORD_BYTES {
            tracing::info!(username = %req.username, "Login refused: password exceeds bcrypt input");
            return Err(AppError::auth(INVALID_CREDENTIALS));
        }

        let Some(mut admin) = self
            .storage
            .find_active_admin_by_username(&req.username)
            .await?
        else {
            tracing::info!(username = %req.username, "Login refused: no active administrator");
            return Err(AppError::auth(INVALID_CREDENTIALS));
        };

        if !verify_password(req.password, admin.password_hash.clone()).await? {
            tracing::info!(user_id = admin.id, "Login refused: password mismatch");
            return Err(AppError::auth(INVALID_CREDENTIALS));
        }

        let now = Utc::now();
        match self.storage.touch_last_login(admin.id, now).await {
            Ok(()) => admin.last_login_at = Some(now),
            Err(e) => {
                tracing::warn!(user_id = admin.id, error = %e, "Failed to update last login time");
            }
        }

        let mut attempt = 0;
        let issued = loop {
            let issued = self
                .tokens
                .issue_at(
                    admin.id,
                    &admin.username,
                    &admin.role,
                    now + Duration::seconds(attempt),
                )
                .map_err(|e| AppError::internal(e.to_string()))?;

            let stored = self
                .storage
                .insert_session(NewSession {
                    user_id: admin.id,
                    token_hash: issued.token_hash.clone(),
                    expires_at: issued.expires_at,
                    user_agent: client.user_agent.clone(),
                    ip_address: client.ip_address.clone(),
                })
                .await;

            match stored {
                Ok(_) => break issued,
                Err(StoreError::Duplicate("token_hash")) if attempt + 1 < MAX_SESSION_ATTEMPTS => {
                    tracing::debug!(
                        user_id = admin.id,
                        attempt,
                        "Token already has a session; reissuing"
                    );
                    attempt += 1;
                }
                Err(StoreError::Duplicate(_)) => {
                    tracing::error!(
                        user_id = admin.id,
                        attempts = attempt + 1,
                        "No free token slot for session"
                    );
                    return Err(AppError::internal("could not allocate a unique session token"));
                }
                Err(e) => {
                    tracing::error!(user_id = admin.id, error = %e, "Failed to persist session");
                    return Err(AppError::from(e));
                }
            }
        };

        tracing::info!(user_id = admin.id, username = %admin.username, "Administrator logged in");

        Ok(LoginResponse {
            token: issued.token,
            expires_at: issued.expires_at,
            user: admin.profile(),
        })
    }

    /// Check signature and expiry, then the session row, then the account.
    /// Read-only.
    pub async fn validate(&self, token: &str) -> AppResult<ValidatedToken> {
        let claims = self.tokens.verify(token).map_err(|e| {
            tracing::debug!(error = %e, "Token rejected");
            AppError::auth(INVALID_TOKEN)
        })?;

        let session = self
            .storage
            .find_session_by_token_hash(&token_hash(token))
            .await?
            .filter(|s| s.user_id == claims.user_id && s.is_valid_at(Utc::now()))
            .ok_or_else(|| AppError::auth(INVALID_TOKEN))?;

        let admin = self
            .storage
            .find_admin_by_id(claims.user_id)
            .await?
            .filter(|a| a.is_active)
            .ok_or_else(|| AppError::auth(INVALID_TOKEN))?;

        Ok(ValidatedToken {
            claims,
            admin,
            expires_at: session.expires_at,
        })
    }

    /// Create an administrator, refused once the active cap is reached
    pub async fn register(&self, req: RegisterRequest) -> AppResult<RegisterResponse> {
        let username = req.username.trim();
        if username.is_empty() || req.password.is_empty() {
            return Err(AppError::validation("username and password are required"));
        }
        check_password_length(&req.password)?;
        let email = req.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::validation("a valid email is required"));
        }

        if self.storage.find_admin_by_username(username).await?.is_some() {
            return Err(AppError::conflict("Username already exists"));
        }

        let cap = self.config.max_active_admins;
        let active = self.storage.count_active_admins().await?;
        if active >= cap as i64 {
            tracing::warn!(active, cap, "Registration refused: administrator cap reached");
            return Err(AppError::conflict(cap_reached_message(cap)));
        }

        let new_admin = NewAdministrator {
            username: username.to_string(),
            password_hash: hash_password(req.password, self.config.bcrypt_cost).await?,
            role: ADMIN_ROLE.to_string(),
            email: Some(email.to_string()),
            full_name: full_name(req.first_name.as_deref(), req.last_name.as_deref()),
        };

        // count and insert are re-checked atomically by the store
        let created = self
            .storage
            .create_admin(new_admin, cap)
            .await
            .map_err(|e| match e {
                StoreError::Duplicate("username") => AppError::conflict("Username already exists"),
                StoreError::Duplicate("email") => AppError::conflict("Email already exists"),
                other => AppError::from(other),
            })?;

        tracing::info!(user_id = created.id, username = %created.username, "Administrator registered");

        Ok(RegisterResponse {
            success: true,
            message: "Administrator registered successfully".to_string(),
            user: Some(created.profile()),
        })
    }

    /// Re-hash the password after verifying the current one
    pub async fn update_password(
        &self,
        username: &str,
        current_password: String,
        new_password: String,
    ) -> AppResult<()> {
        if new_password.is_empty() {
            return Err(AppError::validation("new password is required"));
        }
        check_password_length(&new_password)?;

        let admin = self
            .storage
            .find_active_admin_by_username(username)
            .await?
            .ok_or_else(|| AppError::auth(INVALID_CREDENTIALS))?;

        if !verify_password(current_password, admin.password_hash.clone()).await? {
            return Err(AppError::auth(INVALID_CREDENTIALS));
        }

        let new_hash = hash_password(new_password, self.config.bcrypt_cost).await?;
        let swapped = self
            .storage
            .swap_password_hash(admin.id, &admin.password_hash, &new_hash)
            .await?;
        if !swapped {
            tracing::warn!(user_id = admin.id, "Password changed concurrently; update refused");
            return Err(AppError::auth(INVALID_CREDENTIALS));
        }

        tracing::info!(user_id = admin.id, "Administrator password updated");
        Ok(())
    }

    /// Deactivate an administrator. Its sessions stay but stop validating.
    pub async fn deactivate(&self, username: &str) -> AppResult<()> {
        if !self.storage.deactivate_admin(username).await? {
            return Err(AppError::not_found("Administrator not found"));
        }
        tracing::info!(username = %username, "Administrator deactivated");
        Ok(())
    }

    /// Revoke the session behind a currently valid token
    pub async fn revoke(&self, token: &str) -> AppResult<()> {
        let validated = self.validate(token).await?;
        self.storage.revoke_session(&token_hash(token)).await?;
        tracing::info!(user_id = validated.admin.id, "Session revoked");
        Ok(())
    }

    pub async fn list_admins(&self, pagination: Pagination) -> AppResult<Page<AdminProfile>> {
        let (admins, total) = self.storage.list_admins(pagination).await?;
        let profiles = admins.iter().map(Administrator::profile).collect();
        Ok(Page::new(profiles, pagination, total))
    }

    /// Report the administrator situation at startup. Never seeds accounts.
    pub async fn initialize_defaults(&self) -> AppResult<i64> {
        let cap = self.config.max_active_admins as i64;
        let active = self.storage.count_active_admins().await?;

        if active == 0 {
            tracing::warn!(
                cap,
                "No active administrators. Create one with POST /api/v1/auth/register"
            );
        } else if active < cap {
            tracing::info!(
                active,
                cap,
                remaining = cap - active,
                "Active administrators present; more can be registered"
            );
        } else {
            tracing::info!(active, cap, "Administrator limit reached; registration is closed");
        }
        Ok(active)
    }
}
