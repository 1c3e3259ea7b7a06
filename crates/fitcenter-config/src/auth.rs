// ============================================================================
// Auth Service Configuration
// ============================================================================

use std::time::Duration;

use crate::constants::*;
use crate::{parse_var, ConfigError, DbConfig, LoggingConfig};

/// Where administrator and session rows live
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    /// Process-local tables, for local development and tests
    Memory,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_expire_hours: i64,
    /// Maximum number of administrators with active=true
    pub max_active_admins: usize,
    pub bcrypt_cost: u32,
    pub session_cleanup_interval: Duration,
    pub storage: StorageBackend,
    pub db: DbConfig,
    pub logging: LoggingConfig,
}

impl AuthConfig {
    /// Load configuration from environment variables (and `.env` when present)
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(crate::env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing("JWT_SECRET".to_string()))?;

        let jwt_expire_hours = parse_var(&lookup, "JWT_EXPIRE_HOURS", DEFAULT_JWT_EXPIRE_HOURS)?;
        if jwt_expire_hours <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "JWT_EXPIRE_HOURS".to_string(),
                value: jwt_expire_hours.to_string(),
            });
        }

        let storage = match lookup("AUTH_STORAGE").map(|v| v.to_lowercase()).as_deref() {
            None | Some("") | Some("postgres") => StorageBackend::Postgres,
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "AUTH_STORAGE".to_string(),
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            host: lookup("SERVER_HOST").unwrap_or_else(|| DEFAULT_AUTH_HOST.to_string()),
            port: parse_var(&lookup, "SERVER_PORT", DEFAULT_AUTH_PORT)?,
            jwt_secret,
            jwt_expire_hours,
            max_active_admins: parse_var(&lookup, "MAX_ACTIVE_ADMINS", DEFAULT_MAX_ACTIVE_ADMINS)?,
            bcrypt_cost: parse_var(&lookup, "BCRYPT_COST", 12)?,
            session_cleanup_interval: Duration::from_secs(parse_var(
                &lookup,
                "SESSION_CLEANUP_INTERVAL_SECS",
                DEFAULT_SESSION_CLEANUP_INTERVAL_SECS,
            )?),
            storage,
            db: DbConfig::from_lookup(&lookup)?,
            logging: LoggingConfig::from_lookup(&lookup),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
