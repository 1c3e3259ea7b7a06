// ============================================================================
// Database Configuration
// ============================================================================

use std::fmt;

use crate::{parse_var, ConfigError};

/// Database connection pool configuration
///
/// `DATABASE_URL` wins when set. Otherwise the `DB_*` parts are handed to the
/// driver as separate fields, so credentials never need URL escaping.
#[derive(Clone)]
pub struct DbConfig {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// libpq `sslmode` (disable, prefer, require, verify-ca, verify-full)
    pub ssl_mode: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Connections kept open even when idle
    pub min_connections: u32,
    /// Timeout for acquiring a connection from the pool (seconds)
    pub acquire_timeout_secs: u64,
    /// Timeout for idle connections before they are closed (seconds)
    pub idle_timeout_secs: u64,
    /// Maximum lifetime of any single connection (seconds)
    pub max_lifetime_secs: u64,
    /// Apply embedded migrations at startup
    pub run_migrations: bool,
}

impl DbConfig {
    pub(crate) fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            url: lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()),
            host: get("DB_HOST", "localhost"),
            port: parse_var(lookup, "DB_PORT", 5432)?,
            user: get("DB_USER", "postgres"),
            password: get("DB_PASSWORD", "postgres"),
            database: get("DB_NAME", "fitcenter_auth"),
            ssl_mode: get("DB_SSLMODE", "disable"),
            max_connections: parse_var(lookup, "DB_MAX_CONNECTIONS", 25)?,
            min_connections: parse_var(lookup, "DB_MIN_CONNECTIONS", 0)?,
            acquire_timeout_secs: parse_var(lookup, "DB_ACQUIRE_TIMEOUT_SECS", 30)?,
            idle_timeout_secs: parse_var(lookup, "DB_IDLE_TIMEOUT_SECS", 600)?,
            max_lifetime_secs: parse_var(lookup, "DB_MAX_LIFETIME_SECS", 300)?,
            run_migrations: parse_var(lookup, "DB_RUN_MIGRATIONS", true)?,
        })
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("url", &self.url.as_ref().map(|_| "[REDACTED]"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("run_migrations", &self.run_migrations)
            .finish_non_exhaustive()
    }
}
