// ============================================================================
// Fitcenter Config - Centralized configuration management
// ============================================================================
//
// Configuration for the gateway and the auth service. Every struct here is
// an immutable value built once at boot and shared behind an Arc.
//
// Sources:
// - Gateway: YAML file + environment overrides
// - Auth: environment only
//
// ============================================================================

mod auth;
mod constants;
mod database;
mod duration;
mod error;
mod gateway;
mod logging;

pub use auth::{AuthConfig, StorageBackend};
pub use constants::*;
pub use database::DbConfig;
pub use duration::{parse_duration, serde_duration};
pub use error::ConfigError;
pub use gateway::{
    AuthGuardConfig, GatewayConfig, GatewayServerConfig, RouteSpec, ServiceEndpoint,
};
pub use logging::{LogFormat, LoggingConfig};

/// Reads an environment variable through the given lookup and parses it,
/// falling back to `default` when absent.
pub(crate) fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw,
                })
        }
        _ => Ok(default),
    }
}

/// Process environment lookup used by the `from_env` constructors.
pub(crate) fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
