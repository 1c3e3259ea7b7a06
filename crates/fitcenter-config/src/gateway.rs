// ============================================================================
// Gateway Configuration
// ============================================================================
//
// YAML layout:
//
//   server:   {port, readTimeout, writeTimeout, idleTimeout}
//   services: {member: {url, timeout}, staff: ..., class: ..., facility: ...,
//              payment: ..., auth: ...}
//   routes:   [{prefix, service}]        # optional, replaces built-in table
//   authGuard: {enabled, publicPaths}    # optional
//
// Environment overrides (applied after the file): API_GATEWAY_PORT,
// <SERVICE>_SERVICE_URL, GATEWAY_REQUIRE_AUTH.
//
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::duration::serde_duration;
use crate::{parse_var, ConfigError, LoggingConfig};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayServerConfig {
    pub port: u16,
    #[serde(with = "serde_duration")]
    pub read_timeout: Duration,
    #[serde(with = "serde_duration")]
    pub write_timeout: Duration,
    #[serde(with = "serde_duration")]
    pub idle_timeout: Duration,
}

impl Default for GatewayServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_GATEWAY_PORT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// One downstream backend
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ServiceEndpoint {
    /// scheme://host:port, parsed lazily by the proxy
    pub url: String,
    #[serde(with = "serde_duration", default = "default_service_timeout")]
    pub timeout: Duration,
}

fn default_service_timeout() -> Duration {
    DEFAULT_SERVICE_TIMEOUT
}

/// A declarative `prefix -> service` pair
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct RouteSpec {
    pub prefix: String,
    pub service: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthGuardConfig {
    /// Validate bearer tokens at the gateway before forwarding
    pub enabled: bool,
    /// Paths (exact or prefix) forwarded without a token, in addition to
    /// login/register/validate
    pub public_paths: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    pub server: GatewayServerConfig,
    pub services: BTreeMap<String, ServiceEndpoint>,
    pub routes: Vec<RouteSpec>,
    pub auth_guard: AuthGuardConfig,
    #[serde(skip)]
    pub logging: LoggingConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: GatewayServerConfig::default(),
            services: default_services(),
            routes: default_routes(),
            auth_guard: AuthGuardConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_services() -> BTreeMap<String, ServiceEndpoint> {
    DEFAULT_SERVICES
        .iter()
        .map(|(name, url, _)| {
            (
                name.to_string(),
                ServiceEndpoint {
                    url: url.to_string(),
                    timeout: DEFAULT_SERVICE_TIMEOUT,
                },
            )
        })
        .collect()
}

fn default_routes() -> Vec<RouteSpec> {
    DEFAULT_ROUTES
        .iter()
        .map(|(prefix, service)| RouteSpec {
            prefix: prefix.to_string(),
            service: service.to_string(),
        })
        .collect()
}

impl GatewayConfig {
    /// Load configuration from the YAML file named by `GATEWAY_CONFIG`
    /// (or the default path) and apply environment overrides.
    ///
    /// A missing file at the default path falls back to built-in defaults;
    /// a missing file at an explicitly configured path is an error.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let explicit = std::env::var("GATEWAY_CONFIG").ok();
        let path = explicit
            .clone()
            .unwrap_or_else(|| DEFAULT_GATEWAY_CONFIG_PATH.to_string());

        let mut config = if Path::new(&path).exists() {
            tracing::info!(path = %path, "Loading gateway configuration file");
            Self::from_file(&path)?
        } else if explicit.is_some() {
            return Err(ConfigError::Io {
                path: path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            });
        } else {
            tracing::info!(path = %path, "No gateway configuration file, using defaults");
            Self::default()
        };

        config.apply_overrides(crate::env_lookup)?;
        config.logging = LoggingConfig::from_env();
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw).map_err(|source| ConfigError::Yaml {
            path: path.to_string(),
            source,
        })
    }

    /// Parse YAML; services and routes not mentioned keep their defaults.
    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml::Error> {
        let mut config: GatewayConfig = serde_yaml::from_str(raw)?;

        for (name, endpoint) in default_services() {
            config.services.entry(name).or_insert(endpoint);
        }
        if config.routes.is_empty() {
            config.routes = default_routes();
        }
        Ok(config)
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.server.port = parse_var(&lookup, "API_GATEWAY_PORT", self.server.port)?;

        for &(name, _, env_key) in DEFAULT_SERVICES {
            if let Some(url) = lookup(env_key).filter(|v| !v.trim().is_empty()) {
                self.services
                    .entry(name.to_string())
                    .and_modify(|endpoint| endpoint.url = url.clone())
                    .or_insert(ServiceEndpoint {
                        url,
                        timeout: DEFAULT_SERVICE_TIMEOUT,
                    });
            }
        }

        self.auth_guard.enabled =
            parse_var(&lookup, "GATEWAY_REQUIRE_AUTH", self.auth_guard.enabled)?;
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.server.port)
    }
}
