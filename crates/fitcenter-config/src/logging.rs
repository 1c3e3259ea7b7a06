// ============================================================================
// Logging Configuration
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// EnvFilter directive, e.g. "info" or "fitcenter_server=debug,tower_http=info"
    pub rust_log: String,
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(crate::env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let format = match lookup("LOG_FORMAT")
            .map(|v| v.to_lowercase())
            .as_deref()
        {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        };

        Self {
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            format,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            rust_log: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
