// ============================================================================
// Route Table
// ============================================================================
//
// Declarative prefix -> backend table, built once from configuration and
// read-only afterwards. Selection is longest matching prefix, where a prefix
// matches a path equal to it or continuing with '/'.
//
// ============================================================================

use std::collections::HashSet;
use std::time::Duration;

use fitcenter_config::GatewayConfig;
use thiserror::Error;

/// Mandatory start of every routed prefix
pub const API_PREFIX: &str = "/api/v1/";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteTableError {
    #[error("route table is empty")]
    Empty,

    #[error("route prefix {0:?} must start with /api/v1/ and name a resource")]
    InvalidPrefix(String),

    #[error("route prefix {0:?} is declared more than once")]
    DuplicatePrefix(String),

    #[error("route prefix {prefix:?} points at unknown service {service:?}")]
    UnknownService { prefix: String, service: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteEntry {
    pub prefix: String,
    pub service: String,
    /// Kept unparsed; a bad URL surfaces per request as a configuration error
    pub backend_url: String,
    pub timeout: Duration,
}

impl RouteEntry {
    fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    /// Sorted by descending prefix length
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn from_config(config: &GatewayConfig) -> Result<Self, RouteTableError> {
        let mut entries = Vec::with_capacity(config.routes.len());
        let mut seen = HashSet::new();

        for route in &config.routes {
            let prefix = route.prefix.as_str();
            if !prefix.starts_with(API_PREFIX)
                || prefix.len() == API_PREFIX.len()
                || prefix.ends_with('/')
            {
                return Err(RouteTableError::InvalidPrefix(route.prefix.clone()));
            }
            if !seen.insert(prefix) {
                return Err(RouteTableError::DuplicatePrefix(route.prefix.clone()));
            }
            let endpoint =
                config
                    .services
                    .get(&route.service)
                    .ok_or_else(|| RouteTableError::UnknownService {
                        prefix: route.prefix.clone(),
                        service: route.service.clone(),
                    })?;

            entries.push(RouteEntry {
                prefix: route.prefix.clone(),
                service: route.service.clone(),
                backend_url: endpoint.url.clone(),
                timeout: endpoint.timeout,
            });
        }

        if entries.is_empty() {
            return Err(RouteTableError::Empty);
        }

        entries.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Ok(Self { entries })
    }

    /// Longest-prefix lookup
    pub fn resolve(&self, path: &str) -> Option<&RouteEntry> {
        self.entries.iter().find(|entry| entry.matches(path))
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
