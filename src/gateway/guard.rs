// ============================================================================
// Gateway Bearer Guard
// ============================================================================
//
// Optional pre-forward check: resolves the bearer token against the auth
// service's validate endpoint. Public paths (login, register, validate and
// configured extras) pass untouched.
//
// ============================================================================

use std::time::Duration;

use axum::http::HeaderMap;
use fitcenter_config::{GatewayConfig, PUBLIC_AUTH_PATHS};
use fitcenter_error::{AppError, AppResult};
use serde::Deserialize;
use serde_json::json;

use crate::auth::bearer_token;
use crate::middleware::REQUEST_ID_HEADER;

const VALIDATE_PATH: &str = "/api/v1/auth/validate";

#[derive(Debug, Deserialize)]
struct ValidateReply {
    valid: bool,
}

pub struct AuthGuard {
    validate_url: String,
    timeout: Duration,
    public_paths: Vec<String>,
}

impl AuthGuard {
    /// Returns `None` when the guard is disabled
    pub fn from_config(config: &GatewayConfig) -> AppResult<Option<Self>> {
        if !config.auth_guard.enabled {
            return Ok(None);
        }

        let auth = config
            .services
            .get("auth")
            .ok_or_else(|| AppError::config("auth guard enabled but no auth service configured"))?;

        let public_paths = PUBLIC_AUTH_PATHS
            .iter()
            .map(|p| p.to_string())
            .chain(config.auth_guard.public_paths.iter().cloned())
            .collect();

        Ok(Some(Self {
            validate_url: format!("{}{}", auth.url.trim_end_matches('/'), VALIDATE_PATH),
            timeout: auth.timeout,
            public_paths,
        }))
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|public| {
            path.strip_prefix(public.as_str())
                .map(|rest| rest.is_empty() || rest.starts_with('/'))
                .unwrap_or(false)
        })
    }

    /// Admit the request or fail with 401 (bad token) or 502 (auth unreachable)
    pub async fn check(
        &self,
        client: &reqwest::Client,
        path: &str,
        headers: &HeaderMap,
        request_id: &str,
    ) -> AppResult<()> {
        if self.is_public(path) {
            return Ok(());
        }

        let token = bearer_token(headers)
            .ok_or_else(|| AppError::auth("Missing or invalid Authorization header"))?;

        let response = client
            .post(&self.validate_url)
            .header(REQUEST_ID_HEADER, request_id)
            .timeout(self.timeout)
            .json(&json!({ "token": token }))
            .send()
            .await
            .map_err(|e| AppError::upstream("auth", e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::upstream(
                "auth",
                format!("validate returned {}", response.status()),
            ));
        }

        let reply: ValidateReply = response
            .json()
            .await
            .map_err(|e| AppError::upstream("auth", e.to_string()))?;

        if !reply.valid {
            tracing::debug!(request_id = %request_id, path = %path, "Gateway rejected bearer token");
            return Err(AppError::auth("Invalid or expired token"));
        }
        Ok(())
    }
}
