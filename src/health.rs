use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::json;

use crate::auth_service::AuthServiceContext;

pub const GATEWAY_SERVICE_NAME: &str = "api-gateway";
pub const AUTH_SERVICE_NAME: &str = "auth-service";

/// Gateway health: the process is up and serving
pub async fn gateway_health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": GATEWAY_SERVICE_NAME,
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}

/// Liveness probe, no dependency checks
pub async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "alive" })))
}

/// Auth health: 503 when the store does not answer
pub async fn auth_health(State(ctx): State<Arc<AuthServiceContext>>) -> impl IntoResponse {
    match ctx.storage.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "service": AUTH_SERVICE_NAME,
                "database": "healthy",
                "timestamp": Utc::now().to_rfc3339(),
            })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Auth store health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": AUTH_SERVICE_NAME,
                    "database": "unhealthy",
                    "error": "database unreachable",
                    "timestamp": Utc::now().to_rfc3339(),
                })),
            )
        }
    }
}
