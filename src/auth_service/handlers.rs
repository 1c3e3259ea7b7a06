// ============================================================================
// Auth HTTP Handlers
// ============================================================================
//
// POST /api/v1/auth/login                        {username, password}
// POST /api/v1/auth/register                     {username, password, email, first_name?, last_name?}
// POST /api/v1/auth/validate                     {token}
// GET  /api/v1/auth/user                         bearer
// POST /api/v1/auth/logout                       bearer
// PUT  /api/v1/auth/password                     bearer, {current_password, new_password}
// GET  /api/v1/auth/admins?page=&pageSize=       bearer
// POST /api/v1/auth/admins/:username/deactivate  bearer
//
// ============================================================================

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use fitcenter_db::{AdminProfile, Page, Pagination};
use fitcenter_error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::extractors::{AuthenticatedAdmin, BearerToken};
use super::operations::{ClientInfo, LoginRequest, LoginResponse, RegisterRequest};
use super::AuthServiceContext;
use crate::auth::Claims;
use crate::health;
use crate::middleware::{cors, request_id, request_logging};

#[derive(Deserialize)]
pub struct ValidateRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<Claims>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<AdminProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ValidateResponse {
    fn invalid() -> Self {
        Self {
            valid: false,
            claims: None,
            user: None,
            expires_at: None,
        }
    }
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

fn client_info(headers: &HeaderMap, peer: Option<SocketAddr>) -> ClientInfo {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty());

    ClientInfo {
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        ip_address: forwarded.or_else(|| peer.map(|addr| addr.ip().to_string())),
    }
}

/// POST /api/v1/auth/login
pub async fn login(
    State(ctx): State<Arc<AuthServiceContext>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<LoginResponse>> {
    let Json(req) = payload?;
    let client = client_info(&headers, peer.map(|ConnectInfo(addr)| addr));
    Ok(Json(ctx.login(req, client).await?))
}

/// POST /api/v1/auth/register
pub async fn register(
    State(ctx): State<Arc<AuthServiceContext>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(req) = payload?;
    let response = ctx.register(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/v1/auth/validate
///
/// A bad token is a normal answer (`valid: false`), not an error.
pub async fn validate(
    State(ctx): State<Arc<AuthServiceContext>>,
    payload: Result<Json<ValidateRequest>, JsonRejection>,
) -> AppResult<Json<ValidateResponse>> {
    let Json(req) = payload?;
    match ctx.validate(&req.token).await {
        Ok(validated) => Ok(Json(ValidateResponse {
            valid: true,
            user: Some(validated.admin.profile()),
            claims: Some(validated.claims),
            expires_at: Some(validated.expires_at),
        })),
        Err(AppError::Auth(_)) => Ok(Json(ValidateResponse::invalid())),
        Err(e) => Err(e),
    }
}

/// GET /api/v1/auth/user
pub async fn current_user(admin: AuthenticatedAdmin) -> Json<serde_json::Value> {
    Json(json!({ "user": admin.admin.profile() }))
}

/// POST /api/v1/auth/logout
pub async fn logout(
    State(ctx): State<Arc<AuthServiceContext>>,
    BearerToken(token): BearerToken,
) -> AppResult<Json<serde_json::Value>> {
    ctx.revoke(&token).await?;
    Ok(Json(json!({ "success": true })))
}

/// PUT /api/v1/auth/password
pub async fn change_password(
    State(ctx): State<Arc<AuthServiceContext>>,
    admin: AuthenticatedAdmin,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> AppResult<Json<serde_json::Value>> {
    let Json(req) = payload?;
    ctx.update_password(&admin.admin.username, req.current_password, req.new_password)
        .await?;
    Ok(Json(json!({ "success": true })))
}

/// GET /api/v1/auth/admins
pub async fn list_admins(
    State(ctx): State<Arc<AuthServiceContext>>,
    _admin: AuthenticatedAdmin,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<Page<AdminProfile>>> {
    let pagination = Pagination::from_query(
        params.get("page").map(String::as_str),
        params.get("pageSize").map(String::as_str),
    );
    Ok(Json(ctx.list_admins(pagination).await?))
}

/// POST /api/v1/auth/admins/:username/deactivate
pub async fn deactivate(
    State(ctx): State<Arc<AuthServiceContext>>,
    admin: AuthenticatedAdmin,
    Path(username): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    ctx.deactivate(&username).await?;
    tracing::info!(by = %admin.admin.username, username = %username, "Deactivation requested");
    Ok(Json(json!({ "success": true })))
}

async fn not_found() -> AppError {
    AppError::not_found("Not found")
}

/// Build the auth service application with its middleware chain
pub fn router(ctx: Arc<AuthServiceContext>) -> Router {
    Router::new()
        .route("/health", get(health::auth_health))
        .route("/health/ready", get(health::auth_health))
        .route("/health/live", get(health::liveness))
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/register", post(register))
        .route("/api/v1/auth/validate", post(validate))
        .route("/api/v1/auth/user", get(current_user))
        .route("/api/v1/auth/logout", post(logout))
        .route("/api/v1/auth/password", put(change_password))
        .route("/api/v1/auth/admins", get(list_admins))
        .route("/api/v1/auth/admins/:username/deactivate", post(deactivate))
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(request_id))
                .layer(middleware::from_fn(cors))
                .layer(middleware::from_fn(request_logging)),
        )
        .with_state(ctx)
}
