#![allow(dead_code)]

use std::collections::BTreeMap;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::to_bytes,
    extract::Request,
    http::HeaderValue,
    response::{IntoResponse, Response},
    Json, Router,
};
use fitcenter_server::auth_service::{self, AuthServiceContext};
use fitcenter_server::config::{AuthConfig, GatewayConfig, ServiceEndpoint};
use fitcenter_server::db::InMemoryAuthStorage;
use fitcenter_server::gateway::{self, GatewayState};
use fitcenter_server::shutdown::{serve, ConnectionLimits};
use serde_json::json;
use tokio::net::TcpListener;

pub const TEST_JWT_SECRET: &str = "integration-test-secret";

pub struct TestAuth {
    pub address: String,
    pub context: Arc<AuthServiceContext>,
}

async fn spawn_router(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(serve(
        listener,
        app,
        ConnectionLimits::default(),
        pending(),
        Duration::from_secs(1),
    ));
    address
}

/// Auth service on a random port backed by in-memory storage
pub async fn spawn_auth(max_active_admins: usize) -> TestAuth {
    let cap = max_active_admins.to_string();
    let config = AuthConfig::from_lookup(|key| match key {
        "JWT_SECRET" => Some(TEST_JWT_SECRET.to_string()),
        "BCRYPT_COST" => Some("4".to_string()),
        "AUTH_STORAGE" => Some("memory".to_string()),
        "MAX_ACTIVE_ADMINS" => Some(cap.clone()),
        _ => None,
    })
    .expect("Failed to build auth config");

    let context = Arc::new(AuthServiceContext::new(
        Arc::new(config),
        Arc::new(InMemoryAuthStorage::new()),
    ));
    let address = spawn_router(auth_service::router(context.clone())).await;
    TestAuth { address, context }
}

/// Gateway on a random port
pub async fn spawn_gateway(config: GatewayConfig) -> String {
    let state = GatewayState::from_config(&config).expect("Invalid gateway config");
    spawn_router(gateway::router(state)).await
}

/// Default gateway config with some services pointed at test backends
pub fn gateway_config(backends: &[(&str, &str)]) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    for (service, url) in backends {
        config.services.insert(
            service.to_string(),
            ServiceEndpoint {
                url: url.to_string(),
                timeout: Duration::from_secs(5),
            },
        );
    }
    config
}

async fn echo(name: &'static str, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let body = to_bytes(body, usize::MAX).await.unwrap_or_default();
    let headers: BTreeMap<String, String> = parts
        .headers
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();

    let mut response = Json(json!({
        "backend": name,
        "method": parts.method.as_str(),
        "path": parts.uri.path(),
        "query": parts.uri.query(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
    .into_response();
    response
        .headers_mut()
        .insert("x-backend", HeaderValue::from_static(name));
    response
}

/// Downstream stand-in that answers every request with a JSON description
/// of what it received
pub async fn spawn_echo_backend(name: &'static str) -> String {
    spawn_router(Router::new().fallback(move |req: Request| echo(name, req))).await
}

/// Downstream stand-in that answers only after `delay`
pub async fn spawn_slow_backend(delay: Duration) -> String {
    spawn_router(Router::new().fallback(move || async move {
        tokio::time::sleep(delay).await;
        "late"
    }))
    .await
}

/// A closed local port
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    address
}
