// ============================================================================
// Gateway Router
// ============================================================================
//
// Every request that is not a health probe lands in `route_request`, which
// resolves the route table and forwards to exactly one backend. Paths with
// no matching prefix get 404.
//
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware,
    response::Response,
    routing::get,
    Router,
};
use fitcenter_config::GatewayConfig;
use fitcenter_error::{AppError, AppResult};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::gateway::guard::AuthGuard;
use crate::gateway::routes::{RouteEntry, RouteTable};
use crate::gateway::service_client::ServiceClient;
use crate::health;
use crate::middleware::{cors, request_id, request_logging, RequestContext};

/// Gateway router state
pub struct GatewayState {
    pub routes: RouteTable,
    pub client: ServiceClient,
    pub guard: Option<AuthGuard>,
    /// Upper bound on guard check plus forwarding (`server.writeTimeout`)
    pub request_timeout: Duration,
}

impl GatewayState {
    pub fn from_config(config: &GatewayConfig) -> anyhow::Result<Arc<Self>> {
        let routes = RouteTable::from_config(config)?;
        let client = ServiceClient::new()?;
        let guard = AuthGuard::from_config(config)?;

        for entry in routes.entries() {
            tracing::info!(
                prefix = %entry.prefix,
                service = %entry.service,
                backend = %entry.backend_url,
                timeout_ms = entry.timeout.as_millis() as u64,
                "Route registered"
            );
        }
        if guard.is_some() {
            tracing::info!("Gateway bearer guard enabled");
        }

        Ok(Arc::new(Self {
            routes,
            client,
            guard,
            request_timeout: config.server.write_timeout,
        }))
    }
}

/// Route request to the backend owning its prefix
pub async fn route_request(
    State(state): State<Arc<GatewayState>>,
    request: Request,
) -> AppResult<Response> {
    let path = request.uri().path().to_string();
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let entry = state
        .routes
        .resolve(&path)
        .ok_or_else(|| AppError::not_found(format!("No route for {}", path)))?;

    let limit = state.request_timeout;
    match tokio::time::timeout(limit, proxy(&state, entry, request, &path, &request_id)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                request_id = %request_id,
                service = %entry.service,
                timeout_ms = limit.as_millis() as u64,
                "Request exceeded gateway write timeout"
            );
            Err(AppError::upstream(
                entry.service.clone(),
                format!("{} did not respond within {:?}", entry.service, limit),
            ))
        }
    }
}

async fn proxy(
    state: &GatewayState,
    entry: &RouteEntry,
    request: Request,
    path: &str,
    request_id: &str,
) -> AppResult<Response> {
    let (parts, body) = request.into_parts();
    if let Some(guard) = &state.guard {
        guard
            .check(state.client.http(), path, &parts.headers, request_id)
            .await?;
    }

    state
        .client
        .forward(entry, Request::from_parts(parts, body), request_id)
        .await
}

/// Build the gateway application with its middleware chain
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(health::gateway_health))
        .route("/health/ready", get(health::gateway_health))
        .route("/health/live", get(health::liveness))
        .fallback(route_request)
        // first layer is outermost: correlation -> CORS -> logging -> routing
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(request_id))
                .layer(middleware::from_fn(cors))
                .layer(middleware::from_fn(request_logging)),
        )
        .with_state(state)
}
