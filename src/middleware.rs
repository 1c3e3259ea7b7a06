// ============================================================================
// Shared Middleware
// ============================================================================
//
// Applied in this order on both services:
// - request_id: read or mint X-Request-ID, store a RequestContext, echo the id
// - cors: answer preflight directly, decorate every other response
// - request_logging: one structured record per completed request
//
// ============================================================================

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub const CORS_ALLOW_ORIGIN: &str = "*";
pub const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
pub const CORS_ALLOW_HEADERS: &str = "Origin, Content-Type, Accept, Authorization";

/// Per-request data, available to handlers as `Extension<RequestContext>`
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub started_at: Instant,
    pub method: Method,
    pub path: String,
    pub remote_addr: Option<SocketAddr>,
}

/// Correlation middleware
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id_value = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .filter(|v| v.to_str().map(|s| !s.trim().is_empty()).unwrap_or(false))
        .cloned()
        .unwrap_or_else(new_request_id);

    let context = RequestContext {
        request_id: id_value.to_str().unwrap_or_default().to_string(),
        started_at: Instant::now(),
        method: req.method().clone(),
        path: req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| req.uri().path().to_string()),
        remote_addr: req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr),
    };

    req.headers_mut().insert(REQUEST_ID_HEADER, id_value.clone());
    req.extensions_mut().insert(context);

    let mut response = next.run(req).await;
    response.headers_mut().insert(REQUEST_ID_HEADER, id_value);
    response
}

fn new_request_id() -> HeaderValue {
    // a hyphenated UUID is always a valid header value
    HeaderValue::from_str(&Uuid::new_v4().to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
}

/// CORS middleware: permissive, answers every OPTIONS request itself
pub async fn cors(req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors_headers(&mut response);
        return response;
    }

    let mut response = next.run(req).await;
    apply_cors_headers(&mut response);
    response
}

fn apply_cors_headers(response: &mut Response) {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(CORS_ALLOW_ORIGIN),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
}

/// Request logging middleware
pub async fn request_logging(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let context = req.extensions().get::<RequestContext>().cloned();
    let method = req.method().clone();
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_default();
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let response = next.run(req).await;

    let (request_id, remote_addr) = match &context {
        Some(ctx) => (
            ctx.request_id.as_str(),
            ctx.remote_addr.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string()),
        ),
        None => ("-", "-".to_string()),
    };

    tracing::info!(
        request_id = %request_id,
        remote_addr = %remote_addr,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        user_agent = %user_agent,
        "Request completed"
    );

    response
}
