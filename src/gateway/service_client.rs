// ============================================================================
// Service Client
// ============================================================================
//
// One pooled HTTP client shared by every route. Forwards a request to the
// backend of its RouteEntry:
// - path and raw query unchanged
// - hop-by-hop headers and Host dropped, Host set to the backend authority
// - X-Request-ID always present
// - bodies streamed both ways
// Transport failures and timeouts become 502 without retry.
//
// ============================================================================

use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::Response,
};
use fitcenter_error::{AppError, AppResult};
use futures_util::Stream;
use reqwest::Url;

use crate::gateway::routes::RouteEntry;
use crate::middleware::REQUEST_ID_HEADER;

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    let name = name.as_str();
    HOP_BY_HOP.contains(&name) || name.starts_with("proxy-")
}

/// Copy `headers`, dropping hop-by-hop fields and anything the
/// Connection header nominates.
fn filter_headers(headers: &HeaderMap) -> HeaderMap {
    let nominated: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    let mut filtered = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || nominated.iter().any(|n| n == name.as_str()) {
            continue;
        }
        filtered.append(name.clone(), value.clone());
    }
    filtered
}

/// Gives a `Send` body stream the `Sync` bound the client body requires
struct SyncStream<S>(Mutex<S>);

impl<S: Stream + Unpin> Stream for SyncStream<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let inner = self
            .get_mut()
            .0
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        Pin::new(inner).poll_next(cx)
    }
}

/// Backend base parsed from a RouteEntry
#[derive(Debug)]
struct Backend {
    origin: String,
    authority: String,
}

impl Backend {
    fn parse(entry: &RouteEntry) -> AppResult<Self> {
        let invalid = |reason: String| {
            AppError::config(format!(
                "invalid backend URL {:?} for service {}: {}",
                entry.backend_url, entry.service, reason
            ))
        };

        let url = Url::parse(&entry.backend_url).map_err(|e| invalid(e.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(invalid(format!("unsupported scheme {}", url.scheme())));
        }
        let host = url
            .host_str()
            .ok_or_else(|| invalid("missing host".to_string()))?;

        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Ok(Self {
            origin: format!("{}://{}", url.scheme(), authority),
            authority,
        })
    }
}

pub struct ServiceClient {
    client: reqwest::Client,
}

impl ServiceClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    /// Forward `request` to the backend of `entry`
    pub async fn forward(
        &self,
        entry: &RouteEntry,
        request: Request,
        request_id: &str,
    ) -> AppResult<Response> {
        let backend = Backend::parse(entry)?;

        let (parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let target = format!("{}{}", backend.origin, path_and_query);

        let mut headers = filter_headers(&parts.headers);
        headers.remove(header::HOST);
        let host = HeaderValue::from_str(&backend.authority)
            .map_err(|e| AppError::config(format!("invalid backend authority: {}", e)))?;
        headers.insert(header::HOST, host);
        if let Ok(id) = HeaderValue::from_str(request_id) {
            headers.insert(REQUEST_ID_HEADER, id);
        }

        let has_body = parts.headers.contains_key(header::CONTENT_LENGTH)
            || parts.headers.contains_key(header::TRANSFER_ENCODING);

        let mut outbound = self
            .client
            .request(parts.method.clone(), &target)
            .headers(headers)
            .timeout(entry.timeout);
        if has_body {
            let stream = SyncStream(Mutex::new(body.into_data_stream()));
            outbound = outbound.body(reqwest::Body::wrap_stream(stream));
        }

        tracing::debug!(
            request_id = %request_id,
            service = %entry.service,
            method = %parts.method,
            target = %target,
            "Forwarding request"
        );

        let upstream = match outbound.send().await {
            Ok(response) => response,
            Err(e) => {
                let detail = if e.is_timeout() {
                    format!("{} did not respond within {:?}", entry.service, entry.timeout)
                } else {
                    transport_detail(&e)
                };
                tracing::warn!(
                    request_id = %request_id,
                    service = %entry.service,
                    target = %target,
                    error = %detail,
                    "Upstream request failed"
                );
                return Err(AppError::upstream(entry.service.clone(), detail));
            }
        };

        let status = upstream.status();
        let response_headers = filter_headers(upstream.headers());

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

/// The error chain flattened into one line
fn transport_detail(err: &reqwest::Error) -> String {
    let mut detail = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    detail
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str) -> RouteEntry {
        RouteEntry {
            prefix: "/api/v1/members".to_string(),
            service: "member".to_string(),
            backend_url: url.to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_backend_authority() {
        let backend = Backend::parse(&entry("http://member:8001")).unwrap();
        assert_eq!(backend.authority, "member:8001");
        assert_eq!(backend.origin, "http://member:8001");

        let backend = Backend::parse(&entry("https://payments.internal/")).unwrap();
        assert_eq!(backend.authority, "payments.internal");
    }

    #[test]
    fn test_bad_backend_url_is_config_error() {
        for url in ["not a url", "ftp://member:21", "http://"] {
            let err = Backend::parse(&entry(url)).unwrap_err();
            assert!(matches!(err, AppError::Config(_)), "{url}");
        }
    }

    #[test]
    fn test_hop_by_hop_headers_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-private"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(header::TE, HeaderValue::from_static("trailers"));
        headers.insert(header::TRAILER, HeaderValue::from_static("x-checksum"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(header::PROXY_AUTHORIZATION, HeaderValue::from_static("Basic x"));
        headers.insert("x-private", HeaderValue::from_static("1"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let filtered = filter_headers(&headers);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[header::AUTHORIZATION], "Bearer abc");
        assert_eq!(filtered[header::ACCEPT], "application/json");
    }
}
