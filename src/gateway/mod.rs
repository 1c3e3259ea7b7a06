// ============================================================================
// API Gateway
// ============================================================================
//
// Single ingress for /api/v1/*. Each request is fanned out to exactly one
// downstream service chosen by longest matching path prefix.
//
// Owns:
// - request correlation ids
// - CORS preflight handling
// - request logging
// - transparent proxying (method, path, raw query, headers, streamed body)
// - the optional bearer guard
//
// ============================================================================

pub mod guard;
pub mod router;
pub mod routes;
pub mod service_client;

pub use guard::AuthGuard;
pub use router::{route_request, router, GatewayState};
pub use routes::{RouteEntry, RouteTable, RouteTableError};
pub use service_client::ServiceClient;
