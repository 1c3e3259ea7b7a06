// ============================================================================
// API Gateway Service
// ============================================================================
//
// Single entry point for all client requests under /api/v1/*.
// It handles:
// - Request correlation (X-Request-ID)
// - CORS preflight
// - Request logging
// - Prefix routing to the member, staff, class, facility, payment and auth
//   services
// - Optional bearer-token check against the auth service
//
// Architecture:
// - Stateless (can scale horizontally)
// - Route table loaded once from config/gateway.yaml + environment
//
// ============================================================================

use anyhow::{Context, Result};
use fitcenter_server::config::{GatewayConfig, SHUTDOWN_GRACE_PERIOD};
use fitcenter_server::gateway::{router, GatewayState};
use fitcenter_server::shutdown::{serve, shutdown_signal, ConnectionLimits};
use fitcenter_server::telemetry::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = GatewayConfig::load().context("Failed to load gateway configuration")?;

    init_tracing(&config.logging).context("Failed to initialize tracing")?;

    info!("=== API Gateway Starting ===");
    info!("Port: {}", config.server.port);
    info!(
        read_timeout_ms = config.server.read_timeout.as_millis() as u64,
        write_timeout_ms = config.server.write_timeout.as_millis() as u64,
        idle_timeout_ms = config.server.idle_timeout.as_millis() as u64,
        "Server timeouts"
    );

    let state = GatewayState::from_config(&config).context("Invalid gateway route table")?;
    let app = router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("API Gateway listening on {}", addr);

    let limits = ConnectionLimits {
        read_timeout: Some(config.server.read_timeout),
        idle_timeout: Some(config.server.idle_timeout),
    };
    serve(listener, app, limits, shutdown_signal(), SHUTDOWN_GRACE_PERIOD)
        .await
        .context("Server error")?;

    info!("API Gateway stopped");
    Ok(())
}
