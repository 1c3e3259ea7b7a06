// ============================================================================
// Auth Service
// ============================================================================
//
// Authentication service for administrator accounts.
// Handles:
// - Administrator registration (bounded by MAX_ACTIVE_ADMINS)
// - Login (bearer token + persisted session)
// - Token validation for the gateway and downstream services
// - Logout, password change, deactivation
// - Periodic purge of expired and revoked sessions
//
// ============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use fitcenter_server::auth_service::{router, AuthServiceContext, SessionCleanupTask};
use fitcenter_server::config::{AuthConfig, StorageBackend, SHUTDOWN_GRACE_PERIOD};
use fitcenter_server::db::{
    create_pool, AuthStorage, DbPool, InMemoryAuthStorage, PostgresAuthStorage,
};
use fitcenter_server::shutdown::{serve, shutdown_signal, ConnectionLimits};
use fitcenter_server::telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Arc::new(AuthConfig::from_env().context("Failed to load auth configuration")?);

    init_tracing(&config.logging).context("Failed to initialize tracing")?;

    info!("=== Auth Service Starting ===");
    info!("Port: {}", config.port);

    let (storage, pool): (Arc<dyn AuthStorage>, Option<DbPool>) = match config.storage {
        StorageBackend::Postgres => {
            info!("Connecting to database...");
            let pool = create_pool(&config.db)
                .await
                .context("Failed to connect to database")?;
            info!("Connected to database");

            if config.db.run_migrations {
                sqlx::migrate!("./migrations")
                    .run(&pool)
                    .await
                    .context("Failed to run database migrations")?;
                info!("Database migrations applied");
            }

            let storage: Arc<dyn AuthStorage> = Arc::new(PostgresAuthStorage::new(pool.clone()));
            (storage, Some(pool))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage: administrators and sessions are lost on exit");
            let storage: Arc<dyn AuthStorage> = Arc::new(InMemoryAuthStorage::new());
            (storage, None)
        }
    };

    let context = Arc::new(AuthServiceContext::new(config.clone(), storage.clone()));
    context
        .initialize_defaults()
        .await
        .context("Failed to inspect administrator accounts")?;

    let cleanup = SessionCleanupTask::new(storage, config.session_cleanup_interval).spawn();

    let app = router(context);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Auth Service listening on {}", addr);

    let served = serve(
        listener,
        app,
        ConnectionLimits::default(),
        shutdown_signal(),
        SHUTDOWN_GRACE_PERIOD,
    )
    .await;

    cleanup.abort();
    if let Some(pool) = pool {
        pool.close().await;
        info!("Database pool closed");
    }

    served.context("Server error")?;
    info!("Auth Service stopped");
    Ok(())
}
