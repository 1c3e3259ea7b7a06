// ============================================================================
// Auth Service
// ============================================================================
//
// Issues and validates administrator bearer tokens.
// Handles:
// - Login (credentials -> token + session row)
// - Validate (token -> claims, checked against signature, session and account)
// - Register (bounded by the active administrator cap)
// - Password change, deactivation, logout
// - Background purge of expired and revoked sessions
//
// ============================================================================

pub mod cleanup;
pub mod extractors;
pub mod handlers;
pub mod operations;

use std::sync::Arc;

use fitcenter_config::AuthConfig;
use fitcenter_db::AuthStorage;

use crate::auth::TokenManager;

pub use cleanup::SessionCleanupTask;
pub use extractors::{AuthenticatedAdmin, BearerToken};
pub use handlers::router;
pub use operations::{
    ClientInfo, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, ValidatedToken,
};

/// Auth Service context
pub struct AuthServiceContext {
    pub storage: Arc<dyn AuthStorage>,
    pub tokens: Arc<TokenManager>,
    pub config: Arc<AuthConfig>,
}

impl AuthServiceContext {
    pub fn new(config: Arc<AuthConfig>, storage: Arc<dyn AuthStorage>) -> Self {
        let tokens = Arc::new(TokenManager::new(&config.jwt_secret, config.jwt_expire_hours));
        Self {
            storage,
            tokens,
            config,
        }
    }
}
