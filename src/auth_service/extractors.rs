// ============================================================================
// Axum Extractors
// ============================================================================
//
// - BearerToken: raw token from `Authorization: Bearer <token>`
// - AuthenticatedAdmin: token that passes full validation, with its account
//
// Both reject with 401 and a `WWW-Authenticate: Bearer` challenge.
//
// ============================================================================

use std::sync::Arc;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use fitcenter_db::Administrator;
use fitcenter_error::AppError;

use super::AuthServiceContext;
use crate::auth::{bearer_token, Claims};

#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        bearer_token(&parts.headers)
            .map(|token| BearerToken(token.to_string()))
            .ok_or_else(|| AppError::auth("Missing or invalid Authorization header"))
    }
}

/// Extractor for a validated administrator
///
/// Usage:
/// ```rust,ignore
/// async fn handler(admin: AuthenticatedAdmin) -> AppResult<...> {
///     let username = admin.admin.username;
///     // ...
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedAdmin {
    pub admin: Administrator,
    pub claims: Claims,
    pub token: String,
}

#[async_trait]
impl FromRequestParts<Arc<AuthServiceContext>> for AuthenticatedAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AuthServiceContext>,
    ) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let validated = state.validate(&token).await?;
        Ok(Self {
            admin: validated.admin,
            claims: validated.claims,
            token,
        })
    }
}
