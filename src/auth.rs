use axum::http::{header::AUTHORIZATION, HeaderMap};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Token payload
///
/// Fields are declared in key order so the serialized payload is a
/// deterministic, key-ordered map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub exp: i64,
    pub iat: i64,
    pub role: String,
    pub user_id: i64,
    pub username: String,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// A freshly minted bearer token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub token_hash: String,
    pub claims: Claims,
    pub expires_at: DateTime<Utc>,
}

/// HS256 token issuer and verifier bound to one process-wide secret
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lifetime: Duration,
}

impl TokenManager {
    pub fn new(secret: &str, lifetime_hours: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            lifetime: Duration::hours(lifetime_hours),
        }
    }

    /// Mint a token valid from now for the configured lifetime
    pub fn issue(&self, user_id: i64, username: &str, role: &str) -> Result<IssuedToken, TokenError> {
        self.issue_at(user_id, username, role, Utc::now())
    }

    pub fn issue_at(
        &self,
        user_id: i64,
        username: &str,
        role: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let expires_at = issued_at + self.lifetime;
        let claims = Claims {
            exp: expires_at.timestamp(),
            iat: issued_at.timestamp(),
            role: role.to_string(),
            user_id,
            username: username.to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(IssuedToken {
            token_hash: token_hash(&token),
            token,
            claims,
            expires_at,
        })
    }

    /// Verify signature, algorithm and expiry.
    ///
    /// A token is expired once `exp <= now`.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            }
        })?;

        if data.claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(data.claims)
    }
}

/// SHA-256 of the full token string, hex-encoded. This is what sessions store.
pub fn token_hash(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Extract the token from `Authorization: Bearer <token>`.
///
/// Empty headers, other schemes and blank tokens yield `None`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret-key-for-tokens";

    fn manager() -> TokenManager {
        TokenManager::new(SECRET, 24)
    }

    #[test]
    fn test_issue_and_verify() {
        let tokens = manager();
        let issued = tokens.issue(7, "admin", "admin").unwrap();

        let claims = tokens.verify(&issued.token).unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.username, "admin");
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
        assert_eq!(claims, issued.claims);
    }

    #[test]
    fn test_token_has_three_segments() {
        let issued = manager().issue(1, "admin", "admin").unwrap();
        assert_eq!(issued.token.split('.').count(), 3);
    }

    #[test]
    fn test_payload_keys_are_ordered() {
        let issued = manager().issue(1, "admin", "admin").unwrap();
        let json = serde_json::to_string(&issued.claims).unwrap();
        let positions: Vec<usize> = ["\"exp\"", "\"iat\"", "\"role\"", "\"user_id\"", "\"username\""]
            .iter()
            .map(|key| json.find(key).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_expired_token_rejected() {
        let tokens = manager();
        let issued = tokens
            .issue_at(1, "admin", "admin", Utc::now() - Duration::hours(25))
            .unwrap();
        assert!(matches!(tokens.verify(&issued.token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_token_expired_one_second_ago_rejected() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            exp: now - 1,
            iat: now - 3600,
            role: "admin".into(),
            user_id: 1,
            username: "admin".into(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(matches!(manager().verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issued = TokenManager::new("another-secret", 24)
            .issue(1, "admin", "admin")
            .unwrap();
        assert!(matches!(manager().verify(&issued.token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            exp: now + 3600,
            iat: now,
            role: "admin".into(),
            user_id: 1,
            username: "admin".into(),
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(matches!(manager().verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let tokens = manager();
        let issued = tokens.issue(1, "admin", "admin").unwrap();
        let mut forged = issued.token.clone();
        forged.push('x');
        assert!(tokens.verify(&forged).is_err());
        assert!(tokens.verify("not-a-token").is_err());
    }

    #[test]
    fn test_token_hash_is_hex_sha256() {
        let hash = token_hash("abc");
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        let issued = manager().issue(1, "admin", "admin").unwrap();
        assert_eq!(issued.token_hash, token_hash(&issued.token));
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static(""));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));
    }
}
