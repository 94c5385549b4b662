//! Bearer-token authentication for HTTP and WebSocket connections.
//!
//! The auth provider is an external collaborator; this module is its seam.
//! The default verifier compares a shared token constant-time via SHA-256
//! digests. When no token is configured the gateway runs in dev mode and
//! every connection is admitted as the configured dev user.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use tg_domain::config::AuthConfig;
use tg_domain::error::{Error, Result};

use crate::state::AppState;

/// Constant-time token comparison via SHA-256 digest.
/// Hashing normalizes lengths so `ct_eq` always compares 32 bytes.
fn token_eq(provided: &str, expected_hash: &[u8]) -> bool {
    let provided_hash = Sha256::digest(provided.as_bytes());
    provided_hash.as_slice().ct_eq(expected_hash).into()
}

pub struct AuthVerifier {
    /// SHA-256 of the shared token; `None` = dev mode.
    token_hash: Option<Vec<u8>>,
    user_id: String,
}

impl AuthVerifier {
    pub fn from_config(cfg: &AuthConfig) -> Self {
        let token_hash = std::env::var(&cfg.token_env)
            .ok()
            .filter(|t| !t.is_empty())
            .map(|t| Sha256::digest(t.as_bytes()).to_vec());
        if token_hash.is_none() {
            tracing::warn!(
                env = %cfg.token_env,
                "no API token configured — running in dev mode"
            );
        }
        Self {
            token_hash,
            user_id: cfg.dev_user_id.clone(),
        }
    }

    #[cfg(test)]
    pub fn with_token(token: &str, user_id: &str) -> Self {
        Self {
            token_hash: Some(Sha256::digest(token.as_bytes()).to_vec()),
            user_id: user_id.to_owned(),
        }
    }

    /// Validate a bearer token and return the authenticated user id.
    pub fn verify(&self, token: Option<&str>) -> Result<String> {
        match &self.token_hash {
            None => Ok(self.user_id.clone()),
            Some(expected) => {
                let token =
                    token.ok_or_else(|| Error::Auth("missing authentication token".into()))?;
                if token_eq(token, expected) {
                    Ok(self.user_id.clone())
                } else {
                    Err(Error::Auth("invalid or expired token".into()))
                }
            }
        }
    }
}

/// Pull the bearer token out of the `Authorization` header, falling back to
/// a `?token=` query parameter (used by WebSocket clients that cannot set
/// headers).
pub fn extract_token(parts: &Parts) -> Option<String> {
    if let Some(value) = parts.headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer ")) {
                return Some(token.to_owned());
            }
        }
    }
    parts.uri.query().and_then(|query| {
        query.split('&').find_map(|pair| {
            pair.strip_prefix("token=").map(str::to_owned)
        })
    })
}

/// Extractor that authenticates the request and yields the user id.
pub struct AuthedUser(pub String);

#[async_trait::async_trait]
impl FromRequestParts<AppState> for AuthedUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = extract_token(parts);
        state
            .auth
            .verify(token.as_deref())
            .map(AuthedUser)
            .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_mode_admits_everyone() {
        let verifier = AuthVerifier {
            token_hash: None,
            user_id: "dev-user".into(),
        };
        assert_eq!(verifier.verify(None).unwrap(), "dev-user");
        assert_eq!(verifier.verify(Some("anything")).unwrap(), "dev-user");
    }

    #[test]
    fn configured_token_is_enforced() {
        let verifier = AuthVerifier::with_token("s3cret", "alice");
        assert_eq!(verifier.verify(Some("s3cret")).unwrap(), "alice");
        assert!(verifier.verify(Some("wrong")).is_err());
        assert!(verifier.verify(None).is_err());
    }
}
