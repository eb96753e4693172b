//! Authentication seam: turns a raw credential into a [`SubjectId`].
//!
//! Two implementations ship with Trek:
//! - [`MockAuthenticator`] accepts everything and derives a stable subject
//!   from the token, for development and simulators.
//! - [`JwtAuthenticator`] verifies HS256 tokens and reads the subject from the
//!   `userId` (preferred) or `sub` claim.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::ids::SubjectId;

/// Reasons a credential is rejected.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential was supplied.
    #[error("missing credential")]
    MissingCredential,
    /// The token failed verification.
    #[error("invalid token: {0}")]
    InvalidToken(String),
    /// The token verified but names no subject.
    #[error("token has no subject claim")]
    MissingSubject,
}

/// Resolves a raw credential to the identity a session is keyed by.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Verify `credential` and return the subject it identifies.
    async fn authenticate(&self, credential: Option<&str>) -> Result<SubjectId, AuthError>;
}

/// Strip an optional `Bearer ` scheme prefix.
fn bare_token(credential: &str) -> &str {
    credential
        .strip_prefix("Bearer ")
        .or_else(|| credential.strip_prefix("bearer "))
        .unwrap_or(credential)
        .trim()
}

/// Development authenticator that never fails.
///
/// A supplied token always maps to the same `mock-user-<hash>` subject so
/// reconnects with the same token resume the same identity. A missing token
/// yields a fresh subject.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockAuthenticator;

#[async_trait]
impl Authenticator for MockAuthenticator {
    async fn authenticate(&self, credential: Option<&str>) -> Result<SubjectId, AuthError> {
        let token = credential.map(bare_token).filter(|t| !t.is_empty());
        debug!(token_provided = token.is_some(), "mock token verification");
        let Some(token) = token else {
            return Ok(SubjectId::new());
        };
        let digest = Sha256::digest(token.as_bytes());
        let short: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
        Ok(SubjectId::from_raw(format!("mock-user-{short}")))
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default, rename = "userId")]
    user_id: Option<String>,
    #[serde(default)]
    sub: Option<String>,
}

/// HS256 JWT verifier.
pub struct JwtAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    /// Verifier for tokens signed with `secret`.
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, credential: Option<&str>) -> Result<SubjectId, AuthError> {
        let token = credential
            .map(bare_token)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingCredential)?;
        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        data.claims
            .user_id
            .or(data.claims.sub)
            .filter(|s| !s.is_empty())
            .map(SubjectId::from_raw)
            .ok_or(AuthError::MissingSubject)
    }
}
