//! Token issuer abstraction

use async_trait::async_trait;

use crate::error::AuthError;
use crate::types::{AuthToken, Credential};

pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Turns a credential into a fresh auth token
///
/// The issuer is the only authority on whether a credential is valid.
/// Tokens are never cached: every call performs a full exchange with the
/// remote side, so a rotated or revoked key stops working immediately.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Exchange `credential` for a new token
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidCredential` when the key is malformed, unknown to
    ///   the remote side, or its signature does not verify
    /// - `AuthError::Network` when the exchange could not be completed
    async fn issue_token(&self, credential: &Credential) -> AuthResult<AuthToken>;

    /// Would issuance currently succeed for `credential`?
    ///
    /// The token obtained while checking is discarded.
    async fn has_valid_auth(&self, credential: Option<&Credential>) -> bool {
        match credential {
            Some(credential) => match self.issue_token(credential).await {
                Ok(_) => true,
                Err(e) => {
                    tracing::debug!("{} rejected stored credential: {}", self.name(), e);
                    false
                }
            },
            None => false,
        }
    }

    /// Issuer name for logging
    fn name(&self) -> &str;
}
