//! GitHub App token issuer
//!
//! The author's credential is the private key of a GitHub App installed on
//! the site repository. Issuance proves possession of the key by signing a
//! short-lived RS256 JWT, then trades it for an installation access token:
//!
//! 1. sign `{iat, exp, iss = app_id}` with the PEM key
//! 2. resolve the installation (`GET /repos/{owner}/{repo}/installation`)
//!    unless it is configured
//! 3. `POST /app/installations/{id}/access_tokens` with the JWT as bearer

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use super::issuer::{AuthResult, TokenIssuer};
use crate::config::GitHubConfig;
use crate::error::AuthError;
use crate::github::{describe_failure, GitHubClient};
use crate::types::{AuthToken, Credential};

/// GitHub rejects JWTs valid for longer than ten minutes
const JWT_LIFETIME_SECS: u64 = 600;
/// Backdate `iat` to tolerate clock drift
const JWT_CLOCK_SKEW_SECS: u64 = 60;

pub struct GitHubAppIssuer {
    client: GitHubClient,
    app_id: String,
    installation_id: Option<u64>,
    owner: String,
    repo: String,
}

#[derive(Debug, Serialize)]
struct Claims {
    iat: u64,
    exp: u64,
    iss: String,
}

#[derive(Deserialize)]
struct Installation {
    id: u64,
}

#[derive(Deserialize)]
struct InstallationToken {
    token: String,
}

impl GitHubAppIssuer {
    pub fn new(client: GitHubClient, config: &GitHubConfig) -> Self {
        Self {
            client,
            app_id: config.app_id.clone(),
            installation_id: config.installation_id,
            owner: config.owner.clone(),
            repo: config.repo.clone(),
        }
    }

    /// Sign the app JWT with the credential
    ///
    /// A key that does not parse as an RSA PEM is an invalid credential; no
    /// request is made for it.
    pub(crate) fn generate_jwt(&self, credential: &Credential, now: u64) -> AuthResult<String> {
        let key = EncodingKey::from_rsa_pem(credential.expose().as_bytes()).map_err(|e| {
            AuthError::InvalidCredential(format!("not a usable RSA private key: {}", e))
        })?;

        let claims = Claims {
            iat: now.saturating_sub(JWT_CLOCK_SKEW_SECS),
            exp: now + JWT_LIFETIME_SECS,
            iss: self.app_id.clone(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| AuthError::InvalidCredential(format!("failed to sign app JWT: {}", e)))
    }

    async fn installation_id(&self, jwt: &str) -> AuthResult<u64> {
        if let Some(id) = self.installation_id {
            return Ok(id);
        }

        let url = self
            .client
            .url(["repos", self.owner.as_str(), self.repo.as_str(), "installation"])
            .ok_or_else(|| AuthError::Network("invalid GitHub API base URL".to_string()))?;

        let response = self
            .client
            .request(Method::GET, url, jwt)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(classify_failure(response).await);
        }

        let installation: Installation = response
            .json()
            .await
            .map_err(|e| AuthError::Network(format!("unexpected installation response: {}", e)))?;
        tracing::debug!(
            "Resolved installation {} for {}/{}",
            installation.id,
            self.owner,
            self.repo
        );
        Ok(installation.id)
    }
}

/// Map a rejected response onto the issuer's error taxonomy
async fn classify_failure(response: reqwest::Response) -> AuthError {
    let status = response.status();
    let rate_limited = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|remaining| remaining.trim() == "0");
    let message = describe_failure(response).await;
    classify(status, rate_limited, message)
}

/// 401/403/404 mean GitHub does not accept this key for this repository,
/// except a 403 sent because the rate limit is exhausted.
fn classify(status: StatusCode, rate_limited: bool, message: String) -> AuthError {
    match status {
        StatusCode::FORBIDDEN if rate_limited => {
            AuthError::Network(format!("rate limited: {}", message))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
            AuthError::InvalidCredential(message)
        }
        _ => AuthError::Network(message),
    }
}

fn unix_now() -> AuthResult<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| AuthError::Network(format!("system clock before unix epoch: {}", e)))
}

#[async_trait]
impl TokenIssuer for GitHubAppIssuer {
    async fn issue_token(&self, credential: &Credential) -> AuthResult<AuthToken> {
        let jwt = self.generate_jwt(credential, unix_now()?)?;
        let installation_id = self.installation_id(&jwt).await?;

        let url = self
            .client
            .url([
                "app",
                "installations",
                installation_id.to_string().as_str(),
                "access_tokens",
            ])
            .ok_or_else(|| AuthError::Network("invalid GitHub API base URL".to_string()))?;

        let response = self
            .client
            .request(Method::POST, url, &jwt)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(classify_failure(response).await);
        }

        let payload: InstallationToken = response
            .json()
            .await
            .map_err(|e| AuthError::Network(format!("unexpected token response: {}", e)))?;

        let token = AuthToken::new(payload.token);
        tracing::debug!("Issued installation token {}", token.fingerprint());
        Ok(token)
    }

    fn name(&self) -> &str {
        "github-app"
    }
}
