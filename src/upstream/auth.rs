//! OAuth 2.0 client for the upstream authorization server
//!
//! Implements the PKCE authorization-code flow pieces the service
//! consumes: authorize URL construction, code exchange, refresh-token
//! exchange and revocation. All token endpoints authenticate with the
//! confidential client's Basic credentials.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::types::TokenResponse;
use crate::config::{OAuthConfig, UpstreamConfig};
use crate::error::AppError;

/// Refresh-token exchange, abstracted for the token guard.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpstreamAuth: Send + Sync {
    /// Exchange a refresh token for a fresh token pair.
    ///
    /// # Errors
    /// `AuthRefresh` when the exchange is rejected (revoked or expired
    /// refresh token) -- callers must treat this as requiring a full
    /// re-authentication, not a retry.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AppError>;
}

/// OAuth client talking to the upstream token endpoints.
#[derive(Clone)]
pub struct AuthClient {
    http: Arc<reqwest::Client>,
    auth_base: String,
    authorize_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scopes: String,
}

impl AuthClient {
    pub fn new(http: Arc<reqwest::Client>, upstream: &UpstreamConfig, oauth: &OAuthConfig) -> Self {
        Self {
            http,
            auth_base: upstream.auth_base.trim_end_matches('/').to_string(),
            authorize_url: upstream.authorize_url.clone(),
            client_id: oauth.client_id.clone(),
            client_secret: oauth.client_secret.clone(),
            redirect_uri: oauth.redirect_uri.clone(),
            scopes: oauth.scopes.clone(),
        }
    }

    /// Build the browser-facing authorize URL for a login redirect.
    pub fn build_authorize_url(&self, state: &str, code_challenge: &str) -> Result<String, AppError> {
        let mut url = url::Url::parse(&self.authorize_url)
            .map_err(|e| AppError::Config(format!("invalid authorize URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &self.scopes)
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256");
        Ok(url.into())
    }

    /// Exchange an authorization code for the initial token pair.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(format!("{}/2/oauth2/token", self.auth_base))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("code_verifier", code_verifier),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!("Token exchange failed: {body}")));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| AppError::MalformedResponse(e.to_string()))
    }

    /// Best-effort revocation at sign-out; failures are logged, not surfaced.
    pub async fn revoke(&self, token: &str) {
        let result = self
            .http
            .post(format!("{}/2/oauth2/revoke", self.auth_base))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("token", token)])
            .send()
            .await;

        if let Err(error) = result {
            tracing::warn!(%error, "Token revocation failed");
        }
    }
}

#[async_trait]
impl UpstreamAuth for AuthClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(format!("{}/2/oauth2/token", self.auth_base))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::AuthRefresh(body));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| AppError::MalformedResponse(e.to_string()))
    }
}

// =============================================================================
// PKCE helpers
// =============================================================================

/// Random CSRF state token (32 bytes, hex)
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Random PKCE code verifier (32 bytes, base64url)
pub fn generate_code_verifier() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// S256 code challenge for a verifier
pub fn code_challenge(code_verifier: &str) -> String {
    let digest = Sha256::digest(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_is_hex_and_unique() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn verifier_uses_unreserved_characters() {
        let verifier = generate_code_verifier();
        assert!(verifier.len() >= 43);
        assert!(
            verifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn challenge_matches_known_s256_vector() {
        // SHA-256("test") in base64url without padding
        assert_eq!(
            code_challenge("test"),
            "n4bQgYhMfWWaL-qgxVrQFaO_TxsrC4Is0V1sFbDwCgg"
        );
    }
}
