//! Session management
//!
//! Uses HMAC-signed tokens stored in cookies.
//! No server-side session storage needed. The same token format
//! carries both the login session and the short-lived OAuth handshake
//! (CSRF state + PKCE verifier) between the login redirect and the
//! callback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::AppError;

/// User session data
///
/// Stored in a signed cookie. Contains minimal user info from the
/// upstream profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Upstream user id (subject of all fetches)
    pub user_id: String,
    /// Upstream handle
    pub username: String,
    /// Avatar URL from the upstream profile
    pub profile_image_url: Option<String>,
    /// When session was created
    pub created_at: DateTime<Utc>,
    /// When session expires
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Check if session is expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// In-flight OAuth handshake data
///
/// Set before redirecting to the upstream authorize page, consumed by
/// the callback handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OauthHandshake {
    /// CSRF state echoed back by the authorize redirect
    pub state: String,
    /// PKCE code verifier for the token exchange
    pub code_verifier: String,
    /// When the handshake expires
    pub expires_at: DateTime<Utc>,
}

impl OauthHandshake {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// Create a signed token from any serializable payload
///
/// Token format: base64(payload).base64(hmac_sha256(payload))
fn sign_payload<T: Serialize>(payload: &T, secret: &str) -> Result<String, AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    // 1. Serialize payload to JSON
    let payload = serde_json::to_string(payload).map_err(|e| AppError::Internal(e.into()))?;

    // 2. Base64 encode the payload
    let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes());

    // 3. Create HMAC-SHA256 signature
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC key: {e}")))?;
    mac.update(payload_b64.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

    // 4. Return "{payload}.{signature}"
    Ok(format!("{}.{}", payload_b64, signature_b64))
}

/// Verify a signed token and decode its payload
fn verify_payload<T: DeserializeOwned>(token: &str, secret: &str) -> Result<T, AppError> {
    use base64::{Engine as _, engine::general_purpose};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    // 1. Split token into payload and signature
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 2 {
        return Err(AppError::Unauthorized);
    }

    let payload_b64 = parts[0];
    let signature_b64 = parts[1];

    // 2. Verify HMAC signature
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC key: {e}")))?;
    mac.update(payload_b64.as_bytes());

    let expected_signature = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AppError::Unauthorized)?;

    mac.verify_slice(&expected_signature)
        .map_err(|_| AppError::Unauthorized)?;

    // 3. Decode and deserialize payload
    let payload_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AppError::Unauthorized)?;

    let payload_str = String::from_utf8(payload_bytes).map_err(|_| AppError::Unauthorized)?;

    serde_json::from_str(&payload_str).map_err(|_| AppError::Unauthorized)
}

/// Create a signed session token
pub fn create_session_token(session: &Session, secret: &str) -> Result<String, AppError> {
    sign_payload(session, secret)
}

/// Verify and decode a session token
///
/// # Errors
/// Returns `Unauthorized` if the signature is invalid, the token is
/// malformed, or the session has expired.
pub fn verify_session_token(token: &str, secret: &str) -> Result<Session, AppError> {
    let session: Session = verify_payload(token, secret)?;
    if session.is_expired() {
        return Err(AppError::Unauthorized);
    }
    Ok(session)
}

/// Create a signed OAuth handshake token
pub fn create_handshake_token(handshake: &OauthHandshake, secret: &str) -> Result<String, AppError> {
    sign_payload(handshake, secret)
}

/// Verify and decode an OAuth handshake token
pub fn verify_handshake_token(token: &str, secret: &str) -> Result<OauthHandshake, AppError> {
    let handshake: OauthHandshake = verify_payload(token, secret)?;
    if handshake.is_expired() {
        return Err(AppError::Unauthorized);
    }
    Ok(handshake)
}
