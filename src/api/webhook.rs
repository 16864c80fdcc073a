//! Payment event intake
//!
//! The payment provider delivers completed-checkout events here. The
//! request is authenticated by an HMAC-SHA256 signature over the raw
//! body; credited batches are idempotent by payment id, so provider
//! retries and replays are harmless.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Json,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppError;

/// Header carrying `sha256=<hex hmac>` over the raw body
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

const COMPLETED_EVENT: &str = "checkout.completed";

/// Completed-purchase event body
#[derive(Debug, Deserialize)]
struct PaymentEvent {
    #[serde(rename = "type")]
    kind: String,
    user_id: String,
    payment_id: String,
}

fn verify_signature(secret: &str, body: &[u8], header: &str) -> Result<(), AppError> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let hex_signature = header
        .strip_prefix("sha256=")
        .ok_or(AppError::InvalidSignature)?;
    let signature = hex::decode(hex_signature).map_err(|_| AppError::InvalidSignature)?;

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC key: {e}")))?;
    mac.update(body);
    mac.verify_slice(&signature)
        .map_err(|_| AppError::InvalidSignature)
}

/// POST /api/webhook
///
/// Verifies the signature, then credits one paid batch for a
/// `checkout.completed` event. Unknown users and event types are
/// acknowledged without crediting so the provider does not retry
/// them forever.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Validation("Missing signature".to_string()))?;

    verify_signature(&state.config.billing.webhook_secret, &body, signature)?;

    let event: PaymentEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Malformed event: {e}")))?;

    if event.kind != COMPLETED_EVENT {
        tracing::debug!(kind = %event.kind, "Ignoring webhook event");
        return Ok(Json(serde_json::json!({ "received": true })));
    }

    let Some(mut fetch_state) = state.store.get_user_state(&event.user_id).await? else {
        tracing::error!(user_id = %event.user_id, "Webhook for unknown user");
        return Ok(Json(serde_json::json!({ "received": true })));
    };

    if state
        .orchestrator
        .quota()
        .credit_payment(&mut fetch_state, &event.payment_id)
    {
        state
            .store
            .put_user_state(
                &event.user_id,
                &fetch_state,
                std::time::Duration::from_secs(state.config.fetch.state_ttl_seconds),
            )
            .await?;
        tracing::info!(
            user_id = %event.user_id,
            payment_id = %event.payment_id,
            paid_batches = fetch_state.paid_batches,
            "Payment credited"
        );
    } else {
        tracing::debug!(
            payment_id = %event.payment_id,
            "Duplicate payment event skipped"
        );
    }

    Ok(Json(serde_json::json!({ "received": true })))
}
