//! Access-token lifecycle
//!
//! Guards every upstream call behind a validity check: a token
//! expiring within the safety margin is refreshed and the rotated
//! credentials are persisted before anyone gets to use them.

use std::sync::Arc;
use std::time::Duration;

use crate::config::FetchConfig;
use crate::data::{Store, UserFetchState};
use crate::error::AppError;
use crate::upstream::UpstreamAuth;

/// Ensures a usable access token before upstream data calls.
#[derive(Clone)]
pub struct TokenGuard {
    auth: Arc<dyn UpstreamAuth>,
    store: Arc<Store>,
    /// Refresh when the token expires within this margin
    refresh_margin_ms: i64,
    state_ttl: Duration,
}

impl TokenGuard {
    pub fn new(auth: Arc<dyn UpstreamAuth>, store: Arc<Store>, fetch: &FetchConfig) -> Self {
        Self {
            auth,
            store,
            refresh_margin_ms: fetch.token_refresh_margin_seconds * 1000,
            state_ttl: Duration::from_secs(fetch.state_ttl_seconds),
        }
    }

    /// Return state with a valid access token, refreshing if needed.
    ///
    /// A refresh rotates both tokens; the updated state is persisted
    /// before it is returned so a crash mid-run cannot orphan the new
    /// refresh token.
    ///
    /// # Errors
    /// Propagates `AuthRefresh` when the exchange is rejected; the
    /// caller must send the user through a full re-authentication.
    pub async fn ensure_valid(
        &self,
        user_id: &str,
        state: UserFetchState,
    ) -> Result<UserFetchState, AppError> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        if state.token_expires_at > now_ms + self.refresh_margin_ms {
            return Ok(state);
        }

        tracing::debug!(user_id = %user_id, "Access token near expiry; refreshing");
        let tokens = self.auth.refresh(&state.refresh_token).await?;

        let mut updated = state;
        updated.access_token = tokens.access_token;
        updated.refresh_token = tokens.refresh_token;
        updated.token_expires_at = now_ms + tokens.expires_in * 1000;

        self.store
            .put_user_state(user_id, &updated, self.state_ttl)
            .await?;

        Ok(updated)
    }
}
