//! X OAuth flow
//!
//! Implements the OAuth 2.0 authorization code flow with PKCE against
//! the upstream authorization server.

use axum::{
    Router,
    extract::{Query, State},
    response::{IntoResponse, Redirect},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use serde::Deserialize;

use crate::AppState;
use crate::data::UserFetchState;
use crate::error::AppError;

use super::middleware::SESSION_COOKIE;
use super::session::{
    OauthHandshake, Session, create_handshake_token, create_session_token, verify_handshake_token,
    verify_session_token,
};

/// Cookie carrying the signed in-flight OAuth handshake
pub const HANDSHAKE_COOKIE: &str = "oauth_handshake";

/// Create authentication router
///
/// Routes:
/// - GET /auth/login - Redirect to the upstream authorize page
/// - GET /auth/callback - OAuth callback
/// - POST /auth/logout - Revoke tokens and clear local state
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", get(login))
        .route("/auth/callback", get(callback))
        .route("/auth/logout", post(logout))
}

fn build_cookie(
    state: &AppState,
    name: &'static str,
    value: String,
    max_age_seconds: i64,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.should_use_secure_cookies())
        .max_age(time::Duration::seconds(max_age_seconds))
        .build()
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, "")).path("/").build()
}

fn error_redirect(reason: &str) -> Redirect {
    Redirect::to(&format!("/?error={reason}"))
}

// =============================================================================
// Login
// =============================================================================

/// GET /auth/login
///
/// # Steps
/// 1. Generate CSRF state and PKCE verifier
/// 2. Store both in a signed, short-lived handshake cookie
/// 3. Redirect to the authorize page with the S256 challenge
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    use crate::upstream::{code_challenge, generate_code_verifier, generate_state};

    let csrf_state = generate_state();
    let code_verifier = generate_code_verifier();
    let challenge = code_challenge(&code_verifier);

    let handshake = OauthHandshake {
        state: csrf_state.clone(),
        code_verifier,
        expires_at: Utc::now() + Duration::seconds(state.config.oauth.handshake_max_age),
    };
    let token = create_handshake_token(&handshake, &state.config.oauth.session_secret)?;

    let authorize_url = state.auth.build_authorize_url(&csrf_state, &challenge)?;

    let jar = jar.add(build_cookie(
        &state,
        HANDSHAKE_COOKIE,
        token,
        state.config.oauth.handshake_max_age,
    ));
    Ok((jar, Redirect::to(&authorize_url)))
}

// =============================================================================
// Callback
// =============================================================================

/// Query parameters from the authorize redirect
#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// GET /auth/callback
///
/// # Steps
/// 1. Verify CSRF state against the handshake cookie
/// 2. Exchange code for the initial token pair
/// 3. Fetch the user's profile from upstream
/// 4. Persist a fresh fetch state (counters zeroed, no cursor)
/// 5. Create session and set cookie
///
/// Failures redirect back to the landing page with an error flag
/// instead of surfacing an API error; the browser is mid-redirect.
async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> impl IntoResponse {
    if let Some(error) = query.error {
        tracing::info!(%error, "Authorization denied upstream");
        return (jar.remove(removal_cookie(HANDSHAKE_COOKIE)), error_redirect("auth_denied"));
    }

    let (Some(code), Some(csrf_state)) = (query.code, query.state) else {
        return (jar.remove(removal_cookie(HANDSHAKE_COOKIE)), error_redirect("missing_params"));
    };

    let handshake = jar
        .get(HANDSHAKE_COOKIE)
        .map(|cookie| cookie.value().to_owned())
        .and_then(|token| {
            verify_handshake_token(&token, &state.config.oauth.session_secret).ok()
        });
    let jar = jar.remove(removal_cookie(HANDSHAKE_COOKIE));

    let Some(handshake) = handshake else {
        return (jar, error_redirect("invalid_state"));
    };
    if handshake.state != csrf_state {
        tracing::warn!("OAuth state mismatch");
        return (jar, error_redirect("invalid_state"));
    }

    match complete_login(&state, &code, &handshake.code_verifier).await {
        Ok(session_token) => {
            let jar = jar.add(build_cookie(
                &state,
                SESSION_COOKIE,
                session_token,
                state.config.oauth.session_max_age,
            ));
            (jar, Redirect::to(&state.config.oauth.post_login_path))
        }
        Err(error) => {
            tracing::error!(%error, "OAuth callback failed");
            (jar, error_redirect("auth_failed"))
        }
    }
}

/// Exchange the code, load the profile and mint session + fetch state.
async fn complete_login(
    state: &AppState,
    code: &str,
    code_verifier: &str,
) -> Result<String, AppError> {
    let tokens = state.auth.exchange_code(code, code_verifier).await?;
    let profile = state.bookmarks.fetch_profile(&tokens.access_token).await?;

    let now = Utc::now();
    let fetch_state = UserFetchState::new(
        tokens.access_token,
        tokens.refresh_token,
        now.timestamp_millis() + tokens.expires_in * 1000,
        profile.username.clone(),
        profile.name.clone(),
        profile.profile_image_url.clone(),
    );
    state
        .store
        .put_user_state(
            &profile.id,
            &fetch_state,
            std::time::Duration::from_secs(state.config.fetch.state_ttl_seconds),
        )
        .await?;

    let session = Session {
        user_id: profile.id,
        username: profile.username,
        profile_image_url: profile.profile_image_url,
        created_at: now,
        expires_at: now + Duration::seconds(state.config.oauth.session_max_age),
    };

    tracing::info!(username = %session.username, "User signed in");
    create_session_token(&session, &state.config.oauth.session_secret)
}

// =============================================================================
// Logout
// =============================================================================

/// POST /auth/logout
///
/// Revokes the upstream tokens (best effort), deletes the stored
/// fetch state and cached bookmarks, and clears the session cookie.
/// Tolerates a missing or invalid session.
async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let session = jar
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_owned())
        .and_then(|token| verify_session_token(&token, &state.config.oauth.session_secret).ok());

    if let Some(session) = session {
        match state.store.get_user_state(&session.user_id).await {
            Ok(Some(fetch_state)) => {
                state.auth.revoke(&fetch_state.access_token).await;
                state.auth.revoke(&fetch_state.refresh_token).await;
            }
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(%error, "Failed to load state during logout");
            }
        }

        if let Err(error) = state.store.delete_user_state(&session.user_id).await {
            tracing::warn!(%error, "Failed to delete user state during logout");
        }
        if let Err(error) = state.store.delete_cached_bookmarks(&session.user_id).await {
            tracing::warn!(%error, "Failed to delete cached bookmarks during logout");
        }

        tracing::info!(username = %session.username, "User signed out");
    }

    let jar = jar.remove(removal_cookie(SESSION_COOKIE));
    (jar, Redirect::to("/"))
}
