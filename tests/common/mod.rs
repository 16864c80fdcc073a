//! Common test utilities for E2E tests

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Form, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{Duration, Utc};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use bookstash::auth::session::{Session, create_session_token};
use bookstash::data::UserFetchState;
use bookstash::{AppState, config};

pub const TEST_USER_ID: &str = "user-1";
pub const SESSION_SECRET: &str = "test-secret-key-32-bytes-long!!!";
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

// =============================================================================
// Fake upstream API
// =============================================================================

/// Scripted behavior of the fake X API
#[derive(Debug)]
pub struct UpstreamBehavior {
    /// Total bookmarks the fake account holds
    pub total_items: u64,
    /// Return 429 on this bookmarks call number (1-based)
    pub rate_limit_on_call: Option<u32>,
    /// Bookmarks calls made so far
    pub calls_made: u32,
}

impl Default for UpstreamBehavior {
    fn default() -> Self {
        Self {
            total_items: 60,
            rate_limit_on_call: None,
            calls_made: 0,
        }
    }
}

#[derive(Clone)]
pub struct FakeUpstream {
    pub addr: String,
    pub behavior: Arc<Mutex<UpstreamBehavior>>,
}

impl FakeUpstream {
    pub async fn spawn() -> Self {
        let behavior = Arc::new(Mutex::new(UpstreamBehavior::default()));

        let app = Router::new()
            .route("/2/oauth2/token", post(token_endpoint))
            .route("/2/oauth2/revoke", post(revoke_endpoint))
            .route("/2/users/me", get(me_endpoint))
            .route("/2/users/:id/bookmarks", get(bookmarks_endpoint))
            .route("/2/users/:id/bookmarks/folders", get(folders_endpoint))
            .route(
                "/2/users/:id/bookmarks/folders/:folder_id",
                get(folder_members_endpoint),
            )
            .with_state(behavior.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, behavior }
    }

    pub async fn set_total_items(&self, total: u64) {
        self.behavior.lock().await.total_items = total;
    }

    pub async fn rate_limit_on_call(&self, call: u32) {
        self.behavior.lock().await.rate_limit_on_call = Some(call);
    }

    pub async fn bookmarks_calls(&self) -> u32 {
        self.behavior.lock().await.calls_made
    }
}

async fn token_endpoint(Form(form): Form<HashMap<String, String>>) -> impl IntoResponse {
    match form.get("grant_type").map(String::as_str) {
        Some("authorization_code") => Json(serde_json::json!({
            "access_token": "access-1",
            "refresh_token": "refresh-1",
            "expires_in": 7200,
            "token_type": "bearer",
            "scope": "bookmark.read tweet.read users.read offline.access",
        }))
        .into_response(),
        Some("refresh_token") => {
            if form.get("refresh_token").map(String::as_str) == Some("revoked-refresh") {
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "error": "invalid_grant" })),
                )
                    .into_response()
            } else {
                Json(serde_json::json!({
                    "access_token": "access-2",
                    "refresh_token": "refresh-2",
                    "expires_in": 7200,
                }))
                .into_response()
            }
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "unsupported_grant_type" })),
        )
            .into_response(),
    }
}

async fn revoke_endpoint() -> impl IntoResponse {
    Json(serde_json::json!({ "revoked": true }))
}

async fn me_endpoint() -> impl IntoResponse {
    Json(serde_json::json!({
        "data": {
            "id": TEST_USER_ID,
            "name": "Test User",
            "username": "testuser",
            "profile_image_url": "https://img.example/testuser.png",
        }
    }))
}

fn fake_post(i: u64) -> serde_json::Value {
    serde_json::json!({
        "id": format!("post-{i}"),
        "text": format!("bookmarked post {i}"),
        "created_at": "2024-05-01T12:00:00.000Z",
        "author_id": "author-1",
        "public_metrics": {
            "retweet_count": 1,
            "reply_count": 2,
            "like_count": 3,
            "quote_count": 0,
        },
    })
}

async fn bookmarks_endpoint(
    State(behavior): State<Arc<Mutex<UpstreamBehavior>>>,
    Path(_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let mut behavior = behavior.lock().await;
    behavior.calls_made += 1;

    if behavior.rate_limit_on_call == Some(behavior.calls_made) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({ "title": "Too Many Requests" })),
        )
            .into_response();
    }

    let max_results: u64 = params
        .get("max_results")
        .and_then(|v| v.parse().ok())
        .unwrap_or(25);
    let offset: u64 = params
        .get("pagination_token")
        .and_then(|token| token.strip_prefix("off-"))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let count = max_results.min(behavior.total_items.saturating_sub(offset));
    let posts: Vec<serde_json::Value> = (offset..offset + count).map(fake_post).collect();

    let mut meta = serde_json::json!({ "result_count": count });
    if offset + count < behavior.total_items {
        meta["next_token"] = serde_json::json!(format!("off-{}", offset + count));
    }

    Json(serde_json::json!({
        "data": posts,
        "includes": {
            "users": [{
                "id": "author-1",
                "username": "author",
                "name": "An Author",
                "verified": true,
            }],
        },
        "meta": meta,
    }))
    .into_response()
}

async fn folders_endpoint() -> impl IntoResponse {
    Json(serde_json::json!({
        "data": [
            { "id": "folder-1", "name": "Reading" },
            { "id": "folder-2", "name": "Rust" },
        ],
        "meta": {},
    }))
}

async fn folder_members_endpoint(
    Path((_id, folder_id)): Path<(String, String)>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "data": [
            { "id": format!("{folder_id}-post-1") },
            { "id": format!("{folder_id}-post-2") },
        ],
        "meta": {},
    }))
}

// =============================================================================
// Test server
// =============================================================================

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub upstream: FakeUpstream,
    pub client: reqwest::Client,
    pub _temp_dir: TempDir,
}

impl TestServer {
    /// Create a new test server instance backed by a fake upstream
    pub async fn new() -> Self {
        let upstream = FakeUpstream::spawn().await;

        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Create test configuration
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            database: config::DatabaseConfig {
                path: db_path.clone(),
            },
            upstream: config::UpstreamConfig {
                api_base: upstream.addr.clone(),
                auth_base: upstream.addr.clone(),
                authorize_url: format!("{}/i/oauth2/authorize", upstream.addr),
                request_timeout_seconds: 10,
            },
            oauth: config::OAuthConfig {
                client_id: "test-client-id".to_string(),
                client_secret: "test-client-secret".to_string(),
                redirect_uri: "http://localhost/auth/callback".to_string(),
                scopes: "bookmark.read tweet.read users.read offline.access".to_string(),
                session_secret: SESSION_SECRET.to_string(),
                session_max_age: 604_800,
                handshake_max_age: 300,
                post_login_path: "/dashboard".to_string(),
            },
            billing: config::BillingConfig {
                webhook_secret: WEBHOOK_SECRET.to_string(),
            },
            fetch: config::FetchConfig {
                free_page_size: 25,
                free_allowance: 25,
                paid_batch_size: 100,
                paid_max_page_calls: 5,
                page_size_cap: 25,
                page_delay_ms: 0,
                folder_page_size: 100,
                folder_retry_delay_ms: 0,
                token_refresh_margin_seconds: 60,
                state_ttl_seconds: 2_592_000,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        // Build router
        let app = bookstash::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        Self {
            addr: addr_str,
            state,
            upstream,
            client,
            _temp_dir: temp_dir,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Create a signed session token for the test user
    pub fn session_token(&self) -> String {
        self.session_token_for(TEST_USER_ID)
    }

    pub fn session_token_for(&self, user_id: &str) -> String {
        let now = Utc::now();
        let session = Session {
            user_id: user_id.to_string(),
            username: "testuser".to_string(),
            profile_image_url: None,
            created_at: now,
            expires_at: now + Duration::days(7),
        };
        create_session_token(&session, SESSION_SECRET).unwrap()
    }

    /// Seed a signed-in user with a valid, non-expiring token pair
    pub async fn seed_user(&self) -> UserFetchState {
        let state = UserFetchState::new(
            "access-1".to_string(),
            "refresh-1".to_string(),
            Utc::now().timestamp_millis() + 7_200_000,
            "testuser".to_string(),
            "Test User".to_string(),
            None,
        );
        self.put_user_state(&state).await;
        state
    }

    pub async fn put_user_state(&self, state: &UserFetchState) {
        self.state
            .store
            .put_user_state(
                TEST_USER_ID,
                state,
                std::time::Duration::from_secs(3600),
            )
            .await
            .unwrap();
    }

    pub async fn user_state(&self) -> Option<UserFetchState> {
        self.state.store.get_user_state(TEST_USER_ID).await.unwrap()
    }

    /// Sign a webhook body the way the payment provider would
    pub fn webhook_signature(&self, body: &[u8]) -> String {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }
}
