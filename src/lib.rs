//! Bookstash - A self-hosted exporter for X bookmarks
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - OAuth login/callback/logout                              │
//! │  - Bookmark retrieval (sync + SSE progress)                 │
//! │  - Payment webhook                                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Fetch orchestration (budgets, pacing, checkpoints)       │
//! │  - Token lifecycle, page merging, quota accounting          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌────────────────────────────┬────────────────────────────────┐
//! │        Data Layer          │       Upstream Clients         │
//! │  - SQLite KV store (sqlx)  │  - OAuth token endpoints       │
//! │  - Bookmark cache          │  - Bookmarks/folders API       │
//! └────────────────────────────┴────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers for retrieval, folders, status, webhook
//! - `auth`: OAuth flow and cookie sessions
//! - `service`: Retrieval engine business logic
//! - `upstream`: Wire clients for the X API
//! - `data`: SQLite store and domain models
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod service;
pub mod upstream;

use std::sync::Arc;

use service::{FetchOrchestrator, TokenGuard};
use upstream::{AuthClient, BookmarksClient};

/// Application state shared across all handlers
///
/// This struct is cloned for each request and contains shared
/// resources like the store, HTTP client and the retrieval engine.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// SQLite-backed key-value store
    pub store: Arc<data::Store>,

    /// Shared HTTP client for all upstream calls
    pub http_client: Arc<reqwest::Client>,

    /// OAuth token endpoints client
    pub auth: Arc<AuthClient>,

    /// Bookmarks/folders data API client
    pub bookmarks: Arc<BookmarksClient>,

    /// Access-token lifecycle guard
    pub token_guard: Arc<TokenGuard>,

    /// The retrieval engine
    pub orchestrator: Arc<FetchOrchestrator>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Open the SQLite store and run migrations
    /// 2. Build the shared HTTP client
    /// 3. Wire the upstream clients and the retrieval engine
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Open the store
        let store = Arc::new(data::Store::connect(&config.database.path).await?);
        tracing::info!("Store connected");

        // 2. Shared HTTP client
        let http_client = Arc::new(
            reqwest::Client::builder()
                .user_agent("Bookstash/0.1.0")
                .timeout(std::time::Duration::from_secs(
                    config.upstream.request_timeout_seconds,
                ))
                .build()
                .map_err(|e| error::AppError::Internal(e.into()))?,
        );

        // 3. Upstream clients and the engine
        let auth = Arc::new(AuthClient::new(
            http_client.clone(),
            &config.upstream,
            &config.oauth,
        ));
        let bookmarks = Arc::new(BookmarksClient::new(
            http_client.clone(),
            &config.upstream,
            &config.fetch,
        ));
        let token_guard = Arc::new(TokenGuard::new(
            auth.clone(),
            store.clone(),
            &config.fetch,
        ));
        let orchestrator = Arc::new(FetchOrchestrator::new(
            store.clone(),
            bookmarks.clone(),
            token_guard.clone(),
            config.fetch.clone(),
        ));

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            store,
            http_client,
            auth,
            bookmarks,
            token_guard,
            orchestrator,
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{compression::CompressionLayer, trace::TraceLayer};

    let cors_layer = build_cors_layer(&state.config.server);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(auth::auth_router())
        .nest("/api", api::api_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
        .merge(api::metrics_router())
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
