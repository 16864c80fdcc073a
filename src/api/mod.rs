//! HTTP API handlers
//!
//! JSON endpoints consumed by the dashboard UI plus the payment
//! webhook and the Prometheus scrape target.

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

pub mod bookmarks;
pub mod folders;
pub mod metrics;
pub mod status;
pub mod webhook;

pub use metrics::metrics_router;

/// Create the `/api` router
///
/// Authentication is enforced per-handler via the `CurrentUser`
/// extractor; the webhook authenticates with its own signature.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/bookmarks", get(bookmarks::get_bookmarks))
        .route("/bookmarks/stream", get(bookmarks::stream_bookmarks))
        .route("/bookmarks/export", get(bookmarks::export_bookmarks))
        .route("/folders", get(folders::get_folders))
        .route("/status", get(status::get_status))
        .route("/webhook", post(webhook::payment_webhook))
}
