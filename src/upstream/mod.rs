//! Upstream X API clients
//!
//! Thin wire-level clients: one for the OAuth token endpoints and one
//! for the bookmarks data endpoints. Business rules (budgets, quota,
//! pacing) live in `crate::service`.

mod auth;
mod client;
pub mod types;

pub use auth::{
    AuthClient, UpstreamAuth, code_challenge, generate_code_verifier, generate_state,
};
pub use client::{BookmarkSource, BookmarksClient};

#[cfg(test)]
pub use auth::MockUpstreamAuth;
#[cfg(test)]
pub use client::MockBookmarkSource;
