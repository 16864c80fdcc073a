//! Authentication
//!
//! OAuth 2.0 PKCE login flow against the upstream platform plus
//! HMAC-signed cookie sessions.

pub mod middleware;
pub mod oauth;
pub mod session;

pub use middleware::{CurrentUser, SESSION_COOKIE};
pub use oauth::auth_router;
pub use session::Session;
