//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::{net::IpAddr, path::PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub upstream: UpstreamConfig,
    pub oauth: OAuthConfig,
    pub billing: BillingConfig,
    pub fetch: FetchConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "bookmarks.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://bookmarks.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Upstream X API endpoints
///
/// Overridable so the test suite can point the clients at a local
/// fake server.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Data API base (e.g., "https://api.x.com")
    pub api_base: String,
    /// OAuth token/revoke endpoint base (e.g., "https://api.x.com")
    pub auth_base: String,
    /// Browser-facing authorize page (e.g., "https://x.com/i/oauth2/authorize")
    pub authorize_url: String,
    /// Per-request timeout in seconds
    pub request_timeout_seconds: u64,
}

/// OAuth client + session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    /// OAuth 2.0 client id registered with X
    pub client_id: String,
    /// OAuth 2.0 client secret
    pub client_secret: String,
    /// Registered redirect URI (must match the X app settings)
    pub redirect_uri: String,
    /// Requested scopes
    #[serde(default = "default_oauth_scopes")]
    pub scopes: String,
    /// Session signing secret (32+ bytes)
    pub session_secret: String,
    /// Session max age in seconds (default: 604800 = 7 days)
    pub session_max_age: i64,
    /// OAuth handshake cookie max age in seconds (default: 300)
    pub handshake_max_age: i64,
    /// Where to send the browser after a successful callback
    #[serde(default = "default_post_login_path")]
    pub post_login_path: String,
}

fn default_oauth_scopes() -> String {
    "bookmark.read tweet.read users.read offline.access".to_string()
}

fn default_post_login_path() -> String {
    "/dashboard".to_string()
}

/// Payment event intake configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Shared secret for webhook signature verification
    pub webhook_secret: String,
}

/// Retrieval sizing and pacing
///
/// All thresholds are deliberately configuration rather than code
/// constants; the defaults mirror the values the upstream API
/// tolerates well.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Items granted per run on the free tier (default: 25)
    pub free_page_size: u32,
    /// Items granted free before paid batches are consumed (default: 25)
    pub free_allowance: u64,
    /// Items per purchased batch (default: 100)
    pub paid_batch_size: u64,
    /// Max upstream page calls per paid run (default: 5)
    pub paid_max_page_calls: u32,
    /// Per-page cap for multi-call loops (default: 25)
    ///
    /// Larger page sizes make upstream pagination truncate early, so
    /// multi-call runs never exceed this regardless of the requested
    /// total.
    pub page_size_cap: u32,
    /// Pause between page calls in milliseconds (default: 1000)
    pub page_delay_ms: u64,
    /// Page size for folder/membership lookups (default: 100)
    pub folder_page_size: u32,
    /// Pause before retrying a throttled folder lookup (default: 2000)
    pub folder_retry_delay_ms: u64,
    /// Safety margin before token expiry that triggers a refresh
    /// (default: 60)
    pub token_refresh_margin_seconds: i64,
    /// TTL for persisted user state and cached bookmarks
    /// (default: 2592000 = 30 days)
    pub state_ttl_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (BOOKSTASH_*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.protocol", "http")?
            .set_default("upstream.api_base", "https://api.x.com")?
            .set_default("upstream.auth_base", "https://api.x.com")?
            .set_default("upstream.authorize_url", "https://x.com/i/oauth2/authorize")?
            .set_default("upstream.request_timeout_seconds", 30)?
            .set_default("oauth.session_max_age", 604800)?
            .set_default("oauth.handshake_max_age", 300)?
            .set_default("fetch.free_page_size", 25)?
            .set_default("fetch.free_allowance", 25)?
            .set_default("fetch.paid_batch_size", 100)?
            .set_default("fetch.paid_max_page_calls", 5)?
            .set_default("fetch.page_size_cap", 25)?
            .set_default("fetch.page_delay_ms", 1000)?
            .set_default("fetch.folder_page_size", 100)?
            .set_default("fetch.folder_retry_delay_ms", 2000)?
            .set_default("fetch.token_refresh_margin_seconds", 60)?
            .set_default("fetch.state_ttl_seconds", 2_592_000)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (BOOKSTASH_*)
            .add_source(
                Environment::with_prefix("BOOKSTASH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https")
            || !is_local_server_domain(&self.server.domain)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_SESSION_SECRET_BYTES: usize = 32;

        if self.oauth.session_secret.as_bytes().len() < MIN_SESSION_SECRET_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "oauth.session_secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.oauth.session_max_age <= 0 {
            return Err(crate::error::AppError::Config(
                "oauth.session_max_age must be greater than 0".to_string(),
            ));
        }

        if self.fetch.page_size_cap == 0 || self.fetch.page_size_cap > 100 {
            return Err(crate::error::AppError::Config(
                "fetch.page_size_cap must be between 1 and 100".to_string(),
            ));
        }

        if self.fetch.paid_max_page_calls == 0 {
            return Err(crate::error::AppError::Config(
                "fetch.paid_max_page_calls must be greater than 0".to_string(),
            ));
        }

        if self.fetch.paid_batch_size == 0 {
            return Err(crate::error::AppError::Config(
                "fetch.paid_batch_size must be greater than 0".to_string(),
            ));
        }

        if !self.should_use_secure_cookies() {
            let host = normalized_server_host(&self.server.domain);
            tracing::warn!(
                host = %host,
                protocol = %self.server.protocol,
                "Using insecure session cookies for local development"
            );
        } else if !self.server.protocol.eq_ignore_ascii_case("https") {
            return Err(crate::error::AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}
