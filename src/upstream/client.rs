//! Upstream bookmarks API client
//!
//! One method per endpoint; each performs a single HTTP call and
//! normalizes failures into the application taxonomy. Throttling
//! (HTTP 429) is distinct from other upstream failures so callers can
//! apply backoff instead of giving up.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::types::{
    BookmarksPage, FolderMembersPage, FoldersPage, ProfileEnvelope, UserProfile,
};
use crate::config::{FetchConfig, UpstreamConfig};
use crate::data::BookmarkFolder;
use crate::error::AppError;
use crate::metrics::{UPSTREAM_REQUEST_DURATION_SECONDS, UPSTREAM_REQUESTS_TOTAL};

/// Expansion parameters for the bookmarks endpoint.
///
/// These mirror what the upstream API needs to side-load authors,
/// media and referenced posts in a single page response.
const TWEET_FIELDS: &str =
    "created_at,public_metrics,author_id,entities,attachments,lang,referenced_tweets,note_tweet";
const EXPANSIONS: &str =
    "author_id,attachments.media_keys,referenced_tweets.id,referenced_tweets.id.author_id";
const USER_FIELDS: &str = "username,name,verified,profile_image_url,description,public_metrics";
const MEDIA_FIELDS: &str =
    "media_key,type,url,preview_image_url,alt_text,width,height,duration_ms,variants";

/// Single-page bookmark retrieval, abstracted for the orchestrator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookmarkSource: Send + Sync {
    /// Fetch one page of up to `page_size` bookmarks starting at
    /// `cursor` (or from the beginning when `None`).
    ///
    /// # Errors
    /// `RateLimited` on upstream throttling, `Upstream` for any other
    /// non-success response (carrying the raw body), and
    /// `MalformedResponse` when the body does not decode.
    async fn fetch_page<'a>(
        &self,
        access_token: &'a str,
        subject_id: &'a str,
        page_size: u32,
        cursor: Option<&'a str>,
    ) -> Result<BookmarksPage, AppError>;
}

/// HTTP client for the upstream bookmarks endpoints.
#[derive(Clone)]
pub struct BookmarksClient {
    http: Arc<reqwest::Client>,
    api_base: String,
    folder_page_size: u32,
    folder_retry_delay: Duration,
}

impl BookmarksClient {
    pub fn new(http: Arc<reqwest::Client>, upstream: &UpstreamConfig, fetch: &FetchConfig) -> Self {
        Self {
            http,
            api_base: upstream.api_base.trim_end_matches('/').to_string(),
            folder_page_size: fetch.folder_page_size,
            folder_retry_delay: Duration::from_millis(fetch.folder_retry_delay_ms),
        }
    }

    /// Issue one GET and decode the response, recording metrics and
    /// splitting 429 from other failures.
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        url: String,
        access_token: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let started = Instant::now();
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        UPSTREAM_REQUESTS_TOTAL
            .with_label_values(&[endpoint, status.as_str()])
            .inc();
        UPSTREAM_REQUEST_DURATION_SECONDS
            .with_label_values(&[endpoint])
            .observe(started.elapsed().as_secs_f64());

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::RateLimited);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "upstream returned {status}: {body}"
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| AppError::MalformedResponse(e.to_string()))
    }

    /// Retry a throttled call once after a short pause.
    ///
    /// Auxiliary lookups are issued strictly sequentially, so a single
    /// delayed retry is enough to ride out a burst window; a second
    /// 429 propagates.
    async fn with_rate_limit_retry<T, F, Fut>(&self, call: F) -> Result<T, AppError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, AppError>>,
    {
        match call().await {
            Err(AppError::RateLimited) => {
                tracing::debug!(
                    delay_ms = self.folder_retry_delay.as_millis() as u64,
                    "Upstream throttled folder lookup; retrying once"
                );
                tokio::time::sleep(self.folder_retry_delay).await;
                call().await
            }
            other => other,
        }
    }

    /// List all bookmark folders for a user, following pagination to
    /// the end.
    pub async fn fetch_folders(
        &self,
        access_token: &str,
        subject_id: &str,
    ) -> Result<Vec<BookmarkFolder>, AppError> {
        let url = format!("{}/2/users/{}/bookmarks/folders", self.api_base, subject_id);
        let mut folders = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("max_results", self.folder_page_size.to_string())];
            if let Some(token) = &cursor {
                query.push(("pagination_token", token.clone()));
            }

            let page: FoldersPage = self
                .with_rate_limit_retry(|| {
                    self.get_json("folders", url.clone(), access_token, &query)
                })
                .await?;

            folders.extend(page.data.unwrap_or_default());
            cursor = page.meta.and_then(|m| m.next_token);
            if cursor.is_none() {
                break;
            }
        }

        Ok(folders)
    }

    /// List the post ids contained in one folder, following
    /// pagination to the end.
    pub async fn fetch_folder_members(
        &self,
        access_token: &str,
        subject_id: &str,
        folder_id: &str,
    ) -> Result<Vec<String>, AppError> {
        let url = format!(
            "{}/2/users/{}/bookmarks/folders/{}",
            self.api_base, subject_id, folder_id
        );
        let mut post_ids = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("max_results", self.folder_page_size.to_string())];
            if let Some(token) = &cursor {
                query.push(("pagination_token", token.clone()));
            }

            let page: FolderMembersPage = self
                .with_rate_limit_retry(|| {
                    self.get_json("folder_members", url.clone(), access_token, &query)
                })
                .await?;

            post_ids.extend(page.data.unwrap_or_default().into_iter().map(|m| m.id));
            cursor = page.meta.and_then(|m| m.next_token);
            if cursor.is_none() {
                break;
            }
        }

        Ok(post_ids)
    }

    /// Fetch the authenticated user's own profile.
    pub async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, AppError> {
        let url = format!("{}/2/users/me", self.api_base);
        let envelope: ProfileEnvelope = self
            .get_json(
                "profile",
                url,
                access_token,
                &[("user.fields", "profile_image_url".to_string())],
            )
            .await?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl BookmarkSource for BookmarksClient {
    async fn fetch_page<'a>(
        &self,
        access_token: &'a str,
        subject_id: &'a str,
        page_size: u32,
        cursor: Option<&'a str>,
    ) -> Result<BookmarksPage, AppError> {
        let url = format!("{}/2/users/{}/bookmarks", self.api_base, subject_id);

        let mut query = vec![
            ("max_results", page_size.to_string()),
            ("tweet.fields", TWEET_FIELDS.to_string()),
            ("expansions", EXPANSIONS.to_string()),
            ("user.fields", USER_FIELDS.to_string()),
            ("media.fields", MEDIA_FIELDS.to_string()),
        ];
        if let Some(token) = cursor {
            query.push(("pagination_token", token.to_string()));
        }

        self.get_json("bookmarks", url, access_token, &query).await
    }
}
