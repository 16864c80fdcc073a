//! Data models
//!
//! Rust structs for the per-user fetch state and the denormalized
//! bookmark records the service caches and serves. Field names follow
//! the upstream X API v2 wire vocabulary so cached payloads round-trip
//! unchanged through serde.

use serde::{Deserialize, Serialize};

// =============================================================================
// Engagement and profile metrics
// =============================================================================

/// Engagement counters attached to a post
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementMetrics {
    #[serde(default)]
    pub retweet_count: u64,
    #[serde(default)]
    pub reply_count: u64,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub quote_count: u64,
}

/// Follower/following counters on an author profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorMetrics {
    #[serde(default)]
    pub followers_count: u64,
    #[serde(default)]
    pub following_count: u64,
    #[serde(default)]
    pub tweet_count: u64,
}

/// Denormalized author profile, side-loaded by the upstream API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorProfile {
    pub id: String,
    pub username: String,
    pub name: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "public_metrics", skip_serializing_if = "Option::is_none")]
    pub metrics: Option<AuthorMetrics>,
}

// =============================================================================
// Text entities
// =============================================================================

/// URL span inside post text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlEntity {
    pub start: u32,
    pub end: u32,
    pub url: String,
    pub expanded_url: String,
    pub display_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// @mention span inside post text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentionEntity {
    pub start: u32,
    pub end: u32,
    pub username: String,
    pub id: String,
}

/// Hashtag or cashtag span inside post text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagEntity {
    pub start: u32,
    pub end: u32,
    pub tag: String,
}

/// All entity spans of a post
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostEntities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<UrlEntity>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mentions: Option<Vec<MentionEntity>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashtags: Option<Vec<TagEntity>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cashtags: Option<Vec<TagEntity>>,
}

// =============================================================================
// Media
// =============================================================================

/// Media kind reported by upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    AnimatedGif,
}

/// One transcoded rendition of a video or GIF
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaVariant {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<u64>,
    pub content_type: String,
    pub url: String,
}

/// Side-loaded media attachment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub media_key: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variants: Option<Vec<MediaVariant>>,
}

// =============================================================================
// References between posts
// =============================================================================

/// How a post relates to another post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Retweeted,
    Quoted,
    RepliedTo,
}

/// Reference to another post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostReference {
    #[serde(rename = "type")]
    pub kind: ReferenceKind,
    pub id: String,
}

// =============================================================================
// Bookmark records
// =============================================================================

/// A quoted post resolved into the bookmark that quotes it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotedPost {
    pub id: String,
    pub text: String,
    pub author_id: String,
    pub created_at: String,
    #[serde(rename = "public_metrics", default)]
    pub metrics: EngagementMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<PostEntities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<Vec<MediaItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorProfile>,
}

/// A fully denormalized bookmark
///
/// `id` is stable and is the sole de-duplication key when merging
/// caches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmarkRecord {
    pub id: String,
    pub text: String,
    pub created_at: String,
    pub author_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(rename = "public_metrics", default)]
    pub metrics: EngagementMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<PostEntities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<Vec<MediaItem>>,
    #[serde(
        rename = "referenced_tweets",
        skip_serializing_if = "Option::is_none"
    )]
    pub referenced: Option<Vec<PostReference>>,
    /// Long-form text, present when the post exceeds the classic length
    #[serde(rename = "note_tweet", skip_serializing_if = "Option::is_none")]
    pub note_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorProfile>,
    #[serde(rename = "quoted_tweet", skip_serializing_if = "Option::is_none")]
    pub quoted: Option<QuotedPost>,
}

/// An upstream-defined bookmark folder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmarkFolder {
    pub id: String,
    pub name: String,
}

// =============================================================================
// Per-user fetch state
// =============================================================================

/// Per-user credential and pagination state
///
/// Created on first successful authentication, mutated after every
/// successful page checkpoint and every credited payment, deleted on
/// sign-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFetchState {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry as epoch milliseconds
    pub token_expires_at: i64,
    pub username: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
    /// Opaque continuation marker; `None` after items have been
    /// fetched means upstream is exhausted. Never reset except by a
    /// full re-authentication.
    pub pagination_cursor: Option<String>,
    /// Monotonic count of items ever fetched for this user
    pub total_fetched: u64,
    /// Paid retrieval batches purchased
    pub paid_batches: u32,
    /// Payment references already credited, for idempotent intake
    pub processed_payment_ids: Vec<String>,
}

impl UserFetchState {
    /// Fresh state minted at the end of an OAuth callback.
    pub fn new(
        access_token: String,
        refresh_token: String,
        token_expires_at: i64,
        username: String,
        name: String,
        profile_image_url: Option<String>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            token_expires_at,
            username,
            name,
            profile_image_url,
            pagination_cursor: None,
            total_fetched: 0,
            paid_batches: 0,
            processed_payment_ids: Vec::new(),
        }
    }

    /// True once upstream has reported there are no further pages.
    ///
    /// A fresh state (nothing fetched yet) has no cursor either, so
    /// exhaustion requires at least one fetched item.
    pub fn is_exhausted(&self) -> bool {
        self.total_fetched > 0 && self.pagination_cursor.is_none()
    }
}
