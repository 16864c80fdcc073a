//! Wire types for the upstream X API v2
//!
//! Mirrors the response shapes of the bookmarks, folders, token and
//! profile endpoints. Domain-level structures (profiles, media,
//! entities) are shared with `crate::data` since upstream side-loads
//! them in their final shape.

use serde::Deserialize;

use crate::data::{AuthorProfile, EngagementMetrics, MediaItem, PostEntities, PostReference};

/// Long-form text attachment on a post
#[derive(Debug, Clone, Deserialize)]
pub struct NoteTweet {
    pub text: String,
    #[serde(default)]
    pub entities: Option<PostEntities>,
}

/// Media keys attached to a post
#[derive(Debug, Clone, Deserialize)]
pub struct Attachments {
    #[serde(default)]
    pub media_keys: Option<Vec<String>>,
}

/// A primary bookmark item as returned by upstream
#[derive(Debug, Clone, Deserialize)]
pub struct RawPost {
    pub id: String,
    pub text: String,
    pub created_at: String,
    pub author_id: String,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub public_metrics: EngagementMetrics,
    #[serde(default)]
    pub entities: Option<PostEntities>,
    #[serde(default)]
    pub attachments: Option<Attachments>,
    #[serde(default)]
    pub referenced_tweets: Option<Vec<PostReference>>,
    #[serde(default)]
    pub note_tweet: Option<NoteTweet>,
}

/// A referenced post side-loaded under `includes.tweets`
#[derive(Debug, Clone, Deserialize)]
pub struct IncludedPost {
    pub id: String,
    pub text: String,
    pub created_at: String,
    pub author_id: String,
    #[serde(default)]
    pub public_metrics: EngagementMetrics,
    #[serde(default)]
    pub entities: Option<PostEntities>,
    #[serde(default)]
    pub attachments: Option<Attachments>,
}

/// Side-loaded expansions of a bookmarks page
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Includes {
    #[serde(default)]
    pub users: Option<Vec<AuthorProfile>>,
    #[serde(default)]
    pub media: Option<Vec<MediaItem>>,
    #[serde(default)]
    pub tweets: Option<Vec<IncludedPost>>,
}

/// Pagination metadata
#[derive(Debug, Clone, Deserialize)]
pub struct PageMeta {
    pub result_count: u64,
    #[serde(default)]
    pub next_token: Option<String>,
}

/// One page of the bookmarks endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct BookmarksPage {
    #[serde(default)]
    pub data: Option<Vec<RawPost>>,
    #[serde(default)]
    pub includes: Option<Includes>,
    pub meta: PageMeta,
}

/// Pagination metadata on folder endpoints (result_count absent)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FolderMeta {
    #[serde(default)]
    pub next_token: Option<String>,
}

/// One page of the bookmark folders endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct FoldersPage {
    #[serde(default)]
    pub data: Option<Vec<crate::data::BookmarkFolder>>,
    #[serde(default)]
    pub meta: Option<FolderMeta>,
}

/// Folder membership entry (ids only)
#[derive(Debug, Clone, Deserialize)]
pub struct FolderMemberRef {
    pub id: String,
}

/// One page of a folder membership lookup
#[derive(Debug, Clone, Deserialize)]
pub struct FolderMembersPage {
    #[serde(default)]
    pub data: Option<Vec<FolderMemberRef>>,
    #[serde(default)]
    pub meta: Option<FolderMeta>,
}

/// Response of the OAuth token endpoint (exchange and refresh)
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// The authenticated user's own profile
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub username: String,
    #[serde(default)]
    pub profile_image_url: Option<String>,
}

/// Envelope of the `/2/users/me` endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileEnvelope {
    pub data: UserProfile,
}
