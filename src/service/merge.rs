//! Page merging
//!
//! Combines a raw bookmarks page with its side-loaded expansions into
//! self-contained records. Pure and deterministic: no I/O, and missing
//! optional data becomes an omitted field, never an error.

use std::collections::HashMap;

use crate::data::{AuthorProfile, BookmarkRecord, MediaItem, QuotedPost, ReferenceKind};
use crate::upstream::types::{Attachments, BookmarksPage, IncludedPost};

/// Denormalize one page of bookmarks.
///
/// Authors are resolved by id, media by key (keys with no side-loaded
/// entry are dropped silently), and the first `quoted` reference (if
/// any) becomes a nested record with its own author and media
/// resolved the same way. Long-form text is preferred over the
/// truncated default when both are present.
pub fn merge_page(page: &BookmarksPage) -> Vec<BookmarkRecord> {
    let includes = page.includes.as_ref();

    let users: HashMap<&str, &AuthorProfile> = includes
        .and_then(|i| i.users.as_deref())
        .unwrap_or_default()
        .iter()
        .map(|user| (user.id.as_str(), user))
        .collect();

    let media: HashMap<&str, &MediaItem> = includes
        .and_then(|i| i.media.as_deref())
        .unwrap_or_default()
        .iter()
        .map(|item| (item.media_key.as_str(), item))
        .collect();

    let posts: HashMap<&str, &IncludedPost> = includes
        .and_then(|i| i.tweets.as_deref())
        .unwrap_or_default()
        .iter()
        .map(|post| (post.id.as_str(), post))
        .collect();

    page.data
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|post| {
            // Long posts carry the full text (and entity spans) in a
            // side field; the default `text` is truncated.
            let (text, entities) = match &post.note_tweet {
                Some(note) => (
                    note.text.clone(),
                    note.entities.clone().or_else(|| post.entities.clone()),
                ),
                None => (post.text.clone(), post.entities.clone()),
            };

            let quoted = post
                .referenced_tweets
                .as_deref()
                .unwrap_or_default()
                .iter()
                .find(|reference| reference.kind == ReferenceKind::Quoted)
                .and_then(|reference| posts.get(reference.id.as_str()))
                .map(|quoted| resolve_quoted(quoted, &users, &media));

            BookmarkRecord {
                id: post.id.clone(),
                text,
                created_at: post.created_at.clone(),
                author_id: post.author_id.clone(),
                lang: post.lang.clone(),
                metrics: post.public_metrics.clone(),
                entities,
                media: resolve_media(post.attachments.as_ref(), &media),
                referenced: post.referenced_tweets.clone(),
                note_text: post.note_tweet.as_ref().map(|note| note.text.clone()),
                author: users.get(post.author_id.as_str()).map(|user| (*user).clone()),
                quoted,
            }
        })
        .collect()
}

fn resolve_quoted(
    quoted: &IncludedPost,
    users: &HashMap<&str, &AuthorProfile>,
    media: &HashMap<&str, &MediaItem>,
) -> QuotedPost {
    QuotedPost {
        id: quoted.id.clone(),
        text: quoted.text.clone(),
        author_id: quoted.author_id.clone(),
        created_at: quoted.created_at.clone(),
        metrics: quoted.public_metrics.clone(),
        entities: quoted.entities.clone(),
        media: resolve_media(quoted.attachments.as_ref(), media),
        author: users.get(quoted.author_id.as_str()).map(|user| (*user).clone()),
    }
}

fn resolve_media(
    attachments: Option<&Attachments>,
    media: &HashMap<&str, &MediaItem>,
) -> Option<Vec<MediaItem>> {
    let keys = attachments?.media_keys.as_deref()?;
    let items: Vec<MediaItem> = keys
        .iter()
        .filter_map(|key| media.get(key.as_str()).map(|item| (*item).clone()))
        .collect();
    if items.is_empty() { None } else { Some(items) }
}
