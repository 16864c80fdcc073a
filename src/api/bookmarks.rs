//! Bookmark retrieval endpoints
//!
//! Synchronous retrieval for single-batch pulls, an SSE variant that
//! streams per-page progress for longer runs, and a JSON export of
//! the full cached set.

use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    http::header,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Json},
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::{StreamExt as _, wrappers::ReceiverStream};

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::service::{FetchEvent, FetchOutcome, FetchRequest, FetchTier};

#[derive(Debug, Deserialize)]
pub struct BookmarksQuery {
    #[serde(default)]
    tier: FetchTier,
    #[serde(default)]
    force_refresh: bool,
}

impl BookmarksQuery {
    fn into_request(self) -> FetchRequest {
        FetchRequest {
            tier: self.tier,
            force_refresh: self.force_refresh,
        }
    }
}

/// GET /api/bookmarks
///
/// Runs one retrieval for the authenticated user and returns the
/// newly fetched records (or the cached set when upstream is already
/// exhausted).
pub async fn get_bookmarks(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Query(params): Query<BookmarksQuery>,
) -> Result<Json<FetchOutcome>, AppError> {
    let outcome = state
        .orchestrator
        .run(&session.user_id, params.into_request())
        .await?;
    Ok(Json(outcome))
}

/// GET /api/bookmarks/stream
///
/// Same retrieval, emitted as Server-Sent Events: `progress` after
/// each page, then exactly one `complete` or `error`. A client that
/// disconnects stops the run at its next checkpoint; persisted
/// progress is kept.
pub async fn stream_bookmarks(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Query(params): Query<BookmarksQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state
        .orchestrator
        .stream(session.user_id, params.into_request());

    let stream = ReceiverStream::new(receiver).map(|event| Ok(sse_event(event)));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn sse_event(event: FetchEvent) -> Event {
    match event {
        FetchEvent::Progress(progress) => typed_event("progress", &progress),
        FetchEvent::Complete(outcome) => typed_event("complete", &outcome),
        FetchEvent::Error { message } => {
            typed_event("error", &serde_json::json!({ "message": message }))
        }
    }
}

fn typed_event<T: Serialize>(name: &str, data: &T) -> Event {
    match Event::default().event(name).json_data(data) {
        Ok(event) => event,
        Err(error) => {
            tracing::error!(%error, "Failed to encode SSE event");
            Event::default().event("error").data("{}")
        }
    }
}

/// GET /api/bookmarks/export
///
/// The full cached set as a downloadable JSON document.
pub async fn export_bookmarks(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let records = state.store.cached_bookmarks(&session.user_id).await?;

    tracing::info!(
        username = %session.username,
        count = records.len(),
        "Exporting cached bookmarks"
    );

    Ok((
        [(
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"bookmarks.json\"",
        )],
        Json(records),
    ))
}
