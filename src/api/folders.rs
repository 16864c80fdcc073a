//! Bookmark folder endpoints
//!
//! Auxiliary lookups against the upstream folder API: the list of
//! folders, or the post ids contained in one folder. Both follow
//! upstream pagination to the end, sequentially.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::BookmarkFolder;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct FoldersQuery {
    folder_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct FoldersResponse {
    folders: Vec<BookmarkFolder>,
}

#[derive(Debug, Serialize)]
struct FolderMembersResponse {
    post_ids: Vec<String>,
}

/// GET /api/folders
///
/// Without `folder_id`: all bookmark folders. With `folder_id`: the
/// post ids the folder contains.
pub async fn get_folders(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Query(params): Query<FoldersQuery>,
) -> Result<Response, AppError> {
    let fetch_state = state
        .store
        .get_user_state(&session.user_id)
        .await?
        .ok_or(AppError::SessionExpired)?;
    let fetch_state = state
        .token_guard
        .ensure_valid(&session.user_id, fetch_state)
        .await?;

    if let Some(folder_id) = params.folder_id {
        let post_ids = state
            .bookmarks
            .fetch_folder_members(&fetch_state.access_token, &session.user_id, &folder_id)
            .await?;
        return Ok(Json(FolderMembersResponse { post_ids }).into_response());
    }

    let folders = state
        .bookmarks
        .fetch_folders(&fetch_state.access_token, &session.user_id)
        .await?;
    Ok(Json(FoldersResponse { folders }).into_response())
}
