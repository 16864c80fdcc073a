//! Retrieval status endpoint

use axum::{
    extract::State,
    response::Json,
};
use serde::Serialize;

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    total_fetched: u64,
    has_more: bool,
    paid_batches: u32,
}

/// GET /api/status
///
/// Summary of the user's retrieval progress without touching
/// upstream.
pub async fn get_status(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<StatusResponse>, AppError> {
    let fetch_state = state
        .store
        .get_user_state(&session.user_id)
        .await?
        .ok_or(AppError::SessionExpired)?;

    Ok(Json(StatusResponse {
        total_fetched: fetch_state.total_fetched,
        has_more: !fetch_state.is_exhausted(),
        paid_batches: fetch_state.paid_batches,
    }))
}
