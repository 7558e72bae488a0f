use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use log::{error, info};
use std::sync::Arc;

use crate::shared::error::{error_response, MeetError};
use crate::shared::state::AppState;

pub mod media;
pub mod recording;
pub mod room;
pub mod storage;
pub mod token;

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rooms/:session_id", post(create_room).get(get_room))
        .route("/rooms/:session_id/end", post(end_room))
        .route("/rooms/:session_id/token", get(issue_token))
        .route("/rooms/:session_id/recordings", get(list_recordings))
}

async fn create_room(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.rooms.create_room(&session_id).await {
        Ok(room) => {
            info!("Created room for session {session_id}");
            (StatusCode::OK, Json(serde_json::json!(room)))
        }
        Err(e) => {
            error!("Failed to create room for session {session_id}: {e}");
            error_response(&e)
        }
    }
}

async fn end_room(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.rooms.end_room(&session_id).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": outcome })),
        ),
        Err(e) => {
            error!("Failed to end room for session {session_id}: {e}");
            error_response(&e)
        }
    }
}

async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.rooms.get_room(&session_id).await {
        Some(room) => (StatusCode::OK, Json(serde_json::json!(room))),
        None => error_response(&MeetError::NotFound(format!(
            "no room for session {session_id}"
        ))),
    }
}

async fn issue_token(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    // The gateway authenticates callers and forwards the identity.
    let Some(user_id) = headers.get("x-user-id").and_then(|v| v.to_str().ok()) else {
        return error_response(&MeetError::Auth("missing caller identity".to_string()));
    };

    match state.tokens.issue_token(&session_id, user_id).await {
        Ok(token) => (StatusCode::OK, Json(serde_json::json!(token))),
        Err(e) => {
            error!("Token refused for {user_id} on session {session_id}: {e}");
            error_response(&e)
        }
    }
}

async fn list_recordings(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let Some(room) = state.rooms.get_room(&session_id).await else {
        return error_response(&MeetError::NotFound(format!(
            "no room for session {session_id}"
        )));
    };
    let jobs = state.recordings.jobs_for_room(room.id).await;
    (StatusCode::OK, Json(serde_json::json!(jobs)))
}
