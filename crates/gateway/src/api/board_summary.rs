//! The board-summary digest endpoint: the LLM-friendly aggregate view of
//! the session's whiteboard, computed from the live document (hydrating
//! from the last snapshot when no clients are connected).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use tg_whiteboard::board_digest;

use crate::api::api_error;
use crate::auth::AuthedUser;
use crate::state::AppState;

/// GET /api/v1/sessions/{id}/board_summary
pub async fn get_board_summary(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Path(session_id): Path<Uuid>,
) -> Response {
    match state.store.get_session(session_id, &user_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::FORBIDDEN, "Forbidden"),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }

    let doc = match state.docs.get_or_load(session_id).await {
        Ok(doc) => doc,
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "doc load failed");
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error");
        }
    };

    let objects = doc.objects().await;
    let ephemeral = doc.ephemeral_objects().await;
    Json(board_digest(&objects, &ephemeral)).into_response()
}
