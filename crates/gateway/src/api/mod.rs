//! REST surface and route wiring.

pub mod board_summary;
pub mod folders;
pub mod sessions;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// The full route table.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/sessions", post(sessions::create_session))
        .route(
            "/api/v1/sessions/:session_id/messages",
            get(sessions::session_messages),
        )
        .route(
            "/api/v1/sessions/:session_id/whiteboard_state_at_turn",
            get(sessions::whiteboard_state_at_turn),
        )
        .route(
            "/api/v1/sessions/:session_id/board_summary",
            get(board_summary::get_board_summary),
        )
        .route("/api/v1/folders", post(folders::create_folder))
        .route("/api/v1/folders/:folder_id", get(folders::get_folder))
        .route("/ws/session/:session_id", get(ws::chat::chat_ws))
        .route(
            "/ws/v2/session/:session_id/whiteboard",
            get(ws::whiteboard::whiteboard_ws),
        )
        .with_state(state)
}
