//! Session REST endpoints: creation, chat-history pagination, and
//! whiteboard state reconstruction at a turn.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use tg_domain::context::TutorContext;

use crate::api::api_error;
use crate::auth::AuthedUser;
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub folder_id: Option<Uuid>,
}

/// POST /api/v1/sessions — create a session, optionally linked to a folder.
///
/// When a folder is given its knowledge base and vector-store id seed the
/// fresh tutor context.
pub async fn create_session(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    body: Option<Json<CreateSessionRequest>>,
) -> Response {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let mut folder_id = req.folder_id;
    let mut ctx = TutorContext::new(Uuid::nil(), &user_id, None);

    if let Some(fid) = folder_id {
        match state.store.get_folder(fid, &user_id).await {
            Ok(Some(folder)) => {
                ctx.vector_store_id = folder.vector_store_id;
                if !folder.knowledge_base.is_empty() {
                    ctx.knowledge_base = Some(folder.knowledge_base);
                }
            }
            Ok(None) => {
                tracing::warn!(folder_id = %fid, "folder not found; creating session without it");
                folder_id = None;
            }
            Err(e) => {
                tracing::error!(folder_id = %fid, error = %e, "folder lookup failed");
                folder_id = None;
            }
        }
    }
    ctx.folder_id = folder_id;
    ctx.max_high_cost_calls = state.config.executor.max_high_cost_calls;

    match state
        .store
        .create_session(&user_id, folder_id, Value::Null)
        .await
    {
        Ok(session_id) => {
            ctx.session_id = session_id;
            if let Err(e) = state
                .store
                .save_context(session_id, &user_id, ctx.lean_value())
                .await
            {
                tracing::error!(session_id = %session_id, error = %e, "initial context save failed");
            }
            (
                StatusCode::CREATED,
                Json(serde_json::json!({ "session_id": session_id })),
            )
                .into_response()
        }
        Err(e) => api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("session creation failed: {e}"),
        ),
    }
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default)]
    pub before_turn_no: Option<u64>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// GET /api/v1/sessions/{id}/messages — chronological slice. Assistant rows
/// carry `payload_json`; user rows do not.
pub async fn session_messages(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Path(session_id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> Response {
    if !session_exists(&state, session_id, &user_id).await {
        return api_error(StatusCode::NOT_FOUND, "session not found");
    }

    match state
        .store
        .messages_page(session_id, query.before_turn_no, query.limit.min(200))
        .await
    {
        Ok(rows) => {
            let messages: Vec<Value> = rows
                .iter()
                .map(|r| {
                    let mut item = serde_json::json!({
                        "turn_no": r.turn_no,
                        "role": r.role,
                        "text": r.text,
                        "whiteboard_snapshot_index": r.whiteboard_snapshot_index,
                        "created_at": r.created_at,
                    });
                    if r.role == "assistant" {
                        item["payload_json"] = r.payload_json.clone().unwrap_or(Value::Null);
                    }
                    item
                })
                .collect();
            Json(serde_json::json!({ "messages": messages })).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct WhiteboardStateQuery {
    pub target_snapshot_index: u64,
}

/// GET /api/v1/sessions/{id}/whiteboard_state_at_turn — the concatenated
/// actions of every snapshot with index ≤ target. Replaying them onto a
/// blank canvas reproduces the board as of that turn.
pub async fn whiteboard_state_at_turn(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Path(session_id): Path<Uuid>,
    Query(query): Query<WhiteboardStateQuery>,
) -> Response {
    if !session_exists(&state, session_id, &user_id).await {
        return api_error(StatusCode::NOT_FOUND, "session not found");
    }

    match state
        .store
        .snapshots_up_to(session_id, query.target_snapshot_index)
        .await
    {
        Ok(snapshots) => {
            let mut actions: Vec<Value> = Vec::new();
            for snapshot in snapshots {
                if let Value::Array(items) = snapshot.actions_json {
                    actions.extend(items);
                }
            }
            Json(serde_json::json!({ "actions": actions })).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn session_exists(state: &AppState, session_id: Uuid, user_id: &str) -> bool {
    matches!(state.store.get_session(session_id, user_id).await, Ok(Some(_)))
}
