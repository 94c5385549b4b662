//! Minimal folder endpoints: creation and retrieval. Document upload and
//! embedding live in an external service; sessions only need the folder's
//! knowledge base and vector-store id.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::api_error;
use crate::auth::AuthedUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    pub name: String,
}

/// POST /api/v1/folders
pub async fn create_folder(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Json(req): Json<CreateFolderRequest>,
) -> Response {
    let name = req.name.trim();
    if name.is_empty() || name.len() > 100 {
        return api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "folder name must be 1-100 characters",
        );
    }
    match state.store.create_folder(&user_id, name).await {
        Ok(folder) => (StatusCode::CREATED, Json(folder)).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /api/v1/folders/{id}
pub async fn get_folder(
    State(state): State<AppState>,
    AuthedUser(user_id): AuthedUser,
    Path(folder_id): Path<Uuid>,
) -> Response {
    match state.store.get_folder(folder_id, &user_id).await {
        Ok(Some(folder)) => Json(folder).into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "folder not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
