//! The whiteboard delta-sync WebSocket.
//!
//! Clients exchange opaque binary CRDT update blobs. On connect the server
//! sends the current document state; each received update is applied to the
//! authoritative doc under the per-session lock, owner-rewritten, broadcast
//! to the session's other clients, and persisted to the KV store. The last
//! disconnect writes a final snapshot and drops the doc from memory.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use uuid::Uuid;

use crate::auth::AuthedUser;
use crate::state::AppState;

/// GET /ws/v2/session/{session_id}/whiteboard — upgrade.
pub async fn whiteboard_ws(
    ws: WebSocketUpgrade,
    AuthedUser(user_id): AuthedUser,
    Path(session_id): Path<Uuid>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id, user_id))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, session_id: Uuid, user_id: String) {
    // ── Tenancy guard: the session must belong to the caller ─────────
    match state.store.get_session(session_id, &user_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            tracing::warn!(
                session_id = %session_id,
                user_id,
                "forbidden whiteboard access"
            );
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: 4403,
                    reason: "Forbidden: session does not belong to user".into(),
                })))
                .await;
            return;
        }
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "tenancy lookup failed");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: 1011,
                    reason: "Internal error".into(),
                })))
                .await;
            return;
        }
    }

    let doc = match state.docs.get_or_load(session_id).await {
        Ok(doc) => doc,
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "doc load failed");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: 1011,
                    reason: "Internal error".into(),
                })))
                .await;
            return;
        }
    };

    // ── Initial state ────────────────────────────────────────────────
    let initial = doc.save_bytes().await;
    if !initial.is_empty() && socket.send(Message::Binary(initial)).await.is_err() {
        tracing::warn!(session_id = %session_id, "failed to send initial whiteboard state");
        return;
    }

    let (peer_id, mut peer_rx) = doc.add_peer().await;
    tracing::info!(session_id = %session_id, peer_id, "whiteboard peer connected");

    let (mut sink, mut stream) = socket.split();

    // Writer task: relays peer broadcasts to this client.
    let writer = tokio::spawn(async move {
        while let Some(update) = peer_rx.recv().await {
            if sink.send(Message::Binary(update)).await.is_err() {
                break;
            }
        }
    });

    // ── Receive loop: apply + broadcast + persist ────────────────────
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Binary(update)) => {
                match doc.apply_learner_update(&update, peer_id).await {
                    Ok(_) => {
                        if let Err(e) = state.docs.persist(&doc).await {
                            tracing::error!(
                                session_id = %session_id,
                                error = %e,
                                "whiteboard snapshot persist failed"
                            );
                        }
                    }
                    Err(e) => {
                        tracing::error!(
                            session_id = %session_id,
                            error = %e,
                            "failed to apply whiteboard update"
                        );
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::info!(session_id = %session_id, error = %e, "whiteboard socket error");
                break;
            }
        }
    }

    // ── Cleanup: final snapshot + unload when idle ───────────────────
    writer.abort();
    let remaining = doc.remove_peer(peer_id).await;
    if remaining == 0 {
        if let Err(e) = state.docs.unload(session_id).await {
            tracing::error!(session_id = %session_id, error = %e, "whiteboard unload failed");
        }
    }
    tracing::info!(
        session_id = %session_id,
        peer_id,
        remaining,
        "whiteboard peer disconnected"
    );
}
