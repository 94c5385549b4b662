//! The chat WebSocket endpoint — home of the per-session turn loop.
//!
//! Flow per connection:
//! 1. Authenticate the bearer token (rejected upgrades never reach here).
//! 2. Load or initialize the tutor context; hydrate the last 50 turns plus
//!    the whiteboard snapshots they reference; send `SESSION_INIT_STATE`.
//! 3. Re-emit any pending quiz question.
//! 4. Dispatch each inbound message by `type`; run the planner when no
//!    focus objective exists; persist the lean context after every turn.
//! 5. On disconnect without a clean `end_session`, claim and schedule
//!    background analysis.


use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use tg_domain::chat::ChatMessage;
use tg_domain::context::{InteractionMode, TutorContext};
use tg_domain::error::Result;
use tg_domain::response::InteractionResponse;
use tg_store::{InteractionLogRow, MessageRow};

use crate::runtime::evaluator::run_deterministic_answer;
use crate::runtime::executor::{run_executor_turn, ExecutorDeps, TurnIo};
use crate::runtime::{analyzer, planner};
use crate::state::AppState;
use crate::auth::AuthedUser;

const HISTORY_HYDRATION_LIMIT: usize = 50;

/// GET /ws/session/{session_id} — upgrade to the chat WebSocket.
pub async fn chat_ws(
    ws: WebSocketUpgrade,
    AuthedUser(user_id): AuthedUser,
    Path(session_id): Path<Uuid>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id, user_id))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Connection plumbing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Conn {
    sink: SplitSink<WebSocket, Message>,
    stream: SplitStream<WebSocket>,
    out_rx: mpsc::Receiver<String>,
    io: TurnIo,
    /// Set when the socket breaks mid-turn; suppresses further reads.
    broken: bool,
}

impl Conn {
    async fn send_json<T: serde::Serialize>(&mut self, value: &T) {
        self.io.send_json(value).await;
        self.flush_out().await;
    }

    /// Drain queued outbound frames onto the socket.
    async fn flush_out(&mut self) {
        while let Ok(text) = self.out_rx.try_recv() {
            if self.sink.send(Message::Text(text)).await.is_err() {
                self.broken = true;
                return;
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &'static str) {
        self.flush_out().await;
        let _ = self
            .sink
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: reason.into(),
            })))
            .await;
    }

    /// Poll a turn future while keeping the socket serviced: outbound
    /// frames are flushed as the turn produces them, and inbound
    /// `BOARD_STATE_RESPONSE` frames complete their pending futures so the
    /// board-state round-trip can finish mid-turn.
    async fn drive_turn<F>(&mut self, board: &crate::state::PendingBoardRequests, fut: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<()>>,
    {
        tokio::pin!(fut);
        let Conn {
            sink,
            stream,
            out_rx,
            broken,
            ..
        } = self;
        loop {
            tokio::select! {
                result = &mut fut => {
                    // Final flush happens in the caller.
                    return result;
                }
                Some(text) = out_rx.recv() => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        *broken = true;
                    }
                }
                msg = stream.next(), if !*broken => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Ok(value) = serde_json::from_str::<Value>(&text) {
                                if value.get("type").and_then(Value::as_str)
                                    == Some("BOARD_STATE_RESPONSE")
                                {
                                    complete_board_state(board, &value);
                                    continue;
                                }
                            }
                            tracing::debug!("dropping client frame received mid-turn");
                        }
                        Some(Ok(Message::Close(_))) | None => *broken = true,
                        Some(Ok(_)) => {}
                        Some(Err(_)) => *broken = true,
                    }
                }
            }
        }
    }
}

fn complete_board_state(board: &crate::state::PendingBoardRequests, value: &Value) {
    let request_id = value.get("request_id").and_then(Value::as_str);
    match request_id {
        Some(request_id) => {
            let payload = value.get("payload").cloned().unwrap_or(Value::Null);
            if !board.complete(request_id, payload) {
                tracing::warn!(request_id, "BOARD_STATE_RESPONSE without a pending future");
            }
        }
        None => tracing::warn!("BOARD_STATE_RESPONSE missing request_id"),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Socket handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn handle_socket(socket: WebSocket, state: AppState, session_id: Uuid, user_id: String) {
    let (sink, stream) = socket.split();
    let (out_tx, out_rx) = mpsc::channel::<String>(64);
    let io = TurnIo {
        outbound: out_tx,
        board_requests: state.board_state_requests.clone(),
    };
    let mut conn = Conn {
        sink,
        stream,
        out_rx,
        io,
        broken: false,
    };

    // ── Load the session row + hydrate the context ───────────────────
    let row = match state.store.get_session(session_id, &user_id).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            tracing::warn!(session_id = %session_id, user_id, "session not found for user");
            conn.close(1008, "session not found").await;
            return;
        }
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "session fetch failed");
            let envelope = InteractionResponse::error(
                "DB_ERROR",
                "Internal server error fetching context.",
                None,
                Default::default(),
            );
            conn.send_json(&envelope).await;
            conn.close(1011, "internal error").await;
            return;
        }
    };

    let mut ctx = match hydrate_context(row.context_data, session_id, &user_id) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "context parse failed");
            let envelope = InteractionResponse::error(
                "CONTEXT_PARSE_ERROR",
                "Internal server error processing context.",
                Some(e.to_string()),
                Default::default(),
            );
            conn.send_json(&envelope).await;
            conn.close(1011, "context parse error").await;
            return;
        }
    };
    tracing::info!(session_id = %session_id, user_id, "chat session connected");

    // ── Initial state: recent turns + referenced snapshots ───────────
    if let Err(e) = send_init_state(&state, &mut conn, session_id).await {
        tracing::error!(session_id = %session_id, error = %e, "initial-state hydration failed");
    }

    // ── Resume: re-emit a pending quiz question ──────────────────────
    if let Some(question) = &ctx.current_quiz_question {
        tracing::info!(session_id = %session_id, "re-emitting pending quiz question");
        let envelope = InteractionResponse::new(
            tg_domain::response::ContentType::Question,
            tg_domain::response::ResponsePayload::Question(
                tg_domain::response::QuestionPayload {
                    question_type: "multiple_choice".into(),
                    question_data: question.clone(),
                    context_summary: ctx.user_model_state.current_topic.clone(),
                },
            ),
            ctx.user_model_state.clone(),
        );
        conn.send_json(&envelope).await;
    }

    // ── Main receive loop ────────────────────────────────────────────
    let mut ended_cleanly = false;
    loop {
        conn.flush_out().await;
        if conn.broken {
            break;
        }
        let msg = tokio::select! {
            Some(text) = conn.out_rx.recv() => {
                if conn.sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
                continue;
            }
            msg = conn.stream.next() => msg,
        };

        let text = match msg {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::info!(session_id = %session_id, error = %e, "socket error");
                break;
            }
        };

        let payload: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "unparseable message");
                send_error(&mut conn, &ctx, "INVALID_PAYLOAD", "Malformed JSON message.").await;
                continue;
            }
        };

        match handle_message(&state, &mut conn, &mut ctx, payload).await {
            Ok(LoopControl::Continue) => {}
            Ok(LoopControl::EndedCleanly) => {
                ended_cleanly = true;
                break;
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "unhandled loop error");
                send_error(
                    &mut conn,
                    &ctx,
                    "UNHANDLED_WS_LOOP_ERROR",
                    "An unexpected server error occurred.",
                )
                .await;
                if conn.broken {
                    break;
                }
            }
        }
    }

    // ── Disconnect path ──────────────────────────────────────────────
    if !ended_cleanly {
        save_context(&state, &ctx).await;
        match state.store.analysis_status(session_id).await {
            Ok(None) => {
                tracing::info!(
                    session_id = %session_id,
                    "scheduling analysis after unexpected disconnect"
                );
                analyzer::spawn_session_analysis(
                    state.store.clone(),
                    state.llm.default_provider().ok(),
                    state.config.analyzer.clone(),
                    session_id,
                    ctx.folder_id,
                );
            }
            Ok(Some(status)) => {
                tracing::info!(session_id = %session_id, ?status, "analysis already underway");
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "status check failed");
            }
        }
        conn.close(1000, "bye").await;
    }
    tracing::info!(session_id = %session_id, ended_cleanly, "chat session closed");
}

enum LoopControl {
    Continue,
    EndedCleanly,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn handle_message(
    state: &AppState,
    conn: &mut Conn,
    ctx: &mut TutorContext,
    payload: Value,
) -> Result<LoopControl> {
    // Interaction-mode changes may ride on any message.
    if let Some(mode) = payload.get("whiteboard_mode").and_then(Value::as_str) {
        apply_mode_change(state, ctx, mode).await;
    }

    let kind = match payload.get("type").and_then(Value::as_str) {
        Some(kind) => kind.to_owned(),
        None => {
            send_error(conn, ctx, "INVALID_PAYLOAD", "Message missing 'type' field.").await;
            return Ok(LoopControl::Continue);
        }
    };
    let data = payload.get("data").cloned().unwrap_or(Value::Null);

    match kind.as_str() {
        "ping" | "system_tick" | "whiteboard_mode" => Ok(LoopControl::Continue),

        "BOARD_STATE_RESPONSE" => {
            complete_board_state(&state.board_state_requests, &payload);
            Ok(LoopControl::Continue)
        }

        "canvas_click" => {
            let object_id = data.get("object_id").and_then(Value::as_str);
            let object_id = match object_id {
                Some(id) => id.to_owned(),
                None => {
                    send_error(
                        conn,
                        ctx,
                        "CANVAS_CLICK_NO_ID",
                        "canvas_click event missing object_id",
                    )
                    .await;
                    return Ok(LoopControl::Continue);
                }
            };
            let click = serde_json::json!({"type": "canvas_click", "object_id": object_id});
            ctx.history.push(ChatMessage::user(click.to_string()));
            run_llm_turn(state, conn, ctx).await;
            save_context(state, ctx).await;
            Ok(LoopControl::Continue)
        }

        "end_session" => {
            handle_end_session(state, conn, ctx).await;
            Ok(LoopControl::EndedCleanly)
        }

        "user_message" => {
            let text = data
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            if !text.is_empty() {
                log_user(state, ctx, &text, "user_input", "user_message").await;
                persist_user_turn(state, ctx, &text).await;
                ctx.history.push(ChatMessage::user(&text));
            }
            run_llm_turn(state, conn, ctx).await;
            save_context(state, ctx).await;
            Ok(LoopControl::Continue)
        }

        "answer" => {
            log_user(state, ctx, "User action: answer", "user_action", "answer").await;
            ctx.history.push(ChatMessage::user(payload.to_string()));
            if ctx.current_quiz_question.is_some() {
                let answer_index = data
                    .get("answer_index")
                    .and_then(Value::as_u64)
                    .map(|v| v as usize);
                let question_id = data
                    .get("question_id")
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                match answer_index {
                    Some(answer_index) => {
                        run_answer_turn(state, conn, ctx, answer_index, question_id).await;
                    }
                    None => {
                        send_error(
                            conn,
                            ctx,
                            "TOOL_INPUT_VALIDATION_ERROR",
                            "answer event missing answer_index",
                        )
                        .await;
                    }
                }
            } else {
                // No quiz pending: let the executor interpret the event.
                run_llm_turn(state, conn, ctx).await;
            }
            save_context(state, ctx).await;
            Ok(LoopControl::Continue)
        }

        "next" | "previous" | "summary" | "start" => {
            log_user(
                state,
                ctx,
                &format!("User action: {kind}"),
                "user_action",
                &kind,
            )
            .await;
            ctx.history.push(ChatMessage::user(&kind));
            run_llm_turn(state, conn, ctx).await;
            save_context(state, ctx).await;
            Ok(LoopControl::Continue)
        }

        other => {
            tracing::debug!(kind = other, "unrecognized message type; forwarding to executor");
            ctx.history.push(ChatMessage::user(other));
            run_llm_turn(state, conn, ctx).await;
            save_context(state, ctx).await;
            Ok(LoopControl::Continue)
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn runners
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn executor_deps(state: &AppState) -> Result<ExecutorDeps> {
    Ok(ExecutorDeps {
        provider: state.llm.default_provider()?,
        store: state.store.clone(),
        skills: state.skills.clone(),
        services: state.skill_services.clone(),
        docs: state.docs.clone(),
        config: state.config.executor.clone(),
    })
}

/// Ensure a focus objective exists, then run one executor turn.
async fn run_llm_turn(state: &AppState, conn: &mut Conn, ctx: &mut TutorContext) {
    let deps = match executor_deps(state) {
        Ok(deps) => deps,
        Err(e) => {
            tracing::error!(error = %e, "no LLM provider for executor turn");
            send_error(conn, ctx, "LLM_UNAVAILABLE", "The tutor is not available right now.")
                .await;
            return;
        }
    };

    if ctx.current_focus_objective.is_none() {
        match planner::determine_session_focus(state.store.as_ref(), &state.llm, ctx).await {
            Ok(objective) => {
                save_context(state, ctx).await;
                tracing::info!(topic = %objective.topic, "planner bootstrapped objective");
            }
            Err(e) => {
                tracing::error!(error = %e, "planner failed");
                send_error(
                    conn,
                    ctx,
                    "PLANNING_ERROR",
                    "Could not determine a lesson objective.",
                )
                .await;
                return;
            }
        }
    }

    let io = conn.io.clone();
    let board = state.board_state_requests.clone();
    let result = conn
        .drive_turn(&board, run_executor_turn(&deps, ctx, &io))
        .await;
    conn.flush_out().await;
    if let Err(e) = result {
        tracing::error!(error = %e, "executor turn failed");
        send_error(conn, ctx, "EXECUTOR_ERROR", "The tutor could not take a turn.").await;
    }
}

async fn run_answer_turn(
    state: &AppState,
    conn: &mut Conn,
    ctx: &mut TutorContext,
    answer_index: usize,
    question_id: Option<String>,
) {
    let deps = match executor_deps(state) {
        Ok(deps) => deps,
        Err(e) => {
            // The deterministic path itself needs no LLM; deps carry the
            // store and skills.
            tracing::debug!(error = %e, "deterministic path without provider");
            send_error(conn, ctx, "LLM_UNAVAILABLE", "The tutor is not available right now.")
                .await;
            return;
        }
    };
    let io = conn.io.clone();
    if let Err(e) = run_deterministic_answer(&deps, ctx, &io, answer_index, question_id).await {
        tracing::error!(error = %e, "deterministic evaluation failed");
        send_error(conn, ctx, "EVALUATION_ERROR", "Could not evaluate the answer.").await;
    }
    conn.flush_out().await;
}

async fn handle_end_session(state: &AppState, conn: &mut Conn, ctx: &mut TutorContext) {
    save_context(state, ctx).await;
    match state.store.analysis_status(ctx.session_id).await {
        Ok(None) => {
            analyzer::spawn_session_analysis(
                state.store.clone(),
                state.llm.default_provider().ok(),
                state.config.analyzer.clone(),
                ctx.session_id,
                ctx.folder_id,
            );
            let envelope = InteractionResponse::message(
                "Session ending signal received. Your progress analysis will begin shortly.",
                ctx.user_model_state.clone(),
            );
            conn.send_json(&envelope).await;
        }
        Ok(Some(status)) => {
            let status = match status {
                tg_store::AnalysisStatus::Processing => "processing",
                tg_store::AnalysisStatus::Success => "complete",
                tg_store::AnalysisStatus::Failed => "failed",
            };
            let envelope = InteractionResponse::message(
                format!("Session analysis is already {status}."),
                ctx.user_model_state.clone(),
            );
            conn.send_json(&envelope).await;
        }
        Err(e) => {
            tracing::error!(error = %e, "status check failed during end_session");
            send_error(
                conn,
                ctx,
                "END_SESSION_FAIL",
                "Could not process session ending request.",
            )
            .await;
        }
    }
    conn.close(1000, "user ended session").await;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn hydrate_context(
    context_data: Value,
    session_id: Uuid,
    user_id: &str,
) -> Result<TutorContext> {
    let empty = context_data.is_null()
        || context_data
            .as_object()
            .map(|o| o.is_empty())
            .unwrap_or(false);
    if empty {
        return Ok(TutorContext::new(session_id, user_id, None));
    }
    let mut data = context_data;
    if let Some(obj) = data.as_object_mut() {
        obj.entry("session_id")
            .or_insert_with(|| Value::String(session_id.to_string()));
        obj.entry("user_id")
            .or_insert_with(|| Value::String(user_id.to_owned()));
    }
    Ok(serde_json::from_value(data)?)
}

async fn send_init_state(state: &AppState, conn: &mut Conn, session_id: Uuid) -> Result<()> {
    let rows = state
        .store
        .messages_page(session_id, None, HISTORY_HYDRATION_LIMIT)
        .await?;
    let max_snapshot = rows
        .iter()
        .filter_map(|r| r.whiteboard_snapshot_index)
        .max();

    let mut replay: Vec<Value> = Vec::new();
    if let Some(index) = max_snapshot {
        for snapshot in state.store.snapshots_up_to(session_id, index).await? {
            if let Value::Array(actions) = snapshot.actions_json {
                replay.extend(actions);
            }
        }
    }

    let chat_history: Vec<Value> = rows
        .iter()
        .map(|r| {
            serde_json::json!({
                "turn_no": r.turn_no,
                "role": r.role,
                "text": r.text,
                "payload_json": r.payload_json,
                "whiteboard_snapshot_index": r.whiteboard_snapshot_index,
            })
        })
        .collect();

    conn.send_json(&serde_json::json!({
        "type": "SESSION_INIT_STATE",
        "chat_history": chat_history,
        "whiteboard_actions_to_replay": replay,
    }))
    .await;
    Ok(())
}

async fn apply_mode_change(state: &AppState, ctx: &mut TutorContext, mode: &str) {
    let parsed = match mode {
        "chat_only" => Some(InteractionMode::ChatOnly),
        "chat_and_whiteboard" => Some(InteractionMode::ChatAndWhiteboard),
        _ => None,
    };
    match parsed {
        Some(new_mode) if new_mode != ctx.interaction_mode => {
            tracing::info!(session_id = %ctx.session_id, mode, "interaction mode changed");
            ctx.interaction_mode = new_mode;
            save_context(state, ctx).await;
        }
        Some(_) => {}
        None => tracing::warn!(mode, "ignoring invalid whiteboard_mode"),
    }
}

async fn save_context(state: &AppState, ctx: &TutorContext) {
    if let Err(e) = state
        .store
        .save_context(ctx.session_id, &ctx.user_id, ctx.lean_value())
        .await
    {
        tracing::error!(session_id = %ctx.session_id, error = %e, "context save failed");
    }
}

async fn persist_user_turn(state: &AppState, ctx: &mut TutorContext, text: &str) {
    let turn_no = ctx.next_turn_no();
    if let Err(e) = state
        .store
        .append_message(MessageRow {
            session_id: ctx.session_id,
            turn_no,
            role: "user".into(),
            text: text.to_owned(),
            payload_json: None,
            whiteboard_snapshot_index: None,
            created_at: Utc::now(),
        })
        .await
    {
        tracing::error!(session_id = %ctx.session_id, error = %e, "user turn persist failed");
    }
}

async fn log_user(
    state: &AppState,
    ctx: &TutorContext,
    content: &str,
    content_type: &str,
    event_type: &str,
) {
    if let Err(e) = state
        .store
        .log_interaction(InteractionLogRow {
            session_id: ctx.session_id,
            user_id: ctx.user_id.clone(),
            role: "user".into(),
            content: content.to_owned(),
            content_type: content_type.to_owned(),
            event_type: event_type.to_owned(),
            created_at: Utc::now(),
        })
        .await
    {
        tracing::warn!(error = %e, "interaction log failed");
    }
}

async fn send_error(conn: &mut Conn, ctx: &TutorContext, code: &str, message: &str) {
    let envelope = InteractionResponse::error(
        code,
        message,
        None,
        ctx.user_model_state.clone(),
    );
    conn.send_json(&envelope).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hydrate_empty_context_initializes_fresh() {
        let sid = Uuid::new_v4();
        let ctx = hydrate_context(Value::Null, sid, "alice").unwrap();
        assert_eq!(ctx.session_id, sid);
        assert_eq!(ctx.user_id, "alice");
        assert!(ctx.history.is_empty());
    }

    #[test]
    fn hydrate_lean_context_restores_state() {
        let sid = Uuid::new_v4();
        let mut original = TutorContext::new(sid, "alice", None);
        original.high_cost_calls = 2;
        original.latest_turn_no = 7;
        let ctx = hydrate_context(original.lean_value(), sid, "alice").unwrap();
        assert_eq!(ctx.high_cost_calls, 2);
        assert_eq!(ctx.latest_turn_no, 7);
    }

    #[test]
    fn hydrate_garbage_context_fails() {
        let sid = Uuid::new_v4();
        let err = hydrate_context(serde_json::json!({"session_id": 42}), sid, "u");
        assert!(err.is_err());
    }
}
