//! The lean executor: exactly one LLM call per turn yielding exactly one
//! `{name, args}` tool call, dispatched with strict validation, error
//! recovery, and history management.
//!
//! Recovery policy: anything recoverable by another LLM turn (bad JSON,
//! unknown tool, invalid skill args, exhausted high-cost budget) is surfaced
//! only to the LLM via history/system messages; only terminal conditions
//! reach the learner as error envelopes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use tg_domain::canvas::WhiteboardAction;
use tg_domain::chat::{ChatMessage, ToolCall};
use tg_domain::config::ExecutorConfig;
use tg_domain::context::{PedagogicalAction, TutorContext};
use tg_domain::error::{Error, Result};
use tg_domain::learner::PendingInteraction;
use tg_domain::quiz::QuizQuestion;
use tg_domain::response::{
    ContentType, ErrorPayload, ExplanationPayload, FeedbackPayload, InteractionResponse, MessagePayload, QuestionPayload, ResponsePayload,
};
use tg_providers::retry::{retry_on_json, RetryPolicy};
use tg_providers::{ChatRequest, LlmProvider};
use tg_skills::{Cost, SkillCtxServices, SkillOutput, SkillRegistry};
use tg_store::{InteractionLogRow, MessageRow, SnapshotRow, TutorStore};
use tg_whiteboard::DocRegistry;

use super::prompts;
use crate::state::PendingBoardRequests;

/// How long a board-state round-trip may wait for the client.
const BOARD_STATE_TIMEOUT: Duration = Duration::from_secs(20);

/// History compaction bounds for `summarise_context`.
const HISTORY_KEEP_RECENT: usize = 6;

/// Everything one executor turn needs besides the context itself.
pub struct ExecutorDeps {
    pub provider: Arc<dyn LlmProvider>,
    pub store: Arc<dyn TutorStore>,
    pub skills: Arc<SkillRegistry>,
    pub services: Arc<SkillCtxServices>,
    pub docs: Arc<DocRegistry>,
    pub config: ExecutorConfig,
}

/// Outbound channel to the connected client plus the board-state futures.
#[derive(Clone)]
pub struct TurnIo {
    pub outbound: mpsc::Sender<String>,
    pub board_requests: Arc<PendingBoardRequests>,
}

impl TurnIo {
    pub async fn send_json<T: serde::Serialize>(&self, value: &T) {
        match serde_json::to_string(value) {
            Ok(text) => {
                if self.outbound.send(text).await.is_err() {
                    tracing::warn!("outbound channel closed; dropping message");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to serialize outbound message"),
        }
    }
}

/// Run one executor turn: build the prompt, call the LLM once, dispatch the
/// single resulting tool call, persist, and respond.
pub async fn run_executor_turn(
    deps: &ExecutorDeps,
    ctx: &mut TutorContext,
    io: &TurnIo,
) -> Result<()> {
    // ── One LLM call (with bounded JSON retries) ─────────────────────
    let system_prompt = prompts::executor_system_prompt(ctx);
    let mut messages = Vec::with_capacity(ctx.history.len() + 1);
    messages.push(ChatMessage::system(&system_prompt));
    messages.extend(ctx.history.iter().cloned());

    let policy = RetryPolicy {
        max_attempts: deps.config.max_json_retries.max(1),
        base_temperature: 0.2,
        temperature_step: deps.config.temperature_step,
        backoff: Duration::from_millis(deps.config.retry_backoff_ms),
    };

    let provider = deps.provider.clone();
    let tool_call = retry_on_json(policy, |temperature| {
        let provider = provider.clone();
        let messages = messages.clone();
        async move {
            let reply = provider
                .chat(ChatRequest {
                    messages,
                    temperature: Some(temperature),
                    json_mode: true,
                    ..Default::default()
                })
                .await?;
            let value = super::extract_json_object(&reply.content)?;
            serde_json::from_value::<ToolCall>(value)
                .map_err(|e| Error::Executor(format!("reply is not a tool call: {e}")))
        }
    })
    .await;

    let tool_call = match tool_call {
        Ok(tc) => tc,
        Err(e @ (Error::Json(_) | Error::Executor(_))) => {
            tracing::warn!(error = %e, "LLM failed to produce a tool call; aborting turn");
            ctx.history.push(ChatMessage::system(
                "Your last replies were not valid tool calls. Respond with exactly one JSON \
                 object of the form {\"name\": ..., \"args\": {...}}.",
            ));
            return Ok(());
        }
        Err(other) => return Err(other),
    };

    // The model sees its own action next turn.
    let raw_call = serde_json::to_string(&tool_call).unwrap_or_default();
    ctx.history.push(ChatMessage::assistant(&raw_call));
    tracing::info!(tool = %tool_call.name, "executor dispatching tool call");

    // ── Unknown tool names: correct the model, keep the user out ─────
    if !tool_call.is_frontend_tool() && !deps.skills.contains(&tool_call.name) {
        ctx.history.push(ChatMessage::system(prompts::unknown_tool_feedback(
            &tool_call.name,
        )));
        let envelope = InteractionResponse::message(
            "Let me rethink that for a moment.",
            ctx.user_model_state.clone(),
        );
        finish_turn(deps, ctx, io, envelope, Vec::new()).await?;
        return Ok(());
    }

    // ── Dispatch ─────────────────────────────────────────────────────
    let effect = if tool_call.is_frontend_tool() {
        dispatch_frontend(deps, ctx, &tool_call).await?
    } else {
        dispatch_skill(deps, ctx, io, &tool_call).await?
    };

    if let Some((envelope, actions)) = effect {
        finish_turn(deps, ctx, io, envelope, actions).await?;
    }
    Ok(())
}

type TurnEffect = Option<(InteractionResponse, Vec<WhiteboardAction>)>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Front-end display tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn dispatch_frontend(
    deps: &ExecutorDeps,
    ctx: &mut TutorContext,
    call: &ToolCall,
) -> Result<TurnEffect> {
    let args = Value::Object(call.args.clone());
    match call.name.as_str() {
        "explain" => {
            let text = arg_str(&args, "text").unwrap_or_default();
            if text.is_empty() {
                ctx.history.push(ChatMessage::system(prompts::invalid_args_feedback(
                    "explain requires a non-empty 'text'",
                )));
                return Ok(None);
            }
            ctx.last_pedagogical_action = Some(PedagogicalAction::Explained);
            let envelope = InteractionResponse::new(
                ContentType::Explanation,
                ResponsePayload::Explanation(ExplanationPayload {
                    explanation_text: text,
                    explanation_title: arg_str(&args, "title"),
                }),
                ctx.user_model_state.clone(),
            );
            Ok(Some((envelope, Vec::new())))
        }

        "ask_question" => ask_question(deps, ctx, &args).await,

        "message" => {
            let text = arg_str(&args, "text")
                .unwrap_or_else(|| "Let's keep going.".into());
            let envelope = InteractionResponse::message(text, ctx.user_model_state.clone());
            Ok(Some((envelope, Vec::new())))
        }

        "feedback" => {
            ctx.last_pedagogical_action = Some(PedagogicalAction::Evaluated);
            let envelope = InteractionResponse::new(
                ContentType::Feedback,
                ResponsePayload::Feedback(FeedbackPayload {
                    feedback_items: Vec::new(),
                    overall_assessment: arg_str(&args, "text"),
                    suggested_next_step: None,
                }),
                ctx.user_model_state.clone(),
            );
            Ok(Some((envelope, Vec::new())))
        }

        "error" => {
            let envelope = InteractionResponse::new(
                ContentType::Error,
                ResponsePayload::Error(ErrorPayload {
                    error_code: Some("TUTOR_REPORTED".into()),
                    error_message: arg_str(&args, "message")
                        .unwrap_or_else(|| "The tutor hit a snag.".into()),
                    technical_details: None,
                }),
                ctx.user_model_state.clone(),
            );
            Ok(Some((envelope, Vec::new())))
        }

        "end_session" => {
            let reason = arg_str(&args, "reason").unwrap_or_else(|| "objective_complete".into());
            tracing::info!(session_id = %ctx.session_id, reason, "executor ended the session");
            // The objective is consumed; the planner re-runs on the next
            // message if the learner keeps going.
            ctx.current_focus_objective = None;
            let envelope = InteractionResponse::message(
                "Nice work — we've wrapped up this objective. Send another message any time \
                 to keep going.",
                ctx.user_model_state.clone(),
            );
            Ok(Some((envelope, Vec::new())))
        }

        "reflect" => {
            // Internal: the thought is already in history via the raw call.
            Ok(None)
        }

        "summarise_context" => {
            summarise_history(ctx);
            Ok(None)
        }

        other => Err(Error::Executor(format!(
            "front-end tool '{other}' reached dispatch without a handler"
        ))),
    }
}

/// `ask_question`: validate and store the quiz, then ALWAYS render it via
/// the internal MCQ skill so the layout matches what the evaluator and the
/// front-end expect. LLM-supplied whiteboard actions are ignored.
async fn ask_question(
    deps: &ExecutorDeps,
    ctx: &mut TutorContext,
    args: &Value,
) -> Result<TurnEffect> {
    let question: QuizQuestion = match args
        .get("question_data")
        .cloned()
        .ok_or_else(|| "missing 'question_data'".to_owned())
        .and_then(|v| serde_json::from_value(v).map_err(|e| e.to_string()))
    {
        Ok(q) => q,
        Err(detail) => {
            ctx.history
                .push(ChatMessage::system(prompts::invalid_args_feedback(&detail)));
            return Ok(None);
        }
    };
    if !question.options.is_empty() && question.correct_answer_index >= question.options.len() {
        ctx.history.push(ChatMessage::system(prompts::invalid_args_feedback(
            "correct_answer_index is out of range for the options list",
        )));
        return Ok(None);
    }

    let question_id = arg_str(args, "question_id").unwrap_or_else(|| "q1".into());
    ctx.current_quiz_question = Some(question.clone());
    ctx.pending_interaction_type = Some("checking_question".into());
    ctx.user_model_state.pending_interaction_type = Some(PendingInteraction::CheckingQuestion);
    ctx.user_model_state.pending_interaction_details =
        Some(serde_json::json!({ "question_id": question_id }));
    ctx.last_pedagogical_action = Some(PedagogicalAction::Asked);

    if !ctx.interaction_mode.whiteboard_enabled() {
        // Chat-only sessions get the question inline instead of drawn.
        let envelope = InteractionResponse::new(
            ContentType::Question,
            ResponsePayload::Question(QuestionPayload {
                question_type: "multiple_choice".into(),
                question_data: question,
                context_summary: arg_str(args, "topic"),
            }),
            ctx.user_model_state.clone(),
        );
        return Ok(Some((envelope, Vec::new())));
    }

    let skill_args = serde_json::json!({
        "question": question,
        "question_id": question_id,
        "template": args.get("template"),
        "zone": args.get("zone"),
    });
    let output = deps
        .skills
        .invoke("draw_mcq_actions", ctx, &deps.services, skill_args)
        .await?;
    let actions = output.actions();

    let envelope = InteractionResponse::message(
        "I have a question for you on the whiteboard — take a look and pick an answer.",
        ctx.user_model_state.clone(),
    )
    .with_actions(actions.clone());
    Ok(Some((envelope, actions)))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Backend skills
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Skills that only make sense with a whiteboard attached.
const DRAWING_SKILLS: &[&str] = &[
    "draw",
    "draw_text",
    "draw_shape",
    "draw_mcq_actions",
    "draw_mcq_feedback",
    "draw_table",
    "draw_flowchart",
    "draw_axis",
    "draw_coordinate_plane",
    "draw_timeline",
    "draw_graph",
    "draw_latex",
    "clear_board",
    "add_objects_to_board",
    "update_object_on_board",
    "delete_object_on_board",
    "group_objects",
    "move_group",
    "delete_group",
    "highlight_object",
    "show_pointer_at",
];

async fn dispatch_skill(
    deps: &ExecutorDeps,
    ctx: &mut TutorContext,
    io: &TurnIo,
    call: &ToolCall,
) -> Result<TurnEffect> {
    // Chat-only sessions have no canvas; correct the model instead of
    // sending actions nobody renders.
    if !ctx.interaction_mode.whiteboard_enabled() && DRAWING_SKILLS.contains(&call.name.as_str())
    {
        ctx.history.push(ChatMessage::system(format!(
            "'{}' is unavailable: the session is in chat_only mode. Use explain, message, or \
             ask_question instead.",
            call.name
        )));
        return Ok(None);
    }

    let cost = deps.skills.cost_of(&call.name).unwrap_or(Cost::Low);

    // ── High-cost budget ─────────────────────────────────────────────
    if cost == Cost::High && !ctx.high_cost_budget_left() {
        tracing::warn!(
            skill = %call.name,
            used = ctx.high_cost_calls,
            cap = ctx.max_high_cost_calls,
            "high-cost budget exhausted; degrading"
        );
        ctx.history
            .push(ChatMessage::system(prompts::high_cost_feedback(&call.name)));
        let envelope = InteractionResponse::message(
            "Give me a second — I'll find a simpler way to show this.",
            ctx.user_model_state.clone(),
        );
        return Ok(Some((envelope, Vec::new())));
    }

    // ── Board-state round-trip (client is the source of truth) ───────
    if call.name == "get_board_state" {
        return get_board_state_roundtrip(ctx, io).await;
    }

    match deps
        .skills
        .invoke(&call.name, ctx, &deps.services, Value::Object(call.args.clone()))
        .await
    {
        Err(Error::ToolInput(detail)) => {
            // Recoverable by the next turn: tell the model, not the user.
            tracing::info!(skill = %call.name, detail, "tool input rejected");
            ctx.history
                .push(ChatMessage::system(prompts::invalid_args_feedback(&detail)));
            Ok(None)
        }
        Err(e) => {
            tracing::error!(skill = %call.name, error = %e, "skill execution failed");
            let envelope = InteractionResponse::error(
                "TOOL_EXECUTION_ERROR",
                "Something went wrong while updating the board.",
                Some(e.to_string()),
                ctx.user_model_state.clone(),
            );
            Ok(Some((envelope, Vec::new())))
        }
        Ok(output) => {
            if cost == Cost::High {
                ctx.high_cost_calls += 1;
            }
            if call.name == "evaluate_quiz" {
                ctx.last_pedagogical_action = Some(PedagogicalAction::Evaluated);
            }

            let actions = output.actions();
            let envelope = match output {
                SkillOutput::Message { payload, .. } => InteractionResponse::new(
                    ContentType::Message,
                    ResponsePayload::Message(payload),
                    ctx.user_model_state.clone(),
                ),
                SkillOutput::Feedback { payload, .. } => InteractionResponse::new(
                    ContentType::Feedback,
                    ResponsePayload::Feedback(payload),
                    ctx.user_model_state.clone(),
                ),
                SkillOutput::State(state) => {
                    InteractionResponse::message("Noted — I've updated my picture of you.", state)
                }
                SkillOutput::Value(value) => {
                    // Query results feed the next LLM turn, not the user.
                    ctx.history.push(ChatMessage::system(format!(
                        "Tool result for {}: {}",
                        call.name,
                        super::truncate_for_log(&value.to_string(), 2000)
                    )));
                    return Ok(None);
                }
                SkillOutput::Specs(_) | SkillOutput::Action(_) | SkillOutput::Actions(_) => {
                    InteractionResponse::message(
                        "Done — take a look at the whiteboard.",
                        ctx.user_model_state.clone(),
                    )
                }
            };
            Ok(Some((envelope.with_actions(actions.clone()), actions)))
        }
    }
}

async fn get_board_state_roundtrip(
    ctx: &mut TutorContext,
    io: &TurnIo,
) -> Result<TurnEffect> {
    let request_id = Uuid::new_v4().to_string();
    let rx = io.board_requests.register(&request_id);
    io.send_json(&serde_json::json!({
        "type": "REQUEST_BOARD_STATE",
        "request_id": request_id,
    }))
    .await;

    match tokio::time::timeout(BOARD_STATE_TIMEOUT, rx).await {
        Ok(Ok(payload)) => {
            // The model only ever sees the compressed ids/tags/bbox view.
            let summary = match serde_json::from_value::<Vec<tg_domain::canvas::CanvasObjectSpec>>(
                payload.clone(),
            ) {
                Ok(specs) => tg_whiteboard::compress_board_objects(&specs),
                Err(_) => super::truncate_for_log(&payload.to_string(), 2000),
            };
            ctx.history.push(ChatMessage::system(format!(
                "Current board state: {summary}"
            )));
            Ok(None)
        }
        _ => {
            io.board_requests.remove(&request_id);
            tracing::warn!(request_id, "board state round-trip timed out");
            let envelope = InteractionResponse::error(
                "BOARD_STATE_TIMEOUT",
                "The whiteboard did not answer in time.",
                None,
                ctx.user_model_state.clone(),
            );
            Ok(Some((envelope, Vec::new())))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn finalization: persist, mirror, send
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Persist the assistant turn (and its whiteboard snapshot when actions
/// were emitted), mirror the actions into the live document, and send the
/// envelope. The snapshot index always equals the turn number.
pub(crate) async fn finish_turn(
    deps: &ExecutorDeps,
    ctx: &mut TutorContext,
    io: &TurnIo,
    envelope: InteractionResponse,
    actions: Vec<WhiteboardAction>,
) -> Result<()> {
    let turn_no = ctx.next_turn_no();
    let snapshot_index = if actions.is_empty() {
        None
    } else {
        ctx.latest_snapshot_index = turn_no;
        Some(turn_no)
    };

    if let Some(index) = snapshot_index {
        if let Err(e) = deps
            .store
            .put_snapshot(SnapshotRow {
                session_id: ctx.session_id,
                snapshot_index: index,
                actions_json: serde_json::to_value(&actions)?,
                created_at: Utc::now(),
            })
            .await
        {
            tracing::error!(error = %e, "failed to persist whiteboard snapshot");
        }

        // Mirror into the authoritative doc so the digest and reconnect
        // replay see assistant output.
        match deps.docs.get_or_load(ctx.session_id).await {
            Ok(doc) => {
                if let Err(e) = doc.apply_actions(&actions).await {
                    tracing::error!(error = %e, "failed to mirror actions into doc");
                } else if let Err(e) = deps.docs.persist(&doc).await {
                    tracing::error!(error = %e, "failed to persist doc snapshot");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to load doc for mirror"),
        }

        ctx.whiteboard_history.push(actions.clone());
    }

    let text = payload_text(&envelope.data);
    if let Err(e) = deps
        .store
        .append_message(MessageRow {
            session_id: ctx.session_id,
            turn_no,
            role: "assistant".into(),
            text: text.clone(),
            payload_json: Some(serde_json::to_value(&envelope.data)?),
            whiteboard_snapshot_index: snapshot_index,
            created_at: Utc::now(),
        })
        .await
    {
        tracing::error!(error = %e, "failed to persist assistant turn");
    }

    if let Err(e) = deps
        .store
        .log_interaction(InteractionLogRow {
            session_id: ctx.session_id,
            user_id: ctx.user_id.clone(),
            role: "assistant".into(),
            content: text,
            content_type: content_type_str(envelope.content_type).into(),
            event_type: "executor_turn".into(),
            created_at: Utc::now(),
        })
        .await
    {
        tracing::warn!(error = %e, "failed to log assistant interaction");
    }

    io.send_json(&envelope).await;
    Ok(())
}

fn content_type_str(ct: ContentType) -> &'static str {
    match ct {
        ContentType::Explanation => "explanation",
        ContentType::Question => "question",
        ContentType::Feedback => "feedback",
        ContentType::Message => "message",
        ContentType::Error => "error",
        ContentType::Raw => "raw",
    }
}

fn payload_text(payload: &ResponsePayload) -> String {
    match payload {
        ResponsePayload::Explanation(p) => p.explanation_text.clone(),
        ResponsePayload::Question(p) => p.question_data.question.clone(),
        ResponsePayload::Feedback(p) => p
            .feedback_items
            .first()
            .map(|i| i.explanation.clone())
            .or_else(|| p.overall_assessment.clone())
            .unwrap_or_default(),
        ResponsePayload::Message(p) => p.message_text.clone(),
        ResponsePayload::Error(p) => p.error_message.clone(),
        ResponsePayload::Raw(v) => v.to_string(),
    }
}

fn arg_str(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .filter(|s| !s.is_empty())
}

/// Fold older history into a summary note, keeping the recent tail.
fn summarise_history(ctx: &mut TutorContext) {
    if ctx.history.len() <= HISTORY_KEEP_RECENT {
        return;
    }
    let cut = ctx.history.len() - HISTORY_KEEP_RECENT;
    let folded: Vec<ChatMessage> = ctx.history.drain(..cut).collect();
    let note = format!(
        "(summarised {} earlier messages; last covered: {})",
        folded.len(),
        folded
            .last()
            .map(|m| super::truncate_for_log(&m.content, 80))
            .unwrap_or_default()
    );
    ctx.user_model_state.session_summary_notes.push(note);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarise_keeps_recent_tail() {
        let mut ctx = TutorContext::new(Uuid::new_v4(), "u", None);
        for i in 0..10 {
            ctx.history.push(ChatMessage::user(format!("m{i}")));
        }
        summarise_history(&mut ctx);
        assert_eq!(ctx.history.len(), HISTORY_KEEP_RECENT);
        assert_eq!(ctx.history[0].content, "m4");
        assert_eq!(ctx.user_model_state.session_summary_notes.len(), 1);
    }

    #[test]
    fn payload_text_prefers_primary_fields() {
        let text = payload_text(&ResponsePayload::Message(MessagePayload::status("hi")));
        assert_eq!(text, "hi");
        let text = payload_text(&ResponsePayload::Feedback(FeedbackPayload {
            feedback_items: Vec::new(),
            overall_assessment: Some("good".into()),
            suggested_next_step: None,
        }));
        assert_eq!(text, "good");
    }
}
