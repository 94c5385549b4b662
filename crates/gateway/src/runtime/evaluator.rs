//! The deterministic answer path: when the client sends an `answer` event
//! and a quiz question is pending, the runtime bypasses the LLM entirely.
//! This path never consumes high-cost budget and never triggers a new LLM
//! call.

use serde_json::Value;

use tg_domain::chat::ChatMessage;
use tg_domain::context::{PedagogicalAction, TutorContext};
use tg_domain::error::{Error, Result};
use tg_domain::response::{ContentType, InteractionResponse, ResponsePayload};
use tg_skills::SkillOutput;

use super::executor::{finish_turn, ExecutorDeps, TurnIo};

pub async fn run_deterministic_answer(
    deps: &ExecutorDeps,
    ctx: &mut TutorContext,
    io: &TurnIo,
    answer_index: usize,
    question_id: Option<String>,
) -> Result<()> {
    // Fall back to the drawing id recorded when the question was asked.
    let question_id = question_id.or_else(|| {
        ctx.user_model_state
            .pending_interaction_details
            .as_ref()
            .and_then(|d| d.get("question_id"))
            .and_then(Value::as_str)
            .map(str::to_owned)
    });

    let args = serde_json::json!({
        "user_answer_index": answer_index,
        "question_id": question_id,
    });

    match deps
        .skills
        .invoke("evaluate_quiz", ctx, &deps.services, args)
        .await
    {
        Ok(SkillOutput::Feedback { payload, actions }) => {
            ctx.last_pedagogical_action = Some(PedagogicalAction::Evaluated);

            // Simulated assistant tool call so the LLM has context for the
            // next turn even though it never ran.
            let feedback_text = payload
                .feedback_items
                .first()
                .map(|item| item.explanation.clone())
                .unwrap_or_default();
            let simulated = serde_json::json!({
                "name": "feedback",
                "args": { "text": feedback_text },
            });
            ctx.history
                .push(ChatMessage::assistant(simulated.to_string()));

            let envelope = InteractionResponse::new(
                ContentType::Feedback,
                ResponsePayload::Feedback(payload),
                ctx.user_model_state.clone(),
            )
            .with_actions(actions.clone());
            finish_turn(deps, ctx, io, envelope, actions).await
        }
        Ok(other) => Err(Error::Executor(format!(
            "evaluate_quiz returned an unexpected output shape: {other:?}"
        ))),
        Err(Error::ToolInput(detail)) => {
            // Unlike the executor path, a bad answer index is surfaced to
            // the learner; the pending question is preserved for a retry.
            tracing::info!(detail, "answer rejected");
            let envelope = InteractionResponse::error(
                "TOOL_INPUT_VALIDATION_ERROR",
                "That answer choice is not valid for this question.",
                Some(detail),
                ctx.user_model_state.clone(),
            );
            io.send_json(&envelope).await;
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "deterministic evaluation failed");
            let envelope = InteractionResponse::error(
                "EVALUATION_ERROR",
                "I couldn't evaluate that answer.",
                Some(e.to_string()),
                ctx.user_model_state.clone(),
            );
            io.send_json(&envelope).await;
            Ok(())
        }
    }
}
