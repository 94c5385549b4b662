//! Deterministic MCQ evaluation.
//!
//! Evaluates the learner's answer against the quiz question stored on the
//! context without any LLM involvement: range-check, compare, color the
//! selectors, append the explanation text, update the learner model, and
//! clear the pending question.

use serde::Deserialize;
use serde_json::Value;

use tg_domain::canvas::{CanvasObjectSpec, WhiteboardAction};
use tg_domain::context::TutorContext;
use tg_domain::error::Error;
use tg_domain::learner::InteractionOutcome;
use tg_domain::quiz::QuizFeedbackItem;
use tg_domain::response::FeedbackPayload;

use crate::learner::apply_typed_outcome;
use crate::mcq::{self, mcq_block_height};
use crate::registry::{parse_args, SkillCtxServices, SkillFuture, SkillOutput};

const FEEDBACK_MARGIN_TOP: f64 = 20.0;
const QUESTION_WIDTH: f64 = 700.0;

#[derive(Debug, Deserialize)]
struct EvaluateQuizArgs {
    /// 0-based index of the learner's selected answer.
    user_answer_index: usize,
    /// Drawing question id used for the feedback objects.
    #[serde(default)]
    question_id: Option<String>,
}

pub fn evaluate_quiz<'a>(
    ctx: &'a mut TutorContext,
    services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let args: EvaluateQuizArgs = parse_args("evaluate_quiz", args)?;

        let question = ctx
            .current_quiz_question
            .clone()
            .ok_or_else(|| Error::Executor("no quiz question pending evaluation".into()))?;

        // Out-of-range answers are an input error; the pending question is
        // preserved so the learner can answer again.
        if args.user_answer_index >= question.options.len() {
            return Err(Error::ToolInput(format!(
                "Selected answer index ({}) is out of bounds for question options (count={})",
                args.user_answer_index,
                question.options.len()
            )));
        }

        let is_correct = args.user_answer_index == question.correct_answer_index;
        let selected_option = question.options[args.user_answer_index].clone();
        let correct_option = question.options[question.correct_answer_index].clone();
        let improvement = if is_correct {
            "Great work!".to_owned()
        } else {
            "Consider reviewing the explanation and related concepts.".to_owned()
        };

        let question_id = args.question_id.clone().unwrap_or_else(|| "q1".into());

        // Selector recoloring via the feedback drawing skill.
        let mut actions = Vec::new();
        let feedback_args = serde_json::json!({
            "question_id": question_id,
            "option_id": args.user_answer_index,
            "is_correct": is_correct,
            "num_options": question.options.len(),
        });
        match mcq::draw_mcq_feedback(ctx, services, feedback_args).await {
            Ok(out) => actions.extend(out.actions()),
            Err(e) => {
                tracing::error!(error = %e, "draw_mcq_feedback failed; continuing without recolor");
            }
        }

        // Explanation text under the MCQ block.
        let feedback_y =
            mcq_block_height(question.options.len()) + FEEDBACK_MARGIN_TOP;
        let mut text = CanvasObjectSpec::new(mcq::feedback_text_id(&question_id), "text");
        text.x = Some(0.0);
        text.y = Some(feedback_y);
        text.width = Some(QUESTION_WIDTH);
        text.metadata.source = Some("assistant".into());
        text.metadata.role = Some("mcq_feedback_text".into());
        text.metadata.question_id = Some(question_id.clone());
        text.metadata.group_id = Some(question_id.clone());
        text.props.insert(
            "text".into(),
            Value::String(format!(
                "Explanation: {}\n\nSuggestion: {improvement}",
                question.explanation
            )),
        );
        text.props.insert("fontSize".into(), 16.into());
        text.props.insert("fill".into(), "#333333".into());
        actions.push(WhiteboardAction::add(vec![text]));

        // Mastery update on the question's topic.
        let topic = if question.related_section.is_empty() {
            "general".to_owned()
        } else {
            question.related_section.clone()
        };
        let outcome = if is_correct {
            InteractionOutcome::Correct
        } else {
            InteractionOutcome::Incorrect
        };
        let details = format!(
            "Answered MCQ '{}' with option '{selected_option}'.",
            truncate(&question.question, 50)
        );
        apply_typed_outcome(ctx, &topic, outcome, Some(&details));

        // The question is consumed; clear resume state.
        ctx.current_quiz_question = None;
        ctx.pending_interaction_type = None;
        ctx.user_model_state.pending_interaction_type = None;
        ctx.user_model_state.pending_interaction_details = None;

        let payload = FeedbackPayload {
            feedback_items: vec![QuizFeedbackItem {
                question_index: 0,
                question_text: question.question.clone(),
                user_selected_option: selected_option,
                is_correct,
                correct_option,
                explanation: question.explanation.clone(),
                improvement_suggestion: improvement,
            }],
            overall_assessment: None,
            suggested_next_step: None,
        };

        Ok(SkillOutput::Feedback { payload, actions })
    })
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_owned()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
