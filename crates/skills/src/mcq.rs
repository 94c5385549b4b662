//! MCQ rendering and answer-feedback coloring.
//!
//! `draw_mcq_actions` is the single source of MCQ layout: the executor
//! always routes `ask_question` through it so the object ids and roles the
//! front-end expects stay stable. For a given `(question_id, option count)`
//! the produced id set and metadata roles are identical across runs.

use serde::Deserialize;
use serde_json::Value;

use tg_domain::canvas::{CanvasObjectSpec, ObjectMetadata, ObjectUpdate, WhiteboardAction};
use tg_domain::context::TutorContext;
use tg_domain::error::Error;
use tg_domain::quiz::QuizQuestion;
use tg_whiteboard::{resolve_zone, ReserveRequest};

use crate::drawing::ColorToken;
use crate::registry::{parse_args, SkillCtxServices, SkillFuture, SkillOutput};

// Zone layout fractions.
const QUESTION_TEXT_HEIGHT_PCT_OF_ZONE: f64 = 0.25;
const OPTIONS_START_Y_PCT_OF_ZONE: f64 = 0.30;
const OPTION_HEIGHT_PCT_OF_ZONE: f64 = 0.15;
const OPTION_X_OFFSET_PCT: f64 = 0.02;
const OPTION_TEXT_X_OFFSET_PCT: f64 = 0.05;

// Allocator (absolute) layout constants.
const QUESTION_WIDTH: f64 = 700.0;
const OPTION_SPACING: f64 = 40.0;
const V_PADDING: f64 = 20.0;
const OPTION_START_OFFSET: f64 = 50.0;
const OPTION_X_OFFSET: f64 = 20.0;
const OPTION_TEXT_X_OFFSET: f64 = 25.0;
const RADIO_RADIUS: f64 = 8.0;

/// Total height of the MCQ block in the allocator layout.
pub fn mcq_block_height(num_options: usize) -> f64 {
    100.0 + num_options as f64 * OPTION_SPACING + V_PADDING
}

pub fn question_text_id(question_id: &str) -> String {
    format!("mcq-{question_id}-text")
}

pub fn option_selector_id(question_id: &str, option_id: usize) -> String {
    format!("mcq-{question_id}-opt-{option_id}-radio")
}

pub fn option_label_id(question_id: &str, option_id: usize) -> String {
    format!("mcq-{question_id}-opt-{option_id}-text")
}

pub fn feedback_text_id(question_id: &str) -> String {
    format!("mcq-{question_id}-feedback-text")
}

fn mcq_metadata(role: &str, question_id: &str, option_id: Option<usize>) -> ObjectMetadata {
    ObjectMetadata {
        source: Some("assistant".into()),
        role: Some(role.into()),
        question_id: Some(question_id.to_owned()),
        option_id: option_id.map(|i| i as u32),
        group_id: Some(question_id.to_owned()),
        ..Default::default()
    }
}

fn option_letter(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// draw_mcq_actions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct DrawMcqArgs {
    question: QuizQuestion,
    #[serde(default)]
    question_id: Option<String>,
    #[serde(default, alias = "template")]
    template_name: Option<String>,
    #[serde(default, alias = "zone")]
    zone_name: Option<String>,
}

pub fn draw_mcq_actions<'a>(
    ctx: &'a mut TutorContext,
    services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let args: DrawMcqArgs = parse_args("draw_mcq_actions", args)?;
        if args.question.options.is_empty() {
            return Err(Error::ToolInput(
                "draw_mcq_actions: question has no options".into(),
            ));
        }
        let question_id = args.question_id.clone().unwrap_or_else(|| "q1".into());

        // Zone placement when a resolvable template/zone is given.
        if let (Some(template), Some(zone)) = (&args.template_name, &args.zone_name) {
            if let Some(rect) = resolve_zone(template, zone) {
                tracing::info!(
                    question_id = %question_id,
                    template,
                    zone,
                    "placing MCQ within zone"
                );
                return Ok(SkillOutput::Specs(zone_layout(
                    &args.question,
                    &question_id,
                    rect,
                )));
            }
            tracing::warn!(
                template,
                zone,
                "zone resolution failed; falling back to allocator"
            );
        }

        let block_height = mcq_block_height(args.question.options.len());
        let placement = services
            .allocators
            .reserve_region(
                ctx.session_id,
                ReserveRequest {
                    group_id: Some(question_id.clone()),
                    ..ReserveRequest::flow(QUESTION_WIDTH as u32, block_height as u32)
                },
            )?
            .ok_or_else(|| {
                Error::Executor("draw_mcq_actions: allocator returned no space".into())
            })?;

        Ok(SkillOutput::Specs(absolute_layout(
            &args.question,
            &question_id,
            f64::from(placement.x),
            f64::from(placement.y),
        )))
    })
}

fn zone_layout(
    question: &QuizQuestion,
    question_id: &str,
    rect: tg_whiteboard::ZoneRect,
) -> Vec<CanvasObjectSpec> {
    let mut specs = Vec::new();

    let mut q = CanvasObjectSpec::new(question_text_id(question_id), "text");
    q.x_pct = Some(rect.x_pct);
    q.y_pct = Some(rect.y_pct);
    q.width_pct = Some(rect.width_pct);
    q.height_pct = Some(rect.height_pct * QUESTION_TEXT_HEIGHT_PCT_OF_ZONE);
    q.metadata = mcq_metadata("question", question_id, None);
    q.props
        .insert("text".into(), Value::String(question.question.clone()));
    q.props.insert("fontSize".into(), 18.into());
    q.props.insert("fill".into(), "#000000".into());
    specs.push(q);

    let num_options = question.options.len();
    let options_area_height = rect.height_pct * (1.0 - OPTIONS_START_Y_PCT_OF_ZONE);
    let slot_height = options_area_height / num_options as f64;
    let draw_height = slot_height.min(rect.height_pct * OPTION_HEIGHT_PCT_OF_ZONE);
    let mut y_offset = rect.height_pct * OPTIONS_START_Y_PCT_OF_ZONE;

    for (i, option_text) in question.options.iter().enumerate() {
        let option_y = rect.y_pct + y_offset;

        let mut radio =
            CanvasObjectSpec::new(option_selector_id(question_id, i), "circle");
        radio.x_pct = Some(rect.x_pct + rect.width_pct * OPTION_X_OFFSET_PCT);
        radio.y_pct = Some(option_y + draw_height / 2.0);
        radio.metadata = mcq_metadata("option_selector", question_id, Some(i));
        radio
            .props
            .insert("radius".into(), serde_json::json!(RADIO_RADIUS));
        radio.props.insert("stroke".into(), "#555555".into());
        radio.props.insert("strokeWidth".into(), 1.into());
        radio.props.insert("fill".into(), "#FFFFFF".into());
        specs.push(radio);

        let mut label = CanvasObjectSpec::new(option_label_id(question_id, i), "text");
        label.x_pct = Some(rect.x_pct + rect.width_pct * OPTION_TEXT_X_OFFSET_PCT);
        label.y_pct = Some(option_y);
        label.width_pct = Some(rect.width_pct * (1.0 - OPTION_TEXT_X_OFFSET_PCT));
        label.height_pct = Some(draw_height);
        label.metadata = mcq_metadata("option_label", question_id, Some(i));
        label.props.insert(
            "text".into(),
            Value::String(format!("{}. {option_text}", option_letter(i))),
        );
        label.props.insert("fontSize".into(), 16.into());
        label.props.insert("fill".into(), "#333333".into());
        specs.push(label);

        y_offset += slot_height;
    }

    specs
}

fn absolute_layout(
    question: &QuizQuestion,
    question_id: &str,
    origin_x: f64,
    origin_y: f64,
) -> Vec<CanvasObjectSpec> {
    let mut specs = Vec::new();

    let mut q = CanvasObjectSpec::new(question_text_id(question_id), "text");
    q.x = Some(origin_x);
    q.y = Some(origin_y);
    q.width = Some(QUESTION_WIDTH);
    q.metadata = mcq_metadata("question", question_id, None);
    q.props
        .insert("text".into(), Value::String(question.question.clone()));
    q.props.insert("fontSize".into(), 18.into());
    q.props.insert("fill".into(), "#000000".into());
    specs.push(q);

    let mut current_y = origin_y + OPTION_START_OFFSET;
    for (i, option_text) in question.options.iter().enumerate() {
        let mut radio =
            CanvasObjectSpec::new(option_selector_id(question_id, i), "circle");
        radio.x = Some(origin_x + OPTION_X_OFFSET);
        radio.y = Some(current_y + RADIO_RADIUS);
        radio.metadata = mcq_metadata("option_selector", question_id, Some(i));
        radio
            .props
            .insert("radius".into(), serde_json::json!(RADIO_RADIUS));
        radio.props.insert("stroke".into(), "#555555".into());
        radio.props.insert("strokeWidth".into(), 1.into());
        radio.props.insert("fill".into(), "#FFFFFF".into());
        specs.push(radio);

        let mut label = CanvasObjectSpec::new(option_label_id(question_id, i), "text");
        label.x = Some(origin_x + OPTION_X_OFFSET + OPTION_TEXT_X_OFFSET);
        label.y = Some(current_y + RADIO_RADIUS);
        label.metadata = mcq_metadata("option_label", question_id, Some(i));
        label.props.insert(
            "text".into(),
            Value::String(format!("{}. {option_text}", option_letter(i))),
        );
        label.props.insert("fontSize".into(), 16.into());
        label.props.insert("fill".into(), "#333333".into());
        specs.push(label);

        current_y += OPTION_SPACING;
    }

    specs
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// draw_mcq_feedback
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct McqFeedbackArgs {
    question_id: String,
    /// 0-based index of the learner's selected option.
    option_id: usize,
    is_correct: bool,
    num_options: usize,
}

/// Color the selected selector (success or error) and mute the rest.
pub fn draw_mcq_feedback<'a>(
    _ctx: &'a mut TutorContext,
    _services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let args: McqFeedbackArgs = parse_args("draw_mcq_feedback", args)?;
        if args.option_id >= args.num_options {
            return Err(Error::ToolInput(format!(
                "draw_mcq_feedback: option_id {} out of range for {} options",
                args.option_id, args.num_options
            )));
        }
        Ok(SkillOutput::Action(feedback_updates(&args)))
    })
}

fn feedback_updates(args: &McqFeedbackArgs) -> WhiteboardAction {
    let selected_color = if args.is_correct {
        ColorToken::Success.hex()
    } else {
        ColorToken::Error.hex()
    };

    let mut updates = Vec::new();
    for i in 0..args.num_options {
        let mut patch = serde_json::Map::new();
        if i == args.option_id {
            patch.insert("fill".into(), selected_color.into());
            patch.insert("stroke".into(), selected_color.into());
        } else {
            patch.insert("stroke".into(), ColorToken::Muted.hex().into());
        }
        updates.push(ObjectUpdate {
            object_id: option_selector_id(&args.question_id, i),
            updates: patch,
        });
    }
    WhiteboardAction::UpdateObjects { objects: updates }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::test_services;
    use uuid::Uuid;

    fn question(options: usize) -> QuizQuestion {
        QuizQuestion {
            question: "Inputs of photosynthesis?".into(),
            options: (0..options).map(|i| format!("option {i}")).collect(),
            correct_answer_index: 0,
            explanation: "CO2 + H2O + light.".into(),
            difficulty: "Easy".into(),
            related_section: "Photosynthesis".into(),
        }
    }

    fn ctx() -> TutorContext {
        TutorContext::new(Uuid::new_v4(), "u", None)
    }

    fn specs_of(out: SkillOutput) -> Vec<CanvasObjectSpec> {
        match out {
            SkillOutput::Specs(specs) => specs,
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[tokio::test]
    async fn allocator_layout_emits_question_and_option_pairs() {
        let services = test_services();
        let mut c = ctx();
        let args = serde_json::json!({
            "question": question(4),
            "question_id": "q1",
        });
        let specs = specs_of(draw_mcq_actions(&mut c, &services, args).await.unwrap());

        assert_eq!(specs.len(), 9);
        assert_eq!(specs[0].metadata.role.as_deref(), Some("question"));
        let selectors: Vec<&CanvasObjectSpec> = specs
            .iter()
            .filter(|s| s.metadata.role.as_deref() == Some("option_selector"))
            .collect();
        let labels: Vec<&CanvasObjectSpec> = specs
            .iter()
            .filter(|s| s.metadata.role.as_deref() == Some("option_label"))
            .collect();
        assert_eq!(selectors.len(), 4);
        assert_eq!(labels.len(), 4);
        assert!(selectors.iter().all(|s| s.kind == "circle"));
        assert!(labels.iter().all(|s| s.kind == "text"));
        assert!(specs
            .iter()
            .all(|s| s.metadata.group_id.as_deref() == Some("q1")));
    }

    #[tokio::test]
    async fn id_and_role_sets_are_stable_across_runs() {
        let services = test_services();
        let args = serde_json::json!({"question": question(3), "question_id": "quiz-7"});

        let mut c1 = ctx();
        let first: Vec<(String, Option<String>)> =
            specs_of(draw_mcq_actions(&mut c1, &services, args.clone()).await.unwrap())
                .into_iter()
                .map(|s| (s.id, s.metadata.role))
                .collect();
        let mut c2 = ctx();
        let second: Vec<(String, Option<String>)> =
            specs_of(draw_mcq_actions(&mut c2, &services, args).await.unwrap())
                .into_iter()
                .map(|s| (s.id, s.metadata.role))
                .collect();
        assert_eq!(first, second);
        assert!(first.iter().any(|(id, _)| id == "mcq-quiz-7-opt-2-radio"));
    }

    #[tokio::test]
    async fn zone_layout_uses_percentages() {
        let services = test_services();
        let mut c = ctx();
        let args = serde_json::json!({
            "question": question(2),
            "question_id": "q1",
            "template": "default_board",
            "zone": "question_area",
        });
        let specs = specs_of(draw_mcq_actions(&mut c, &services, args).await.unwrap());
        assert!(specs.iter().all(|s| s.x_pct.is_some() || s.y_pct.is_some()));
        assert!(specs.iter().all(|s| s.x.is_none()));
        // Question sits at the zone origin.
        assert_eq!(specs[0].x_pct, Some(0.05));
        assert_eq!(specs[0].y_pct, Some(0.05));
    }

    #[tokio::test]
    async fn unknown_zone_falls_back_to_allocator() {
        let services = test_services();
        let mut c = ctx();
        let args = serde_json::json!({
            "question": question(2),
            "template": "default_board",
            "zone": "nope",
        });
        let specs = specs_of(draw_mcq_actions(&mut c, &services, args).await.unwrap());
        assert!(specs[0].x.is_some());
    }

    #[tokio::test]
    async fn feedback_colors_selected_and_mutes_rest() {
        let services = test_services();
        let mut c = ctx();
        let out = draw_mcq_feedback(
            &mut c,
            &services,
            serde_json::json!({
                "question_id": "q1",
                "option_id": 0,
                "is_correct": true,
                "num_options": 3,
            }),
        )
        .await
        .unwrap();
        let updates = match out {
            SkillOutput::Action(WhiteboardAction::UpdateObjects { objects }) => objects,
            other => panic!("unexpected: {other:?}"),
        };
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].object_id, "mcq-q1-opt-0-radio");
        assert_eq!(updates[0].updates["fill"], "#2ECC71");
        assert_eq!(updates[1].updates["stroke"], "#9E9E9E");
        assert!(updates[1].updates.get("fill").is_none());
    }

    #[tokio::test]
    async fn feedback_out_of_range_rejected() {
        let services = test_services();
        let mut c = ctx();
        let err = draw_mcq_feedback(
            &mut c,
            &services,
            serde_json::json!({
                "question_id": "q1",
                "option_id": 7,
                "is_correct": false,
                "num_options": 4,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::ToolInput(_)));
    }
}
