//! Attention skills (highlight, pointer) and board clearing.

use serde::Deserialize;
use serde_json::Value;

use tg_domain::canvas::WhiteboardAction;
use tg_domain::context::TutorContext;
use tg_domain::response::MessagePayload;

use crate::drawing::ColorToken;
use crate::registry::{parse_args, SkillCtxServices, SkillFuture, SkillOutput};

#[derive(Debug, Deserialize)]
struct HighlightObjectArgs {
    object_id: String,
    #[serde(default = "default_highlight_token")]
    color_token: ColorToken,
    #[serde(default)]
    pulse: bool,
}

fn default_highlight_token() -> ColorToken {
    ColorToken::Accent
}

/// Visually highlight an existing object.
pub fn highlight_object<'a>(
    _ctx: &'a mut TutorContext,
    _services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let args: HighlightObjectArgs = parse_args("highlight_object", args)?;
        Ok(SkillOutput::Action(WhiteboardAction::HighlightObject {
            target_object_id: args.object_id,
            color: args.color_token.hex().to_owned(),
            pulse: args.pulse,
        }))
    })
}

#[derive(Debug, Deserialize)]
struct ShowPointerArgs {
    x: f64,
    y: f64,
    #[serde(default)]
    pointer_id: Option<String>,
    #[serde(default = "default_pointer_duration")]
    duration_ms: u64,
    #[serde(default = "default_pointer_token")]
    color_token: ColorToken,
}

fn default_pointer_duration() -> u64 {
    3000
}
fn default_pointer_token() -> ColorToken {
    ColorToken::Primary
}

/// Show the tutor pointer at a canvas position. Reusing the same
/// `pointer_id` moves the existing pointer instead of spawning a new one.
pub fn show_pointer_at<'a>(
    _ctx: &'a mut TutorContext,
    _services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let args: ShowPointerArgs = parse_args("show_pointer_at", args)?;
        Ok(SkillOutput::Action(WhiteboardAction::ShowPointerAt {
            x: args.x,
            y: args.y,
            pointer_id: args.pointer_id,
            duration_ms: args.duration_ms,
            color: args.color_token.hex().to_owned(),
        }))
    })
}

/// Erase every object from the board.
pub fn clear_board<'a>(
    _ctx: &'a mut TutorContext,
    _services: &'a SkillCtxServices,
    _args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        Ok(SkillOutput::Message {
            payload: MessagePayload::status("Whiteboard cleared."),
            actions: vec![WhiteboardAction::ClearBoard],
        })
    })
}
