//! The process-wide skill registry.
//!
//! Built once at startup from plain function pointers; read-only afterward.
//! Dispatch threads the per-session tutor context and the shared layout
//! services into the skill explicitly.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use tg_domain::canvas::{CanvasObjectSpec, WhiteboardAction};
use tg_domain::context::TutorContext;
use tg_domain::error::{Error, Result};
use tg_domain::learner::LearnerState;
use tg_domain::response::{FeedbackPayload, MessagePayload};
use tg_whiteboard::{AllocatorMap, DocRegistry};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Output & cost
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What a skill hands back to the dispatcher.
#[derive(Debug, Clone)]
pub enum SkillOutput {
    /// Raw object specs; the caller wraps them into an ADD_OBJECTS action.
    Specs(Vec<CanvasObjectSpec>),
    Action(WhiteboardAction),
    Actions(Vec<WhiteboardAction>),
    /// A chat payload plus board actions (the `(payload, actions)` shape).
    Message {
        payload: MessagePayload,
        actions: Vec<WhiteboardAction>,
    },
    Feedback {
        payload: FeedbackPayload,
        actions: Vec<WhiteboardAction>,
    },
    State(LearnerState),
    Value(Value),
}

impl SkillOutput {
    /// Whiteboard actions carried by this output, wrapping bare specs.
    pub fn actions(&self) -> Vec<WhiteboardAction> {
        match self {
            SkillOutput::Specs(specs) => {
                if specs.is_empty() {
                    Vec::new()
                } else {
                    vec![WhiteboardAction::add(specs.clone())]
                }
            }
            SkillOutput::Action(a) => vec![a.clone()],
            SkillOutput::Actions(actions) => actions.clone(),
            SkillOutput::Message { actions, .. } | SkillOutput::Feedback { actions, .. } => {
                actions.clone()
            }
            SkillOutput::State(_) | SkillOutput::Value(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cost {
    Low,
    Medium,
    High,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Shared services skills may need besides the tutor context.
pub struct SkillCtxServices {
    pub allocators: Arc<AllocatorMap>,
    pub docs: Arc<DocRegistry>,
}

pub type SkillFuture<'a> = Pin<Box<dyn Future<Output = Result<SkillOutput>> + Send + 'a>>;

/// Every skill is a plain function: context + services + raw JSON args.
pub type SkillFn =
    for<'a> fn(&'a mut TutorContext, &'a SkillCtxServices, Value) -> SkillFuture<'a>;

pub struct SkillDescriptor {
    pub name: &'static str,
    pub cost: Cost,
    pub summary: &'static str,
    callable: SkillFn,
}

pub struct SkillRegistry {
    skills: BTreeMap<&'static str, SkillDescriptor>,
}

impl SkillRegistry {
    pub fn empty() -> Self {
        Self {
            skills: BTreeMap::new(),
        }
    }

    pub fn register(
        &mut self,
        name: &'static str,
        cost: Cost,
        summary: &'static str,
        callable: SkillFn,
    ) {
        self.skills.insert(
            name,
            SkillDescriptor {
                name,
                cost,
                summary,
                callable,
            },
        );
    }

    /// The full standard catalog.
    pub fn standard() -> Self {
        use crate::{board_ops, diagrams, drawing, evaluate, graph_latex, grouping, learner, mcq, pointer};

        let mut reg = Self::empty();
        reg.register(
            "update_user_model",
            Cost::Low,
            "Record an interaction outcome against a concept",
            learner::update_user_model,
        );
        reg.register(
            "evaluate_quiz",
            Cost::Low,
            "Deterministically evaluate the pending MCQ answer",
            evaluate::evaluate_quiz,
        );
        reg.register(
            "style_token",
            Cost::Low,
            "Resolve a semantic color token to a hex string",
            drawing::style_token,
        );
        reg.register(
            "draw_text",
            Cost::Low,
            "Draw a single text label",
            drawing::draw_text,
        );
        reg.register(
            "draw_shape",
            Cost::Low,
            "Draw a primitive shape (rect, circle, arrow)",
            drawing::draw_shape,
        );
        reg.register(
            "draw",
            Cost::Low,
            "Place a batch of objects on the board",
            board_ops::draw,
        );
        reg.register(
            "add_objects_to_board",
            Cost::Low,
            "Low-level placement of object specs",
            board_ops::add_objects_to_board,
        );
        reg.register(
            "update_object_on_board",
            Cost::Low,
            "Patch properties of an existing object",
            board_ops::update_object_on_board,
        );
        reg.register(
            "delete_object_on_board",
            Cost::Low,
            "Remove a single object",
            board_ops::delete_object_on_board,
        );
        reg.register(
            "find_object_on_board",
            Cost::Low,
            "Query board objects by metadata",
            board_ops::find_object_on_board,
        );
        reg.register(
            "draw_mcq_actions",
            Cost::Low,
            "Render a multiple-choice question",
            mcq::draw_mcq_actions,
        );
        reg.register(
            "draw_mcq_feedback",
            Cost::Low,
            "Color MCQ selectors after an answer",
            mcq::draw_mcq_feedback,
        );
        reg.register(
            "draw_table",
            Cost::Low,
            "Draw an allocator-placed table of headers and rows",
            diagrams::draw_table,
        );
        reg.register(
            "draw_flowchart",
            Cost::Low,
            "Draw a left-to-right flowchart from step labels",
            diagrams::draw_flowchart,
        );
        reg.register(
            "draw_axis",
            Cost::Low,
            "Draw an X/Y axis pair with arrow heads",
            diagrams::draw_axis,
        );
        reg.register(
            "draw_coordinate_plane",
            Cost::Low,
            "Draw a 2-D Cartesian plane",
            diagrams::draw_coordinate_plane,
        );
        reg.register(
            "draw_timeline",
            Cost::Low,
            "Draw a horizontal timeline of events",
            diagrams::draw_timeline,
        );
        reg.register(
            "draw_graph",
            Cost::Medium,
            "Auto-laid-out node/edge graph",
            graph_latex::draw_graph,
        );
        reg.register(
            "draw_latex",
            Cost::Low,
            "Render a LaTeX string as an SVG object",
            graph_latex::draw_latex,
        );
        reg.register(
            "clear_board",
            Cost::Low,
            "Erase all whiteboard content",
            pointer::clear_board,
        );
        reg.register(
            "highlight_object",
            Cost::Low,
            "Highlight an existing object",
            pointer::highlight_object,
        );
        reg.register(
            "show_pointer_at",
            Cost::Low,
            "Show the tutor pointer at a position",
            pointer::show_pointer_at,
        );
        reg.register(
            "group_objects",
            Cost::Low,
            "Group objects for joint manipulation",
            grouping::group_objects,
        );
        reg.register(
            "move_group",
            Cost::Low,
            "Move a group by canvas percentages",
            grouping::move_group,
        );
        reg.register(
            "delete_group",
            Cost::Low,
            "Delete a group and its members",
            grouping::delete_group,
        );
        reg.register(
            "get_board_state",
            Cost::Medium,
            "Fetch the current board object list",
            board_ops::get_board_state,
        );
        reg
    }

    pub fn list(&self) -> impl Iterator<Item = &SkillDescriptor> {
        self.skills.values()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.skills.contains_key(name)
    }

    pub fn cost_of(&self, name: &str) -> Option<Cost> {
        self.skills.get(name).map(|d| d.cost)
    }

    /// Dispatch a call to a registered skill.
    pub async fn invoke(
        &self,
        name: &str,
        ctx: &mut TutorContext,
        services: &SkillCtxServices,
        args: Value,
    ) -> Result<SkillOutput> {
        let descriptor = self
            .skills
            .get(name)
            .ok_or_else(|| Error::ToolNotFound(name.to_owned()))?;
        tracing::debug!(skill = name, "dispatching skill");
        (descriptor.callable)(ctx, services, args).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Deserialize skill arguments, mapping failures to [`Error::ToolInput`].
pub(crate) fn parse_args<T: DeserializeOwned>(skill: &str, args: Value) -> Result<T> {
    serde_json::from_value(args)
        .map_err(|e| Error::ToolInput(format!("Invalid arguments for {skill}: {e}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tg_domain::config::WhiteboardConfig;
    use tg_store::MemoryKv;
    use uuid::Uuid;

    pub(crate) fn test_services() -> SkillCtxServices {
        SkillCtxServices {
            allocators: Arc::new(AllocatorMap::new(WhiteboardConfig::default())),
            docs: Arc::new(DocRegistry::new(Arc::new(MemoryKv::new()))),
        }
    }

    #[tokio::test]
    async fn unknown_skill_is_tool_not_found() {
        let reg = SkillRegistry::standard();
        let mut ctx = TutorContext::new(Uuid::new_v4(), "u", None);
        let services = test_services();
        let err = reg
            .invoke("dance", &mut ctx, &services, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(_)));
    }

    #[test]
    fn standard_catalog_has_expected_names() {
        let reg = SkillRegistry::standard();
        for name in [
            "update_user_model",
            "draw",
            "draw_mcq_actions",
            "draw_mcq_feedback",
            "draw_graph",
            "draw_latex",
            "clear_board",
            "highlight_object",
            "show_pointer_at",
            "group_objects",
            "get_board_state",
            "evaluate_quiz",
        ] {
            assert!(reg.contains(name), "missing skill {name}");
        }
        assert_eq!(reg.cost_of("draw_graph"), Some(Cost::Medium));
        assert_eq!(reg.cost_of("draw_text"), Some(Cost::Low));
    }
}
