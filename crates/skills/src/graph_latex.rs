//! Graph and LaTeX objects: both are single rich objects the front-end
//! renders (`graph_layout` carries a layout spec, `latex_svg` carries the
//! LaTeX source).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tg_domain::canvas::{CanvasObjectSpec, ObjectMetadata, WhiteboardAction};
use tg_domain::context::TutorContext;
use tg_domain::error::Error;
use tg_domain::response::MessagePayload;

use crate::registry::{parse_args, SkillCtxServices, SkillFuture, SkillOutput};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// draw_graph
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    pub width: f64,
    pub height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DrawGraphArgs {
    graph_id: String,
    nodes: Vec<NodeSpec>,
    edges: Vec<EdgeSpec>,
    #[serde(default = "default_layout_type")]
    layout_type: String,
    #[serde(default)]
    x: Option<f64>,
    #[serde(default)]
    y: Option<f64>,
    #[serde(default, rename = "xPct")]
    x_pct: Option<f64>,
    #[serde(default, rename = "yPct")]
    y_pct: Option<f64>,
}

fn default_layout_type() -> String {
    "elk".into()
}

/// Clear the board and add one auto-laid-out `graph_layout` object.
pub fn draw_graph<'a>(
    _ctx: &'a mut TutorContext,
    _services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let args: DrawGraphArgs = parse_args("draw_graph", args)?;
        if args.nodes.is_empty() {
            return Err(Error::ToolInput(
                "draw_graph: at least one node is required".into(),
            ));
        }
        let node_ids: Vec<&str> = args.nodes.iter().map(|n| n.id.as_str()).collect();
        for edge in &args.edges {
            if !node_ids.contains(&edge.source.as_str())
                || !node_ids.contains(&edge.target.as_str())
            {
                return Err(Error::ToolInput(format!(
                    "draw_graph: edge '{}' references an unknown node",
                    edge.id
                )));
            }
        }

        let mut spec = CanvasObjectSpec::new(args.graph_id.clone(), "graph_layout");
        spec.x = args.x;
        spec.y = args.y;
        spec.x_pct = args.x_pct;
        spec.y_pct = args.y_pct;
        spec.metadata = ObjectMetadata::assistant();
        spec.metadata.extra.insert(
            "layoutSpec".into(),
            serde_json::json!({
                "nodes": args.nodes,
                "edges": args.edges,
                "layoutType": args.layout_type,
            }),
        );
        // The rendered graph is a single non-interactive unit.
        spec.props.insert("selectable".into(), false.into());
        spec.props.insert("evented".into(), false.into());
        spec.props.insert("hasControls".into(), false.into());

        let payload = MessagePayload::status(format!(
            "Cleared the board and generated graph '{}'.",
            args.graph_id
        ));
        Ok(SkillOutput::Message {
            payload,
            actions: vec![
                WhiteboardAction::ClearBoard,
                WhiteboardAction::add(vec![spec]),
            ],
        })
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// draw_latex
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct DrawLatexArgs {
    object_id: String,
    latex_string: String,
    #[serde(default)]
    x: Option<f64>,
    #[serde(default)]
    y: Option<f64>,
    #[serde(default, rename = "xPct")]
    x_pct: Option<f64>,
    #[serde(default, rename = "yPct")]
    y_pct: Option<f64>,
}

pub fn draw_latex<'a>(
    _ctx: &'a mut TutorContext,
    _services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let args: DrawLatexArgs = parse_args("draw_latex", args)?;
        if args.latex_string.trim().is_empty() {
            return Err(Error::ToolInput(
                "draw_latex: latex_string must not be empty".into(),
            ));
        }

        let mut spec = CanvasObjectSpec::new(args.object_id.clone(), "latex_svg");
        spec.x = args.x;
        spec.y = args.y;
        spec.x_pct = args.x_pct;
        spec.y_pct = args.y_pct;
        spec.metadata = ObjectMetadata::assistant();
        spec.metadata
            .extra
            .insert("latex".into(), Value::String(args.latex_string));

        Ok(SkillOutput::Action(WhiteboardAction::add(vec![spec])))
    })
}
