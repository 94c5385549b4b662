//! Canvas object specs and whiteboard actions.
//!
//! These types are the wire contract with the front-end canvas renderer:
//! field names follow the frontend's camelCase conventions where the
//! original protocol does (`xPct`, `groupId`, `objectIds`, …) and stay
//! snake_case where the executor prompt uses snake_case (anchor arguments).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SOURCE_ASSISTANT: &str = "assistant";
pub const SOURCE_USER: &str = "user";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Object metadata
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Structured metadata attached to a canvas object. Unknown keys are kept in
/// `extra` so learner- and model-authored fields survive round-trips.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Pedagogical role: `question`, `option_selector`, `option_label`,
    /// `mcq_feedback_text`, `question_tag`, `label`, …
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_tags: Option<Vec<String>>,
    /// Absolute bounding box `(x, y, w, h)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    #[serde(
        default,
        rename = "groupId",
        skip_serializing_if = "Option::is_none"
    )]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_id: Option<u32>,
    /// ID of another object this one annotates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_to: Option<String>,
    /// Expiry for ephemeral objects, milliseconds since the epoch.
    #[serde(
        default,
        rename = "expiresAt",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ObjectMetadata {
    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.role.is_none()
            && self.semantic_tags.is_none()
            && self.bbox.is_none()
            && self.group_id.is_none()
            && self.concept.is_none()
            && self.question_id.is_none()
            && self.option_id.is_none()
            && self.linked_to.is_none()
            && self.expires_at.is_none()
            && self.extra.is_empty()
    }

    pub fn assistant() -> Self {
        Self {
            source: Some(SOURCE_ASSISTANT.into()),
            ..Default::default()
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Canvas object spec
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Declarative description of a single object on the board.
///
/// Coordinates come in two flavors: absolute pixels (`x`, `y`, `width`,
/// `height`) or canvas percentages in [0, 1] (`xPct` … `heightPct`). Style
/// and kind-specific properties (text, fill, radius, points, fontSize, …)
/// live in the flattened `props` map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasObjectSpec {
    pub id: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, rename = "xPct", skip_serializing_if = "Option::is_none")]
    pub x_pct: Option<f64>,
    #[serde(default, rename = "yPct", skip_serializing_if = "Option::is_none")]
    pub y_pct: Option<f64>,
    #[serde(
        default,
        rename = "widthPct",
        skip_serializing_if = "Option::is_none"
    )]
    pub width_pct: Option<f64>,
    #[serde(
        default,
        rename = "heightPct",
        skip_serializing_if = "Option::is_none"
    )]
    pub height_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "ObjectMetadata::is_empty")]
    pub metadata: ObjectMetadata,
    #[serde(flatten)]
    pub props: Map<String, Value>,
}

impl CanvasObjectSpec {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            x: None,
            y: None,
            width: None,
            height: None,
            x_pct: None,
            y_pct: None,
            width_pct: None,
            height_pct: None,
            metadata: ObjectMetadata::default(),
            props: Map::new(),
        }
    }

    pub fn prop(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.props.insert(key.to_owned(), value.into());
        self
    }

    /// Absolute bounding box, from metadata.bbox when present, otherwise
    /// from the absolute coordinate fields.
    pub fn abs_bbox(&self) -> Option<[f64; 4]> {
        if let Some(b) = self.metadata.bbox {
            return Some(b);
        }
        match (self.x, self.y) {
            (Some(x), Some(y)) => Some([
                x,
                y,
                self.width.unwrap_or(0.0),
                self.height.unwrap_or(0.0),
            ]),
            _ => None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Whiteboard actions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single partial update applied to an existing object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectUpdate {
    #[serde(rename = "objectId")]
    pub object_id: String,
    pub updates: Map<String, Value>,
}

/// One instruction for the front-end canvas (and the server-side doc mirror).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WhiteboardAction {
    #[serde(rename = "ADD_OBJECTS")]
    AddObjects {
        objects: Vec<CanvasObjectSpec>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        strategy: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        anchor_object_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        anchor_edge_x: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        object_edge_x: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        anchor_edge_y: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        object_edge_y: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offset_x_pct: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offset_y_pct: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        template: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        zone: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_id: Option<String>,
    },
    #[serde(rename = "UPDATE_OBJECTS")]
    UpdateObjects { objects: Vec<ObjectUpdate> },
    #[serde(rename = "DELETE_OBJECTS")]
    DeleteObjects {
        #[serde(rename = "objectIds")]
        object_ids: Vec<String>,
    },
    #[serde(rename = "CLEAR_BOARD")]
    ClearBoard,
    #[serde(rename = "GROUP_OBJECTS")]
    GroupObjects {
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(rename = "objectIds")]
        object_ids: Vec<String>,
    },
    #[serde(rename = "MOVE_GROUP")]
    MoveGroup {
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(rename = "dxPct")]
        dx_pct: f64,
        #[serde(rename = "dyPct")]
        dy_pct: f64,
    },
    #[serde(rename = "DELETE_GROUP")]
    DeleteGroup {
        #[serde(rename = "groupId")]
        group_id: String,
    },
    #[serde(rename = "HIGHLIGHT_OBJECT")]
    HighlightObject {
        #[serde(rename = "targetObjectId")]
        target_object_id: String,
        color: String,
        pulse: bool,
    },
    #[serde(rename = "SHOW_POINTER_AT")]
    ShowPointerAt {
        x: f64,
        y: f64,
        #[serde(
            default,
            rename = "pointerId",
            skip_serializing_if = "Option::is_none"
        )]
        pointer_id: Option<String>,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
        color: String,
    },
}

impl WhiteboardAction {
    /// Plain ADD_OBJECTS with no placement hints.
    pub fn add(objects: Vec<CanvasObjectSpec>) -> Self {
        WhiteboardAction::AddObjects {
            objects,
            strategy: None,
            anchor_object_id: None,
            anchor_edge_x: None,
            object_edge_x: None,
            anchor_edge_y: None,
            object_edge_y: None,
            offset_x_pct: None,
            offset_y_pct: None,
            template: None,
            zone: None,
            group_id: None,
        }
    }
}
