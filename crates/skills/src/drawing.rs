//! Primitive drawing skills: text labels, basic shapes, and the semantic
//! color palette.
//!
//! Deterministic-id rule: when the caller supplies no object id, one is
//! minted with UUIDv5 over a fixed namespace and a name derived from the
//! kind plus key properties, so identical inputs always produce identical
//! ids.

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use tg_domain::canvas::{CanvasObjectSpec, ObjectMetadata};
use tg_domain::context::TutorContext;

use crate::registry::{parse_args, SkillCtxServices, SkillFuture, SkillOutput};

/// Namespace for deterministic assistant-drawn object ids.
pub const DRAWING_NAMESPACE: Uuid = Uuid::from_bytes([
    0xa1, 0xe5, 0xa9, 0x7a, 0x72, 0x78, 0x47, 0xce, 0x86, 0x1d, 0x80, 0x97, 0x1e, 0x00, 0xde,
    0x60,
]);

/// Mint a stable id from a descriptive name string.
pub fn deterministic_id(name: &str) -> String {
    Uuid::new_v5(&DRAWING_NAMESPACE, name.as_bytes()).to_string()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Palette
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Semantic color tokens, loosely mirroring the front-end theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorToken {
    #[default]
    Default,
    Primary,
    Accent,
    Muted,
    Success,
    Error,
}

impl ColorToken {
    pub fn hex(&self) -> &'static str {
        match self {
            ColorToken::Default => "#000000",
            ColorToken::Primary => "#1976D2",
            ColorToken::Accent => "#FF5722",
            ColorToken::Muted => "#9E9E9E",
            ColorToken::Success => "#2ECC71",
            ColorToken::Error => "#E74C3C",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ColorToken::Default => "default",
            ColorToken::Primary => "primary",
            ColorToken::Accent => "accent",
            ColorToken::Muted => "muted",
            ColorToken::Success => "success",
            ColorToken::Error => "error",
        }
    }
}

/// Fallback position until the caller routes through the allocator.
fn fallback_position() -> (f64, f64) {
    (100.0, 100.0)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// style_token
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct StyleTokenArgs {
    token: ColorToken,
}

pub fn style_token<'a>(
    _ctx: &'a mut TutorContext,
    _services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let args: StyleTokenArgs = parse_args("style_token", args)?;
        Ok(SkillOutput::Value(Value::String(args.token.hex().into())))
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// draw_text
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct DrawTextArgs {
    #[serde(default)]
    id: Option<String>,
    text: String,
    #[serde(default)]
    x: Option<f64>,
    #[serde(default)]
    y: Option<f64>,
    #[serde(default, rename = "fontSize")]
    font_size: Option<u32>,
    #[serde(default)]
    width: Option<f64>,
    #[serde(default)]
    color_token: ColorToken,
    #[serde(default)]
    custom_metadata: Option<ObjectMetadata>,
}

pub fn draw_text<'a>(
    _ctx: &'a mut TutorContext,
    _services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let args: DrawTextArgs = parse_args("draw_text", args)?;
        if args.text.trim().is_empty() {
            return Err(tg_domain::error::Error::ToolInput(
                "draw_text: 'text' must not be empty".into(),
            ));
        }
        Ok(SkillOutput::Specs(vec![text_spec(&args)]))
    })
}

fn text_spec(args: &DrawTextArgs) -> CanvasObjectSpec {
    let id = args.id.clone().unwrap_or_else(|| {
        deterministic_id(&format!("text-{}-{}", args.text, args.color_token.name()))
    });

    let (x, y) = match (args.x, args.y) {
        (Some(x), Some(y)) => (x, y),
        _ => fallback_position(),
    };
    let bbox_w = args.width.unwrap_or(100.0);
    let bbox_h = args.font_size.map(f64::from).unwrap_or(20.0);

    let mut metadata = match &args.custom_metadata {
        Some(custom) => custom.clone(),
        None => ObjectMetadata::default(),
    };
    metadata.source = Some("assistant".into());
    metadata.bbox = Some([x, y, bbox_w, bbox_h]);

    let mut spec = CanvasObjectSpec::new(id, "text");
    spec.x = Some(x);
    spec.y = Some(y);
    spec.metadata = metadata;
    spec.props
        .insert("text".into(), Value::String(args.text.clone()));
    if let Some(size) = args.font_size {
        spec.props.insert("fontSize".into(), serde_json::json!(size));
    }
    if let Some(width) = args.width {
        spec.width = Some(width);
    }
    spec.props.insert(
        "fill".into(),
        Value::String(args.color_token.hex().into()),
    );
    spec
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// draw_shape
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct PointSpec {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct DrawShapeArgs {
    #[serde(default)]
    id: Option<String>,
    kind: ShapeKind,
    #[serde(default)]
    x: Option<f64>,
    #[serde(default)]
    y: Option<f64>,
    #[serde(default)]
    w: Option<f64>,
    #[serde(default)]
    h: Option<f64>,
    #[serde(default)]
    radius: Option<f64>,
    #[serde(default)]
    points: Option<Vec<PointSpec>>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    color_token: ColorToken,
    #[serde(default)]
    custom_metadata: Option<ObjectMetadata>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ShapeKind {
    Rect,
    Circle,
    Arrow,
}

pub fn draw_shape<'a>(
    _ctx: &'a mut TutorContext,
    _services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let args: DrawShapeArgs = parse_args("draw_shape", args)?;
        Ok(SkillOutput::Specs(shape_specs(&args)))
    })
}

fn shape_specs(args: &DrawShapeArgs) -> Vec<CanvasObjectSpec> {
    let id = args.id.clone().unwrap_or_else(|| {
        let mut name_parts = vec![match args.kind {
            ShapeKind::Rect => "rect".to_owned(),
            ShapeKind::Circle => "circle".to_owned(),
            ShapeKind::Arrow => "arrow".to_owned(),
        }];
        if args.kind == ShapeKind::Arrow {
            if let Some(points) = &args.points {
                name_parts.push(
                    points
                        .iter()
                        .map(|p| format!("{},{}", p.x, p.y))
                        .collect::<Vec<_>>()
                        .join(","),
                );
            }
        }
        deterministic_id(&format!(
            "shape-{}-{}",
            name_parts.join("-"),
            args.color_token.name()
        ))
    });

    // Work out the shape footprint for the bbox.
    let (mut x, mut y) = match (args.x, args.y) {
        (Some(x), Some(y)) => (x, y),
        _ => fallback_position(),
    };
    let (shape_w, shape_h) = match args.kind {
        ShapeKind::Circle => {
            let d = args.radius.map(|r| r * 2.0).unwrap_or(60.0);
            (d, d)
        }
        ShapeKind::Arrow => match &args.points {
            Some(points) if points.len() >= 2 => {
                let min_x = points.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
                let max_x = points.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
                let min_y = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
                let max_y = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
                x = min_x;
                y = min_y;
                (max_x - min_x, max_y - min_y)
            }
            _ => (args.w.unwrap_or(60.0), args.h.unwrap_or(2.0)),
        },
        ShapeKind::Rect => (args.w.unwrap_or(100.0), args.h.unwrap_or(60.0)),
    };

    let stroke = args.color_token.hex();
    let mut metadata = match &args.custom_metadata {
        Some(custom) => custom.clone(),
        None => ObjectMetadata::default(),
    };
    metadata.source = Some("assistant".into());
    metadata.bbox = Some([x, y, shape_w, shape_h]);

    let mut specs = Vec::new();
    match args.kind {
        ShapeKind::Rect => {
            let mut spec = CanvasObjectSpec::new(id.clone(), "rect");
            spec.x = Some(x);
            spec.y = Some(y);
            spec.width = Some(shape_w);
            spec.height = Some(shape_h);
            spec.metadata = metadata.clone();
            spec.props.insert("stroke".into(), stroke.into());
            spec.props.insert("strokeWidth".into(), 2.into());
            spec.props.insert("fill".into(), "#FFFFFF".into());
            specs.push(spec);
        }
        ShapeKind::Circle => {
            let mut spec = CanvasObjectSpec::new(id.clone(), "circle");
            // Circle coordinates are the center point.
            spec.x = Some(x + shape_w / 2.0);
            spec.y = Some(y + shape_h / 2.0);
            spec.metadata = metadata.clone();
            spec.props
                .insert("radius".into(), serde_json::json!(shape_w / 2.0));
            spec.props.insert("stroke".into(), stroke.into());
            spec.props.insert("strokeWidth".into(), 2.into());
            spec.props.insert("fill".into(), "#FFFFFF".into());
            specs.push(spec);
        }
        ShapeKind::Arrow => {
            let flat_points: Vec<f64> = match &args.points {
                Some(points) => points.iter().flat_map(|p| [p.x, p.y]).collect(),
                None => vec![x, y, x + shape_w, y],
            };
            let mut arrow_meta = metadata.clone();
            arrow_meta.role = Some("arrow".into());
            let mut spec = CanvasObjectSpec::new(id.clone(), "line");
            spec.metadata = arrow_meta;
            spec.props
                .insert("points".into(), serde_json::json!(flat_points));
            spec.props.insert("stroke".into(), stroke.into());
            spec.props.insert("strokeWidth".into(), 2.into());
            specs.push(spec);
        }
    }

    if let Some(label) = &args.label {
        let label_id = deterministic_id(&format!("{id}-label-{label}"));
        let label_x = x + shape_w / 2.0;
        let label_y = y + shape_h + 20.0;
        let mut label_meta = ObjectMetadata {
            source: Some("assistant".into()),
            linked_to: Some(id),
            role: Some("label".into()),
            bbox: Some([label_x, label_y, label.len() as f64 * 8.0, 20.0]),
            ..Default::default()
        };
        if let Some(custom) = &args.custom_metadata {
            label_meta.concept = custom.concept.clone();
        }
        let mut spec = CanvasObjectSpec::new(label_id, "text");
        spec.x = Some(label_x);
        spec.y = Some(label_y);
        spec.metadata = label_meta;
        spec.props
            .insert("text".into(), Value::String(label.clone()));
        spec.props.insert("fill".into(), stroke.into());
        specs.push(spec);
    }

    specs
}
