//! Layout-aware board operations: placing, patching, deleting, and querying
//! objects, plus the generic `draw` entry point the executor exposes to the
//! LLM.
//!
//! Placement strategies:
//! - `explicit` — objects carry their own coordinates (absolute or pct).
//! - `zone` — objects are stacked inside a named template zone.
//! - `flow` — the grid allocator finds the first free block.
//! - `anchor` — anchor arguments are copied onto the ADD_OBJECTS action so
//!   the front-end resolves the relative placement against the live canvas.

use serde::Deserialize;
use serde_json::{Map, Value};

use tg_domain::canvas::{CanvasObjectSpec, ObjectUpdate, WhiteboardAction};
use tg_domain::context::TutorContext;
use tg_domain::error::{Error, Result};
use tg_domain::response::MessagePayload;
use tg_whiteboard::{resolve_zone, ReserveRequest};

use crate::drawing::deterministic_id;
use crate::registry::{parse_args, SkillCtxServices, SkillFuture, SkillOutput};

const DEFAULT_WIDTH: f64 = 200.0;
const DEFAULT_HEIGHT: f64 = 120.0;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// add_objects_to_board
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default, Deserialize)]
pub struct AddObjectsArgs {
    pub specs: Vec<CanvasObjectSpec>,
    /// `explicit` | `flow` | `anchor` | `zone`.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default)]
    pub anchor_object_id: Option<String>,
    #[serde(default)]
    pub anchor_edge_x: Option<String>,
    #[serde(default)]
    pub object_edge_x: Option<String>,
    #[serde(default)]
    pub anchor_edge_y: Option<String>,
    #[serde(default)]
    pub object_edge_y: Option<String>,
    #[serde(default)]
    pub offset_x_pct: Option<f64>,
    #[serde(default)]
    pub offset_y_pct: Option<f64>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
}

fn default_strategy() -> String {
    "explicit".into()
}

pub fn add_objects_to_board<'a>(
    ctx: &'a mut TutorContext,
    services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let args: AddObjectsArgs = parse_args("add_objects_to_board", args)?;
        add_objects_impl(ctx, services, args).await
    })
}

pub(crate) async fn add_objects_impl(
    ctx: &mut TutorContext,
    services: &SkillCtxServices,
    mut args: AddObjectsArgs,
) -> Result<SkillOutput> {
    if args.specs.is_empty() {
        return Err(Error::ToolInput(
            "add_objects_to_board: 'specs' must not be empty".into(),
        ));
    }
    match args.strategy.as_str() {
        "explicit" | "flow" | "anchor" | "zone" => {}
        other => {
            return Err(Error::ToolInput(format!(
                "add_objects_to_board: unsupported strategy '{other}'"
            )))
        }
    }
    if args.strategy == "anchor" && args.anchor_object_id.is_none() {
        return Err(Error::ToolInput(
            "add_objects_to_board: anchor strategy requires anchor_object_id".into(),
        ));
    }

    // Ownership + grouping on every spec.
    for spec in &mut args.specs {
        spec.metadata.source = Some("assistant".into());
        if spec.metadata.group_id.is_none() {
            spec.metadata.group_id = args.group_id.clone();
        }
    }

    // Zone placement: stack objects without their own coordinates inside
    // the resolved zone.
    let zone_rect = match (&args.template, &args.zone) {
        (Some(template), Some(zone)) => resolve_zone(template, zone),
        _ => None,
    };
    if let Some(rect) = zone_rect {
        let n = args.specs.len() as f64;
        let slot_h = rect.height_pct / n;
        for (i, spec) in args.specs.iter_mut().enumerate() {
            let has_own_coords =
                spec.x.is_some() && spec.y.is_some() || spec.x_pct.is_some() && spec.y_pct.is_some();
            if has_own_coords {
                continue;
            }
            spec.x_pct = Some(rect.x_pct);
            spec.y_pct = Some(rect.y_pct + i as f64 * slot_h);
            if spec.width_pct.is_none() {
                spec.width_pct = Some(rect.width_pct);
            }
            if spec.height_pct.is_none() {
                spec.height_pct = Some(slot_h);
            }
        }
    } else if args.strategy == "flow" {
        let block_w = args
            .specs
            .iter()
            .filter_map(|s| s.width)
            .fold(DEFAULT_WIDTH, f64::max);
        let block_h: f64 = args
            .specs
            .iter()
            .map(|s| s.height.unwrap_or(DEFAULT_HEIGHT))
            .sum();
        let placement = services
            .allocators
            .reserve_region(
                ctx.session_id,
                ReserveRequest {
                    group_id: args.group_id.clone(),
                    ..ReserveRequest::flow(block_w as u32, block_h as u32)
                },
            )?
            .ok_or_else(|| {
                Error::Executor("add_objects_to_board: allocator returned no space".into())
            })?;

        let mut cursor_y = f64::from(placement.y);
        for spec in &mut args.specs {
            if spec.x.is_none() {
                spec.x = Some(f64::from(placement.x));
            }
            if spec.y.is_none() {
                spec.y = Some(cursor_y);
            }
            cursor_y += spec.height.unwrap_or(DEFAULT_HEIGHT);
        }
    }

    // Stamp an absolute bbox wherever coordinates are known.
    for spec in &mut args.specs {
        if let (Some(x), Some(y)) = (spec.x, spec.y) {
            spec.metadata.bbox = Some([
                x,
                y,
                spec.width.unwrap_or(DEFAULT_WIDTH),
                spec.height.unwrap_or(DEFAULT_HEIGHT),
            ]);
        }
    }

    let count = args.specs.len();
    let action = WhiteboardAction::AddObjects {
        objects: args.specs,
        strategy: Some(args.strategy),
        anchor_object_id: args.anchor_object_id,
        anchor_edge_x: args.anchor_edge_x,
        object_edge_x: args.object_edge_x,
        anchor_edge_y: args.anchor_edge_y,
        object_edge_y: args.object_edge_y,
        offset_x_pct: args.offset_x_pct,
        offset_y_pct: args.offset_y_pct,
        template: args.template,
        zone: args.zone,
        group_id: args.group_id,
    };

    Ok(SkillOutput::Message {
        payload: MessagePayload::status(format!("Added {count} object(s) to the board.")),
        actions: vec![action],
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// update / delete
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct UpdateObjectArgs {
    object_id: String,
    updates: Map<String, Value>,
}

pub fn update_object_on_board<'a>(
    _ctx: &'a mut TutorContext,
    _services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let args: UpdateObjectArgs = parse_args("update_object_on_board", args)?;
        if args.updates.is_empty() {
            return Err(Error::ToolInput(
                "update_object_on_board: 'updates' must not be empty".into(),
            ));
        }
        Ok(SkillOutput::Action(WhiteboardAction::UpdateObjects {
            objects: vec![ObjectUpdate {
                object_id: args.object_id,
                updates: args.updates,
            }],
        }))
    })
}

#[derive(Debug, Deserialize)]
struct DeleteObjectArgs {
    object_id: String,
}

pub fn delete_object_on_board<'a>(
    _ctx: &'a mut TutorContext,
    _services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let args: DeleteObjectArgs = parse_args("delete_object_on_board", args)?;
        Ok(SkillOutput::Action(WhiteboardAction::DeleteObjects {
            object_ids: vec![args.object_id],
        }))
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// find_object_on_board / get_board_state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct FindObjectArgs {
    #[serde(default)]
    meta_query: Option<Map<String, Value>>,
    #[serde(default)]
    fields: Option<Vec<String>>,
    /// Restrict matches to objects intersecting `(x, y, w, h)`.
    #[serde(default)]
    spatial_query: Option<[f64; 4]>,
}

/// True iff the spec's metadata satisfies the query. Keys prefixed `meta.`
/// address metadata explicitly; bare keys are metadata keys too (the common
/// case); `props.` keys address free-form properties.
fn matches_meta(spec: &CanvasObjectSpec, query: &Map<String, Value>) -> bool {
    let metadata = serde_json::to_value(&spec.metadata).unwrap_or_default();
    for (key, expected) in query {
        let actual = if let Some(rest) = key.strip_prefix("meta.") {
            metadata.get(rest)
        } else if let Some(rest) = key.strip_prefix("props.") {
            spec.props.get(rest)
        } else {
            metadata.get(key)
        };
        if actual != Some(expected) {
            return false;
        }
    }
    true
}

pub fn find_object_on_board<'a>(
    ctx: &'a mut TutorContext,
    services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let args: FindObjectArgs = parse_args("find_object_on_board", args)?;
        let doc = services.docs.get_or_load(ctx.session_id).await?;
        let objects = doc.objects().await;

        // Spatial pre-filter via the bbox index.
        let spatial_hits: Option<Vec<String>> = args.spatial_query.map(|[x, y, w, h]| {
            let mut index = tg_whiteboard::SpatialIndex::new();
            for spec in &objects {
                if let Some([bx, by, bw, bh]) = spec.abs_bbox() {
                    index.insert(&spec.id, bx, by, bw, bh);
                }
            }
            index.query_intersecting(x, y, w, h)
        });

        let matched: Vec<&CanvasObjectSpec> = objects
            .iter()
            .filter(|s| {
                spatial_hits
                    .as_ref()
                    .map_or(true, |hits| hits.contains(&s.id))
            })
            .filter(|s| {
                args.meta_query
                    .as_ref()
                    .map_or(true, |query| matches_meta(s, query))
            })
            .collect();

        let results: Vec<Value> = matched
            .iter()
            .map(|spec| {
                let full = serde_json::to_value(spec).unwrap_or_default();
                match &args.fields {
                    Some(fields) => {
                        let mut picked = Map::new();
                        picked.insert("id".into(), Value::String(spec.id.clone()));
                        for field in fields {
                            if let Some(v) = full.get(field) {
                                picked.insert(field.clone(), v.clone());
                            }
                        }
                        Value::Object(picked)
                    }
                    None => full,
                }
            })
            .collect();

        Ok(SkillOutput::Value(Value::Array(results)))
    })
}

/// Server-known board state, compressed to ids/tags/bboxes — the full
/// object list is never sent to the model. The session runtime prefers the
/// client round-trip (REQUEST_BOARD_STATE) and only falls back to this.
pub fn get_board_state<'a>(
    ctx: &'a mut TutorContext,
    services: &'a SkillCtxServices,
    _args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let doc = services.docs.get_or_load(ctx.session_id).await?;
        let objects = doc.objects().await;
        let compressed = tg_whiteboard::compress_board_objects(&objects);
        Ok(SkillOutput::Value(serde_json::from_str(&compressed)?))
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// draw — the generic entry point the LLM uses
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct DrawArgs {
    objects: Vec<Map<String, Value>>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

pub fn draw<'a>(
    ctx: &'a mut TutorContext,
    services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let mut args: DrawArgs = parse_args("draw", args)?;
        if args.objects.is_empty() {
            return Err(Error::ToolInput("draw: 'objects' must not be empty".into()));
        }

        let mut add_args = AddObjectsArgs {
            strategy: default_strategy(),
            ..Default::default()
        };

        // Per-spec anchor hints: the first spec carrying an `anchor` object
        // configures the whole batch.
        let mut specs = Vec::with_capacity(args.objects.len());
        for mut raw in args.objects {
            if let Some(anchor) = raw.remove("anchor") {
                if add_args.anchor_object_id.is_none() {
                    if let Some(anchor) = anchor.as_object() {
                        apply_anchor_hints(&mut add_args, anchor);
                    }
                }
            }

            // Mint a deterministic id when none was supplied.
            if raw.get("id").and_then(Value::as_str).is_none() {
                let kind = raw
                    .get("kind")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_owned();
                let mut name = kind.clone();
                if kind == "text" {
                    if let Some(text) = raw.get("text").and_then(Value::as_str) {
                        name.push('-');
                        name.push_str(text);
                    }
                }
                raw.insert("id".into(), Value::String(deterministic_id(&name)));
            }

            let spec: CanvasObjectSpec = serde_json::from_value(Value::Object(raw))
                .map_err(|e| Error::ToolInput(format!("draw: malformed object spec: {e}")))?;
            specs.push(spec);
        }
        add_args.specs = specs;

        // Top-level args override spec-level hints for strategy/anchor id and
        // fill in everything else that is still unset.
        for key in [
            "strategy",
            "anchor_object_id",
            "group_id",
            "anchor_edge_x",
            "object_edge_x",
            "anchor_edge_y",
            "object_edge_y",
            "template",
            "zone",
        ] {
            if let Some(value) = args.rest.remove(key).and_then(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            }) {
                match key {
                    "strategy" => add_args.strategy = value,
                    "anchor_object_id" => add_args.anchor_object_id = Some(value),
                    "group_id" => add_args.group_id = Some(value),
                    "anchor_edge_x" if add_args.anchor_edge_x.is_none() => {
                        add_args.anchor_edge_x = Some(value)
                    }
                    "object_edge_x" if add_args.object_edge_x.is_none() => {
                        add_args.object_edge_x = Some(value)
                    }
                    "anchor_edge_y" if add_args.anchor_edge_y.is_none() => {
                        add_args.anchor_edge_y = Some(value)
                    }
                    "object_edge_y" if add_args.object_edge_y.is_none() => {
                        add_args.object_edge_y = Some(value)
                    }
                    "template" => add_args.template = Some(value),
                    "zone" => add_args.zone = Some(value),
                    _ => {}
                }
            }
        }
        for key in ["offset_x_pct", "offset_y_pct"] {
            if let Some(value) = args.rest.remove(key).and_then(|v| v.as_f64()) {
                match key {
                    "offset_x_pct" if add_args.offset_x_pct.is_none() => {
                        add_args.offset_x_pct = Some(value)
                    }
                    "offset_y_pct" if add_args.offset_y_pct.is_none() => {
                        add_args.offset_y_pct = Some(value)
                    }
                    _ => {}
                }
            }
        }

        if add_args.anchor_object_id.is_some() && add_args.strategy == "explicit" {
            add_args.strategy = "anchor".into();
        }

        add_objects_impl(ctx, services, add_args).await
    })
}

/// Map one spec-level `anchor` object onto batch anchor arguments.
fn apply_anchor_hints(args: &mut AddObjectsArgs, anchor: &Map<String, Value>) {
    args.strategy = "anchor".into();

    let get = |key: &str| anchor.get(key).and_then(Value::as_str).map(str::to_owned);

    args.anchor_object_id = get("object_id").or_else(|| get("anchor_to"));

    // X edges: specific keys first, then align_x, then generic fallbacks.
    args.object_edge_x = get("object_edge_x");
    args.anchor_edge_x = get("anchor_edge_x");
    if let Some(align) = get("align_x") {
        if ["left", "center_x", "right"].contains(&align.as_str()) {
            args.object_edge_x.get_or_insert(align.clone());
            args.anchor_edge_x.get_or_insert(align);
        }
    }
    if args.object_edge_x.is_none() {
        args.object_edge_x = get("object_edge");
    }
    if args.anchor_edge_x.is_none() {
        args.anchor_edge_x = get("target_edge").or_else(|| get("anchor_edge"));
    }

    // Y edges: specific keys, then align_y, then the generic `align`.
    args.object_edge_y = get("object_edge_y");
    args.anchor_edge_y = get("anchor_edge_y");
    if let Some(align) = get("align_y") {
        if ["top", "center_y", "bottom"].contains(&align.as_str()) {
            args.object_edge_y.get_or_insert(align.clone());
            args.anchor_edge_y.get_or_insert(align);
        }
    }
    if let Some(align) = get("align") {
        if ["top", "center_y", "bottom"].contains(&align.as_str()) {
            args.object_edge_y.get_or_insert(align.clone());
            args.anchor_edge_y.get_or_insert(align);
        } else if ["left", "center_x", "right"].contains(&align.as_str()) {
            args.object_edge_x.get_or_insert(align.clone());
            args.anchor_edge_x.get_or_insert(align);
        }
    }

    args.offset_x_pct = anchor.get("offset_x_pct").and_then(Value::as_f64);
    args.offset_y_pct = anchor.get("offset_y_pct").and_then(Value::as_f64);
}
