//! Structured diagram generators: tables, flowcharts, axis pairs,
//! coordinate planes, and timelines.
//!
//! Tables, flowcharts, and axis pairs reserve their block through the
//! session's grid allocator (flow strategy), so successive calls land in
//! separate regions. Coordinate planes and timelines take explicit
//! coordinates, as their argument surfaces always have. All ids derive
//! from the caller-supplied diagram id.

use serde::Deserialize;
use serde_json::Value;

use tg_domain::canvas::{CanvasObjectSpec, ObjectMetadata};
use tg_domain::context::TutorContext;
use tg_domain::error::Error;
use tg_whiteboard::ReserveRequest;

use crate::registry::{parse_args, SkillCtxServices, SkillFuture, SkillOutput};

fn diagram_metadata(group_id: &str, role: &str) -> ObjectMetadata {
    ObjectMetadata {
        source: Some("assistant".into()),
        role: Some(role.into()),
        group_id: Some(group_id.to_owned()),
        ..Default::default()
    }
}

/// Metadata for allocator-placed diagrams: role + the diagram's own id key
/// (`table_id`, `chart_id`, `axis_id`) plus any extra tags.
fn tagged_metadata(role: &str, tags: &[(&str, Value)]) -> ObjectMetadata {
    let mut metadata = ObjectMetadata {
        source: Some("assistant".into()),
        role: Some(role.into()),
        ..Default::default()
    };
    for (key, value) in tags {
        metadata.extra.insert((*key).to_owned(), value.clone());
    }
    metadata
}

fn text_at(id: String, group: &str, role: &str, x: f64, y: f64, text: &str) -> CanvasObjectSpec {
    let mut spec = CanvasObjectSpec::new(id, "text");
    spec.x = Some(x);
    spec.y = Some(y);
    spec.metadata = diagram_metadata(group, role);
    spec.props.insert("text".into(), Value::String(text.into()));
    spec.props.insert("fill".into(), "#000000".into());
    spec
}

fn line_between(
    id: String,
    group: &str,
    role: &str,
    points: [f64; 4],
) -> CanvasObjectSpec {
    let mut spec = CanvasObjectSpec::new(id, "line");
    spec.metadata = diagram_metadata(group, role);
    spec.props
        .insert("points".into(), serde_json::json!(points));
    spec.props.insert("stroke".into(), "#000000".into());
    spec.props.insert("strokeWidth".into(), 2.into());
    spec
}

fn rect_spec(
    id: String,
    metadata: ObjectMetadata,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    fill: &str,
    stroke: &str,
) -> CanvasObjectSpec {
    let mut spec = CanvasObjectSpec::new(id, "rect");
    spec.x = Some(x);
    spec.y = Some(y);
    spec.width = Some(width);
    spec.height = Some(height);
    spec.metadata = metadata;
    spec.metadata.bbox = Some([x, y, width, height]);
    spec.props.insert("fill".into(), fill.into());
    spec.props.insert("stroke".into(), stroke.into());
    spec.props.insert("strokeWidth".into(), 1.into());
    spec
}

fn label_spec(
    id: String,
    metadata: ObjectMetadata,
    x: f64,
    y: f64,
    text: &str,
    fill: &str,
) -> CanvasObjectSpec {
    let mut spec = CanvasObjectSpec::new(id, "text");
    spec.x = Some(x);
    spec.y = Some(y);
    spec.metadata = metadata;
    spec.props.insert("text".into(), Value::String(text.into()));
    spec.props.insert("fontSize".into(), 14.into());
    spec.props.insert("fill".into(), fill.into());
    spec
}

fn line_spec(
    id: String,
    metadata: ObjectMetadata,
    points: [f64; 4],
    stroke: &str,
) -> CanvasObjectSpec {
    let mut spec = CanvasObjectSpec::new(id, "line");
    spec.metadata = metadata;
    spec.props
        .insert("points".into(), serde_json::json!(points));
    spec.props.insert("stroke".into(), stroke.into());
    spec.props.insert("strokeWidth".into(), 2.into());
    spec
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// draw_table
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct DrawTableArgs {
    #[serde(default = "default_table_id")]
    table_id: String,
    headers: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<String>>,
    #[serde(default = "default_cell_width")]
    cell_width: f64,
    #[serde(default = "default_cell_height")]
    cell_height: f64,
    #[serde(default = "default_cell_gap")]
    col_gap: f64,
    #[serde(default = "default_cell_gap")]
    row_gap: f64,
}

fn default_table_id() -> String {
    "table-1".into()
}
fn default_cell_width() -> f64 {
    140.0
}
fn default_cell_height() -> f64 {
    40.0
}
fn default_cell_gap() -> f64 {
    10.0
}

pub fn draw_table<'a>(
    ctx: &'a mut TutorContext,
    services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let args: DrawTableArgs = parse_args("draw_table", args)?;
        if args.headers.is_empty() {
            return Err(Error::ToolInput("draw_table: 'headers' missing".into()));
        }

        let n_cols = args.headers.len();
        let n_rows = args.rows.len() + 1;
        let total_width =
            n_cols as f64 * args.cell_width + (n_cols - 1) as f64 * args.col_gap;
        let total_height =
            n_rows as f64 * args.cell_height + (n_rows - 1) as f64 * args.row_gap;

        let placement = services
            .allocators
            .reserve_region(
                ctx.session_id,
                ReserveRequest {
                    group_id: Some(args.table_id.clone()),
                    ..ReserveRequest::flow(total_width as u32, total_height as u32)
                },
            )?
            .ok_or_else(|| Error::Executor("draw_table: allocator returned no space".into()))?;

        let gid = &args.table_id;
        let cell_x = |c: usize| f64::from(placement.x) + c as f64 * (args.cell_width + args.col_gap);
        let cell_y =
            |r: usize| f64::from(placement.y) + r as f64 * (args.cell_height + args.row_gap);

        let mut specs = Vec::new();

        for (c, header) in args.headers.iter().enumerate() {
            let (x, y) = (cell_x(c), cell_y(0));
            specs.push(rect_spec(
                format!("{gid}-header-{c}"),
                tagged_metadata(
                    "table_header",
                    &[("table_id", gid.as_str().into()), ("col", c.into())],
                ),
                x,
                y,
                args.cell_width,
                args.cell_height,
                "#BBDEFB",
                "#0D47A1",
            ));
            specs.push(label_spec(
                format!("{gid}-header-{c}-text"),
                tagged_metadata(
                    "table_header_text",
                    &[("table_id", gid.as_str().into()), ("col", c.into())],
                ),
                x + 10.0,
                y + args.cell_height / 2.0,
                header,
                "#0D47A1",
            ));
        }

        for (r, row) in args.rows.iter().enumerate() {
            for c in 0..n_cols {
                let (x, y) = (cell_x(c), cell_y(r + 1));
                // Short rows render as empty cells.
                let text = row.get(c).map(String::as_str).unwrap_or("");
                specs.push(rect_spec(
                    format!("{gid}-cell-{r}-{c}"),
                    tagged_metadata(
                        "table_cell",
                        &[
                            ("table_id", gid.as_str().into()),
                            ("row", r.into()),
                            ("col", c.into()),
                        ],
                    ),
                    x,
                    y,
                    args.cell_width,
                    args.cell_height,
                    "#FFFFFF",
                    "#9E9E9E",
                ));
                specs.push(label_spec(
                    format!("{gid}-cell-{r}-{c}-text"),
                    tagged_metadata(
                        "table_cell_text",
                        &[
                            ("table_id", gid.as_str().into()),
                            ("row", r.into()),
                            ("col", c.into()),
                        ],
                    ),
                    x + 10.0,
                    y + args.cell_height / 2.0,
                    text,
                    "#000000",
                ));
            }
        }

        Ok(SkillOutput::Specs(specs))
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// draw_flowchart
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct DrawFlowchartArgs {
    #[serde(default = "default_chart_id")]
    chart_id: String,
    steps: Vec<String>,
}

fn default_chart_id() -> String {
    "flow-1".into()
}

const FLOW_BOX_WIDTH: f64 = 140.0;
const FLOW_BOX_HEIGHT: f64 = 60.0;
const FLOW_H_GAP: f64 = 80.0;

/// Left-to-right flowchart, automatically placed by the allocator.
pub fn draw_flowchart<'a>(
    ctx: &'a mut TutorContext,
    services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let args: DrawFlowchartArgs = parse_args("draw_flowchart", args)?;
        if args.steps.is_empty() {
            return Err(Error::ToolInput(
                "draw_flowchart: 'steps' argument missing or empty".into(),
            ));
        }

        let n = args.steps.len();
        let total_width = n as f64 * FLOW_BOX_WIDTH + (n - 1) as f64 * FLOW_H_GAP;
        let total_height = FLOW_BOX_HEIGHT + 40.0; // arrow space

        let placement = services
            .allocators
            .reserve_region(
                ctx.session_id,
                ReserveRequest {
                    group_id: Some(args.chart_id.clone()),
                    ..ReserveRequest::flow(total_width as u32, total_height as u32)
                },
            )?
            .ok_or_else(|| {
                Error::Executor("draw_flowchart: allocator returned no space".into())
            })?;

        let gid = &args.chart_id;
        let start_x = f64::from(placement.x);
        let start_y = f64::from(placement.y);
        let mut specs = Vec::new();

        for (i, label) in args.steps.iter().enumerate() {
            let x = start_x + i as f64 * (FLOW_BOX_WIDTH + FLOW_H_GAP);
            let mut box_meta = tagged_metadata(
                "flow_box",
                &[("chart_id", gid.as_str().into()), ("step", i.into())],
            );
            box_meta.group_id = Some(gid.clone());
            specs.push(rect_spec(
                format!("{gid}-box-{i}"),
                box_meta,
                x,
                start_y,
                FLOW_BOX_WIDTH,
                FLOW_BOX_HEIGHT,
                "#E8F5E9",
                "#1B5E20",
            ));

            let mut text_meta = tagged_metadata(
                "flow_box_text",
                &[("chart_id", gid.as_str().into()), ("step", i.into())],
            );
            text_meta.group_id = Some(gid.clone());
            let mut text = label_spec(
                format!("{gid}-box-{i}-text"),
                text_meta,
                x + FLOW_BOX_WIDTH / 2.0,
                start_y + FLOW_BOX_HEIGHT / 2.0,
                label,
                "#1B5E20",
            );
            text.props
                .insert("textAnchor".into(), "middle".into());
            specs.push(text);
        }

        for i in 0..n - 1 {
            let x1 = start_x + i as f64 * (FLOW_BOX_WIDTH + FLOW_H_GAP);
            let x2 = start_x + (i + 1) as f64 * (FLOW_BOX_WIDTH + FLOW_H_GAP);
            let y_mid = start_y + FLOW_BOX_HEIGHT / 2.0;
            let mut arrow_meta = tagged_metadata(
                "flow_arrow",
                &[
                    ("chart_id", gid.as_str().into()),
                    ("from", i.into()),
                    ("to", (i + 1).into()),
                ],
            );
            arrow_meta.group_id = Some(gid.clone());
            specs.push(line_spec(
                format!("{gid}-arrow-{i}-{}", i + 1),
                arrow_meta,
                [x1 + FLOW_BOX_WIDTH, y_mid, x2 - 10.0, y_mid],
                "#000000",
            ));
        }

        Ok(SkillOutput::Specs(specs))
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// draw_axis
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct DrawAxisArgs {
    #[serde(default = "default_axis_id")]
    axis_id: String,
    #[serde(default = "default_axis_width")]
    width: f64,
    #[serde(default = "default_axis_height")]
    height: f64,
    #[serde(default = "default_show_arrows")]
    show_arrows: bool,
    #[serde(default = "default_x_label")]
    label_x: String,
    #[serde(default = "default_y_label")]
    label_y: String,
}

fn default_axis_id() -> String {
    "axis-1".into()
}
fn default_axis_width() -> f64 {
    250.0
}
fn default_axis_height() -> f64 {
    200.0
}
fn default_show_arrows() -> bool {
    true
}

const AXIS_PADDING: f64 = 40.0;

/// An X/Y axis pair with arrow heads, automatically placed by the
/// allocator. The origin sits bottom-left of the reserved block.
pub fn draw_axis<'a>(
    ctx: &'a mut TutorContext,
    services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let args: DrawAxisArgs = parse_args("draw_axis", args)?;
        if args.width <= 0.0 || args.height <= 0.0 {
            return Err(Error::ToolInput(
                "draw_axis: width and height must be positive".into(),
            ));
        }

        let placement = services
            .allocators
            .reserve_region(
                ctx.session_id,
                ReserveRequest {
                    group_id: Some(args.axis_id.clone()),
                    ..ReserveRequest::flow(
                        (args.width + AXIS_PADDING) as u32,
                        (args.height + AXIS_PADDING) as u32,
                    )
                },
            )?
            .ok_or_else(|| Error::Executor("draw_axis: allocator returned no space".into()))?;

        let gid = &args.axis_id;
        let start_x = f64::from(placement.x) + 20.0;
        let start_y = f64::from(placement.y) + args.height;
        let axis_tag = |role: &str| tagged_metadata(role, &[("axis_id", gid.as_str().into())]);

        let mut specs = vec![
            line_spec(
                format!("{gid}-x-line"),
                axis_tag("axis_x"),
                [start_x, start_y, start_x + args.width, start_y],
                "#000",
            ),
            line_spec(
                format!("{gid}-y-line"),
                axis_tag("axis_y"),
                [start_x, start_y, start_x, start_y - args.height],
                "#000",
            ),
        ];

        if args.show_arrows {
            let x_tip = start_x + args.width;
            let y_tip = start_y - args.height;
            specs.push(line_spec(
                format!("{gid}-x-arrow"),
                axis_tag("axis_x_arrow"),
                [x_tip, start_y, x_tip - 10.0, start_y - 5.0],
                "#000",
            ));
            specs.push(line_spec(
                format!("{gid}-x-arrow2"),
                axis_tag("axis_x_arrow"),
                [x_tip, start_y, x_tip - 10.0, start_y + 5.0],
                "#000",
            ));
            specs.push(line_spec(
                format!("{gid}-y-arrow"),
                axis_tag("axis_y_arrow"),
                [start_x, y_tip, start_x - 5.0, y_tip + 10.0],
                "#000",
            ));
            specs.push(line_spec(
                format!("{gid}-y-arrow2"),
                axis_tag("axis_y_arrow"),
                [start_x, y_tip, start_x + 5.0, y_tip + 10.0],
                "#000",
            ));
        }

        specs.push(label_spec(
            format!("{gid}-label-x"),
            axis_tag("axis_label_x"),
            start_x + args.width + 10.0,
            start_y - 5.0,
            &args.label_x,
            "#000000",
        ));
        specs.push(label_spec(
            format!("{gid}-label-y"),
            axis_tag("axis_label_y"),
            start_x - 10.0,
            start_y - args.height - 15.0,
            &args.label_y,
            "#000000",
        ));

        Ok(SkillOutput::Specs(specs))
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// draw_coordinate_plane
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const TICK_HALF: f64 = 5.0;

fn default_num_ticks() -> usize {
    5
}

#[derive(Debug, Deserialize)]
struct DrawPlaneArgs {
    plane_id: String,
    x_range: [f64; 2],
    y_range: [f64; 2],
    #[serde(default = "default_x_label")]
    x_label: String,
    #[serde(default = "default_y_label")]
    y_label: String,
    #[serde(default = "default_num_ticks")]
    num_ticks_x: usize,
    #[serde(default = "default_num_ticks")]
    num_ticks_y: usize,
    #[serde(default)]
    show_grid: bool,
    #[serde(default = "default_plane_x")]
    x: f64,
    #[serde(default = "default_plane_y")]
    y: f64,
    #[serde(default = "default_plane_width")]
    width: f64,
    #[serde(default = "default_plane_height")]
    height: f64,
}

fn default_x_label() -> String {
    "X".into()
}
fn default_y_label() -> String {
    "Y".into()
}
fn default_plane_x() -> f64 {
    50.0
}
fn default_plane_y() -> f64 {
    300.0
}
fn default_plane_width() -> f64 {
    250.0
}
fn default_plane_height() -> f64 {
    200.0
}

pub fn draw_coordinate_plane<'a>(
    _ctx: &'a mut TutorContext,
    _services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let args: DrawPlaneArgs = parse_args("draw_coordinate_plane", args)?;
        if args.x_range[0] >= args.x_range[1] || args.y_range[0] >= args.y_range[1] {
            return Err(Error::ToolInput(
                "draw_coordinate_plane: ranges must be increasing".into(),
            ));
        }

        let gid = &args.plane_id;
        let mut specs = Vec::new();

        // Origin is bottom-left: x axis runs right, y axis runs up.
        specs.push(line_between(
            format!("{gid}-x-axis"),
            gid,
            "axis",
            [args.x, args.y, args.x + args.width, args.y],
        ));
        specs.push(line_between(
            format!("{gid}-y-axis"),
            gid,
            "axis",
            [args.x, args.y, args.x, args.y - args.height],
        ));

        if args.num_ticks_x > 1 {
            let step = args.width / (args.num_ticks_x - 1) as f64;
            let value_step = (args.x_range[1] - args.x_range[0]) / (args.num_ticks_x - 1) as f64;
            for i in 0..args.num_ticks_x {
                let tx = args.x + i as f64 * step;
                specs.push(line_between(
                    format!("{gid}-xtick{i}"),
                    gid,
                    "axis_tick",
                    [tx, args.y - TICK_HALF, tx, args.y + TICK_HALF],
                ));
                specs.push(text_at(
                    format!("{gid}-xtick{i}-label"),
                    gid,
                    "axis_tick_label",
                    tx - 6.0,
                    args.y + 10.0,
                    &format_tick(args.x_range[0] + i as f64 * value_step),
                ));
                if args.show_grid && i > 0 {
                    specs.push(line_between(
                        format!("{gid}-xgrid{i}"),
                        gid,
                        "grid_line",
                        [tx, args.y, tx, args.y - args.height],
                    ));
                }
            }
        }

        if args.num_ticks_y > 1 {
            let step = args.height / (args.num_ticks_y - 1) as f64;
            let value_step = (args.y_range[1] - args.y_range[0]) / (args.num_ticks_y - 1) as f64;
            for i in 0..args.num_ticks_y {
                let ty = args.y - i as f64 * step;
                specs.push(line_between(
                    format!("{gid}-ytick{i}"),
                    gid,
                    "axis_tick",
                    [args.x - TICK_HALF, ty, args.x + TICK_HALF, ty],
                ));
                specs.push(text_at(
                    format!("{gid}-ytick{i}-label"),
                    gid,
                    "axis_tick_label",
                    args.x - 35.0,
                    ty - 8.0,
                    &format_tick(args.y_range[0] + i as f64 * value_step),
                ));
                if args.show_grid && i > 0 {
                    specs.push(line_between(
                        format!("{gid}-ygrid{i}"),
                        gid,
                        "grid_line",
                        [args.x, ty, args.x + args.width, ty],
                    ));
                }
            }
        }

        specs.push(text_at(
            format!("{gid}-x-label"),
            gid,
            "axis_label",
            args.x + args.width / 2.0,
            args.y + 28.0,
            &args.x_label,
        ));
        specs.push(text_at(
            format!("{gid}-y-label"),
            gid,
            "axis_label",
            args.x - 40.0,
            args.y - args.height - 16.0,
            &args.y_label,
        ));

        Ok(SkillOutput::Specs(specs))
    })
}

fn format_tick(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{}", value.round() as i64)
    } else {
        format!("{value:.1}")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// draw_timeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct TimelineEvent {
    date: String,
    label: String,
}

#[derive(Debug, Deserialize)]
struct DrawTimelineArgs {
    timeline_id: String,
    events: Vec<TimelineEvent>,
    #[serde(default = "default_timeline_x")]
    start_x: f64,
    #[serde(default = "default_timeline_y")]
    start_y: f64,
    #[serde(default = "default_timeline_length")]
    length: f64,
}

fn default_timeline_x() -> f64 {
    50.0
}
fn default_timeline_y() -> f64 {
    150.0
}
fn default_timeline_length() -> f64 {
    600.0
}

pub fn draw_timeline<'a>(
    _ctx: &'a mut TutorContext,
    _services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let args: DrawTimelineArgs = parse_args("draw_timeline", args)?;
        if args.events.is_empty() {
            return Err(Error::ToolInput(
                "draw_timeline: at least one event is required".into(),
            ));
        }

        let gid = &args.timeline_id;
        let mut specs = vec![line_between(
            format!("{gid}-baseline"),
            gid,
            "timeline",
            [
                args.start_x,
                args.start_y,
                args.start_x + args.length,
                args.start_y,
            ],
        )];

        let n = args.events.len();
        let step = if n > 1 {
            args.length / (n - 1) as f64
        } else {
            0.0
        };
        for (i, event) in args.events.iter().enumerate() {
            let ex = args.start_x + i as f64 * step;
            specs.push(line_between(
                format!("{gid}-event{i}-tick"),
                gid,
                "timeline_tick",
                [ex, args.start_y - 8.0, ex, args.start_y + 8.0],
            ));
            specs.push(text_at(
                format!("{gid}-event{i}-date"),
                gid,
                "timeline_date",
                ex - 15.0,
                args.start_y + 14.0,
                &event.date,
            ));
            specs.push(text_at(
                format!("{gid}-event{i}-label"),
                gid,
                "timeline_label",
                ex - 15.0,
                args.start_y - 30.0,
                &event.label,
            ));
        }

        Ok(SkillOutput::Specs(specs))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::test_services;
    use uuid::Uuid;

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
    async fn table_emits_cell_grid_at_allocated_origin() {
        let services = test_services();
        let mut c = ctx();
        let out = draw_table(
            &mut c,
            &services,
            serde_json::json!({
                "table_id": "t1",
                "headers": ["Stage", "Product"],
                "rows": [["Light", "ATP"], ["Calvin", "Glucose"]],
            }),
        )
        .await
        .unwrap();
        let specs = specs_of(out);
        // 2 header cells + 4 body cells, each a rect + text.
        assert_eq!(specs.len(), 12);
        assert_eq!(specs[0].x, Some(0.0));
        assert_eq!(specs[0].y, Some(0.0));
        assert!(specs
            .iter()
            .all(|s| s.metadata.extra.get("table_id").unwrap() == "t1"));
        // Second header cell sits one cell + gap to the right.
        assert_eq!(specs[2].x, Some(150.0));
    }

    #[tokio::test]
    async fn table_pads_short_rows() {
        let services = test_services();
        let mut c = ctx();
        let specs = specs_of(
            draw_table(
                &mut c,
                &services,
                serde_json::json!({
                    "table_id": "t1",
                    "headers": ["A", "B"],
                    "rows": [["only one"]],
                }),
            )
            .await
            .unwrap(),
        );
        let padded = specs
            .iter()
            .find(|s| s.id == "t1-cell-0-1-text")
            .unwrap();
        assert_eq!(padded.props["text"], "");
    }

    #[tokio::test]
    async fn successive_tables_land_in_separate_regions() {
        let services = test_services();
        let mut c = ctx();
        let args = serde_json::json!({
            "headers": ["A", "B"],
            "rows": [["1", "2"]],
        });
        let first = specs_of(
            draw_table(&mut c, &services, args.clone()).await.unwrap(),
        );
        let second = specs_of(draw_table(&mut c, &services, args).await.unwrap());
        assert_ne!(
            (first[0].x, first[0].y),
            (second[0].x, second[0].y),
            "two tables must not stack on the same grid region"
        );
    }

    #[tokio::test]
    async fn flowchart_runs_left_to_right_with_arrows() {
        let services = test_services();
        let mut c = ctx();
        let specs = specs_of(
            draw_flowchart(
                &mut c,
                &services,
                serde_json::json!({"chart_id": "f1", "steps": ["Start", "Process", "End"]}),
            )
            .await
            .unwrap(),
        );
        let boxes: Vec<&CanvasObjectSpec> = specs
            .iter()
            .filter(|s| s.metadata.role.as_deref() == Some("flow_box"))
            .collect();
        assert_eq!(boxes.len(), 3);
        // Same row, advancing x: horizontal layout.
        assert!(boxes.iter().all(|b| b.y == boxes[0].y));
        assert_eq!(boxes[0].x, Some(0.0));
        assert_eq!(boxes[1].x, Some(220.0));
        assert_eq!(boxes[2].x, Some(440.0));

        let arrows = specs
            .iter()
            .filter(|s| s.metadata.role.as_deref() == Some("flow_arrow"))
            .count();
        assert_eq!(arrows, 2);
        assert!(specs
            .iter()
            .all(|s| s.metadata.group_id.as_deref() == Some("f1")));
    }

    #[tokio::test]
    async fn axis_pair_has_arrows_and_labels() {
        let services = test_services();
        let mut c = ctx();
        let specs = specs_of(
            draw_axis(
                &mut c,
                &services,
                serde_json::json!({"axis_id": "a1", "label_x": "Time (s)", "label_y": "v"}),
            )
            .await
            .unwrap(),
        );
        assert!(specs
            .iter()
            .any(|s| s.metadata.role.as_deref() == Some("axis_x")));
        assert!(specs
            .iter()
            .any(|s| s.metadata.role.as_deref() == Some("axis_y")));
        let arrow_heads = specs
            .iter()
            .filter(|s| {
                matches!(
                    s.metadata.role.as_deref(),
                    Some("axis_x_arrow") | Some("axis_y_arrow")
                )
            })
            .count();
        assert_eq!(arrow_heads, 4);

        // Origin sits bottom-left of the reserved block (allocated at 0,0).
        let x_line = specs.iter().find(|s| s.id == "a1-x-line").unwrap();
        assert_eq!(
            x_line.props["points"],
            serde_json::json!([20.0, 200.0, 270.0, 200.0])
        );
        let x_label = specs.iter().find(|s| s.id == "a1-label-x").unwrap();
        assert_eq!(x_label.props["text"], "Time (s)");
    }

    #[tokio::test]
    async fn axis_without_arrows_omits_heads() {
        let services = test_services();
        let mut c = ctx();
        let specs = specs_of(
            draw_axis(
                &mut c,
                &services,
                serde_json::json!({"axis_id": "a2", "show_arrows": false}),
            )
            .await
            .unwrap(),
        );
        // 2 axis lines + 2 labels only.
        assert_eq!(specs.len(), 4);
    }

    #[tokio::test]
    async fn plane_has_two_axes_and_labels() {
        let services = test_services();
        let mut c = ctx();
        let specs = specs_of(
            draw_coordinate_plane(
                &mut c,
                &services,
                serde_json::json!({
                    "plane_id": "p1",
                    "x_range": [0.0, 100.0],
                    "y_range": [0.0, 50.0],
                    "num_ticks_x": 3,
                    "num_ticks_y": 3,
                }),
            )
            .await
            .unwrap(),
        );
        let axes = specs
            .iter()
            .filter(|s| s.metadata.role.as_deref() == Some("axis"))
            .count();
        assert_eq!(axes, 2);
        // 3 x-ticks with integer labels 0/50/100.
        assert!(specs
            .iter()
            .any(|s| s.props.get("text").map(|t| t == "50").unwrap_or(false)));
    }

    #[tokio::test]
    async fn timeline_spaces_events_evenly() {
        let services = test_services();
        let mut c = ctx();
        let specs = specs_of(
            draw_timeline(
                &mut c,
                &services,
                serde_json::json!({
                    "timeline_id": "h1",
                    "events": [
                        {"date": "1776", "label": "Declaration"},
                        {"date": "1789", "label": "Revolution"},
                    ],
                    "start_x": 100, "start_y": 200, "length": 500,
                }),
            )
            .await
            .unwrap(),
        );
        let ticks: Vec<&CanvasObjectSpec> = specs
            .iter()
            .filter(|s| s.metadata.role.as_deref() == Some("timeline_tick"))
            .collect();
        assert_eq!(ticks.len(), 2);
        let first = ticks[0].props["points"][0].as_f64().unwrap();
        let second = ticks[1].props["points"][0].as_f64().unwrap();
        assert_eq!(first, 100.0);
        assert_eq!(second, 600.0);
    }
}
