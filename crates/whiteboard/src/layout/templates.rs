//! Named layout templates: each template maps zone names to normalized
//! rectangles. Skills place objects within a zone using percentage
//! coordinates when the executor supplies `template` + `zone`.

use serde::Serialize;

/// A zone rectangle in canvas percentages, all in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoneRect {
    #[serde(rename = "xPct")]
    pub x_pct: f64,
    #[serde(rename = "yPct")]
    pub y_pct: f64,
    #[serde(rename = "widthPct")]
    pub width_pct: f64,
    #[serde(rename = "heightPct")]
    pub height_pct: f64,
}

const fn zone(x_pct: f64, y_pct: f64, width_pct: f64, height_pct: f64) -> ZoneRect {
    ZoneRect {
        x_pct,
        y_pct,
        width_pct,
        height_pct,
    }
}

/// Resolve a named zone within a layout template.
///
/// Returns `None` (with a warning) for unknown templates or zones; callers
/// fall back to the allocator.
pub fn resolve_zone(template: &str, zone_name: &str) -> Option<ZoneRect> {
    let resolved = match template {
        "default_board" => match zone_name {
            "question_area" => Some(zone(0.05, 0.05, 0.9, 0.2)),
            "options_area" => Some(zone(0.05, 0.30, 0.9, 0.4)),
            "explanation_area" => Some(zone(0.05, 0.75, 0.9, 0.2)),
            "side_panel_top" => Some(zone(0.75, 0.05, 0.20, 0.40)),
            "side_panel_bottom" => Some(zone(0.75, 0.50, 0.20, 0.45)),
            "center_large" => Some(zone(0.2, 0.2, 0.6, 0.6)),
            "full_width_top_banner" => Some(zone(0.0, 0.0, 1.0, 0.1)),
            "full_width_bottom_banner" => Some(zone(0.0, 0.9, 1.0, 0.1)),
            "alt_question_spot" => Some(zone(0.05, 0.70, 0.4, 0.25)),
            _ => None,
        },
        "two_column_equal" => match zone_name {
            "left_column" => Some(zone(0.02, 0.02, 0.47, 0.96)),
            "right_column" => Some(zone(0.51, 0.02, 0.47, 0.96)),
            _ => None,
        },
        _ => None,
    };

    if resolved.is_none() {
        tracing::warn!(template, zone = zone_name, "unknown layout template/zone");
    }
    resolved
}
