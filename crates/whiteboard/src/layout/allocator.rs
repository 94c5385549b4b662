//! Grid-based layout allocator for the whiteboard.
//!
//! The canvas is divided into a fixed logical grid (default 4×12 cells of
//! 220×140 px, roughly the footprint of a small text box). `flow` scans
//! row-major for the first free block big enough for the request; `anchor`
//! converts an anchor bbox to grid cells and searches adjacent cells in the
//! placement direction, strictly (no fallback when the spot is taken).
//!
//! All state is in-memory per session; it resets with the process.

use std::collections::HashMap;

use parking_lot::Mutex;
use uuid::Uuid;

use tg_domain::config::WhiteboardConfig;
use tg_domain::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Flow,
    Anchor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorPlacement {
    RightOf,
    Below,
}

impl AnchorPlacement {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "right-of" => Some(AnchorPlacement::RightOf),
            "below" => Some(AnchorPlacement::Below),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub width: u32,
    pub height: u32,
    pub strategy: Strategy,
    /// Pixel bbox `(x, y, w, h)` of the anchor object; required for
    /// [`Strategy::Anchor`].
    pub anchor_bbox: Option<[f64; 4]>,
    pub placement: Option<AnchorPlacement>,
    pub group_id: Option<String>,
}

impl ReserveRequest {
    pub fn flow(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            strategy: Strategy::Flow,
            anchor_bbox: None,
            placement: None,
            group_id: None,
        }
    }
}

/// A successful reservation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "regionId")]
    pub region_id: String,
    #[serde(rename = "groupId", skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-session allocator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct GridAllocator {
    cols: u32,
    rows: u32,
    cell_w: u32,
    cell_h: u32,
    /// row-major: grid[row * cols + col] = occupying region id.
    grid: Vec<Option<String>>,
    regions: HashMap<String, Vec<(u32, u32)>>,
}

impl GridAllocator {
    fn new(cfg: &WhiteboardConfig) -> Self {
        Self {
            cols: cfg.grid_cols,
            rows: cfg.grid_rows,
            cell_w: cfg.cell_width,
            cell_h: cfg.cell_height,
            grid: vec![None; (cfg.grid_cols * cfg.grid_rows) as usize],
            regions: HashMap::new(),
        }
    }

    fn cell(&self, row: u32, col: u32) -> &Option<String> {
        &self.grid[(row * self.cols + col) as usize]
    }

    fn block_free(&self, start_col: u32, start_row: u32, cols: u32, rows: u32) -> bool {
        for row in start_row..start_row + rows {
            for col in start_col..start_col + cols {
                if self.cell(row, col).is_some() {
                    return false;
                }
            }
        }
        true
    }

    fn occupy(&mut self, start_col: u32, start_row: u32, cols: u32, rows: u32) -> Placement {
        let region_id = Uuid::new_v4().to_string();
        let mut cells = Vec::new();
        for row in start_row..start_row + rows {
            for col in start_col..start_col + cols {
                self.grid[(row * self.cols + col) as usize] = Some(region_id.clone());
                cells.push((row, col));
            }
        }
        self.regions.insert(region_id.clone(), cells);
        Placement {
            x: start_col * self.cell_w,
            y: start_row * self.cell_h,
            width: cols * self.cell_w,
            height: rows * self.cell_h,
            region_id,
            group_id: None,
        }
    }

    fn reserve(&mut self, req: &ReserveRequest) -> Option<Placement> {
        let cols_needed = req.width.div_ceil(self.cell_w).max(1);
        let rows_needed = req.height.div_ceil(self.cell_h).max(1);

        if cols_needed > self.cols || rows_needed > self.rows {
            return None;
        }

        if req.strategy == Strategy::Anchor {
            let bbox = req.anchor_bbox?;
            let placement = req.placement?;
            return self.reserve_anchored(bbox, placement, cols_needed, rows_needed);
        }

        // Flow: row-major first fit.
        for row in 0..=self.rows - rows_needed {
            for col in 0..=self.cols - cols_needed {
                if self.block_free(col, row, cols_needed, rows_needed) {
                    return Some(self.occupy(col, row, cols_needed, rows_needed));
                }
            }
        }
        None
    }

    fn reserve_anchored(
        &mut self,
        bbox: [f64; 4],
        placement: AnchorPlacement,
        cols_needed: u32,
        rows_needed: u32,
    ) -> Option<Placement> {
        let [ax, ay, aw, ah] = bbox;
        let anchor_col = (ax / f64::from(self.cell_w)).floor().max(0.0) as u32;
        let anchor_row = (ay / f64::from(self.cell_h)).floor().max(0.0) as u32;
        let anchor_cols = ((aw / f64::from(self.cell_w)).ceil() as u32).max(1);
        let anchor_rows = ((ah / f64::from(self.cell_h)).ceil() as u32).max(1);

        match placement {
            AnchorPlacement::RightOf => {
                let start_col = anchor_col + anchor_cols;
                if start_col + cols_needed > self.cols {
                    return None;
                }
                // Scan within the anchor's row span.
                for offset in 0..anchor_rows {
                    let row = anchor_row + offset;
                    if row + rows_needed > self.rows {
                        break;
                    }
                    if self.block_free(start_col, row, cols_needed, rows_needed) {
                        return Some(self.occupy(start_col, row, cols_needed, rows_needed));
                    }
                }
            }
            AnchorPlacement::Below => {
                let start_row = anchor_row + anchor_rows;
                if start_row + rows_needed > self.rows {
                    return None;
                }
                // Scan within the anchor's column span.
                for offset in 0..anchor_cols {
                    let col = anchor_col + offset;
                    if col + cols_needed > self.cols {
                        break;
                    }
                    if self.block_free(col, start_row, cols_needed, rows_needed) {
                        return Some(self.occupy(col, start_row, cols_needed, rows_needed));
                    }
                }
            }
        }
        None
    }

    fn release(&mut self, region_id: &str) {
        if let Some(cells) = self.regions.remove(region_id) {
            for (row, col) in cells {
                self.grid[(row * self.cols + col) as usize] = None;
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session map
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// session id → allocator. Shared by all skills of a process.
pub struct AllocatorMap {
    config: WhiteboardConfig,
    allocators: Mutex<HashMap<Uuid, GridAllocator>>,
}

impl AllocatorMap {
    pub fn new(config: WhiteboardConfig) -> Self {
        Self {
            config,
            allocators: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve space on the canvas. Returns `None` when the board is full
    /// (or strict anchoring failed); callers must fall back.
    pub fn reserve_region(
        &self,
        session_id: Uuid,
        req: ReserveRequest,
    ) -> Result<Option<Placement>> {
        if req.strategy == Strategy::Anchor
            && (req.anchor_bbox.is_none() || req.placement.is_none())
        {
            return Err(Error::ToolInput(
                "anchor strategy requires anchor_bbox and placement".into(),
            ));
        }
        let mut allocators = self.allocators.lock();
        let allocator = allocators
            .entry(session_id)
            .or_insert_with(|| GridAllocator::new(&self.config));
        let mut placement = allocator.reserve(&req);
        if let Some(p) = placement.as_mut() {
            p.group_id = req.group_id;
        }
        Ok(placement)
    }

    pub fn release_region(&self, session_id: Uuid, region_id: &str) {
        if let Some(allocator) = self.allocators.lock().get_mut(&session_id) {
            allocator.release(region_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> AllocatorMap {
        AllocatorMap::new(WhiteboardConfig::default())
    }

    #[test]
    fn flow_scans_row_major() {
        let map = map();
        let sid = Uuid::new_v4();
        let first = map
            .reserve_region(sid, ReserveRequest::flow(220, 140))
            .unwrap()
            .unwrap();
        assert_eq!((first.x, first.y), (0, 0));
        let second = map
            .reserve_region(sid, ReserveRequest::flow(220, 140))
            .unwrap()
            .unwrap();
        assert_eq!((second.x, second.y), (220, 0));
    }

    #[test]
    fn oversized_requests_return_none() {
        let map = map();
        let sid = Uuid::new_v4();
        // Wider than 4 cells * 220 px.
        let placement = map
            .reserve_region(sid, ReserveRequest::flow(2000, 100))
            .unwrap();
        assert!(placement.is_none());
    }

    #[test]
    fn release_frees_cells() {
        let map = map();
        let sid = Uuid::new_v4();
        // Fill the first row.
        let mut regions = Vec::new();
        for _ in 0..4 {
            regions.push(
                map.reserve_region(sid, ReserveRequest::flow(220, 140))
                    .unwrap()
                    .unwrap(),
            );
        }
        map.release_region(sid, &regions[0].region_id);
        let again = map
            .reserve_region(sid, ReserveRequest::flow(220, 140))
            .unwrap()
            .unwrap();
        assert_eq!((again.x, again.y), (0, 0));
    }

    #[test]
    fn anchor_right_of_lands_beside_anchor() {
        let map = map();
        let sid = Uuid::new_v4();
        let anchor = map
            .reserve_region(sid, ReserveRequest::flow(220, 140))
            .unwrap()
            .unwrap();
        let req = ReserveRequest {
            width: 220,
            height: 140,
            strategy: Strategy::Anchor,
            anchor_bbox: Some([
                f64::from(anchor.x),
                f64::from(anchor.y),
                f64::from(anchor.width),
                f64::from(anchor.height),
            ]),
            placement: Some(AnchorPlacement::RightOf),
            group_id: None,
        };
        let beside = map.reserve_region(sid, req).unwrap().unwrap();
        assert_eq!((beside.x, beside.y), (220, 0));
    }

    #[test]
    fn anchor_below_lands_under_anchor() {
        let map = map();
        let sid = Uuid::new_v4();
        let req = ReserveRequest {
            width: 200,
            height: 100,
            strategy: Strategy::Anchor,
            anchor_bbox: Some([0.0, 0.0, 220.0, 140.0]),
            placement: Some(AnchorPlacement::Below),
            group_id: None,
        };
        let below = map.reserve_region(sid, req).unwrap().unwrap();
        assert_eq!((below.x, below.y), (0, 140));
    }

    #[test]
    fn anchor_without_bbox_is_a_tool_input_error() {
        let map = map();
        let req = ReserveRequest {
            width: 100,
            height: 100,
            strategy: Strategy::Anchor,
            anchor_bbox: None,
            placement: None,
            group_id: None,
        };
        assert!(map.reserve_region(Uuid::new_v4(), req).is_err());
    }

    #[test]
    fn sessions_do_not_share_grids() {
        let map = map();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let pa = map
            .reserve_region(a, ReserveRequest::flow(220, 140))
            .unwrap()
            .unwrap();
        let pb = map
            .reserve_region(b, ReserveRequest::flow(220, 140))
            .unwrap()
            .unwrap();
        assert_eq!((pa.x, pa.y), (pb.x, pb.y));
    }
}
