//! Session-scoped 2-D spatial index over object bounding boxes.
//!
//! A linear bbox walk: insert/remove are O(n) and intersection queries scan
//! every record. Board object counts are small (hundreds), so this is the
//! same tradeoff the bbox-list path of the reference design makes.

/// `(min_x, min_y, max_x, max_y)`.
type BoundingBox = (f64, f64, f64, f64);

#[derive(Default)]
pub struct SpatialIndex {
    records: Vec<(String, BoundingBox)>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn to_bbox(x: f64, y: f64, width: f64, height: f64) -> BoundingBox {
        (x, y, x + width, y + height)
    }

    /// Insert or update an object's bounding box.
    pub fn insert(&mut self, object_id: &str, x: f64, y: f64, width: f64, height: f64) {
        let bbox = Self::to_bbox(x, y, width, height);
        self.records.retain(|(id, _)| id != object_id);
        self.records.push((object_id.to_owned(), bbox));
    }

    pub fn remove(&mut self, object_id: &str) {
        self.records.retain(|(id, _)| id != object_id);
    }

    /// IDs whose bbox strictly intersects the query rect `(x, y, w, h)`.
    pub fn query_intersecting(&self, x: f64, y: f64, width: f64, height: f64) -> Vec<String> {
        let (qminx, qminy, qmaxx, qmaxy) = Self::to_bbox(x, y, width, height);
        self.records
            .iter()
            .filter(|(_, (minx, miny, maxx, maxy))| {
                *minx < qmaxx && *maxx > qminx && *miny < qmaxy && *maxy > qminy
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_upsert() {
        let mut idx = SpatialIndex::new();
        idx.insert("a", 0.0, 0.0, 10.0, 10.0);
        idx.insert("a", 100.0, 100.0, 10.0, 10.0);
        assert_eq!(idx.len(), 1);
        assert!(idx.query_intersecting(0.0, 0.0, 20.0, 20.0).is_empty());
        assert_eq!(idx.query_intersecting(95.0, 95.0, 20.0, 20.0), vec!["a"]);
    }

    #[test]
    fn intersection_is_strict() {
        let mut idx = SpatialIndex::new();
        idx.insert("a", 0.0, 0.0, 10.0, 10.0);
        // Touching edges do not intersect.
        assert!(idx.query_intersecting(10.0, 0.0, 5.0, 5.0).is_empty());
        assert_eq!(idx.query_intersecting(9.9, 0.0, 5.0, 5.0), vec!["a"]);
    }

    #[test]
    fn remove_drops_record() {
        let mut idx = SpatialIndex::new();
        idx.insert("a", 0.0, 0.0, 10.0, 10.0);
        idx.remove("a");
        assert!(idx.is_empty());
    }
}
