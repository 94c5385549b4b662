//! The board-summary digest.
//!
//! The LLM never sees the raw object list; it sees this aggregate: counts
//! by kind and owner, learner question tags, per-concept bounding-box
//! clusters, and a summary of the ephemeral layer.

use std::collections::BTreeMap;

use serde::Serialize;

use tg_domain::canvas::CanvasObjectSpec;

#[derive(Debug, Clone, Serialize)]
pub struct BoardDigest {
    pub counts: DigestCounts,
    pub learner_question_tags: Vec<QuestionTag>,
    pub concept_clusters: Vec<ConceptCluster>,
    #[serde(rename = "ephemeralSummary")]
    pub ephemeral_summary: EphemeralSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct DigestCounts {
    pub by_kind: BTreeMap<String, u32>,
    pub by_owner: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionTag {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    pub meta: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConceptCluster {
    pub concept: String,
    /// Envelope `[min_x, min_y, max_x, max_y]` over member objects.
    pub bbox: [f64; 4],
    pub count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct EphemeralSummary {
    #[serde(rename = "activeHighlights")]
    pub active_highlights: u32,
    #[serde(rename = "activeQuestionTags")]
    pub active_question_tags: Vec<EphemeralQuestionTag>,
    #[serde(rename = "recentPointer")]
    pub recent_pointer: Option<PointerPing>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EphemeralQuestionTag {
    pub id: String,
    #[serde(rename = "linkedObjectId", skip_serializing_if = "Option::is_none")]
    pub linked_object_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PointerPing {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    pub meta: serde_json::Value,
}

/// Compute the digest from the durable and ephemeral object lists.
pub fn board_digest(
    objects: &[CanvasObjectSpec],
    ephemeral: &[CanvasObjectSpec],
) -> BoardDigest {
    let mut by_kind: BTreeMap<String, u32> = BTreeMap::new();
    let mut by_owner: BTreeMap<String, u32> = BTreeMap::new();
    let mut learner_question_tags = Vec::new();
    let mut concept_boxes: BTreeMap<String, Vec<[f64; 4]>> = BTreeMap::new();

    for spec in objects {
        *by_kind.entry(spec.kind.clone()).or_default() += 1;
        let owner = spec
            .metadata
            .source
            .clone()
            .unwrap_or_else(|| "unknown".into());
        *by_owner.entry(owner).or_default() += 1;

        if spec.metadata.role.as_deref() == Some("question_tag") {
            learner_question_tags.push(QuestionTag {
                id: spec.id.clone(),
                x: spec.x,
                y: spec.y,
                meta: serde_json::to_value(&spec.metadata).unwrap_or_default(),
            });
        }

        if let Some(concept) = &spec.metadata.concept {
            let x = spec.x.unwrap_or(0.0);
            let y = spec.y.unwrap_or(0.0);
            let w = spec.width.unwrap_or(0.0);
            let h = spec.height.unwrap_or(0.0);
            concept_boxes
                .entry(concept.clone())
                .or_default()
                .push([x, y, x + w, y + h]);
        }
    }

    let concept_clusters = concept_boxes
        .into_iter()
        .map(|(concept, boxes)| {
            let min_x = boxes.iter().map(|b| b[0]).fold(f64::INFINITY, f64::min);
            let min_y = boxes.iter().map(|b| b[1]).fold(f64::INFINITY, f64::min);
            let max_x = boxes.iter().map(|b| b[2]).fold(f64::NEG_INFINITY, f64::max);
            let max_y = boxes.iter().map(|b| b[3]).fold(f64::NEG_INFINITY, f64::max);
            ConceptCluster {
                concept,
                bbox: [min_x, min_y, max_x, max_y],
                count: boxes.len() as u32,
            }
        })
        .collect();

    let active_highlights = ephemeral
        .iter()
        .filter(|s| s.kind == "highlight_stroke")
        .count() as u32;
    let active_question_tags = ephemeral
        .iter()
        .filter(|s| s.kind == "question_tag")
        .map(|s| EphemeralQuestionTag {
            id: s.id.clone(),
            linked_object_id: s
                .metadata
                .linked_to
                .clone()
                .or_else(|| {
                    s.metadata
                        .extra
                        .get("linkedObjectId")
                        .and_then(|v| v.as_str().map(str::to_owned))
                }),
        })
        .collect();
    let recent_pointer = ephemeral
        .iter()
        .filter(|s| s.kind == "pointer_ping")
        .max_by(|a, b| {
            let ea = a.metadata.expires_at.unwrap_or(0.0);
            let eb = b.metadata.expires_at.unwrap_or(0.0);
            ea.partial_cmp(&eb).unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|s| PointerPing {
            x: s.x,
            y: s.y,
            meta: serde_json::to_value(&s.metadata).unwrap_or_default(),
        });

    BoardDigest {
        counts: DigestCounts { by_kind, by_owner },
        learner_question_tags,
        concept_clusters,
        ephemeral_summary: EphemeralSummary {
            active_highlights,
            active_question_tags,
            recent_pointer,
        },
    }
}

/// Compress objects to a compact `id`/`tags`/`bbox` JSON list for LLM
/// consumption.
pub fn compress_board_objects(objects: &[CanvasObjectSpec]) -> String {
    let compressed: Vec<serde_json::Value> = objects
        .iter()
        .map(|spec| {
            let mut item = serde_json::json!({"id": spec.id});
            if let Some(tags) = &spec.metadata.semantic_tags {
                if !tags.is_empty() {
                    item["tags"] = serde_json::json!(tags);
                }
            }
            if let Some(bbox) = spec.abs_bbox() {
                item["bbox"] = serde_json::json!(bbox);
            }
            item
        })
        .collect();
    serde_json::to_string(&compressed).unwrap_or_else(|_| "[]".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    

    fn spec(id: &str, kind: &str, source: &str) -> CanvasObjectSpec {
        let mut s = CanvasObjectSpec::new(id, kind);
        s.metadata.source = Some(source.into());
        s
    }

    #[test]
    fn counts_by_kind_and_owner() {
        let objects = vec![
            spec("a", "text", "assistant"),
            spec("b", "text", "assistant"),
            spec("c", "rect", "user"),
        ];
        let digest = board_digest(&objects, &[]);
        assert_eq!(digest.counts.by_kind["text"], 2);
        assert_eq!(digest.counts.by_kind["rect"], 1);
        assert_eq!(digest.counts.by_owner["assistant"], 2);
        assert_eq!(digest.counts.by_owner["user"], 1);
    }

    #[test]
    fn concept_clusters_compute_envelopes() {
        let mut a = spec("a", "rect", "assistant");
        a.metadata.concept = Some("water_cycle".into());
        a.x = Some(10.0);
        a.y = Some(10.0);
        a.width = Some(20.0);
        a.height = Some(20.0);
        let mut b = spec("b", "text", "assistant");
        b.metadata.concept = Some("water_cycle".into());
        b.x = Some(100.0);
        b.y = Some(5.0);
        b.width = Some(50.0);
        b.height = Some(10.0);

        let digest = board_digest(&[a, b], &[]);
        assert_eq!(digest.concept_clusters.len(), 1);
        let cluster = &digest.concept_clusters[0];
        assert_eq!(cluster.concept, "water_cycle");
        assert_eq!(cluster.bbox, [10.0, 5.0, 150.0, 30.0]);
        assert_eq!(cluster.count, 2);
    }

    #[test]
    fn question_tags_and_ephemeral_summary() {
        let mut tag = spec("qtag-1", "circle", "user");
        tag.metadata.role = Some("question_tag".into());
        tag.x = Some(120.0);
        tag.y = Some(200.0);

        let mut highlight = CanvasObjectSpec::new("h1", "highlight_stroke");
        highlight.metadata.expires_at = Some(1.0);
        let mut ping_old = CanvasObjectSpec::new("p1", "pointer_ping");
        ping_old.metadata.expires_at = Some(10.0);
        let mut ping_new = CanvasObjectSpec::new("p2", "pointer_ping");
        ping_new.metadata.expires_at = Some(20.0);
        ping_new.x = Some(5.0);

        let digest = board_digest(&[tag], &[highlight, ping_old, ping_new]);
        assert_eq!(digest.learner_question_tags.len(), 1);
        assert_eq!(digest.learner_question_tags[0].id, "qtag-1");
        assert_eq!(digest.ephemeral_summary.active_highlights, 1);
        assert_eq!(
            digest.ephemeral_summary.recent_pointer.as_ref().unwrap().x,
            Some(5.0)
        );
    }

    #[test]
    fn compress_emits_ids_tags_bbox() {
        let mut a = spec("a", "rect", "assistant");
        a.metadata.semantic_tags = Some(vec!["math".into()]);
        a.metadata.bbox = Some([1.0, 2.0, 3.0, 4.0]);
        let b = spec("b", "text", "user");

        let compressed = compress_board_objects(&[a, b]);
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&compressed).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["tags"][0], "math");
        assert_eq!(parsed[0]["bbox"][2], 3.0);
        assert!(parsed[1].get("tags").is_none());
    }
}
