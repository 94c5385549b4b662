use serde::{Deserialize, Serialize};

/// The single learning goal a session currently pursues.
///
/// Produced by the focus planner; exactly one objective is active per
/// session and is replaced when the executor ends the session or the
/// planner is re-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusObjective {
    pub topic: String,
    pub learning_goal: String,
    /// Priority 1–5 (5 = highest).
    pub priority: i32,
    #[serde(default)]
    pub relevant_concepts: Vec<String>,
    #[serde(default)]
    pub suggested_approach: Option<String>,
    pub target_mastery: f64,
    #[serde(default)]
    pub initial_difficulty: Option<String>,
}

pub const DEFAULT_PRIORITY: i32 = 3;
pub const DEFAULT_TARGET_MASTERY: f64 = 0.8;

impl FocusObjective {
    /// Fill missing/invalid required fields with defaults, logging a warning
    /// for each. Returns the number of fields that had to be defaulted.
    pub fn apply_defaults(data: &mut serde_json::Value) -> usize {
        let mut patched = 0;
        if let Some(obj) = data.as_object_mut() {
            let priority_ok = obj.get("priority").map(|v| v.is_i64()).unwrap_or(false);
            if !priority_ok {
                tracing::warn!("focus objective missing 'priority'; defaulting to {DEFAULT_PRIORITY}");
                obj.insert("priority".into(), serde_json::json!(DEFAULT_PRIORITY));
                patched += 1;
            }
            let mastery_ok = obj
                .get("target_mastery")
                .map(|v| v.is_number())
                .unwrap_or(false);
            if !mastery_ok {
                tracing::warn!(
                    "focus objective missing 'target_mastery'; defaulting to {DEFAULT_TARGET_MASTERY}"
                );
                obj.insert(
                    "target_mastery".into(),
                    serde_json::json!(DEFAULT_TARGET_MASTERY),
                );
                patched += 1;
            }
        }
        patched
    }
}
