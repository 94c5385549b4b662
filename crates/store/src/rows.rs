use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of background session analysis. The transition automaton is
/// monotone: `None → Processing → {Success, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Processing,
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: Uuid,
    pub user_id: String,
    #[serde(default)]
    pub folder_id: Option<Uuid>,
    /// Lean tutor context (histories omitted).
    pub context_data: serde_json::Value,
    #[serde(default)]
    pub analysis_status: Option<AnalysisStatus>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub session_id: Uuid,
    pub turn_no: u64,
    /// `user` or `assistant`.
    pub role: String,
    pub text: String,
    /// Structured payload for assistant rows; never set on user rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_json: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whiteboard_snapshot_index: Option<u64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub session_id: Uuid,
    pub snapshot_index: u64,
    /// Serialized `Vec<WhiteboardAction>`.
    pub actions_json: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderRow {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub knowledge_base: String,
    #[serde(default)]
    pub vector_store_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionLogRow {
    pub session_id: Uuid,
    pub user_id: String,
    pub role: String,
    pub content: String,
    pub content_type: String,
    pub event_type: String,
    pub created_at: DateTime<Utc>,
}
