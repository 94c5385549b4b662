use tg_domain::error::Result;
use uuid::Uuid;

use crate::rows::{
    AnalysisStatus, FolderRow, InteractionLogRow, MessageRow, SessionRow, SnapshotRow,
};

/// The database seam. Every method is a suspension point; implementations
/// decide whether the backing store is a real database or local files.
#[async_trait::async_trait]
pub trait TutorStore: Send + Sync {
    // ── Sessions ─────────────────────────────────────────────────────

    async fn create_session(
        &self,
        user_id: &str,
        folder_id: Option<Uuid>,
        context_data: serde_json::Value,
    ) -> Result<Uuid>;

    /// Owner-scoped lookup: returns None when the session does not exist or
    /// belongs to a different user.
    async fn get_session(&self, id: Uuid, user_id: &str) -> Result<Option<SessionRow>>;

    async fn save_context(
        &self,
        id: Uuid,
        user_id: &str,
        context_data: serde_json::Value,
    ) -> Result<()>;

    async fn analysis_status(&self, id: Uuid) -> Result<Option<AnalysisStatus>>;

    /// Atomic claim: set `analysis_status = processing` iff it is currently
    /// null. Returns true when this caller won the claim.
    async fn claim_analysis(&self, id: Uuid) -> Result<bool>;

    /// Transition `processing → success|failed`. A no-op (with a warning)
    /// from any other state.
    async fn finish_analysis(&self, id: Uuid, status: AnalysisStatus) -> Result<()>;

    async fn mark_ended(&self, id: Uuid) -> Result<()>;

    // ── Chat turns ───────────────────────────────────────────────────

    /// Append a turn row. `(session_id, turn_no)` is unique; duplicates are
    /// rejected.
    async fn append_message(&self, row: MessageRow) -> Result<()>;

    /// Chronological slice ending before `before_turn_no` (exclusive; None =
    /// from the latest), at most `limit` rows.
    async fn messages_page(
        &self,
        session_id: Uuid,
        before_turn_no: Option<u64>,
        limit: usize,
    ) -> Result<Vec<MessageRow>>;

    // ── Whiteboard snapshots ─────────────────────────────────────────

    async fn put_snapshot(&self, row: SnapshotRow) -> Result<()>;

    /// All snapshots with `snapshot_index <= index`, ordered by index.
    async fn snapshots_up_to(&self, session_id: Uuid, index: u64) -> Result<Vec<SnapshotRow>>;

    // ── Folders ──────────────────────────────────────────────────────

    async fn create_folder(&self, user_id: &str, name: &str) -> Result<FolderRow>;

    async fn get_folder(&self, id: Uuid, user_id: &str) -> Result<Option<FolderRow>>;

    /// Append-only knowledge-base update (the analyzer's RPC).
    async fn append_knowledge_base(&self, folder_id: Uuid, text: &str) -> Result<()>;

    // ── Concept graph ────────────────────────────────────────────────

    /// Prerequisite edges as `(prereq, concept)` pairs.
    async fn concept_edges(&self) -> Result<Vec<(String, String)>>;

    async fn add_concept_edge(&self, prereq: &str, concept: &str) -> Result<()>;

    // ── Interaction logs ─────────────────────────────────────────────

    async fn log_interaction(&self, row: InteractionLogRow) -> Result<()>;

    async fn interaction_logs(&self, session_id: Uuid) -> Result<Vec<InteractionLogRow>>;
}
