//! File-backed [`TutorStore`] implementation.
//!
//! Each table lives in memory behind a `parking_lot::RwLock` and is written
//! to `<state_path>/store/<table>.json` after every mutation. Good enough
//! for single-process deployments and tests; a real database implements the
//! same trait.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use tg_domain::error::{Error, Result};

use crate::rows::{
    AnalysisStatus, FolderRow, InteractionLogRow, MessageRow, SessionRow, SnapshotRow,
};
use crate::traits::TutorStore;

pub struct FileStore {
    dir: PathBuf,
    sessions: RwLock<HashMap<Uuid, SessionRow>>,
    messages: RwLock<HashMap<Uuid, Vec<MessageRow>>>,
    snapshots: RwLock<HashMap<Uuid, Vec<SnapshotRow>>>,
    folders: RwLock<HashMap<Uuid, FolderRow>>,
    concept_edges: RwLock<Vec<(String, String)>>,
    interaction_logs: RwLock<HashMap<Uuid, Vec<InteractionLogRow>>>,
}

impl FileStore {
    /// Load or create the store under `state_path/store`.
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("store");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;

        let store = Self {
            sessions: RwLock::new(load_table(&dir, "sessions")),
            messages: RwLock::new(load_table(&dir, "messages")),
            snapshots: RwLock::new(load_table(&dir, "snapshots")),
            folders: RwLock::new(load_table(&dir, "folders")),
            concept_edges: RwLock::new(load_table(&dir, "concept_graph")),
            interaction_logs: RwLock::new(load_table(&dir, "interaction_logs")),
            dir,
        };

        tracing::info!(
            sessions = store.sessions.read().len(),
            folders = store.folders.read().len(),
            path = %store.dir.display(),
            "file store loaded"
        );
        Ok(store)
    }

    fn flush<T: Serialize>(&self, table: &str, data: &T) -> Result<()> {
        let path = self.dir.join(format!("{table}.json"));
        let json = serde_json::to_string_pretty(data)
            .map_err(|e| Error::Store(format!("serializing {table}: {e}")))?;
        std::fs::write(&path, json).map_err(Error::Io)
    }
}

fn load_table<T: DeserializeOwned + Default>(dir: &Path, table: &str) -> T {
    let path = dir.join(format!("{table}.json"));
    if !path.exists() {
        return T::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(table, error = %e, "failed to parse table file; starting empty");
            T::default()
        }),
        Err(e) => {
            tracing::warn!(table, error = %e, "failed to read table file; starting empty");
            T::default()
        }
    }
}

#[async_trait::async_trait]
impl TutorStore for FileStore {
    // ── Sessions ─────────────────────────────────────────────────────

    async fn create_session(
        &self,
        user_id: &str,
        folder_id: Option<Uuid>,
        context_data: serde_json::Value,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let row = SessionRow {
            id,
            user_id: user_id.to_owned(),
            folder_id,
            context_data,
            analysis_status: None,
            ended_at: None,
            created_at: now,
            updated_at: now,
        };
        let mut sessions = self.sessions.write();
        sessions.insert(id, row);
        self.flush("sessions", &*sessions)?;
        Ok(id)
    }

    async fn get_session(&self, id: Uuid, user_id: &str) -> Result<Option<SessionRow>> {
        Ok(self
            .sessions
            .read()
            .get(&id)
            .filter(|row| row.user_id == user_id)
            .cloned())
    }

    async fn save_context(
        &self,
        id: Uuid,
        user_id: &str,
        context_data: serde_json::Value,
    ) -> Result<()> {
        let mut sessions = self.sessions.write();
        let row = sessions
            .get_mut(&id)
            .filter(|row| row.user_id == user_id)
            .ok_or_else(|| Error::Store(format!("session {id} not found for user")))?;
        row.context_data = context_data;
        row.updated_at = Utc::now();
        self.flush("sessions", &*sessions)
    }

    async fn analysis_status(&self, id: Uuid) -> Result<Option<AnalysisStatus>> {
        Ok(self.sessions.read().get(&id).and_then(|r| r.analysis_status))
    }

    async fn claim_analysis(&self, id: Uuid) -> Result<bool> {
        // The write lock makes the null-check + set a critical section, which
        // is the file-store equivalent of `UPDATE … WHERE status IS NULL`.
        let mut sessions = self.sessions.write();
        let row = sessions
            .get_mut(&id)
            .ok_or_else(|| Error::Store(format!("session {id} not found")))?;
        if row.analysis_status.is_some() {
            return Ok(false);
        }
        row.analysis_status = Some(AnalysisStatus::Processing);
        row.updated_at = Utc::now();
        self.flush("sessions", &*sessions)?;
        Ok(true)
    }

    async fn finish_analysis(&self, id: Uuid, status: AnalysisStatus) -> Result<()> {
        let mut sessions = self.sessions.write();
        let row = sessions
            .get_mut(&id)
            .ok_or_else(|| Error::Store(format!("session {id} not found")))?;
        if row.analysis_status != Some(AnalysisStatus::Processing) {
            tracing::warn!(
                session_id = %id,
                current = ?row.analysis_status,
                requested = ?status,
                "ignoring analysis transition from non-processing state"
            );
            return Ok(());
        }
        row.analysis_status = Some(status);
        row.updated_at = Utc::now();
        self.flush("sessions", &*sessions)
    }

    async fn mark_ended(&self, id: Uuid) -> Result<()> {
        let mut sessions = self.sessions.write();
        if let Some(row) = sessions.get_mut(&id) {
            row.ended_at = Some(Utc::now());
            row.updated_at = Utc::now();
        }
        self.flush("sessions", &*sessions)
    }

    // ── Chat turns ───────────────────────────────────────────────────

    async fn append_message(&self, row: MessageRow) -> Result<()> {
        let mut messages = self.messages.write();
        let rows = messages.entry(row.session_id).or_default();
        if rows.iter().any(|r| r.turn_no == row.turn_no) {
            return Err(Error::Store(format!(
                "duplicate turn {} for session {}",
                row.turn_no, row.session_id
            )));
        }
        rows.push(row);
        rows.sort_by_key(|r| r.turn_no);
        self.flush("messages", &*messages)
    }

    async fn messages_page(
        &self,
        session_id: Uuid,
        before_turn_no: Option<u64>,
        limit: usize,
    ) -> Result<Vec<MessageRow>> {
        let messages = self.messages.read();
        let rows = match messages.get(&session_id) {
            Some(rows) => rows,
            None => return Ok(Vec::new()),
        };
        let filtered: Vec<MessageRow> = rows
            .iter()
            .filter(|r| before_turn_no.map_or(true, |b| r.turn_no < b))
            .cloned()
            .collect();
        // Keep the most recent `limit` rows, chronological order.
        let skip = filtered.len().saturating_sub(limit);
        Ok(filtered.into_iter().skip(skip).collect())
    }

    // ── Whiteboard snapshots ─────────────────────────────────────────

    async fn put_snapshot(&self, row: SnapshotRow) -> Result<()> {
        let mut snapshots = self.snapshots.write();
        let rows = snapshots.entry(row.session_id).or_default();
        rows.retain(|r| r.snapshot_index != row.snapshot_index);
        rows.push(row);
        rows.sort_by_key(|r| r.snapshot_index);
        self.flush("snapshots", &*snapshots)
    }

    async fn snapshots_up_to(&self, session_id: Uuid, index: u64) -> Result<Vec<SnapshotRow>> {
        Ok(self
            .snapshots
            .read()
            .get(&session_id)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.snapshot_index <= index)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    // ── Folders ──────────────────────────────────────────────────────

    async fn create_folder(&self, user_id: &str, name: &str) -> Result<FolderRow> {
        let now = Utc::now();
        let row = FolderRow {
            id: Uuid::new_v4(),
            user_id: user_id.to_owned(),
            name: name.to_owned(),
            knowledge_base: String::new(),
            vector_store_id: None,
            created_at: now,
            updated_at: now,
        };
        let mut folders = self.folders.write();
        folders.insert(row.id, row.clone());
        self.flush("folders", &*folders)?;
        Ok(row)
    }

    async fn get_folder(&self, id: Uuid, user_id: &str) -> Result<Option<FolderRow>> {
        Ok(self
            .folders
            .read()
            .get(&id)
            .filter(|row| row.user_id == user_id)
            .cloned())
    }

    async fn append_knowledge_base(&self, folder_id: Uuid, text: &str) -> Result<()> {
        let mut folders = self.folders.write();
        let row = folders
            .get_mut(&folder_id)
            .ok_or_else(|| Error::Store(format!("folder {folder_id} not found")))?;
        if !row.knowledge_base.is_empty() {
            row.knowledge_base.push_str("\n\n");
        }
        row.knowledge_base.push_str(text);
        row.updated_at = Utc::now();
        self.flush("folders", &*folders)
    }

    // ── Concept graph ────────────────────────────────────────────────

    async fn concept_edges(&self) -> Result<Vec<(String, String)>> {
        Ok(self.concept_edges.read().clone())
    }

    async fn add_concept_edge(&self, prereq: &str, concept: &str) -> Result<()> {
        let mut edges = self.concept_edges.write();
        edges.push((prereq.to_owned(), concept.to_owned()));
        self.flush("concept_graph", &*edges)
    }

    // ── Interaction logs ─────────────────────────────────────────────

    async fn log_interaction(&self, row: InteractionLogRow) -> Result<()> {
        let mut logs = self.interaction_logs.write();
        logs.entry(row.session_id).or_default().push(row);
        self.flush("interaction_logs", &*logs)
    }

    async fn interaction_logs(&self, session_id: Uuid) -> Result<Vec<InteractionLogRow>> {
        Ok(self
            .interaction_logs
            .read()
            .get(&session_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store() -> (tempfile::TempDir, Arc<FileStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path()).unwrap());
        (dir, store)
    }

    #[tokio::test]
    async fn session_lookup_is_owner_scoped() {
        let (_dir, store) = store();
        let id = store
            .create_session("alice", None, serde_json::json!({}))
            .await
            .unwrap();
        assert!(store.get_session(id, "alice").await.unwrap().is_some());
        assert!(store.get_session(id, "bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_turn_numbers_rejected() {
        let (_dir, store) = store();
        let sid = Uuid::new_v4();
        let row = |turn| MessageRow {
            session_id: sid,
            turn_no: turn,
            role: "user".into(),
            text: "hi".into(),
            payload_json: None,
            whiteboard_snapshot_index: None,
            created_at: Utc::now(),
        };
        store.append_message(row(1)).await.unwrap();
        assert!(store.append_message(row(1)).await.is_err());
        store.append_message(row(2)).await.unwrap();
    }

    #[tokio::test]
    async fn messages_page_returns_most_recent_chronological() {
        let (_dir, store) = store();
        let sid = Uuid::new_v4();
        for turn in 1..=10 {
            store
                .append_message(MessageRow {
                    session_id: sid,
                    turn_no: turn,
                    role: "user".into(),
                    text: format!("t{turn}"),
                    payload_json: None,
                    whiteboard_snapshot_index: None,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        let page = store.messages_page(sid, None, 3).await.unwrap();
        assert_eq!(
            page.iter().map(|r| r.turn_no).collect::<Vec<_>>(),
            vec![8, 9, 10]
        );
        let page = store.messages_page(sid, Some(8), 3).await.unwrap();
        assert_eq!(
            page.iter().map(|r| r.turn_no).collect::<Vec<_>>(),
            vec![5, 6, 7]
        );
    }

    #[tokio::test]
    async fn snapshots_up_to_filters_by_index() {
        let (_dir, store) = store();
        let sid = Uuid::new_v4();
        for index in [1u64, 3, 5] {
            store
                .put_snapshot(SnapshotRow {
                    session_id: sid,
                    snapshot_index: index,
                    actions_json: serde_json::json!([]),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        let rows = store.snapshots_up_to(sid, 3).await.unwrap();
        assert_eq!(
            rows.iter().map(|r| r.snapshot_index).collect::<Vec<_>>(),
            vec![1, 3]
        );
    }

    #[tokio::test]
    async fn analysis_claim_is_exclusive() {
        let (_dir, store) = store();
        let id = store
            .create_session("u", None, serde_json::json!({}))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.claim_analysis(id).await.unwrap()
            }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(
            store.analysis_status(id).await.unwrap(),
            Some(AnalysisStatus::Processing)
        );
    }

    #[tokio::test]
    async fn analysis_transitions_are_monotone() {
        let (_dir, store) = store();
        let id = store
            .create_session("u", None, serde_json::json!({}))
            .await
            .unwrap();
        assert!(store.claim_analysis(id).await.unwrap());
        store
            .finish_analysis(id, AnalysisStatus::Success)
            .await
            .unwrap();
        // A late "failed" from a loser must not clobber the final state.
        store
            .finish_analysis(id, AnalysisStatus::Failed)
            .await
            .unwrap();
        assert_eq!(
            store.analysis_status(id).await.unwrap(),
            Some(AnalysisStatus::Success)
        );
    }

    #[tokio::test]
    async fn knowledge_base_appends_only() {
        let (_dir, store) = store();
        let folder = store.create_folder("u", "bio").await.unwrap();
        store
            .append_knowledge_base(folder.id, "Session Summary: first")
            .await
            .unwrap();
        store
            .append_knowledge_base(folder.id, "Session Summary: second")
            .await
            .unwrap();
        let row = store.get_folder(folder.id, "u").await.unwrap().unwrap();
        assert!(row.knowledge_base.starts_with("Session Summary: first"));
        assert!(row.knowledge_base.ends_with("Session Summary: second"));
    }

    #[tokio::test]
    async fn tables_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let sid;
        {
            let store = FileStore::new(dir.path()).unwrap();
            sid = store
                .create_session("u", None, serde_json::json!({"k": 1}))
                .await
                .unwrap();
            store.add_concept_edge("A", "B").await.unwrap();
        }
        let store = FileStore::new(dir.path()).unwrap();
        assert!(store.get_session(sid, "u").await.unwrap().is_some());
        assert_eq!(
            store.concept_edges().await.unwrap(),
            vec![("A".to_string(), "B".to_string())]
        );
    }
}
