//! Authoritative per-session whiteboard documents.
//!
//! Each session owns one automerge document with two root maps: `objects`
//! (durable canvas specs) and `ephemeral` (specs with `metadata.expiresAt`,
//! garbage-collected). Clients exchange opaque binary update blobs; the
//! server applies each under a per-session lock, rewrites learner-authored
//! owners, broadcasts to peers, and persists the snapshot to the KV store.
//!
//! Canvas specs are stored as JSON-encoded map values. Sync granularity is
//! the whole spec, which keeps the owner-rewrite and digest passes a single
//! map walk.

use std::collections::HashMap;
use std::sync::Arc;

use automerge::transaction::Transactable;
use automerge::{AutoCommit, ObjId, ObjType, ReadDoc, Value, ROOT};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use tg_domain::canvas::{CanvasObjectSpec, WhiteboardAction, SOURCE_USER};
use tg_domain::error::{Error, Result};
use tg_store::KvStore;

const OBJECTS_MAP: &str = "objects";
const EPHEMERAL_MAP: &str = "ephemeral";

/// Ephemeral kinds written by highlight/pointer actions.
const KIND_HIGHLIGHT: &str = "highlight_stroke";
const KIND_POINTER: &str = "pointer_ping";

/// Default lifetime for highlight strokes mirrored into the ephemeral map.
const HIGHLIGHT_TTL_MS: f64 = 10_000.0;

fn am_err(e: automerge::AutomergeError) -> Error {
    Error::Whiteboard(e.to_string())
}

pub fn snapshot_key(session_id: Uuid) -> String {
    format!("wb:snapshot:{session_id}")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SessionDoc
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct DocInner {
    doc: AutoCommit,
    peers: HashMap<u64, mpsc::Sender<Vec<u8>>>,
    next_peer_id: u64,
}

/// One session's document plus its connected whiteboard peers.
///
/// The `tokio::sync::Mutex` serializes apply+broadcast across the chat and
/// whiteboard tasks that share the doc.
pub struct SessionDoc {
    session_id: Uuid,
    inner: Mutex<DocInner>,
}

impl SessionDoc {
    fn new(session_id: Uuid, doc: AutoCommit) -> Self {
        Self {
            session_id,
            inner: Mutex::new(DocInner {
                doc,
                peers: HashMap::new(),
                next_peer_id: 0,
            }),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Register a peer; returns its id and the channel its updates arrive on.
    pub async fn add_peer(&self) -> (u64, mpsc::Receiver<Vec<u8>>) {
        let mut inner = self.inner.lock().await;
        let id = inner.next_peer_id;
        inner.next_peer_id += 1;
        let (tx, rx) = mpsc::channel(64);
        inner.peers.insert(id, tx);
        (id, rx)
    }

    /// Remove a peer; returns the number of peers remaining.
    pub async fn remove_peer(&self, peer_id: u64) -> usize {
        let mut inner = self.inner.lock().await;
        inner.peers.remove(&peer_id);
        inner.peers.len()
    }

    /// Full serialized document, sent to clients on connect.
    pub async fn save_bytes(&self) -> Vec<u8> {
        self.inner.lock().await.doc.save()
    }

    /// Apply one learner update: load the incremental blob, enforce the
    /// owner invariant, and relay the raw bytes to every other peer.
    /// Returns the number of sanitized objects.
    pub async fn apply_learner_update(&self, update: &[u8], origin_peer: u64) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        inner.doc.load_incremental(update).map_err(|e| {
            Error::Whiteboard(format!("bad update for session {}: {e}", self.session_id))
        })?;

        let sanitized = rewrite_owners(&mut inner.doc)?;
        if sanitized > 0 {
            tracing::warn!(
                session_id = %self.session_id,
                sanitized,
                "rewrote spoofed owner field(s) from learner update"
            );
        }

        // Broadcast after apply, under the same lock, so peers observe
        // updates in apply order.
        let mut dead = Vec::new();
        for (peer_id, tx) in &inner.peers {
            if *peer_id == origin_peer {
                continue;
            }
            if tx.try_send(update.to_vec()).is_err() {
                dead.push(*peer_id);
            }
        }
        for peer_id in dead {
            inner.peers.remove(&peer_id);
        }

        Ok(sanitized)
    }

    /// All durable objects, parsed.
    pub async fn objects(&self) -> Vec<CanvasObjectSpec> {
        let mut inner = self.inner.lock().await;
        read_specs(&mut inner.doc, OBJECTS_MAP)
    }

    /// All ephemeral objects, parsed.
    pub async fn ephemeral_objects(&self) -> Vec<CanvasObjectSpec> {
        let mut inner = self.inner.lock().await;
        read_specs(&mut inner.doc, EPHEMERAL_MAP)
    }

    /// Mirror assistant-produced actions into the authoritative document.
    pub async fn apply_actions(&self, actions: &[WhiteboardAction]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        for action in actions {
            apply_action(&mut inner.doc, action)?;
        }
        Ok(())
    }

    /// Delete ephemeral entries whose `expiresAt` has passed. Returns the
    /// number of entries removed.
    pub async fn gc_expired(&self, now_ms: f64) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let doc = &mut inner.doc;
        let map = ensure_map(doc, EPHEMERAL_MAP)?;
        let keys: Vec<String> = doc.keys(&map).collect();
        let mut removed = 0;
        for key in keys {
            let expired = read_spec(doc, &map, &key)
                .and_then(|spec| spec.metadata.expires_at)
                .map(|at| at < now_ms)
                .unwrap_or(false);
            if expired {
                doc.delete(&map, key.as_str()).map_err(am_err)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Document helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn ensure_map(doc: &mut AutoCommit, key: &str) -> Result<ObjId> {
    let existing = match doc.get(ROOT, key).map_err(am_err)? {
        Some((Value::Object(ObjType::Map), id)) => Some(id),
        _ => None,
    };
    match existing {
        Some(id) => Ok(id),
        None => doc.put_object(ROOT, key, ObjType::Map).map_err(am_err),
    }
}

fn put_spec(doc: &mut AutoCommit, map: &ObjId, spec: &CanvasObjectSpec) -> Result<()> {
    let raw = serde_json::to_string(spec)?;
    doc.put(map, spec.id.as_str(), raw).map_err(am_err)
}

fn read_spec(doc: &AutoCommit, map: &ObjId, key: &str) -> Option<CanvasObjectSpec> {
    match doc.get(map, key) {
        Ok(Some((Value::Scalar(scalar), _))) => match scalar.as_ref() {
            automerge::ScalarValue::Str(raw) => serde_json::from_str(raw).ok(),
            _ => None,
        },
        _ => None,
    }
}

fn read_specs(doc: &mut AutoCommit, map_key: &str) -> Vec<CanvasObjectSpec> {
    let map = match ensure_map(doc, map_key) {
        Ok(map) => map,
        Err(_) => return Vec::new(),
    };
    let keys: Vec<String> = doc.keys(&map).collect();
    keys.iter()
        .filter_map(|key| read_spec(doc, &map, key))
        .collect()
}

/// Enforce the tenancy invariant: learner connections may only author
/// objects with `metadata.source == "user"`.
fn rewrite_owners(doc: &mut AutoCommit) -> Result<usize> {
    let map = ensure_map(doc, OBJECTS_MAP)?;
    let keys: Vec<String> = doc.keys(&map).collect();
    let mut patched = 0;
    for key in keys {
        if let Some(mut spec) = read_spec(doc, &map, &key) {
            if spec.metadata.source.as_deref() != Some(SOURCE_USER) {
                spec.metadata.source = Some(SOURCE_USER.to_owned());
                put_spec(doc, &map, &spec)?;
                patched += 1;
            }
        }
    }
    Ok(patched)
}

fn apply_action(doc: &mut AutoCommit, action: &WhiteboardAction) -> Result<()> {
    match action {
        WhiteboardAction::AddObjects { objects, .. } => {
            for spec in objects {
                let target = if spec.metadata.expires_at.is_some() {
                    EPHEMERAL_MAP
                } else {
                    OBJECTS_MAP
                };
                let map = ensure_map(doc, target)?;
                put_spec(doc, &map, spec)?;
            }
        }
        WhiteboardAction::UpdateObjects { objects } => {
            let map = ensure_map(doc, OBJECTS_MAP)?;
            for update in objects {
                if let Some(spec) = read_spec(doc, &map, &update.object_id) {
                    let mut value = serde_json::to_value(&spec)?;
                    if let Some(obj) = value.as_object_mut() {
                        for (k, v) in &update.updates {
                            obj.insert(k.clone(), v.clone());
                        }
                    }
                    let merged: CanvasObjectSpec = serde_json::from_value(value)?;
                    put_spec(doc, &map, &merged)?;
                }
            }
        }
        WhiteboardAction::DeleteObjects { object_ids } => {
            let map = ensure_map(doc, OBJECTS_MAP)?;
            for id in object_ids {
                let exists = doc.get(&map, id.as_str()).map_err(am_err)?.is_some();
                if exists {
                    doc.delete(&map, id.as_str()).map_err(am_err)?;
                }
            }
        }
        WhiteboardAction::ClearBoard => {
            for map_key in [OBJECTS_MAP, EPHEMERAL_MAP] {
                let map = ensure_map(doc, map_key)?;
                let keys: Vec<String> = doc.keys(&map).collect();
                for key in keys {
                    doc.delete(&map, key.as_str()).map_err(am_err)?;
                }
            }
        }
        WhiteboardAction::GroupObjects {
            group_id,
            object_ids,
        } => {
            let map = ensure_map(doc, OBJECTS_MAP)?;
            for id in object_ids {
                if let Some(mut spec) = read_spec(doc, &map, id) {
                    spec.metadata.group_id = Some(group_id.clone());
                    put_spec(doc, &map, &spec)?;
                }
            }
        }
        WhiteboardAction::MoveGroup {
            group_id,
            dx_pct,
            dy_pct,
        } => {
            let map = ensure_map(doc, OBJECTS_MAP)?;
            let keys: Vec<String> = doc.keys(&map).collect();
            for key in keys {
                if let Some(mut spec) = read_spec(doc, &map, &key) {
                    if spec.metadata.group_id.as_deref() == Some(group_id.as_str()) {
                        if let Some(x) = spec.x_pct {
                            spec.x_pct = Some(x + dx_pct);
                        }
                        if let Some(y) = spec.y_pct {
                            spec.y_pct = Some(y + dy_pct);
                        }
                        put_spec(doc, &map, &spec)?;
                    }
                }
            }
        }
        WhiteboardAction::DeleteGroup { group_id } => {
            let map = ensure_map(doc, OBJECTS_MAP)?;
            let keys: Vec<String> = doc.keys(&map).collect();
            for key in keys {
                let in_group = read_spec(doc, &map, &key)
                    .map(|s| s.metadata.group_id.as_deref() == Some(group_id.as_str()))
                    .unwrap_or(false);
                if in_group {
                    doc.delete(&map, key.as_str()).map_err(am_err)?;
                }
            }
        }
        WhiteboardAction::HighlightObject {
            target_object_id,
            color,
            pulse,
        } => {
            let now_ms = chrono::Utc::now().timestamp_millis() as f64;
            let mut spec =
                CanvasObjectSpec::new(format!("highlight-{target_object_id}"), KIND_HIGHLIGHT);
            spec.metadata.linked_to = Some(target_object_id.clone());
            spec.metadata.expires_at = Some(now_ms + HIGHLIGHT_TTL_MS);
            spec.props
                .insert("color".into(), serde_json::json!(color));
            spec.props
                .insert("pulse".into(), serde_json::json!(pulse));
            let map = ensure_map(doc, EPHEMERAL_MAP)?;
            put_spec(doc, &map, &spec)?;
        }
        WhiteboardAction::ShowPointerAt {
            x,
            y,
            pointer_id,
            duration_ms,
            color,
        } => {
            let now_ms = chrono::Utc::now().timestamp_millis() as f64;
            let id = pointer_id
                .clone()
                .unwrap_or_else(|| "pointer-ping".to_owned());
            let mut spec = CanvasObjectSpec::new(id, KIND_POINTER);
            spec.x = Some(*x);
            spec.y = Some(*y);
            spec.metadata.expires_at = Some(now_ms + *duration_ms as f64);
            spec.props
                .insert("color".into(), serde_json::json!(color));
            let map = ensure_map(doc, EPHEMERAL_MAP)?;
            put_spec(doc, &map, &spec)?;
        }
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process-wide registry of live session documents.
pub struct DocRegistry {
    docs: parking_lot::Mutex<HashMap<Uuid, Arc<SessionDoc>>>,
    kv: Arc<dyn KvStore>,
}

impl DocRegistry {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            docs: parking_lot::Mutex::new(HashMap::new()),
            kv,
        }
    }

    /// Return the live doc for a session, hydrating from the last KV
    /// snapshot when it is not in memory.
    pub async fn get_or_load(&self, session_id: Uuid) -> Result<Arc<SessionDoc>> {
        if let Some(doc) = self.docs.lock().get(&session_id) {
            return Ok(doc.clone());
        }

        let doc = match self.kv.get(&snapshot_key(session_id)).await? {
            Some(bytes) => {
                let loaded = AutoCommit::load(&bytes).map_err(|e| {
                    Error::Whiteboard(format!("corrupt snapshot for {session_id}: {e}"))
                })?;
                tracing::info!(
                    session_id = %session_id,
                    bytes = bytes.len(),
                    "restored whiteboard doc from snapshot"
                );
                loaded
            }
            None => AutoCommit::new(),
        };

        let doc = Arc::new(SessionDoc::new(session_id, doc));
        // A concurrent loader may have won; keep the first one registered.
        let mut docs = self.docs.lock();
        Ok(docs.entry(session_id).or_insert(doc).clone())
    }

    /// Look up a live doc without hydrating.
    pub fn get_live(&self, session_id: Uuid) -> Option<Arc<SessionDoc>> {
        self.docs.lock().get(&session_id).cloned()
    }

    /// Persist the current state to the KV store.
    pub async fn persist(&self, doc: &SessionDoc) -> Result<()> {
        let bytes = doc.save_bytes().await;
        self.kv.put(&snapshot_key(doc.session_id()), bytes).await
    }

    /// Persist a final snapshot and drop the doc from memory. Call after
    /// the last client disconnects.
    pub async fn unload(&self, session_id: Uuid) -> Result<()> {
        let doc = self.docs.lock().remove(&session_id);
        if let Some(doc) = doc {
            self.persist(&doc).await?;
            tracing::info!(session_id = %session_id, "whiteboard doc unloaded");
        }
        Ok(())
    }

    pub fn live_docs(&self) -> Vec<Arc<SessionDoc>> {
        self.docs.lock().values().cloned().collect()
    }

    /// Spawn the periodic ephemeral GC task.
    pub fn spawn_gc(self: &Arc<Self>, interval_secs: u64) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let period = std::time::Duration::from_secs(interval_secs.max(1));
            loop {
                tokio::time::sleep(period).await;
                let now_ms = chrono::Utc::now().timestamp_millis() as f64;
                for doc in registry.live_docs() {
                    match doc.gc_expired(now_ms).await {
                        Ok(0) => {}
                        Ok(removed) => {
                            tracing::debug!(
                                session_id = %doc.session_id(),
                                removed,
                                "ephemeral GC tick"
                            );
                        }
                        Err(e) => {
                            tracing::error!(
                                session_id = %doc.session_id(),
                                error = %e,
                                "ephemeral GC failed"
                            );
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tg_domain::canvas::{ObjectMetadata, SOURCE_ASSISTANT};
    use tg_store::MemoryKv;

    fn registry() -> Arc<DocRegistry> {
        Arc::new(DocRegistry::new(Arc::new(MemoryKv::new())))
    }

    fn assistant_spec(id: &str) -> CanvasObjectSpec {
        let mut spec = CanvasObjectSpec::new(id, "text");
        spec.metadata = ObjectMetadata::assistant();
        spec.x = Some(10.0);
        spec.y = Some(20.0);
        spec
    }

    #[tokio::test]
    async fn add_and_read_objects() {
        let reg = registry();
        let sid = Uuid::new_v4();
        let doc = reg.get_or_load(sid).await.unwrap();
        doc.apply_actions(&[WhiteboardAction::add(vec![
            assistant_spec("a"),
            assistant_spec("b"),
        ])])
        .await
        .unwrap();
        let mut ids: Vec<String> = doc.objects().await.into_iter().map(|s| s.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn learner_update_rewrites_spoofed_owner() {
        let reg = registry();
        let sid = Uuid::new_v4();
        let doc = reg.get_or_load(sid).await.unwrap();

        // A "client" doc forks the server state and writes an object
        // claiming to be assistant-authored.
        let mut client = AutoCommit::load(&doc.save_bytes().await).unwrap();
        let map = ensure_map(&mut client, OBJECTS_MAP).unwrap();
        let mut spec = CanvasObjectSpec::new("spoof", "rect");
        spec.metadata.source = Some(SOURCE_ASSISTANT.to_owned());
        put_spec(&mut client, &map, &spec).unwrap();
        let update = client.save_incremental();

        let sanitized = doc.apply_learner_update(&update, 0).await.unwrap();
        assert_eq!(sanitized, 1);
        let objects = doc.objects().await;
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].metadata.source.as_deref(), Some(SOURCE_USER));
    }

    #[tokio::test]
    async fn updates_broadcast_to_other_peers_only() {
        let reg = registry();
        let doc = reg.get_or_load(Uuid::new_v4()).await.unwrap();
        let (origin, mut origin_rx) = doc.add_peer().await;
        let (_other, mut other_rx) = doc.add_peer().await;

        let mut client = AutoCommit::load(&doc.save_bytes().await).unwrap();
        let map = ensure_map(&mut client, OBJECTS_MAP).unwrap();
        put_spec(&mut client, &map, &CanvasObjectSpec::new("o", "rect")).unwrap();
        let update = client.save_incremental();

        doc.apply_learner_update(&update, origin).await.unwrap();
        assert_eq!(other_rx.recv().await.unwrap(), update);
        assert!(origin_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn gc_removes_expired_ephemerals() {
        let reg = registry();
        let doc = reg.get_or_load(Uuid::new_v4()).await.unwrap();
        let now_ms = chrono::Utc::now().timestamp_millis() as f64;

        let mut stale = CanvasObjectSpec::new("stale", "pointer_ping");
        stale.metadata.expires_at = Some(now_ms - 1_000.0);
        let mut live = CanvasObjectSpec::new("live", "pointer_ping");
        live.metadata.expires_at = Some(now_ms + 60_000.0);
        doc.apply_actions(&[WhiteboardAction::add(vec![stale, live])])
            .await
            .unwrap();

        let removed = doc.gc_expired(now_ms).await.unwrap();
        assert_eq!(removed, 1);
        let remaining = doc.ephemeral_objects().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "live");
    }

    #[tokio::test]
    async fn clear_board_wipes_both_maps() {
        let reg = registry();
        let doc = reg.get_or_load(Uuid::new_v4()).await.unwrap();
        doc.apply_actions(&[
            WhiteboardAction::add(vec![assistant_spec("a")]),
            WhiteboardAction::ShowPointerAt {
                x: 1.0,
                y: 2.0,
                pointer_id: None,
                duration_ms: 3000,
                color: "#1976D2".into(),
            },
        ])
        .await
        .unwrap();
        assert_eq!(doc.objects().await.len(), 1);
        assert_eq!(doc.ephemeral_objects().await.len(), 1);

        doc.apply_actions(&[WhiteboardAction::ClearBoard])
            .await
            .unwrap();
        assert!(doc.objects().await.is_empty());
        assert!(doc.ephemeral_objects().await.is_empty());
    }

    #[tokio::test]
    async fn group_lifecycle_on_doc() {
        let reg = registry();
        let doc = reg.get_or_load(Uuid::new_v4()).await.unwrap();
        doc.apply_actions(&[WhiteboardAction::add(vec![
            assistant_spec("a"),
            assistant_spec("b"),
        ])])
        .await
        .unwrap();

        doc.apply_actions(&[WhiteboardAction::GroupObjects {
            group_id: "g1".into(),
            object_ids: vec!["a".into(), "b".into()],
        }])
        .await
        .unwrap();
        assert!(doc
            .objects()
            .await
            .iter()
            .all(|s| s.metadata.group_id.as_deref() == Some("g1")));

        doc.apply_actions(&[WhiteboardAction::DeleteGroup {
            group_id: "g1".into(),
        }])
        .await
        .unwrap();
        assert!(doc.objects().await.is_empty());
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_kv() {
        let kv = Arc::new(MemoryKv::new());
        let sid = Uuid::new_v4();
        {
            let reg = Arc::new(DocRegistry::new(kv.clone()));
            let doc = reg.get_or_load(sid).await.unwrap();
            doc.apply_actions(&[WhiteboardAction::add(vec![assistant_spec("kept")])])
                .await
                .unwrap();
            reg.unload(sid).await.unwrap();
        }
        let reg = Arc::new(DocRegistry::new(kv));
        let doc = reg.get_or_load(sid).await.unwrap();
        let objects = doc.objects().await;
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].id, "kept");
    }
}
