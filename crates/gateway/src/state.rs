use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use tg_domain::config::Config;
use tg_providers::ProviderRegistry;
use tg_skills::{SkillCtxServices, SkillRegistry};
use tg_store::{KvStore, TutorStore};
use tg_whiteboard::{AllocatorMap, DocRegistry};

use crate::auth::AuthVerifier;

/// Shared application state passed to all handlers.
///
/// Fields are grouped by concern:
/// - **Core services** — config, LLM providers, persistence
/// - **Whiteboard** — live CRDT docs, layout allocators
/// - **Skills** — the registry plus the services threaded into dispatch
/// - **Runtime plumbing** — auth, pending board-state round-trips
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub llm: Arc<ProviderRegistry>,
    pub store: Arc<dyn TutorStore>,
    pub kv: Arc<dyn KvStore>,

    // ── Whiteboard ────────────────────────────────────────────────────
    pub docs: Arc<DocRegistry>,
    pub allocators: Arc<AllocatorMap>,

    // ── Skills ────────────────────────────────────────────────────────
    pub skills: Arc<SkillRegistry>,
    pub skill_services: Arc<SkillCtxServices>,

    // ── Runtime plumbing ──────────────────────────────────────────────
    pub auth: Arc<AuthVerifier>,
    /// Futures for in-flight REQUEST_BOARD_STATE round-trips, by request id.
    pub board_state_requests: Arc<PendingBoardRequests>,
}

impl AppState {
    /// Wire every subsystem from config + the chosen store/kv backends.
    pub fn build(
        config: Arc<Config>,
        store: Arc<dyn TutorStore>,
        kv: Arc<dyn KvStore>,
    ) -> tg_domain::error::Result<Self> {
        let llm = Arc::new(ProviderRegistry::from_config(&config.llm)?);
        if llm.is_empty() {
            tracing::warn!("no LLM providers initialized — executor turns will fail");
        } else {
            tracing::info!(providers = llm.len(), "LLM provider registry ready");
        }

        let docs = Arc::new(DocRegistry::new(kv.clone()));
        let allocators = Arc::new(AllocatorMap::new(config.whiteboard.clone()));
        let skills = Arc::new(SkillRegistry::standard());
        tracing::info!(skills = skills.list().count(), "skill registry ready");

        let skill_services = Arc::new(SkillCtxServices {
            allocators: allocators.clone(),
            docs: docs.clone(),
        });

        let auth = Arc::new(AuthVerifier::from_config(&config.auth));

        Ok(Self {
            config,
            llm,
            store,
            kv,
            docs,
            allocators,
            skills,
            skill_services,
            auth,
            board_state_requests: Arc::new(PendingBoardRequests::default()),
        })
    }
}

/// Pending futures for board-state round-trips to the client.
#[derive(Default)]
pub struct PendingBoardRequests {
    pending: Mutex<HashMap<String, oneshot::Sender<serde_json::Value>>>,
}

impl PendingBoardRequests {
    pub fn register(&self, request_id: &str) -> oneshot::Receiver<serde_json::Value> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id.to_owned(), tx);
        rx
    }

    /// Complete a pending request; returns false when no future was waiting.
    pub fn complete(&self, request_id: &str, payload: serde_json::Value) -> bool {
        match self.pending.lock().remove(request_id) {
            Some(tx) => tx.send(payload).is_ok(),
            None => false,
        }
    }

    pub fn remove(&self, request_id: &str) {
        self.pending.lock().remove(request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn board_request_completes_pending_future() {
        let pending = PendingBoardRequests::default();
        let rx = pending.register("req-1");
        assert!(pending.complete("req-1", serde_json::json!([1, 2])));
        assert_eq!(rx.await.unwrap(), serde_json::json!([1, 2]));
        // A second completion finds nothing.
        assert!(!pending.complete("req-1", serde_json::json!([])));
    }

    #[test]
    fn removing_unknown_request_is_a_noop() {
        let pending = PendingBoardRequests::default();
        pending.remove("missing");
    }
}
