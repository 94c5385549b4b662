//! End-to-end runtime flows driven by a scripted LLM: the happy MCQ turn,
//! deterministic answer evaluation, unknown-tool recovery, planner
//! bootstrap, and the analyzer claim protocol.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use tg_domain::canvas::WhiteboardAction;
use tg_domain::config::{AnalyzerConfig, ExecutorConfig, WhiteboardConfig};
use tg_domain::context::{PedagogicalAction, TutorContext};
use tg_domain::error::{Error, Result};
use tg_gateway::runtime::analyzer::run_session_analysis;
use tg_gateway::runtime::evaluator::run_deterministic_answer;
use tg_gateway::runtime::executor::{run_executor_turn, ExecutorDeps, TurnIo};
use tg_gateway::runtime::planner::determine_session_focus;
use tg_gateway::state::PendingBoardRequests;
use tg_providers::{ChatRequest, ChatResponse, LlmProvider, ProviderRegistry};
use tg_skills::{SkillCtxServices, SkillRegistry};
use tg_store::{AnalysisStatus, FileStore, InteractionLogRow, MemoryKv, TutorStore};
use tg_whiteboard::{AllocatorMap, DocRegistry};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted LLM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedLlm {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
        })
    }

    fn remaining(&self) -> usize {
        self.replies.lock().len()
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedLlm {
    async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
        let reply = self
            .replies
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Provider {
                provider: "scripted".into(),
                message: "unexpected LLM call".into(),
            })?;
        Ok(ChatResponse {
            content: reply,
            usage: None,
            model: "scripted".into(),
        })
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Harness {
    _dir: tempfile::TempDir,
    store: Arc<FileStore>,
    deps: ExecutorDeps,
    io: TurnIo,
    out_rx: mpsc::Receiver<String>,
    llm: Arc<ScriptedLlm>,
}

fn harness(replies: &[&str]) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path()).unwrap());
    let docs = Arc::new(DocRegistry::new(Arc::new(MemoryKv::new())));
    let allocators = Arc::new(AllocatorMap::new(WhiteboardConfig::default()));
    let llm = ScriptedLlm::new(replies);

    let deps = ExecutorDeps {
        provider: llm.clone(),
        store: store.clone(),
        skills: Arc::new(SkillRegistry::standard()),
        services: Arc::new(SkillCtxServices {
            allocators,
            docs: docs.clone(),
        }),
        docs,
        config: ExecutorConfig {
            retry_backoff_ms: 1,
            ..Default::default()
        },
    };

    let (out_tx, out_rx) = mpsc::channel(64);
    let io = TurnIo {
        outbound: out_tx,
        board_requests: Arc::new(PendingBoardRequests::default()),
    };

    Harness {
        _dir: dir,
        store,
        deps,
        io,
        out_rx,
        llm,
    }
}

fn recv_envelope(rx: &mut mpsc::Receiver<String>) -> serde_json::Value {
    let text = rx.try_recv().expect("expected an outbound message");
    serde_json::from_str(&text).unwrap()
}

const ASK_QUESTION_REPLY: &str = r#"{"name":"ask_question","args":{"question_data":{"question":"Inputs of photosynthesis?","options":["CO2+H2O+light","Glucose","Oxygen","Heat"],"correct_answer_index":0,"explanation":"Plants combine CO2 and water using light energy.","difficulty":"Easy","related_section":"Photosynthesis"},"template":"default_board","zone":"question_area"}}"#;

fn objective_reply() -> &'static str {
    r#"{"topic":"Photosynthesis","learning_goal":"Name the inputs of photosynthesis","priority":4,"target_mastery":0.8}"#
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: happy MCQ turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn happy_mcq_turn_draws_question_and_stores_quiz() {
    let mut h = harness(&[ASK_QUESTION_REPLY]);
    let mut ctx = TutorContext::new(Uuid::new_v4(), "u", None);
    ctx.history
        .push(tg_domain::chat::ChatMessage::user("quiz me"));

    run_executor_turn(&h.deps, &mut ctx, &h.io).await.unwrap();

    let envelope = recv_envelope(&mut h.out_rx);
    assert_eq!(envelope["content_type"], "message");
    let actions = envelope["whiteboard_actions"].as_array().unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0]["type"], "ADD_OBJECTS");
    let objects = actions[0]["objects"].as_array().unwrap();
    // One question text + (selector, label) per option.
    assert_eq!(objects.len(), 9);
    assert_eq!(objects[0]["metadata"]["role"], "question");
    let selectors = objects
        .iter()
        .filter(|o| o["metadata"]["role"] == "option_selector")
        .count();
    assert_eq!(selectors, 4);

    assert!(ctx.current_quiz_question.is_some());
    assert_eq!(
        ctx.last_pedagogical_action,
        Some(PedagogicalAction::Asked)
    );

    // The assistant turn + snapshot share the turn number.
    let rows = h
        .store
        .messages_page(ctx.session_id, None, 10)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].role, "assistant");
    assert_eq!(rows[0].whiteboard_snapshot_index, Some(rows[0].turn_no));
    let snapshots = h
        .store
        .snapshots_up_to(ctx.session_id, rows[0].turn_no)
        .await
        .unwrap();
    assert_eq!(snapshots.len(), 1);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: deterministic answers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn correct_answer_is_evaluated_without_the_llm() {
    let mut h = harness(&[ASK_QUESTION_REPLY]);
    let mut ctx = TutorContext::new(Uuid::new_v4(), "u", None);
    run_executor_turn(&h.deps, &mut ctx, &h.io).await.unwrap();
    let _question_envelope = recv_envelope(&mut h.out_rx);
    assert_eq!(h.llm.remaining(), 0);

    run_deterministic_answer(&h.deps, &mut ctx, &h.io, 0, None)
        .await
        .unwrap();

    let envelope = recv_envelope(&mut h.out_rx);
    assert_eq!(envelope["content_type"], "feedback");
    assert_eq!(envelope["data"]["feedback_items"][0]["is_correct"], true);

    let actions = envelope["whiteboard_actions"].as_array().unwrap();
    let update = actions.iter().find(|a| a["type"] == "UPDATE_OBJECTS").unwrap();
    assert_eq!(update["objects"][0]["objectId"], "mcq-q1-opt-0-radio");
    assert_eq!(update["objects"][0]["updates"]["fill"], "#2ECC71");
    let added = actions.iter().find(|a| a["type"] == "ADD_OBJECTS").unwrap();
    assert_eq!(
        added["objects"][0]["metadata"]["role"],
        "mcq_feedback_text"
    );

    let concept = &ctx.user_model_state.concepts["Photosynthesis"];
    assert_eq!(concept.alpha, 2);
    assert!(ctx.current_quiz_question.is_none());
    // The simulated feedback tool call gives the LLM context next turn.
    assert!(ctx
        .history
        .last()
        .unwrap()
        .content
        .contains("\"name\":\"feedback\""));
}

#[tokio::test]
async fn out_of_range_answer_keeps_quiz_and_model_untouched() {
    let mut h = harness(&[ASK_QUESTION_REPLY]);
    let mut ctx = TutorContext::new(Uuid::new_v4(), "u", None);
    run_executor_turn(&h.deps, &mut ctx, &h.io).await.unwrap();
    let _question_envelope = recv_envelope(&mut h.out_rx);

    run_deterministic_answer(&h.deps, &mut ctx, &h.io, 7, None)
        .await
        .unwrap();

    let envelope = recv_envelope(&mut h.out_rx);
    assert_eq!(envelope["content_type"], "error");
    assert_eq!(
        envelope["data"]["error_code"],
        "TOOL_INPUT_VALIDATION_ERROR"
    );
    assert!(ctx.current_quiz_question.is_some());
    let concept = &ctx.user_model_state.concepts["Photosynthesis"];
    assert_eq!((concept.alpha, concept.beta), (1, 1));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: unknown tool name
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn unknown_tool_injects_system_correction() {
    let mut h = harness(&[r#"{"name":"dance","args":{}}"#]);
    let mut ctx = TutorContext::new(Uuid::new_v4(), "u", None);

    run_executor_turn(&h.deps, &mut ctx, &h.io).await.unwrap();

    // History: invalid assistant JSON followed by the system correction.
    let n = ctx.history.len();
    assert!(ctx.history[n - 2].content.contains("\"name\":\"dance\""));
    assert_eq!(ctx.history[n - 2].role, tg_domain::chat::Role::Assistant);
    assert_eq!(ctx.history[n - 1].role, tg_domain::chat::Role::System);
    assert!(ctx.history[n - 1].content.contains("does not exist"));

    // The learner sees a generic rethink message, not an error.
    let envelope = recv_envelope(&mut h.out_rx);
    assert_eq!(envelope["content_type"], "message");
}

#[tokio::test]
async fn malformed_json_retries_then_aborts_turn() {
    let mut h = harness(&["not json", "still not json", "nope"]);
    let mut ctx = TutorContext::new(Uuid::new_v4(), "u", None);

    run_executor_turn(&h.deps, &mut ctx, &h.io).await.unwrap();

    assert_eq!(h.llm.remaining(), 0);
    // No user-visible output; a shape reminder was injected for next turn.
    assert!(h.out_rx.try_recv().is_err());
    assert!(ctx
        .history
        .last()
        .unwrap()
        .content
        .contains("valid tool calls"));
}

#[tokio::test]
async fn invalid_skill_args_feed_back_to_the_llm_only() {
    // draw with an empty objects list is a ToolInput error.
    let mut h = harness(&[r#"{"name":"draw","args":{"objects":[]}}"#]);
    let mut ctx = TutorContext::new(Uuid::new_v4(), "u", None);

    run_executor_turn(&h.deps, &mut ctx, &h.io).await.unwrap();

    assert!(h.out_rx.try_recv().is_err());
    let last = ctx.history.last().unwrap();
    assert_eq!(last.role, tg_domain::chat::Role::System);
    assert!(last.content.contains("args were invalid"));
}

#[tokio::test]
async fn chat_only_mode_blocks_drawing_tools() {
    let mut h = harness(&[r#"{"name":"draw","args":{"objects":[{"kind":"text","text":"hi"}]}}"#]);
    let mut ctx = TutorContext::new(Uuid::new_v4(), "u", None);
    ctx.interaction_mode = tg_domain::context::InteractionMode::ChatOnly;

    run_executor_turn(&h.deps, &mut ctx, &h.io).await.unwrap();

    assert!(h.out_rx.try_recv().is_err());
    assert!(ctx
        .history
        .last()
        .unwrap()
        .content
        .contains("chat_only mode"));
}

#[tokio::test]
async fn high_cost_budget_caps_expensive_skills() {
    use tg_skills::registry::{SkillFuture, SkillOutput};

    fn pricey<'a>(
        _ctx: &'a mut TutorContext,
        _services: &'a SkillCtxServices,
        _args: serde_json::Value,
    ) -> SkillFuture<'a> {
        Box::pin(async move {
            Ok(SkillOutput::Message {
                payload: tg_domain::response::MessagePayload::status("expensive result"),
                actions: vec![],
            })
        })
    }

    let call = r#"{"name":"pricey","args":{}}"#;
    let mut h = harness(&[call, call, call, call]);
    let mut registry = SkillRegistry::standard();
    registry.register("pricey", tg_skills::Cost::High, "test-only", pricey);
    h.deps.skills = Arc::new(registry);

    let mut ctx = TutorContext::new(Uuid::new_v4(), "u", None);
    ctx.max_high_cost_calls = 3;

    for _ in 0..3 {
        run_executor_turn(&h.deps, &mut ctx, &h.io).await.unwrap();
        let envelope = recv_envelope(&mut h.out_rx);
        assert_eq!(envelope["data"]["message_text"], "expensive result");
    }
    assert_eq!(ctx.high_cost_calls, 3);

    // The fourth call degrades: the skill never runs and the LLM is told.
    run_executor_turn(&h.deps, &mut ctx, &h.io).await.unwrap();
    let envelope = recv_envelope(&mut h.out_rx);
    assert_ne!(envelope["data"]["message_text"], "expensive result");
    assert_eq!(ctx.high_cost_calls, 3);
    assert!(ctx
        .history
        .iter()
        .any(|m| m.content.contains("high-cost budget")));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: planner bootstrap
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn planner_bootstraps_objective_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path()).unwrap());
    store.add_concept_edge("A", "B").await.unwrap();
    store.add_concept_edge("B", "C").await.unwrap();

    // Reply omits priority and target_mastery; defaults must fill in.
    let llm = ScriptedLlm::new(&[r#"{"topic":"A","learning_goal":"Learn A"}"#]);
    let registry = registry_with(llm);
    let mut ctx = TutorContext::new(Uuid::new_v4(), "u", None);

    let objective = determine_session_focus(store.as_ref(), &registry, &mut ctx)
        .await
        .unwrap();
    assert_eq!(objective.topic, "A");
    assert_eq!(objective.priority, 3);
    assert!((objective.target_mastery - 0.8).abs() < f64::EPSILON);
    assert!(ctx.current_focus_objective.is_some());
}

#[tokio::test]
async fn planner_retries_invalid_payloads() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path()).unwrap());
    let llm = ScriptedLlm::new(&[
        "garbage",
        objective_reply(),
    ]);
    let registry = registry_with(llm.clone());
    let mut ctx = TutorContext::new(Uuid::new_v4(), "u", None);

    let objective = determine_session_focus(store.as_ref(), &registry, &mut ctx)
        .await
        .unwrap();
    assert_eq!(objective.topic, "Photosynthesis");
    assert_eq!(llm.remaining(), 0);
}

/// A registry wrapping only the scripted provider.
fn registry_with(llm: Arc<ScriptedLlm>) -> ProviderRegistry {
    ProviderRegistry::with_provider(llm)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario: analyzer claim + knowledge-base append
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn analyzer_summarizes_and_appends_to_kb() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path()).unwrap());
    let folder = store.create_folder("u", "biology").await.unwrap();
    let session_id = store
        .create_session("u", Some(folder.id), serde_json::json!({}))
        .await
        .unwrap();
    store
        .log_interaction(InteractionLogRow {
            session_id,
            user_id: "u".into(),
            role: "user".into(),
            content: "what is photosynthesis".into(),
            content_type: "user_input".into(),
            event_type: "user_message".into(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let llm = ScriptedLlm::new(&["The student asked about photosynthesis and engaged well."]);
    run_session_analysis(
        store.as_ref(),
        Some(llm),
        &AnalyzerConfig::default(),
        session_id,
        Some(folder.id),
    )
    .await;

    assert_eq!(
        store.analysis_status(session_id).await.unwrap(),
        Some(AnalysisStatus::Success)
    );
    let folder = store.get_folder(folder.id, "u").await.unwrap().unwrap();
    assert!(folder.knowledge_base.starts_with("Session Summary:"));
    assert!(folder.knowledge_base.contains("photosynthesis"));
}

#[tokio::test]
async fn concurrent_analyzers_produce_exactly_one_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path()).unwrap());
    let session_id = store
        .create_session("u", None, serde_json::json!({}))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = store.clone();
        let llm: Arc<dyn LlmProvider> = ScriptedLlm::new(&["chunk summary"]);
        handles.push(tokio::spawn(async move {
            run_session_analysis(
                store.as_ref(),
                Some(llm),
                &AnalyzerConfig::default(),
                session_id,
                None,
            )
            .await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Exactly one worker owned the claim; the state is terminal.
    assert_eq!(
        store.analysis_status(session_id).await.unwrap(),
        Some(AnalysisStatus::Success)
    );
}

#[tokio::test]
async fn analyzer_without_provider_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path()).unwrap());
    let session_id = store
        .create_session("u", None, serde_json::json!({}))
        .await
        .unwrap();
    store
        .log_interaction(InteractionLogRow {
            session_id,
            user_id: "u".into(),
            role: "user".into(),
            content: "hello".into(),
            content_type: "user_input".into(),
            event_type: "user_message".into(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    run_session_analysis(
        store.as_ref(),
        None,
        &AnalyzerConfig::default(),
        session_id,
        None,
    )
    .await;
    assert_eq!(
        store.analysis_status(session_id).await.unwrap(),
        Some(AnalysisStatus::Failed)
    );
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Snapshot replay
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn snapshot_replay_reproduces_live_object_map() {
    let mut h = harness(&[ASK_QUESTION_REPLY]);
    let mut ctx = TutorContext::new(Uuid::new_v4(), "u", None);
    run_executor_turn(&h.deps, &mut ctx, &h.io).await.unwrap();
    let _ = recv_envelope(&mut h.out_rx);

    // Live object ids from the mirrored doc.
    let doc = h.deps.docs.get_or_load(ctx.session_id).await.unwrap();
    let mut live_ids: Vec<String> = doc.objects().await.into_iter().map(|s| s.id).collect();
    live_ids.sort();

    // Replay the persisted snapshots onto a blank doc.
    let snapshots = h
        .store
        .snapshots_up_to(ctx.session_id, ctx.latest_snapshot_index)
        .await
        .unwrap();
    let blank = DocRegistry::new(Arc::new(MemoryKv::new()));
    let replay_doc = blank.get_or_load(Uuid::new_v4()).await.unwrap();
    for snapshot in snapshots {
        let actions: Vec<WhiteboardAction> =
            serde_json::from_value(snapshot.actions_json).unwrap();
        replay_doc.apply_actions(&actions).await.unwrap();
    }
    let mut replayed_ids: Vec<String> =
        replay_doc.objects().await.into_iter().map(|s| s.id).collect();
    replayed_ids.sort();

    assert_eq!(live_ids, replayed_ids);
}
