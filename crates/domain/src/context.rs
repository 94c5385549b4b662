//! The authoritative per-session state threaded through every turn.
//!
//! Created on the first session row insert, hydrated on WebSocket connect,
//! mutated in-memory during a turn, and persisted after each turn in a
//! "lean" form that drops the chat and whiteboard histories (those live in
//! dedicated tables).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::canvas::WhiteboardAction;
use crate::chat::ChatMessage;
use crate::learner::LearnerState;
use crate::objective::FocusObjective;
use crate::quiz::QuizQuestion;

pub const DEFAULT_MAX_HIGH_COST_CALLS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMode {
    ChatOnly,
    ChatAndWhiteboard,
}

impl InteractionMode {
    pub fn whiteboard_enabled(&self) -> bool {
        matches!(self, InteractionMode::ChatAndWhiteboard)
    }
}

/// The last major pedagogical move the tutor made, used by the executor
/// prompt to avoid trivial loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PedagogicalAction {
    Explained,
    Asked,
    Evaluated,
    Remediated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorContext {
    pub session_id: Uuid,
    pub user_id: String,
    #[serde(default)]
    pub folder_id: Option<Uuid>,
    #[serde(default)]
    pub vector_store_id: Option<String>,
    #[serde(default = "default_mode")]
    pub interaction_mode: InteractionMode,
    /// Cached knowledge-base text from document analysis.
    #[serde(default)]
    pub knowledge_base: Option<String>,
    #[serde(default)]
    pub current_focus_objective: Option<FocusObjective>,
    #[serde(default)]
    pub current_quiz_question: Option<QuizQuestion>,
    #[serde(default)]
    pub user_model_state: LearnerState,
    /// Executor conversation history (role/content items).
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    /// Whiteboard action lists already sent to the client, newest last.
    #[serde(default)]
    pub whiteboard_history: Vec<Vec<WhiteboardAction>>,
    #[serde(default)]
    pub last_pedagogical_action: Option<PedagogicalAction>,
    #[serde(default)]
    pub pending_interaction_type: Option<String>,
    #[serde(default)]
    pub high_cost_calls: u32,
    #[serde(default = "default_high_cost_cap")]
    pub max_high_cost_calls: u32,
    /// Monotonic chat turn counter for the persistence layer.
    #[serde(default)]
    pub latest_turn_no: u64,
    /// Monotonic whiteboard snapshot counter; aligns with turn numbers.
    #[serde(default)]
    pub latest_snapshot_index: u64,
}

fn default_mode() -> InteractionMode {
    InteractionMode::ChatAndWhiteboard
}

fn default_high_cost_cap() -> u32 {
    DEFAULT_MAX_HIGH_COST_CALLS
}

impl TutorContext {
    pub fn new(session_id: Uuid, user_id: impl Into<String>, folder_id: Option<Uuid>) -> Self {
        Self {
            session_id,
            user_id: user_id.into(),
            folder_id,
            vector_store_id: None,
            interaction_mode: default_mode(),
            knowledge_base: None,
            current_focus_objective: None,
            current_quiz_question: None,
            user_model_state: LearnerState::default(),
            history: Vec::new(),
            whiteboard_history: Vec::new(),
            last_pedagogical_action: None,
            pending_interaction_type: None,
            high_cost_calls: 0,
            max_high_cost_calls: default_high_cost_cap(),
            latest_turn_no: 0,
            latest_snapshot_index: 0,
        }
    }

    /// Persistence form for `sessions.context_data`.
    ///
    /// The rapidly-growing chat and whiteboard histories are omitted: they
    /// are stored in dedicated tables and would bloat the row.
    pub fn lean_value(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.remove("history");
            obj.remove("whiteboard_history");
        }
        value
    }

    /// True while another high-cost skill call is still within budget.
    pub fn high_cost_budget_left(&self) -> bool {
        self.high_cost_calls < self.max_high_cost_calls
    }

    /// Allocate the next chat turn number.
    pub fn next_turn_no(&mut self) -> u64 {
        self.latest_turn_no += 1;
        self.latest_turn_no
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lean_value_omits_histories() {
        let mut ctx = TutorContext::new(Uuid::new_v4(), "u1", None);
        ctx.history.push(ChatMessage::user("hi"));
        ctx.whiteboard_history.push(vec![]);
        let lean = ctx.lean_value();
        assert!(lean.get("history").is_none());
        assert!(lean.get("whiteboard_history").is_none());
        assert!(lean.get("session_id").is_some());
    }

    #[test]
    fn hydrates_from_lean_form() {
        let ctx = TutorContext::new(Uuid::new_v4(), "u1", None);
        let lean = ctx.lean_value();
        let back: TutorContext = serde_json::from_value(lean).unwrap();
        assert_eq!(back.session_id, ctx.session_id);
        assert!(back.history.is_empty());
        assert_eq!(back.max_high_cost_calls, DEFAULT_MAX_HIGH_COST_CALLS);
    }

    #[test]
    fn turn_numbers_increase() {
        let mut ctx = TutorContext::new(Uuid::new_v4(), "u1", None);
        assert_eq!(ctx.next_turn_no(), 1);
        assert_eq!(ctx.next_turn_no(), 2);
        assert_eq!(ctx.latest_turn_no, 2);
    }
}
