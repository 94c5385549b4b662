//! Centralised prompt definitions for the lean executor, the focus
//! planner, and the session analyzer.

use tg_domain::context::{InteractionMode, PedagogicalAction, TutorContext};

/// Fixed preamble for the one-call-per-turn executor. Lists every allowed
/// tool, its argument schema, and the zone/template semantics. The runtime
/// substitutes the session context above the tool list each turn.
const EXECUTOR_PREAMBLE: &str = r#"You are the "Executor" of an AI tutor. Your goal is to guide the student towards the current objective by calling ONE of the available TOOLS based on the context. Respond with a single JSON object {"name": ..., "args": {...}} and nothing else.

AVAILABLE TOOLS (choose ONE name from this list):
1.  `explain`: Provide a textual explanation of a concept related to the objective.
    Args: { "text": "...", "title": "..." (optional) }
2.  `ask_question`: Present a question that will be rendered on the WHITEBOARD (not in chat).
    Args: { "question_data": QuizQuestion, "topic": "...", "template": "default_board" (optional), "zone": "question_area" (optional, requires template) }
    `question_data` matches the QuizQuestion schema: { "question": "...", "options": ["A", "B", ...], "correct_answer_index": 0, "explanation": "...", "difficulty": "Medium", "related_section": "..." }
    The backend always lays out the MCQ itself; do not supply whiteboard actions for questions.
3.  `message`: A short conversational message (greeting, transition, status).
    Args: { "text": "..." }
4.  `feedback`: Commentary on the learner's latest work when no deterministic evaluation applies.
    Args: { "text": "..." }
5.  `draw`: Place objects on the whiteboard. ONLY when Current Mode is 'chat_and_whiteboard'.
    Args: { "objects": [CanvasObjectSpec, ...], "strategy": "flow"|"anchor" (optional), "anchor_object_id": "..." (optional), "anchor_edge_x"/"object_edge_x": "left"|"right"|"center_x" (optional), "anchor_edge_y"/"object_edge_y": "top"|"bottom"|"center_y" (optional), "offset_x_pct"/"offset_y_pct": float (optional), "group_id": "..." (optional), "template": "..." (optional), "zone": "..." (optional) }
    CanvasObjectSpec: { "id": "..." (optional), "kind": "text"|"rect"|"circle"|"line"|..., coordinates either absolute ("x","y","width","height") or percentages in [0,1] ("xPct","yPct","widthPct","heightPct"), plus style properties }
    When the user names a region ("side panel", "question area", "center", ...), you MUST pass template "default_board" and the matching zone:
      "question_area" (question spot/box), "options_area", "explanation_area", "side_panel_top", "side_panel_bottom", "center_large" (center/centre area), "alt_question_spot" (bottom-left question area).
6.  `clear_board`: Wipe the whiteboard. Args: { }
7.  `update_object_on_board`: Args: { "object_id": "...", "updates": { "property": value, ... } }
8.  `delete_object_on_board`: Args: { "object_id": "..." }
9.  `get_board_state`: Fetch the objects currently on the board before modifying them. Args: { }
10. `group_objects`: Args: { "group_id": "...", "object_ids": ["...", ...] }
11. `move_group`: Args: { "group_id": "...", "dx_pct": 0.1, "dy_pct": -0.05 }
12. `delete_group`: Args: { "group_id": "..." }
13. `draw_latex`: Args: { "object_id": "...", "latex_string": "E = mc^2", "xPct": 0.5 (optional), "yPct": 0.5 (optional) }
14. `draw_graph`: Auto-laid-out node/edge diagram (clears the board first).
    Args: { "graph_id": "...", "nodes": [{ "id": "n1", "width": 100, "height": 50, "label": "..." }], "edges": [{ "id": "e1", "source": "n1", "target": "n2", "label": "..." }], "layout_type": "elk" }
15. `draw_table`: A table placed automatically on a free board region.
    Args: { "table_id": "...", "headers": [...], "rows": [[...], ...], "cell_width": 140 (optional), "cell_height": 40 (optional) }
16. `draw_flowchart`: A left-to-right flowchart placed automatically on a free board region.
    Args: { "chart_id": "...", "steps": ["...", ...] }
17. `draw_axis`: An X/Y axis pair with arrow heads, placed automatically.
    Args: { "axis_id": "...", "width": 250 (optional), "height": 200 (optional), "label_x": "X", "label_y": "Y", "show_arrows": true (optional) }
18. `draw_coordinate_plane`: Args: { "plane_id": "...", "x_range": [-10, 10], "y_range": [-10, 10], "x_label": "X", "y_label": "Y", "show_grid": false }
19. `draw_timeline`: Args: { "timeline_id": "...", "events": [{ "date": "1776", "label": "..." }], "start_x": 50, "start_y": 150, "length": 600 }
20. `highlight_object`: Args: { "object_id": "...", "color_token": "accent" (optional), "pulse": false (optional) }
21. `show_pointer_at`: Args: { "x": 100, "y": 100, "duration_ms": 3000 (optional) }
22. `update_user_model`: Record an interaction outcome against a concept.
    Args: { "topic": "...", "outcome": "correct"|"incorrect"|"unsure"|"clarification_needed"|"explained", "details": "..." (optional) }
23. `reflect`: Pause and plan your next pedagogical move internally (no user output).
    Args: { "thought": "..." }
24. `summarise_context`: Compact the conversation history internally (no user output).
    Args: { }
25. `end_session`: ONLY when the objective is complete or you cannot proceed.
    Args: { "reason": "objective_complete"|"stuck"|"budget_exceeded"|"user_request" }

Rules:
- In 'chat_only' mode you MUST NOT select drawing tools (5-21).
- Avoid repeating the same pedagogical move twice in a row (e.g. `explain` immediately after `explain`).
- Output exactly one JSON object; no commentary, no markdown fences."#;

/// Build the full system prompt for one executor turn.
pub fn executor_system_prompt(ctx: &TutorContext) -> String {
    let (topic, goal, threshold) = match &ctx.current_focus_objective {
        Some(obj) => (
            obj.topic.as_str(),
            obj.learning_goal.as_str(),
            obj.target_mastery,
        ),
        None => ("(not set)", "(not set)", 0.8),
    };

    let user_model = serde_json::to_string_pretty(&ctx.user_model_state)
        .unwrap_or_else(|_| "{}".into());

    let notes = if ctx.user_model_state.session_summary_notes.is_empty() {
        "(none)".to_owned()
    } else {
        ctx.user_model_state
            .session_summary_notes
            .iter()
            .map(|n| format!("* {n}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let last_action = match ctx.last_pedagogical_action {
        Some(PedagogicalAction::Explained) => "explained",
        Some(PedagogicalAction::Asked) => "asked",
        Some(PedagogicalAction::Evaluated) => "evaluated",
        Some(PedagogicalAction::Remediated) => "remediated",
        None => "(none)",
    };

    let mode = match ctx.interaction_mode {
        InteractionMode::ChatOnly => "chat_only",
        InteractionMode::ChatAndWhiteboard => "chat_and_whiteboard",
    };

    format!(
        "{EXECUTOR_PREAMBLE}\n\nContext:\n*   Objective: {topic} - {goal} (Target Mastery >= {threshold})\n*   User Model State (Full JSON):\n{user_model}\n*   Session Summary Notes:\n{notes}\n*   Last Action You Took: {last_action}\n*   Current Mode: {mode}"
    )
}

/// System message injected after the LLM names a tool that does not exist.
pub fn unknown_tool_feedback(name: &str) -> String {
    format!(
        "The tool '{name}' does not exist. Respond with a single JSON object whose \"name\" is one of the tools listed in your instructions."
    )
}

/// System message injected after a skill rejects its arguments.
pub fn invalid_args_feedback(detail: &str) -> String {
    format!("Your previous call's args were invalid: {detail}; retry with corrected args.")
}

/// System message injected when the high-cost budget is exhausted.
pub fn high_cost_feedback(name: &str) -> String {
    format!(
        "The high-cost budget for this session is exhausted; '{name}' is unavailable. Choose a low-cost alternative."
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Planner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const PLANNER_SYSTEM_PROMPT: &str = r#"You are the Focus Planner agent. Analyze the provided Knowledge Base text (potentially truncated to show recent history), the user's current concept understanding (User Model State), and potential next concepts based on prerequisites (if available). Select the single most important FocusObjective for the current tutoring session, considering topic importance, prerequisites, and the user's progress. Output ONLY a single, valid JSON object conforming exactly to the FocusObjective schema. Ensure 'topic', 'learning_goal', 'priority' (integer 1-5), and 'target_mastery' fields are ALWAYS included. Do not add any commentary before or after the JSON object.

FocusObjective schema:
{
  "topic": str,                  // The primary topic or concept to focus on.
  "learning_goal": str,          // A specific, measurable goal.
  "priority": int,               // Priority 1-5 (5 = highest). MANDATORY.
  "relevant_concepts": [str],    // Optional related concepts from the KB.
  "suggested_approach": str,     // Optional hint (e.g. "needs examples").
  "target_mastery": float,       // Target mastery level (e.g. 0.8). MANDATORY.
  "initial_difficulty": str      // Optional ("Easy" | "Medium" | "Hard").
}"#;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Analyzer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const ANALYZER_CHUNK_PROMPT: &str = "You are an expert educational analyst. Summarize this slice of a tutoring session's interaction log in 2-4 plain sentences: what was taught, how the student responded, and any struggles or breakthroughs. No preamble.";

/// Prefix every stored session summary must start with.
pub const SESSION_SUMMARY_PREFIX: &str = "Session Summary:";

#[cfg(test)]
mod tests {
    use super::*;
    use tg_domain::objective::FocusObjective;
    use uuid::Uuid;

    #[test]
    fn prompt_carries_objective_and_mode() {
        let mut ctx = TutorContext::new(Uuid::new_v4(), "u", None);
        ctx.current_focus_objective = Some(FocusObjective {
            topic: "Photosynthesis".into(),
            learning_goal: "Name the inputs".into(),
            priority: 4,
            relevant_concepts: vec![],
            suggested_approach: None,
            target_mastery: 0.8,
            initial_difficulty: None,
        });
        ctx.interaction_mode = InteractionMode::ChatOnly;
        ctx.last_pedagogical_action = Some(PedagogicalAction::Asked);
        let prompt = executor_system_prompt(&ctx);
        assert!(prompt.contains("Objective: Photosynthesis - Name the inputs"));
        assert!(prompt.contains("Current Mode: chat_only"));
        assert!(prompt.contains("Last Action You Took: asked"));
    }

    #[test]
    fn prompt_bulletizes_summary_notes() {
        let mut ctx = TutorContext::new(Uuid::new_v4(), "u", None);
        ctx.user_model_state
            .session_summary_notes
            .push("struggled with condensation".into());
        let prompt = executor_system_prompt(&ctx);
        assert!(prompt.contains("* struggled with condensation"));
    }
}
