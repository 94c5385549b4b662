use serde::{Deserialize, Serialize};

/// A message in the executor conversation (compact role/content form).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool-call envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Front-end display tools that always exist, independent of the backend
/// skill registry. These are rendered directly by the client.
pub const FE_TOOL_NAMES: &[&str] = &[
    "explain",
    "ask_question",
    "message",
    "feedback",
    "error",
    "end_session",
    // Internal tools: no user-visible output.
    "reflect",
    "summarise_context",
];

/// Unified envelope produced by the lean executor LLM each turn.
///
/// `name` is validated at dispatch time against the union of
/// [`FE_TOOL_NAMES`] and the backend skill registry, so new skills never
/// require touching this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

impl ToolCall {
    /// True when `name` is one of the fixed front-end display tools.
    pub fn is_frontend_tool(&self) -> bool {
        FE_TOOL_NAMES.contains(&self.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_parses_with_missing_args() {
        let tc: ToolCall = serde_json::from_str(r#"{"name":"explain"}"#).unwrap();
        assert_eq!(tc.name, "explain");
        assert!(tc.args.is_empty());
        assert!(tc.is_frontend_tool());
    }

    #[test]
    fn backend_names_are_not_frontend() {
        let tc: ToolCall =
            serde_json::from_str(r#"{"name":"draw","args":{"objects":[]}}"#).unwrap();
        assert!(!tc.is_frontend_tool());
    }
}
