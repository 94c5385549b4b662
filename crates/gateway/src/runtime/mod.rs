//! The per-session tutoring runtime: focus planner, lean executor,
//! deterministic answer evaluator, and the background session analyzer.

pub mod analyzer;
pub mod evaluator;
pub mod executor;
pub mod planner;
pub mod prompts;

use tg_domain::error::{Error, Result};

/// Extract the first JSON object from an LLM reply, tolerating markdown
/// fences and stray commentary around the braces.
pub(crate) fn extract_json_object(raw: &str) -> Result<serde_json::Value> {
    let cleaned = raw.trim();
    let cleaned = cleaned
        .strip_prefix("```json")
        .or_else(|| cleaned.strip_prefix("```"))
        .unwrap_or(cleaned);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    let start = cleaned.find('{');
    let end = cleaned.rfind('}');
    let json_str = match (start, end) {
        (Some(start), Some(end)) if end > start => &cleaned[start..=end],
        _ => {
            return Err(Error::Executor(format!(
                "no JSON object found in LLM reply: {}",
                truncate_for_log(cleaned, 120)
            )))
        }
    };
    serde_json::from_str(json_str)
        .map_err(|e| Error::Executor(format!("malformed JSON in LLM reply: {e}")))
}

pub(crate) fn truncate_for_log(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_owned()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json() {
        let raw = "```json\n{\"name\": \"explain\", \"args\": {}}\n```";
        let value = extract_json_object(raw).unwrap();
        assert_eq!(value["name"], "explain");
    }

    #[test]
    fn extracts_json_with_surrounding_prose() {
        let raw = "Sure! Here is the call: {\"name\":\"message\",\"args\":{\"text\":\"hi\"}} Hope that helps.";
        let value = extract_json_object(raw).unwrap();
        assert_eq!(value["name"], "message");
    }

    #[test]
    fn missing_braces_is_an_executor_error() {
        assert!(matches!(
            extract_json_object("no json here"),
            Err(Error::Executor(_))
        ));
    }
}
