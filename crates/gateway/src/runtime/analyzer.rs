//! Background session analysis: claim the session, summarize its
//! interaction log chunk by chunk, and append the result to the folder's
//! knowledge base.
//!
//! Idempotency comes from the claim: among any number of concurrent workers
//! for the same session, exactly one wins the null→processing transition
//! and produces the final state; the rest exit silently.

use std::sync::Arc;

use uuid::Uuid;

use tg_domain::chat::ChatMessage;
use tg_domain::config::AnalyzerConfig;
use tg_domain::error::Result;
use tg_providers::{ChatRequest, LlmProvider};
use tg_store::{AnalysisStatus, TutorStore};

use super::prompts::{ANALYZER_CHUNK_PROMPT, SESSION_SUMMARY_PREFIX};

/// Rough chars-per-token heuristic for the hard budget.
const CHARS_PER_TOKEN: usize = 4;
const TRUNCATION_MARKER: &str = "…[truncated]";

/// Spawn the analyzer as a detached background task.
pub fn spawn_session_analysis(
    store: Arc<dyn TutorStore>,
    provider: Option<Arc<dyn LlmProvider>>,
    config: AnalyzerConfig,
    session_id: Uuid,
    folder_id: Option<Uuid>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run_session_analysis(store.as_ref(), provider, &config, session_id, folder_id).await;
    })
}

/// The analyzer body. Public for direct testing.
pub async fn run_session_analysis(
    store: &dyn TutorStore,
    provider: Option<Arc<dyn LlmProvider>>,
    config: &AnalyzerConfig,
    session_id: Uuid,
    folder_id: Option<Uuid>,
) {
    // ── Atomic claim ─────────────────────────────────────────────────
    match store.claim_analysis(session_id).await {
        Ok(true) => {
            tracing::info!(session_id = %session_id, "claimed session for analysis");
        }
        Ok(false) => {
            tracing::info!(
                session_id = %session_id,
                "session already claimed or finished; analyzer exiting"
            );
            return;
        }
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "claim failed");
            return;
        }
    }

    if let Err(e) = store.mark_ended(session_id).await {
        tracing::warn!(session_id = %session_id, error = %e, "failed to mark ended_at");
    }

    match analyze(store, provider, config, session_id).await {
        Ok(summary) => {
            if let Some(folder_id) = folder_id {
                if summary.starts_with(SESSION_SUMMARY_PREFIX) {
                    // Append-only; a KB failure does not fail the analysis.
                    if let Err(e) = store.append_knowledge_base(folder_id, &summary).await {
                        tracing::error!(
                            folder_id = %folder_id,
                            error = %e,
                            "knowledge-base append failed"
                        );
                    }
                }
            } else {
                tracing::warn!(session_id = %session_id, "no folder id; skipping KB append");
            }
            if let Err(e) = store
                .finish_analysis(session_id, AnalysisStatus::Success)
                .await
            {
                tracing::error!(session_id = %session_id, error = %e, "failed to record success");
            }
            tracing::info!(session_id = %session_id, "session analysis finished");
        }
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "session analysis failed");
            if let Err(e) = store
                .finish_analysis(session_id, AnalysisStatus::Failed)
                .await
            {
                tracing::error!(session_id = %session_id, error = %e, "failed to record failure");
            }
        }
    }
}

/// Summarize the interaction log: chunk, per-chunk LLM summary, concatenate
/// under the token budget.
async fn analyze(
    store: &dyn TutorStore,
    provider: Option<Arc<dyn LlmProvider>>,
    config: &AnalyzerConfig,
    session_id: Uuid,
) -> Result<String> {
    let provider = provider.ok_or_else(|| {
        tg_domain::error::Error::Config("no LLM provider available for analysis".into())
    })?;

    let logs = store.interaction_logs(session_id).await?;
    let transcript: Vec<String> = logs
        .iter()
        .map(|row| format!("{}: {}", row.role, row.content))
        .collect();

    if transcript.is_empty() {
        return Ok(format!(
            "{SESSION_SUMMARY_PREFIX} No interactions were recorded for this session."
        ));
    }

    let mut parts = Vec::new();
    for chunk in chunk_by_words(&transcript.join("\n"), config.chunk_words) {
        let reply = provider
            .chat(ChatRequest {
                messages: vec![
                    ChatMessage::system(ANALYZER_CHUNK_PROMPT),
                    ChatMessage::user(chunk),
                ],
                temperature: Some(0.2),
                ..Default::default()
            })
            .await?;
        parts.push(reply.content.trim().to_owned());
    }

    let body = parts.join(" ");
    let summary = if body.starts_with(SESSION_SUMMARY_PREFIX) {
        body
    } else {
        format!("{SESSION_SUMMARY_PREFIX} {body}")
    };
    Ok(enforce_token_budget(&summary, config.token_budget))
}

/// Split text into chunks of roughly `chunk_words` words.
fn chunk_by_words(text: &str, chunk_words: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    words
        .chunks(chunk_words.max(1))
        .map(|chunk| chunk.join(" "))
        .collect()
}

/// Hard budget on the final summary, with an explicit marker when cut.
fn enforce_token_budget(summary: &str, token_budget: usize) -> String {
    let max_chars = token_budget.saturating_mul(CHARS_PER_TOKEN);
    if summary.chars().count() <= max_chars {
        return summary.to_owned();
    }
    let keep = max_chars.saturating_sub(TRUNCATION_MARKER.chars().count());
    let cut: String = summary.chars().take(keep).collect();
    format!("{cut}{TRUNCATION_MARKER}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_respect_word_budget() {
        let text = (0..1000).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let chunks = chunk_by_words(&text, 400);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].split_whitespace().count(), 400);
        assert_eq!(chunks[2].split_whitespace().count(), 200);
    }

    #[test]
    fn token_budget_truncates_with_marker() {
        let summary = "x".repeat(10_000);
        let bounded = enforce_token_budget(&summary, 100);
        assert!(bounded.chars().count() <= 400);
        assert!(bounded.ends_with(TRUNCATION_MARKER));

        let short = enforce_token_budget("short", 100);
        assert_eq!(short, "short");
    }
}
