//! The focus planner: chooses the session's single FocusObjective from the
//! knowledge base, the learner-model state, and the concept prerequisite
//! DAG.

use std::time::Duration;

use tg_domain::chat::ChatMessage;
use tg_domain::context::TutorContext;
use tg_domain::error::{Error, Result};
use tg_domain::objective::FocusObjective;
use tg_providers::retry::{retry_on_json, RetryPolicy};
use tg_providers::{ChatRequest, ProviderRegistry};
use tg_store::TutorStore;

use super::prompts::PLANNER_SYSTEM_PROMPT;

/// Keep only the tail of the KB in the prompt (most recent history).
const KB_INPUT_LIMIT_BYTES: usize = 8000;

/// Concepts not yet mastered whose prerequisites are all mastered.
///
/// Every concept mentioned in the edge list is considered; roots (concepts
/// with no incoming edge) have their prerequisites vacuously satisfied.
pub fn next_learnable(edges: &[(String, String)], mastered: &[String]) -> Vec<String> {
    let mut concepts: Vec<&str> = Vec::new();
    for (prereq, concept) in edges {
        for name in [prereq.as_str(), concept.as_str()] {
            if !concepts.contains(&name) {
                concepts.push(name);
            }
        }
    }

    concepts
        .into_iter()
        .filter(|concept| !mastered.iter().any(|m| m == concept))
        .filter(|concept| {
            edges
                .iter()
                .filter(|(_, c)| c == concept)
                .all(|(prereq, _)| mastered.iter().any(|m| m == prereq))
        })
        .map(str::to_owned)
        .collect()
}

/// Truncate KB text to its last `limit` bytes on a char boundary, with a
/// marker noting the cut.
fn kb_prompt_content(kb: Option<&str>, limit: usize) -> String {
    match kb {
        None => "Knowledge Base is empty or unavailable.".into(),
        Some(kb) if kb.len() <= limit => kb.to_owned(),
        Some(kb) => {
            let mut start = kb.len() - limit;
            while !kb.is_char_boundary(start) {
                start += 1;
            }
            format!(
                "... (Beginning of Knowledge Base truncated)\n\n{}",
                &kb[start..]
            )
        }
    }
}

/// Run the planner and store the chosen objective on the context.
pub async fn determine_session_focus(
    store: &dyn TutorStore,
    llm: &ProviderRegistry,
    ctx: &mut TutorContext,
) -> Result<FocusObjective> {
    let session_id = ctx.session_id;
    tracing::info!(session_id = %session_id, "planner: determining session focus");

    // 1. Knowledge base: context cache first, folder row second.
    if ctx.knowledge_base.is_none() {
        if let Some(folder_id) = ctx.folder_id {
            if let Some(folder) = store.get_folder(folder_id, &ctx.user_id).await? {
                if !folder.knowledge_base.is_empty() {
                    ctx.knowledge_base = Some(folder.knowledge_base);
                }
            }
        }
    }
    let kb_content = kb_prompt_content(ctx.knowledge_base.as_deref(), KB_INPUT_LIMIT_BYTES);

    // 2. Mastered concepts + user-state summary.
    let mastered = ctx.user_model_state.mastered_concepts();
    let state_lines = ctx.user_model_state.summary_lines();
    let user_state_summary = if state_lines.is_empty() {
        "User has no tracked concepts yet.".to_owned()
    } else {
        format!(
            "Current user concept understanding:\n{}",
            state_lines.join("\n")
        )
    };

    // 3. Prerequisite DAG hint. The planner still runs without edges.
    let edges = store.concept_edges().await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "planner: concept graph unavailable");
        Vec::new()
    });
    let dag_info = if edges.is_empty() {
        "Prerequisite information (DAG) is not available for planning.".to_owned()
    } else {
        let candidates = next_learnable(&edges, &mastered);
        format!("Suggested next learnable concepts based on prerequisites: {candidates:?}")
    };

    // 4. LLM call with bounded validation retries.
    let provider = llm.default_provider()?;
    let planner_model = llm.planner_model().map(str::to_owned);
    let messages = vec![
        ChatMessage::system(PLANNER_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Knowledge Base Content (Recent History):\n{kb_content}"
        )),
        ChatMessage::user(user_state_summary),
        ChatMessage::user(dag_info),
        ChatMessage::user(
            "Select the single best FocusObjective for this session based on all available \
             information. Respond only with the JSON object.",
        ),
    ];

    let policy = RetryPolicy {
        max_attempts: 3,
        base_temperature: 0.2,
        temperature_step: 0.1,
        backoff: Duration::from_secs(1),
    };
    let objective = retry_on_json(policy, |temperature| {
        let provider = provider.clone();
        let messages = messages.clone();
        let model = planner_model.clone();
        async move {
            let reply = provider
                .chat(ChatRequest {
                    messages,
                    temperature: Some(temperature),
                    json_mode: true,
                    model,
                    ..Default::default()
                })
                .await?;

            let mut data = super::extract_json_object(&reply.content)?;
            FocusObjective::apply_defaults(&mut data);
            serde_json::from_value::<FocusObjective>(data)
                .map_err(|e| Error::Executor(format!("invalid FocusObjective: {e}")))
        }
    })
    .await
    .map_err(|e| {
        tracing::error!(session_id = %session_id, error = %e, "planner failed");
        e
    })?;

    tracing::info!(
        session_id = %session_id,
        topic = %objective.topic,
        priority = objective.priority,
        "planner selected focus objective"
    );
    ctx.current_focus_objective = Some(objective.clone());
    Ok(objective)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect()
    }

    #[test]
    fn chain_starts_at_the_root() {
        // A -> B -> C with nothing mastered: A is the only concept with no
        // unmet prerequisites.
        let e = edges(&[("A", "B"), ("B", "C")]);
        assert_eq!(next_learnable(&e, &[]), vec!["A"]);

        // With A mastered, B becomes learnable.
        assert_eq!(next_learnable(&e, &["A".into()]), vec!["B"]);
        // With A and B mastered, C becomes learnable.
        assert_eq!(
            next_learnable(&e, &["A".into(), "B".into()]),
            vec!["C"]
        );
    }

    #[test]
    fn mastered_concepts_are_not_candidates() {
        let e = edges(&[("A", "B")]);
        assert!(next_learnable(&e, &["A".into(), "B".into()]).is_empty());
    }

    #[test]
    fn multiple_prereqs_must_all_be_met() {
        let e = edges(&[("A", "C"), ("B", "C")]);
        // C is blocked until both A and B are mastered; B itself is a root.
        assert_eq!(next_learnable(&e, &["A".into()]), vec!["B"]);
        assert_eq!(
            next_learnable(&e, &["A".into(), "B".into()]),
            vec!["C"]
        );
    }

    #[test]
    fn kb_truncation_keeps_the_tail() {
        let kb = "x".repeat(10_000);
        let content = kb_prompt_content(Some(&kb), 8000);
        assert!(content.starts_with("... (Beginning of Knowledge Base truncated)"));
        assert!(content.len() < 8100);

        let short = kb_prompt_content(Some("short kb"), 8000);
        assert_eq!(short, "short kb");
        assert_eq!(
            kb_prompt_content(None, 8000),
            "Knowledge Base is empty or unavailable."
        );
    }

    #[test]
    fn kb_truncation_respects_char_boundaries() {
        let kb = format!("{}é", "a".repeat(9000));
        let content = kb_prompt_content(Some(&kb), 100);
        assert!(content.ends_with('é'));
    }
}
