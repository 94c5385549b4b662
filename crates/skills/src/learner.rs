//! The learner-model update skill.

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use tg_domain::context::TutorContext;
use tg_domain::error::Error;
use tg_domain::learner::{ConceptMastery, InteractionOutcome};

use crate::registry::{parse_args, SkillCtxServices, SkillFuture, SkillOutput};

#[derive(Debug, Deserialize)]
struct UpdateUserModelArgs {
    topic: String,
    /// `correct`, `incorrect`, `unsure`, `clarification_needed`, `explained`.
    /// Anything else is recorded as a no-op.
    outcome: String,
    #[serde(default)]
    details: Option<String>,
}

/// Update the Beta(α, β) mastery record for a topic.
///
/// `correct` → α+1; `incorrect` → β+1 (plus a novel confusion point when
/// details are given); `explained`/`clarification_needed`/`unsure` count the
/// interaction without moving α/β. Unknown outcomes change nothing.
pub fn update_user_model<'a>(
    ctx: &'a mut TutorContext,
    _services: &'a SkillCtxServices,
    args: Value,
) -> SkillFuture<'a> {
    Box::pin(async move {
        let args: UpdateUserModelArgs = parse_args("update_user_model", args)?;
        if args.topic.trim().is_empty() {
            return Err(Error::ToolInput(
                "update_user_model: 'topic' must not be blank".into(),
            ));
        }

        let state = apply_outcome(ctx, &args.topic, &args.outcome, args.details.as_deref());
        Ok(SkillOutput::State(state))
    })
}

/// Internal entry point shared with the deterministic evaluator.
pub(crate) fn apply_outcome(
    ctx: &mut TutorContext,
    topic: &str,
    outcome: &str,
    details: Option<&str>,
) -> tg_domain::learner::LearnerState {
    let concept = ctx
        .user_model_state
        .concepts
        .entry(topic.to_owned())
        .or_insert_with(ConceptMastery::default);

    match outcome {
        "correct" => {
            concept.alpha += 1;
            concept.attempts += 1;
        }
        "incorrect" => {
            concept.beta += 1;
            concept.attempts += 1;
            if let Some(details) = details.filter(|d| !d.trim().is_empty()) {
                if !concept.confusion_points.iter().any(|p| p == details) {
                    concept.confusion_points.push(details.to_owned());
                }
            }
        }
        "explained" | "clarification_needed" | "unsure" => {
            concept.attempts += 1;
        }
        other => {
            tracing::warn!(topic, outcome = other, "unhandled outcome; no update");
            return ctx.user_model_state.clone();
        }
    }

    concept.last_interaction_outcome = Some(outcome.to_owned());
    concept.last_accessed = Some(Utc::now());
    let mastery = concept.mastery();
    let confidence = concept.confidence();
    let attempts = concept.attempts;
    ctx.user_model_state.current_topic = Some(topic.to_owned());

    tracing::info!(
        topic,
        outcome,
        mastery = format!("{mastery:.3}"),
        confidence,
        attempts,
        "learner model updated"
    );
    ctx.user_model_state.clone()
}

/// Typed variant for internal callers.
pub(crate) fn apply_typed_outcome(
    ctx: &mut TutorContext,
    topic: &str,
    outcome: InteractionOutcome,
    details: Option<&str>,
) -> tg_domain::learner::LearnerState {
    apply_outcome(ctx, topic, outcome.as_str(), details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::test_services;
    use uuid::Uuid;

    fn ctx() -> TutorContext {
        TutorContext::new(Uuid::new_v4(), "u", None)
    }

    async fn run(ctx: &mut TutorContext, args: Value) -> SkillOutput {
        let services = test_services();
        update_user_model(ctx, &services, args).await.unwrap()
    }

    #[tokio::test]
    async fn correct_bumps_alpha_and_attempts() {
        let mut c = ctx();
        run(
            &mut c,
            serde_json::json!({"topic": "Photosynthesis", "outcome": "correct"}),
        )
        .await;
        let concept = &c.user_model_state.concepts["Photosynthesis"];
        assert_eq!(concept.alpha, 2);
        assert_eq!(concept.beta, 1);
        assert_eq!(concept.attempts, 1);
        assert_eq!(
            c.user_model_state.current_topic.as_deref(),
            Some("Photosynthesis")
        );
    }

    #[tokio::test]
    async fn incorrect_bumps_beta_and_records_novel_confusion() {
        let mut c = ctx();
        let args = serde_json::json!({
            "topic": "Scope",
            "outcome": "incorrect",
            "details": "confused global with local",
        });
        run(&mut c, args.clone()).await;
        run(&mut c, args).await;
        let concept = &c.user_model_state.concepts["Scope"];
        assert_eq!(concept.alpha, 1);
        assert_eq!(concept.beta, 3);
        assert_eq!(concept.attempts, 2);
        // Duplicate details are not re-recorded.
        assert_eq!(concept.confusion_points.len(), 1);
    }

    #[tokio::test]
    async fn explained_counts_attempt_without_moving_mastery() {
        let mut c = ctx();
        run(
            &mut c,
            serde_json::json!({"topic": "Loops", "outcome": "explained"}),
        )
        .await;
        let concept = &c.user_model_state.concepts["Loops"];
        assert_eq!((concept.alpha, concept.beta), (1, 1));
        assert_eq!(concept.attempts, 1);
        assert_eq!(concept.last_interaction_outcome.as_deref(), Some("explained"));
    }

    #[tokio::test]
    async fn unknown_outcome_changes_nothing() {
        let mut c = ctx();
        run(
            &mut c,
            serde_json::json!({"topic": "Loops", "outcome": "shrugged"}),
        )
        .await;
        let concept = &c.user_model_state.concepts["Loops"];
        assert_eq!((concept.alpha, concept.beta, concept.attempts), (1, 1, 0));
        assert!(concept.last_interaction_outcome.is_none());
    }

    #[tokio::test]
    async fn blank_topic_is_rejected() {
        let mut c = ctx();
        let services = test_services();
        let err = update_user_model(
            &mut c,
            &services,
            serde_json::json!({"topic": "  ", "outcome": "correct"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::ToolInput(_)));
    }

    #[tokio::test]
    async fn mastery_stays_in_open_interval() {
        let mut c = ctx();
        for _ in 0..50 {
            run(
                &mut c,
                serde_json::json!({"topic": "T", "outcome": "correct"}),
            )
            .await;
        }
        let concept = &c.user_model_state.concepts["T"];
        let mastery = concept.mastery();
        assert!(mastery > 0.0 && mastery < 1.0);
        assert!(concept.is_mastered());
    }
}
