//! The per-learner knowledge model: Beta-distributed mastery per concept
//! plus session-level preferences and pending-interaction state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tracks mastery of a single concept with a Beta(α, β) model.
///
/// α counts successes, β failures; both start at 1 (uniform prior) and only
/// ever increase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptMastery {
    pub alpha: u32,
    pub beta: u32,
    #[serde(default)]
    pub last_interaction_outcome: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    /// Specific points the learner struggled with on this concept.
    #[serde(default)]
    pub confusion_points: Vec<String>,
    #[serde(default)]
    pub last_accessed: Option<DateTime<Utc>>,
}

impl Default for ConceptMastery {
    fn default() -> Self {
        Self {
            alpha: 1,
            beta: 1,
            last_interaction_outcome: None,
            attempts: 0,
            confusion_points: Vec::new(),
            last_accessed: None,
        }
    }
}

impl ConceptMastery {
    /// Posterior mean mastery probability.
    pub fn mastery(&self) -> f64 {
        f64::from(self.alpha) / f64::from(self.alpha + self.beta)
    }

    /// Total number of observations (α + β).
    pub fn confidence(&self) -> u32 {
        self.alpha + self.beta
    }

    /// Mastered iff mastery > 0.8 and at least 5 observations.
    pub fn is_mastered(&self) -> bool {
        self.mastery() > 0.8 && self.confidence() >= 5
    }
}

/// Outcome of one learner/tutor interaction on a concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionOutcome {
    Correct,
    Incorrect,
    Unsure,
    ClarificationNeeded,
    Explained,
}

impl InteractionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionOutcome::Correct => "correct",
            InteractionOutcome::Incorrect => "incorrect",
            InteractionOutcome::Unsure => "unsure",
            InteractionOutcome::ClarificationNeeded => "clarification_needed",
            InteractionOutcome::Explained => "explained",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStyle {
    Explanatory,
    QuizHeavy,
    Socratic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingInteraction {
    CheckingQuestion,
    SummaryPrompt,
}

/// The tutor's model of the learner's knowledge state and preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerState {
    #[serde(default)]
    pub concepts: BTreeMap<String, ConceptMastery>,
    #[serde(default)]
    pub overall_progress: f64,
    #[serde(default)]
    pub current_topic: Option<String>,
    /// Progress within the current topic's explanation.
    #[serde(default)]
    pub current_topic_segment_index: u32,
    /// Pacing adjustment: > 1 faster, < 1 slower.
    #[serde(default = "default_pace")]
    pub learning_pace_factor: f64,
    #[serde(default)]
    pub preferred_interaction_style: Option<InteractionStyle>,
    /// High-level notes about session progress and learner behavior.
    #[serde(default)]
    pub session_summary_notes: Vec<String>,
    #[serde(default)]
    pub pending_interaction_type: Option<PendingInteraction>,
    #[serde(default)]
    pub pending_interaction_details: Option<serde_json::Value>,
}

fn default_pace() -> f64 {
    1.0
}

impl Default for LearnerState {
    fn default() -> Self {
        Self {
            concepts: BTreeMap::new(),
            overall_progress: 0.0,
            current_topic: None,
            current_topic_segment_index: 0,
            learning_pace_factor: default_pace(),
            preferred_interaction_style: None,
            session_summary_notes: Vec::new(),
            pending_interaction_type: None,
            pending_interaction_details: None,
        }
    }
}

impl LearnerState {
    /// Concepts currently considered mastered.
    pub fn mastered_concepts(&self) -> Vec<String> {
        self.concepts
            .iter()
            .filter(|(_, c)| c.is_mastered())
            .map(|(t, _)| t.clone())
            .collect()
    }

    /// One line per tracked concept, for the planner/executor prompts.
    pub fn summary_lines(&self) -> Vec<String> {
        self.concepts
            .iter()
            .map(|(topic, c)| {
                format!(
                    "- {topic}: Mastery={:.2}, Confidence={}, Attempts={}",
                    c.mastery(),
                    c.confidence(),
                    c.attempts
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_concept_has_uniform_prior() {
        let c = ConceptMastery::default();
        assert_eq!(c.alpha, 1);
        assert_eq!(c.beta, 1);
        assert!((c.mastery() - 0.5).abs() < f64::EPSILON);
        assert_eq!(c.confidence(), 2);
        assert!(!c.is_mastered());
    }

    #[test]
    fn mastery_requires_confidence() {
        // 4/5 successes: mastery 0.83 but only 6 observations counts.
        let c = ConceptMastery {
            alpha: 5,
            beta: 1,
            ..Default::default()
        };
        assert!(c.mastery() > 0.8);
        assert!(c.is_mastered());

        // High ratio, low evidence.
        let c = ConceptMastery {
            alpha: 3,
            beta: 1,
            ..Default::default()
        };
        assert!(!c.is_mastered());
    }

    #[test]
    fn mastered_concepts_filters() {
        let mut state = LearnerState::default();
        state.concepts.insert(
            "loops".into(),
            ConceptMastery {
                alpha: 9,
                beta: 1,
                ..Default::default()
            },
        );
        state
            .concepts
            .insert("recursion".into(), ConceptMastery::default());
        assert_eq!(state.mastered_concepts(), vec!["loops".to_string()]);
    }
}
