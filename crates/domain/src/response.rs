//! The outbound envelope sent to the client after every turn, plus its
//! typed payload variants.

use serde::{Deserialize, Serialize};

use crate::canvas::WhiteboardAction;
use crate::learner::LearnerState;
use crate::quiz::{QuizFeedbackItem, QuizQuestion};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Explanation,
    Question,
    Feedback,
    Message,
    Error,
    Raw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplanationPayload {
    pub explanation_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionPayload {
    /// `multiple_choice`, `free_response`, or `reflection`.
    pub question_type: String,
    pub question_data: QuizQuestion,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackPayload {
    pub feedback_items: Vec<QuizFeedbackItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_assessment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_next_step: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    pub message_text: String,
    /// `greeting`, `transition`, `summary`, `status_update`, `clarification`.
    pub message_type: String,
}

impl MessagePayload {
    pub fn status(text: impl Into<String>) -> Self {
        Self {
            message_text: text.into(),
            message_type: "status_update".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    Explanation(ExplanationPayload),
    Question(QuestionPayload),
    Feedback(FeedbackPayload),
    Message(MessagePayload),
    Error(ErrorPayload),
    Raw(serde_json::Value),
}

/// Wrapper for everything sent from the tutor runtime to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionResponse {
    pub schema_version: u32,
    pub content_type: ContentType,
    pub data: ResponsePayload,
    pub user_model_state: LearnerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whiteboard_actions: Option<Vec<WhiteboardAction>>,
}

impl InteractionResponse {
    pub fn new(
        content_type: ContentType,
        data: ResponsePayload,
        user_model_state: LearnerState,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            content_type,
            data,
            user_model_state,
            whiteboard_actions: None,
        }
    }

    pub fn with_actions(mut self, actions: Vec<WhiteboardAction>) -> Self {
        if !actions.is_empty() {
            self.whiteboard_actions = Some(actions);
        }
        self
    }

    pub fn message(
        text: impl Into<String>,
        state: LearnerState,
    ) -> Self {
        Self::new(
            ContentType::Message,
            ResponsePayload::Message(MessagePayload::status(text)),
            state,
        )
    }

    pub fn error(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Option<String>,
        state: LearnerState,
    ) -> Self {
        Self::new(
            ContentType::Error,
            ResponsePayload::Error(ErrorPayload {
                error_code: Some(code.into()),
                error_message: message.into(),
                technical_details: details,
            }),
            state,
        )
    }
}
