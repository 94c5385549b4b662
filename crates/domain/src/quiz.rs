use serde::{Deserialize, Serialize};

/// A multiple-choice question shown on the whiteboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer_index: usize,
    pub explanation: String,
    pub difficulty: String,
    pub related_section: String,
}

/// Feedback on a single answered question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizFeedbackItem {
    pub question_index: usize,
    pub question_text: String,
    pub user_selected_option: String,
    pub is_correct: bool,
    pub correct_option: String,
    pub explanation: String,
    pub improvement_suggestion: String,
}
