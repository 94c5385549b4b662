//! LLM provider adapters for TutorGate.
//!
//! The planner and lean executor speak to the model through the
//! [`LlmProvider`] trait; adapters translate to each provider's wire format.
//! All calls here are single-shot (no streaming): the executor consumes
//! exactly one JSON object per turn.

mod anthropic;
mod openai_compat;
pub mod registry;
pub mod retry;
mod traits;
mod util;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use registry::ProviderRegistry;
pub use traits::{ChatRequest, ChatResponse, LlmProvider, Usage};
