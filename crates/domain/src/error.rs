/// Shared error type used across all TutorGate crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    /// A skill rejected its arguments. The executor feeds these back to the
    /// LLM as a system message instead of surfacing them to the learner.
    #[error("tool input: {0}")]
    ToolInput(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Unexpected failure inside a skill or the turn loop.
    #[error("executor: {0}")]
    Executor(String),

    #[error("store: {0}")]
    Store(String),

    #[error("whiteboard: {0}")]
    Whiteboard(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
