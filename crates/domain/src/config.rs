//! Top-level configuration, deserialized from `tutorgate.toml` with
//! environment-variable fallbacks resolved by the gateway at startup.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub whiteboard: WhiteboardConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    /// Allowed CORS origin for the front-end.
    #[serde(default = "d_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            cors_origin: d_cors_origin(),
        }
    }
}

fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_port() -> u16 {
    8000
}
fn d_cors_origin() -> String {
    "http://localhost:3000".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Auth
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Environment variable holding the shared bearer token.
    /// If the env var is unset, the gateway runs in dev mode: every
    /// connection is admitted as the dev user.
    #[serde(default = "d_token_env")]
    pub token_env: String,
    /// User id attached to dev-mode connections.
    #[serde(default = "d_dev_user")]
    pub dev_user_id: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_env: d_token_env(),
            dev_user_id: d_dev_user(),
        }
    }
}

fn d_token_env() -> String {
    "TG_API_TOKEN".into()
}
fn d_dev_user() -> String {
    "dev-user".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Storage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for persisted state (sessions, folders, snapshots).
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
        }
    }
}

fn d_state_path() -> PathBuf {
    PathBuf::from("./data")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    /// Provider adapters, first entry is the default.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Optional model override for the focus planner.
    #[serde(default)]
    pub planner_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    /// Adapter kind: `openai_compat` or `anthropic`.
    pub kind: String,
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub default_model: Option<String>,
}

fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Bounded retries for malformed LLM JSON.
    #[serde(default = "d_retries")]
    pub max_json_retries: u32,
    /// Linear temperature escalation per retry.
    #[serde(default = "d_temp_step")]
    pub temperature_step: f32,
    /// Backoff between retries, in milliseconds.
    #[serde(default = "d_backoff")]
    pub retry_backoff_ms: u64,
    /// Per-session cap on high-cost skill invocations.
    #[serde(default = "d_high_cost")]
    pub max_high_cost_calls: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_json_retries: d_retries(),
            temperature_step: d_temp_step(),
            retry_backoff_ms: d_backoff(),
            max_high_cost_calls: d_high_cost(),
        }
    }
}

fn d_retries() -> u32 {
    3
}
fn d_temp_step() -> f32 {
    0.1
}
fn d_backoff() -> u64 {
    1000
}
fn d_high_cost() -> u32 {
    3
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Whiteboard
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhiteboardConfig {
    /// Ephemeral-object GC tick, in seconds.
    #[serde(default = "d_gc_interval")]
    pub gc_interval_secs: u64,
    #[serde(default = "d_grid_cols")]
    pub grid_cols: u32,
    #[serde(default = "d_grid_rows")]
    pub grid_rows: u32,
    #[serde(default = "d_cell_width")]
    pub cell_width: u32,
    #[serde(default = "d_cell_height")]
    pub cell_height: u32,
}

impl Default for WhiteboardConfig {
    fn default() -> Self {
        Self {
            gc_interval_secs: d_gc_interval(),
            grid_cols: d_grid_cols(),
            grid_rows: d_grid_rows(),
            cell_width: d_cell_width(),
            cell_height: d_cell_height(),
        }
    }
}

fn d_gc_interval() -> u64 {
    10
}
fn d_grid_cols() -> u32 {
    4
}
fn d_grid_rows() -> u32 {
    12
}
fn d_cell_width() -> u32 {
    220
}
fn d_cell_height() -> u32 {
    140
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Analyzer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Approximate words per summarization chunk.
    #[serde(default = "d_chunk_words")]
    pub chunk_words: usize,
    /// Hard token budget for the concatenated summary.
    #[serde(default = "d_token_budget")]
    pub token_budget: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            chunk_words: d_chunk_words(),
            token_budget: d_token_budget(),
        }
    }
}

fn d_chunk_words() -> usize {
    400
}
fn d_token_budget() -> usize {
    2000
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.server.port == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        if self.whiteboard.grid_cols == 0 || self.whiteboard.grid_rows == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: "whiteboard.grid".into(),
                message: "grid dimensions must be non-zero".into(),
            });
        }

        if self.executor.max_json_retries == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "executor.max_json_retries".into(),
                message: "0 retries means a single malformed reply aborts the turn".into(),
            });
        }

        if self.llm.providers.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                field: "llm.providers".into(),
                message: "no LLM providers configured; executor turns will fail".into(),
            });
        }

        issues
    }
}
