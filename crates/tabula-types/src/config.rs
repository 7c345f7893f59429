//! Global configuration types for Tabula.
//!
//! `GlobalConfig` represents the top-level `config.toml`. Every section and
//! field has a default, so an empty file (or no file) is a valid config.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// Loaded from `~/.tabula/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Workflow engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Consecutive failed Execute attempts before control returns to the user.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Deadline for a single code runner invocation.
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,

    /// How much of the generated code is kept in an undo entry description.
    #[serde(default = "default_description_preview_chars")]
    pub description_preview_chars: usize,

    /// Upper bound on steps run by a single `advance` call. Retry
    /// self-loops at `Execute` do not count; `max_retries` bounds those.
    #[serde(default = "default_max_steps_per_turn")]
    pub max_steps_per_turn: u32,

    /// Export destination when the user does not name one.
    #[serde(default = "default_export_filename")]
    pub default_export_filename: String,
}

fn default_max_retries() -> u32 {
    3
}

fn default_execution_timeout_secs() -> u64 {
    60
}

fn default_description_preview_chars() -> usize {
    60
}

fn default_max_steps_per_turn() -> u32 {
    50
}

fn default_export_filename() -> String {
    "cleaned.csv".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            execution_timeout_secs: default_execution_timeout_secs(),
            description_preview_chars: default_description_preview_chars(),
            max_steps_per_turn: default_max_steps_per_turn(),
            default_export_filename: default_export_filename(),
        }
    }
}

/// Sandboxed code runner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Interpreter executable used to run the harness.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Hard deadline enforced by the runner itself (the engine applies its own too).
    #[serde(default = "default_runner_timeout_secs")]
    pub timeout_secs: u64,

    /// Largest dataset the runner will accept back from the child process.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: u64,

    /// Builtins exposed to generated code.
    #[serde(default = "default_allowed_builtins")]
    pub allowed_builtins: Vec<String>,
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_runner_timeout_secs() -> u64 {
    60
}

fn default_max_output_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_allowed_builtins() -> Vec<String> {
    [
        "len", "sum", "min", "max", "range", "enumerate", "zip", "abs", "round", "sorted",
        "list", "dict", "set", "tuple", "str", "int", "float", "bool", "print", "isinstance",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            timeout_secs: default_runner_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
            allowed_builtins: default_allowed_builtins(),
        }
    }
}

/// Proposal generator (LLM) settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Override for the provider base URL (proxies, tests).
    #[serde(default)]
    pub base_url: Option<String>,

    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f64 {
    0.1
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            base_url: None,
            api_key_env: default_api_key_env(),
        }
    }
}

/// Which snapshot store backs the sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Filesystem,
}

/// Snapshot store settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Byte budget for the in-memory store; `None` means unbounded.
    #[serde(default)]
    pub max_bytes: Option<u64>,
}

/// HTTP/WebSocket adapter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Sessions idle longer than this are evicted.
    #[serde(default = "default_session_idle_timeout_secs")]
    pub session_idle_timeout_secs: u64,

    /// CORS origin; `None` allows any origin.
    #[serde(default)]
    pub allowed_origin: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8700
}

fn default_session_idle_timeout_secs() -> u64 {
    1800
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            session_idle_timeout_secs: default_session_idle_timeout_secs(),
            allowed_origin: None,
        }
    }
}
