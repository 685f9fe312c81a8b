//! Configuration loading, validation, and management for sandpiper.
//!
//! Loads configuration from `~/.sandpiper/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.sandpiper/config.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model client settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Loop controller settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// History compaction and repetition detection
    #[serde(default)]
    pub history: HistoryConfig,

    /// Tool dispatcher and sandbox settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Checkpoint store settings
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("provider", &self.provider)
            .field("agent", &self.agent)
            .field("history", &self.history)
            .field("tools", &self.tools)
            .field("checkpoint", &self.checkpoint)
            .finish()
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Maximum `ASK_MODEL` entries per invocation before the run is truncated.
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: u32,

    /// Extra attempts after a failed model call.
    #[serde(default = "default_model_retries")]
    pub model_retries: u32,
}

fn default_recursion_limit() -> u32 {
    40
}
fn default_model_retries() -> u32 {
    1
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            recursion_limit: default_recursion_limit(),
            model_retries: default_model_retries(),
        }
    }
}

/// Knobs for the history compactor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Copies of one user/assistant message allowed inside `recent_window`.
    #[serde(default = "default_max_duplicates")]
    pub max_duplicates: usize,

    #[serde(default = "default_recent_window")]
    pub recent_window: usize,

    /// Entries scanned for an identical `(tool, content)` pair.
    #[serde(default = "default_tool_result_window")]
    pub tool_result_window: usize,

    /// Turns after a successful write during which an identical write is hidden.
    #[serde(default = "default_write_suppress_turns")]
    pub write_suppress_turns: usize,

    /// Turns after a read during which an identical, unchanged read is hidden.
    #[serde(default = "default_read_suppress_turns")]
    pub read_suppress_turns: usize,

    /// Consecutive repeats that count as a loop.
    #[serde(default = "default_loop_threshold")]
    pub loop_threshold: usize,

    /// Messages per class examined by the loop detector.
    #[serde(default = "default_loop_window")]
    pub loop_window: usize,

    /// Tool results scanned for a completion signal when a loop is terminal.
    #[serde(default = "default_completion_lookback")]
    pub completion_lookback: usize,

    /// View length above which the log is compacted.
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    #[serde(default = "default_recent_tail")]
    pub recent_tail: usize,

    #[serde(default = "default_milestone_limit")]
    pub milestone_limit: usize,

    /// Older tool-calling exchanges kept when compacting.
    #[serde(default = "default_tool_call_context_limit")]
    pub tool_call_context_limit: usize,
}

fn default_max_duplicates() -> usize {
    3
}
fn default_recent_window() -> usize {
    12
}
fn default_tool_result_window() -> usize {
    5
}
fn default_write_suppress_turns() -> usize {
    8
}
fn default_read_suppress_turns() -> usize {
    10
}
fn default_loop_threshold() -> usize {
    3
}
fn default_loop_window() -> usize {
    8
}
fn default_completion_lookback() -> usize {
    20
}
fn default_max_length() -> usize {
    25
}
fn default_recent_tail() -> usize {
    12
}
fn default_milestone_limit() -> usize {
    3
}
fn default_tool_call_context_limit() -> usize {
    2
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_duplicates: default_max_duplicates(),
            recent_window: default_recent_window(),
            tool_result_window: default_tool_result_window(),
            write_suppress_turns: default_write_suppress_turns(),
            read_suppress_turns: default_read_suppress_turns(),
            loop_threshold: default_loop_threshold(),
            loop_window: default_loop_window(),
            completion_lookback: default_completion_lookback(),
            max_length: default_max_length(),
            recent_tail: default_recent_tail(),
            milestone_limit: default_milestone_limit(),
            tool_call_context_limit: default_tool_call_context_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Tool calls from one model response dispatched concurrently.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Treat files differing only in whitespace as already written.
    ///
    /// This can hide a genuinely partial write, so it is off by default.
    #[serde(default)]
    pub whitespace_insensitive_compare: bool,

    /// Root directory of the local sandbox.
    #[serde(default = "default_sandbox_root")]
    pub sandbox_root: String,

    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_parallelism() -> usize {
    4
}
fn default_sandbox_root() -> String {
    AppConfig::config_dir()
        .join("sandbox")
        .to_string_lossy()
        .into_owned()
}
fn default_command_timeout_secs() -> u64 {
    300
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            whitespace_insensitive_compare: false,
            sandbox_root: default_sandbox_root(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// "file" or "memory"
    #[serde(default = "default_checkpoint_backend")]
    pub backend: String,

    #[serde(default = "default_checkpoint_dir")]
    pub dir: String,
}

fn default_checkpoint_backend() -> String {
    "file".into()
}
fn default_checkpoint_dir() -> String {
    AppConfig::config_dir()
        .join("threads")
        .to_string_lossy()
        .into_owned()
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: default_checkpoint_backend(),
            dir: default_checkpoint_dir(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location with env var overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Environment variables take precedence over the file.
    fn apply_env_overrides(&mut self) {
        if self.provider.api_key.is_none() {
            self.provider.api_key = std::env::var("SANDPIPER_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("SANDPIPER_MODEL") {
            self.provider.model = model;
        }

        if let Ok(url) = std::env::var("SANDPIPER_BASE_URL") {
            self.provider.base_url = url;
        }

        if let Ok(root) = std::env::var("SANDPIPER_SANDBOX_ROOT") {
            self.tools.sandbox_root = root;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".sandpiper")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.temperature < 0.0 || self.provider.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.recursion_limit == 0 {
            return Err(ConfigError::ValidationError(
                "agent.recursion_limit must be at least 1".into(),
            ));
        }

        let h = &self.history;
        if h.loop_threshold < 2 {
            return Err(ConfigError::ValidationError(
                "history.loop_threshold must be at least 2".into(),
            ));
        }
        if h.loop_threshold > h.max_duplicates {
            return Err(ConfigError::ValidationError(
                "history.loop_threshold must not exceed history.max_duplicates".into(),
            ));
        }
        if h.recent_tail >= h.max_length {
            return Err(ConfigError::ValidationError(
                "history.recent_tail must be smaller than history.max_length".into(),
            ));
        }

        if self.tools.parallelism == 0 {
            return Err(ConfigError::ValidationError(
                "tools.parallelism must be at least 1".into(),
            ));
        }

        if !matches!(self.checkpoint.backend.as_str(), "file" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "checkpoint.backend must be \"file\" or \"memory\", got \"{}\"",
                self.checkpoint.backend
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.recursion_limit, 40);
        assert_eq!(config.history.max_length, 25);
        assert!(!config.tools.whitespace_insensitive_compare);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.provider.model, config.provider.model);
        assert_eq!(parsed.history.loop_threshold, config.history.loop_threshold);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.provider.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn loop_threshold_above_duplicates_rejected() {
        let mut config = AppConfig::default();
        config.history.loop_threshold = 5;
        config.history.max_duplicates = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn tail_must_fit_inside_max_length() {
        let mut config = AppConfig::default();
        config.history.recent_tail = 25;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_backend_rejected() {
        let mut config = AppConfig::default();
        config.checkpoint.backend = "redis".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.provider.base_url, "https://openrouter.ai/api/v1");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[agent]
recursion_limit = 10

[history]
max_length = 40
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.agent.recursion_limit, 10);
        assert_eq!(config.history.max_length, 40);
        assert_eq!(config.history.recent_tail, 12);
        assert_eq!(config.tools.parallelism, 4);
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-secret".into());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("recursion_limit"));
        assert!(toml_str.contains("openrouter"));
    }
}
