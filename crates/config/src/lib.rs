//! Configuration loading, validation, and management for Turnstile.
//!
//! Loads configuration from `~/.turnstile/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.turnstile/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Text-generation backend
    #[serde(default)]
    pub backend: BackendConfig,

    /// HTTP gateway and admission queue
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Conversation loop tuning
    #[serde(default)]
    pub agent: AgentConfig,

    /// Session persistence
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Extra profiles (a name collision replaces a built-in profile)
    #[serde(default)]
    pub profiles: Vec<ProfileConfig>,
}

fn default_true() -> bool {
    true
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

// ── Backend ───────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// `openai_compat`, `ollama`, or `echo`
    #[serde(default = "default_backend_kind")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_backend_timeout")]
    pub request_timeout_secs: u64,
}

fn default_backend_kind() -> String {
    "echo".into()
}
fn default_model() -> String {
    "qwen3:8b".into()
}
fn default_backend_timeout() -> u64 {
    300
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            api_url: None,
            api_key: None,
            model: default_model(),
            request_timeout_secs: default_backend_timeout(),
        }
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("kind", &self.kind)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

// ── Gateway ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// One deadline covering both queue wait and generation.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Waits longer than this report `was_queued = true`.
    #[serde(default = "default_queued_threshold")]
    pub queued_threshold_ms: u64,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_port() -> u16 {
    5997
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_request_timeout() -> u64 {
    1800
}
fn default_queued_threshold() -> u64 {
    10
}
fn default_max_body_bytes() -> usize {
    1024 * 1024
}
fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:5173".into(), "http://127.0.0.1:5173".into()]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            request_timeout_secs: default_request_timeout(),
            queued_threshold_ms: default_queued_threshold(),
            max_body_bytes: default_max_body_bytes(),
            cors_origins: default_cors_origins(),
        }
    }
}

// ── Agent ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Final content shorter than this may trigger a nudge.
    #[serde(default = "default_nudge_min_content_chars")]
    pub nudge_min_content_chars: usize,

    /// Nudges only fire while the 0-based round index is below this.
    #[serde(default = "default_nudge_max_round")]
    pub nudge_max_round: u32,

    #[serde(default = "default_nudge_message")]
    pub nudge_message: String,

    #[serde(default = "default_stream_arg_max_chars")]
    pub stream_arg_max_chars: usize,

    #[serde(default = "default_stream_result_max_chars")]
    pub stream_result_max_chars: usize,

    #[serde(default = "default_stream_thinking_max_chars")]
    pub stream_thinking_max_chars: usize,

    /// Argument keys that stream events never truncate.
    #[serde(default = "default_untruncated_args")]
    pub untruncated_args: Vec<String>,

    /// Capacity of the per-request event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_nudge_min_content_chars() -> usize {
    50
}
fn default_nudge_max_round() -> u32 {
    3
}
fn default_nudge_message() -> String {
    "Now use your tools to help answer the question.".into()
}
fn default_stream_arg_max_chars() -> usize {
    200
}
fn default_stream_result_max_chars() -> usize {
    500
}
fn default_stream_thinking_max_chars() -> usize {
    2000
}
fn default_untruncated_args() -> Vec<String> {
    vec!["code".into()]
}
fn default_event_buffer() -> usize {
    128
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            nudge_min_content_chars: default_nudge_min_content_chars(),
            nudge_max_round: default_nudge_max_round(),
            nudge_message: default_nudge_message(),
            stream_arg_max_chars: default_stream_arg_max_chars(),
            stream_result_max_chars: default_stream_result_max_chars(),
            stream_thinking_max_chars: default_stream_thinking_max_chars(),
            untruncated_args: default_untruncated_args(),
            event_buffer: default_event_buffer(),
        }
    }
}

// ── Sessions ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Empty sessions older than this are pruned by the janitor.
    #[serde(default = "default_empty_grace")]
    pub empty_grace_secs: u64,

    #[serde(default = "default_janitor_interval")]
    pub janitor_interval_secs: u64,

    #[serde(default = "default_list_limit")]
    pub list_limit: usize,

    /// Drop every empty session when the gateway starts.
    #[serde(default = "default_true")]
    pub prune_on_startup: bool,
}

fn default_data_dir() -> PathBuf {
    AppConfig::config_dir().join("data")
}
fn default_empty_grace() -> u64 {
    1800
}
fn default_janitor_interval() -> u64 {
    300
}
fn default_list_limit() -> usize {
    50
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            empty_grace_secs: default_empty_grace(),
            janitor_interval_secs: default_janitor_interval(),
            list_limit: default_list_limit(),
            prune_on_startup: true,
        }
    }
}

// ── Profiles ──────────────────────────────────────────────────────────────

/// A profile declared in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub name: String,

    pub system_prompt: String,

    /// Tool names, resolved against the registry at startup
    #[serde(default)]
    pub tools: Vec<String>,

    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_tool_rounds() -> u32 {
    8
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.7
}

impl AppConfig {
    /// Load configuration from the default path (~/.turnstile/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `TURNSTILE_API_KEY`, then `OPENAI_API_KEY`
    /// - `TURNSTILE_BACKEND`, `TURNSTILE_BACKEND_URL`, `TURNSTILE_MODEL`
    /// - `TURNSTILE_DATA_DIR`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
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

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var("TURNSTILE_API_KEY").or_else(|| var("OPENAI_API_KEY")) {
            self.backend.api_key = Some(key);
        }
        if let Some(kind) = var("TURNSTILE_BACKEND") {
            self.backend.kind = kind;
        }
        if let Some(url) = var("TURNSTILE_BACKEND_URL") {
            self.backend.api_url = Some(url);
        }
        if let Some(model) = var("TURNSTILE_MODEL") {
            self.backend.model = model;
        }
        if let Some(dir) = var("TURNSTILE_DATA_DIR") {
            self.sessions.data_dir = PathBuf::from(dir);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".turnstile")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.port == 0 {
            return Err(ConfigError::ValidationError("gateway.port must be non-zero".into()));
        }
        if self.gateway.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "gateway.request_timeout_secs must be > 0".into(),
            ));
        }
        if self.backend.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "backend.request_timeout_secs must be > 0".into(),
            ));
        }
        if self.agent.event_buffer == 0 {
            return Err(ConfigError::ValidationError("agent.event_buffer must be > 0".into()));
        }

        let mut seen = HashSet::new();
        for profile in &self.profiles {
            if !seen.insert(profile.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate profile name: {}",
                    profile.name
                )));
            }
            if profile.max_tool_rounds == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "profile {}: max_tool_rounds must be >= 1",
                    profile.name
                )));
            }
            if !(0.0..=2.0).contains(&profile.temperature) {
                return Err(ConfigError::ValidationError(format!(
                    "profile {}: temperature must be between 0.0 and 2.0",
                    profile.name
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
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
