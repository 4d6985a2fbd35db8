//! Progress events emitted while a conversation runs.
//!
//! The gateway forwards these over SSE, one frame per event, with the
//! event's `type` as the SSE event name. Order within a run:
//!
//! - `round_start`, `generating`, optional `thinking`
//! - one `tool_start` / `tool_end` pair per tool call
//! - exactly one terminal `complete` or `error` (sent by the gateway)

use serde::{Deserialize, Serialize};
use turnstile_config::AgentConfig;
use turnstile_core::profile::truncate_chars;
use turnstile_core::tool::ToolArguments;

/// The payload of a [`GenerationEvent`], tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    RoundStart {
        round: u32,
        max_rounds: u32,
    },

    Generating {
        round: u32,
        max_rounds: u32,
    },

    /// The first reasoning fence of the round's response.
    Thinking {
        content: String,
        round: u32,
        max_rounds: u32,
    },

    ToolStart {
        tool_name: String,
        tool_args: serde_json::Value,
        round: u32,
        max_rounds: u32,
    },

    ToolEnd {
        tool_name: String,
        tool_result: String,
        round: u32,
        max_rounds: u32,
    },

    /// Carries the same payload as the non-streaming response.
    Complete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<serde_json::Value>,
        response: serde_json::Value,
        queue_stats: serde_json::Value,
    },

    Error {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationEvent {
    #[serde(flatten)]
    pub kind: EventKind,

    /// Unix seconds.
    pub timestamp: f64,
}

impl GenerationEvent {
    pub fn new(kind: EventKind) -> Self {
        let now = chrono::Utc::now();
        Self {
            kind,
            timestamp: now.timestamp_micros() as f64 / 1_000_000.0,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventKind::Error {
            error: message.into(),
        })
    }

    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            EventKind::RoundStart { .. } => "round_start",
            EventKind::Generating { .. } => "generating",
            EventKind::Thinking { .. } => "thinking",
            EventKind::ToolStart { .. } => "tool_start",
            EventKind::ToolEnd { .. } => "tool_end",
            EventKind::Complete { .. } => "complete",
            EventKind::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::Complete { .. } | EventKind::Error { .. })
    }
}

/// Size caps for event payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamLimits {
    pub arg_max_chars: usize,
    pub result_max_chars: usize,
    pub thinking_max_chars: usize,
    /// Argument keys passed through whole, such as source code a tool is
    /// about to run.
    pub untruncated_args: Vec<String>,
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

impl StreamLimits {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            arg_max_chars: config.stream_arg_max_chars,
            result_max_chars: config.stream_result_max_chars,
            thinking_max_chars: config.stream_thinking_max_chars,
            untruncated_args: config.untruncated_args.clone(),
        }
    }

    /// Cap string argument values. Non-string values pass through.
    pub fn truncate_args(&self, arguments: &ToolArguments) -> serde_json::Value {
        let capped = arguments
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) if !self.untruncated_args.contains(key) => {
                        serde_json::Value::String(truncate_chars(s, self.arg_max_chars))
                    }
                    other => other.clone(),
                };
                (key.clone(), value)
            })
            .collect();
        serde_json::Value::Object(capped)
    }

    pub fn truncate_result(&self, result: &str) -> String {
        truncate_chars(result, self.result_max_chars)
    }

    pub fn truncate_thinking(&self, thinking: &str) -> String {
        thinking.chars().take(self.thinking_max_chars).collect()
    }
}
