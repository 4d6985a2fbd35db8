//! Nudge policy for backends that reason without acting.
//!
//! Small backends sometimes think through which tool to call and then stop
//! without calling it. When a round ends with reasoning, almost no visible
//! answer, and tools on offer, the loop asks once more instead of returning.

use turnstile_config::AgentConfig;

use crate::parser::has_thinking;

#[derive(Debug, Clone, PartialEq)]
pub struct NudgePolicy {
    /// Final content shorter than this (in chars) counts as "no answer".
    pub min_content_chars: usize,
    /// Nudges are allowed only while the 0-based round index is below this.
    pub max_round: u32,
    pub message: String,
}

impl Default for NudgePolicy {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

impl NudgePolicy {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            min_content_chars: config.nudge_min_content_chars,
            max_round: config.nudge_max_round,
            message: config.nudge_message.clone(),
        }
    }

    /// Never nudge.
    pub fn disabled() -> Self {
        Self {
            max_round: 0,
            ..Self::default()
        }
    }

    /// Evaluated once per tool-call-free round.
    pub fn should_nudge(
        &self,
        raw_response: &str,
        final_content: &str,
        round_index: u32,
        has_tools: bool,
    ) -> bool {
        has_tools
            && round_index < self.max_round
            && has_thinking(raw_response)
            && final_content.chars().count() < self.min_content_chars
    }
}
