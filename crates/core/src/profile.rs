//! Profiles — immutable agent personas.
//!
//! A profile bundles a system prompt, the tools the backend may call, and
//! generation limits. Profiles are built once at startup and shared behind
//! `Arc` by every conversation that uses them.

use serde::{Deserialize, Serialize};

use crate::tool::ToolSpec;

pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 8;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub system_prompt: String,
    pub tools: Vec<ToolSpec>,
    pub max_tool_rounds: u32,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Profile {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            tools: Vec::new(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the round budget. A budget of zero is raised to one.
    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name.clone()).collect()
    }

    /// First 200 characters of the system prompt, with "..." when cut.
    pub fn system_prompt_preview(&self) -> String {
        truncate_chars(&self.system_prompt, PREVIEW_CHARS)
    }
}

/// Cut `text` to at most `max` characters, appending "..." when shortened.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol() {
        let profile = Profile::new("general", "You are helpful.");
        assert_eq!(profile.max_tool_rounds, 8);
        assert_eq!(profile.max_tokens, 4096);
        assert!((profile.temperature - 0.7).abs() < f32::EPSILON);
        assert!(!profile.has_tools());
    }

    #[test]
    fn zero_round_budget_is_clamped() {
        let profile = Profile::new("p", "x").with_max_tool_rounds(0);
        assert_eq!(profile.max_tool_rounds, 1);
    }

    #[test]
    fn preview_truncates_long_prompts() {
        let profile = Profile::new("p", "a".repeat(250));
        let preview = profile.system_prompt_preview();
        assert_eq!(preview.len(), 203);
        assert!(preview.ends_with("..."));

        let short = Profile::new("p", "short prompt");
        assert_eq!(short.system_prompt_preview(), "short prompt");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll...");
        assert_eq!(truncate_chars("abc", 3), "abc");
    }
}
