//! The outcome of one conversation-loop run.

use serde::{Deserialize, Serialize};

use crate::tool::{ToolCall, ToolResult};

/// Result of driving one user message through the loop.
///
/// `finished == false` means the round budget ran out before the backend
/// produced a tool-call-free answer. `content` still carries the best
/// partial answer; this is a degraded success, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
    pub rounds_used: u32,
    pub finished: bool,
}
