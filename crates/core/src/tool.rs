//! Tool traits — the abstraction over agent capabilities.
//!
//! A tool is a named operation with a JSON Schema and a string-in/string-out
//! body. Bodies come in two flavours: [`Tool`] for async work (network,
//! browsers) and [`BlockingTool`] for synchronous work that must stay off the
//! async worker threads.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;

/// Arguments passed to a tool: a JSON object.
pub type ToolArguments = serde_json::Map<String, serde_json::Value>;

/// The schema half of a tool, known at registration time even when the
/// implementation is resolved lazily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// The unique name of this tool (e.g., "web_search")
    pub name: String,

    /// What this tool does (sent to the backend)
    pub description: String,

    /// JSON Schema describing this tool's parameters
    pub parameters: serde_json::Value,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Function-calling schema as embedded in the system prompt.
    pub fn to_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// A tool call parsed out of backend output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,

    #[serde(default)]
    pub arguments: ToolArguments,
}

/// The outcome of one tool call. `result` is always serialized JSON text,
/// including `{"error": ...}` envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub result: String,
}

/// An async tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the backend).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: ToolArguments) -> Result<String, ToolError>;

    fn to_spec(&self) -> ToolSpec {
        ToolSpec::new(self.name(), self.description(), self.parameters_schema())
    }
}

/// A synchronous tool. The registry runs it on the blocking thread pool
/// when called from async code.
pub trait BlockingTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> serde_json::Value;

    fn execute(&self, arguments: ToolArguments) -> Result<String, ToolError>;

    fn to_spec(&self) -> ToolSpec {
        ToolSpec::new(self.name(), self.description(), self.parameters_schema())
    }
}

/// Render a failure message as the JSON envelope fed back to the backend.
pub fn error_envelope(message: impl AsRef<str>) -> String {
    serde_json::json!({ "error": message.as_ref() }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_wraps_spec_as_function() {
        let spec = ToolSpec::new(
            "search",
            "Search things",
            serde_json::json!({"type": "object", "properties": {}}),
        );
        let schema = spec.to_schema();
        assert_eq!(schema["type"], "function");
        assert_eq!(schema["function"]["name"], "search");
        assert_eq!(schema["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn tool_call_defaults_missing_arguments() {
        let call: ToolCall = serde_json::from_str(r#"{"name":"search"}"#).unwrap();
        assert!(call.arguments.is_empty());
    }

    #[test]
    fn error_envelope_is_valid_json() {
        let text = error_envelope("Unknown tool: nope");
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["error"], "Unknown tool: nope");
    }
}
