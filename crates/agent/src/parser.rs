//! In-band tool-calling protocol.
//!
//! Tools are advertised inside the system prompt and the backend answers
//! with `<tool_call>{json}</tool_call>` fences. Reasoning arrives in
//! `<think>...</think>` fences. Results go back as one user message of
//! `<tool_response>` blocks.

use std::sync::LazyLock;

use regex_lite::Regex;
use turnstile_core::profile::Profile;
use turnstile_core::tool::{ToolArguments, ToolCall, ToolResult, ToolSpec};

const TOOL_CALL_OPEN: &str = "<tool_call>";
const THINK_OPEN: &str = "<think>";

static TOOL_CALL_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<tool_call>(.*?)</tool_call>").expect("valid pattern"));

static THINK_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>(.*?)</think>").expect("valid pattern"));

/// Extract every well-formed tool call, in order of appearance.
///
/// Each fence is parsed on its own. A fence whose body is not a JSON object
/// with a string `name` is dropped without affecting the others.
pub fn parse_tool_calls(text: &str) -> Vec<ToolCall> {
    TOOL_CALL_FENCE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|body| parse_block(body.as_str()))
        .collect()
}

fn parse_block(body: &str) -> Option<ToolCall> {
    // An unterminated fence before this one leaves its opener inside the
    // match; only the text after the innermost opener belongs to this call.
    let body = body.rsplit(TOOL_CALL_OPEN).next().unwrap_or(body).trim();

    let serde_json::Value::Object(mut object) = serde_json::from_str(body).ok()? else {
        return None;
    };

    let name = match object.remove("name")? {
        serde_json::Value::String(name) => name,
        _ => return None,
    };

    let arguments = match object.remove("arguments") {
        None | Some(serde_json::Value::Null) => ToolArguments::new(),
        Some(serde_json::Value::Object(arguments)) => arguments,
        Some(_) => return None,
    };

    Some(ToolCall { name, arguments })
}

/// The user-visible answer: the raw text without tool-call or reasoning fences.
pub fn extract_final_content(text: &str) -> String {
    let without_calls = TOOL_CALL_FENCE.replace_all(text, "");
    THINK_FENCE.replace_all(&without_calls, "").trim().to_string()
}

/// The body of the first reasoning fence, if any.
pub fn extract_thinking(text: &str) -> Option<String> {
    THINK_FENCE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|body| body.as_str().trim().to_string())
}

pub fn has_thinking(text: &str) -> bool {
    text.contains(THINK_OPEN)
}

/// Render results as the single user message fed back to the backend.
pub fn format_tool_results(results: &[ToolResult]) -> String {
    results
        .iter()
        .map(|r| {
            let payload = serde_json::json!({ "name": r.tool_name, "result": r.result });
            format!("<tool_response>\n{payload}\n</tool_response>")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The tools section appended to a profile's system prompt.
pub fn format_tools_prompt(tools: &[ToolSpec]) -> String {
    if tools.is_empty() {
        return String::new();
    }

    let schemas = tools
        .iter()
        .map(|t| t.to_schema().to_string())
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "\n\n# Tools\n\n\
         You may call one or more functions to assist with the user query.\n\n\
         You are provided with function signatures within <tools></tools> XML tags:\n\
         <tools>\n{schemas}\n</tools>\n\n\
         For each function call, return a json object with function name and arguments \
         within <tool_call></tool_call> XML tags:\n\
         <tool_call>\n\
         {{\"name\": \"<function-name>\", \"arguments\": {{\"<arg1>\": \"<value1>\"}}}}\n\
         </tool_call>"
    )
}

pub fn build_system_prompt(profile: &Profile) -> String {
    format!("{}{}", profile.system_prompt, format_tools_prompt(&profile.tools))
}
