//! Web search via the DuckDuckGo Instant Answer API.
//!
//! The HTTP client is built on first use, so registering this tool costs
//! nothing for profiles that never search.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;
use turnstile_core::error::ToolError;
use turnstile_core::profile::truncate_chars;
use turnstile_core::tool::{Tool, ToolArguments, ToolSpec};

const NAME: &str = "web_search";
const DESCRIPTION: &str = "Search the web for current information. Returns titles, URLs, and \
                           snippets for the top results.";
const ENDPOINT: &str = "https://api.duckduckgo.com/";
const DEFAULT_RESULTS: usize = 5;
const MAX_RESULTS: usize = 10;
const SNIPPET_CHARS: usize = 200;

pub struct WebSearchTool {
    client: reqwest::Client,
    endpoint: String,
}

impl WebSearchTool {
    pub fn new() -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("turnstile/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ToolError::Unavailable {
                tool_name: NAME.into(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint: ENDPOINT.into(),
        })
    }

    /// Schema for registration, available without building a client.
    pub fn spec() -> ToolSpec {
        ToolSpec::new(NAME, DESCRIPTION, schema())
    }
}

fn schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "The search query"
            },
            "num_results": {
                "type": "integer",
                "description": "Number of results to return (default 5, max 10)",
                "default": DEFAULT_RESULTS
            }
        },
        "required": ["query"]
    })
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn parameters_schema(&self) -> serde_json::Value {
        schema()
    }

    async fn execute(&self, arguments: ToolArguments) -> Result<String, ToolError> {
        let query = arguments
            .get("query")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let limit = arguments
            .get("num_results")
            .and_then(|v| v.as_u64())
            .map_or(DEFAULT_RESULTS, |n| n as usize)
            .clamp(1, MAX_RESULTS);

        debug!(query, limit, "Running web search");

        let body: serde_json::Value = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ToolError::ExecutionFailed(format!("Search request failed: {e}")))?
            .json()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("Invalid search response: {e}")))?;

        let results = collect_results(&body, limit);
        let output = if results.is_empty() {
            serde_json::json!({ "status": "no_results", "query": query })
        } else {
            serde_json::json!({ "status": "success", "results": results })
        };
        Ok(output.to_string())
    }
}

#[derive(Debug, Serialize)]
struct SearchResult {
    title: String,
    url: String,
    snippet: String,
}

/// Flatten an Instant Answer payload: the abstract first, then related
/// topics (including those nested under category headings).
fn collect_results(body: &serde_json::Value, limit: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    let abstract_text = body["AbstractText"].as_str().unwrap_or_default();
    let abstract_url = body["AbstractURL"].as_str().unwrap_or_default();
    if !abstract_text.is_empty() && !abstract_url.is_empty() {
        results.push(SearchResult {
            title: body["Heading"].as_str().unwrap_or(abstract_url).to_string(),
            url: abstract_url.to_string(),
            snippet: truncate_chars(abstract_text, SNIPPET_CHARS),
        });
    }

    let mut topics: Vec<&serde_json::Value> = Vec::new();
    for topic in body["RelatedTopics"].as_array().into_iter().flatten() {
        match topic["Topics"].as_array() {
            Some(nested) => topics.extend(nested),
            None => topics.push(topic),
        }
    }

    for topic in topics {
        if results.len() >= limit {
            break;
        }
        let (Some(text), Some(url)) = (topic["Text"].as_str(), topic["FirstURL"].as_str()) else {
            continue;
        };
        let title = text.split(" - ").next().unwrap_or(text);
        results.push(SearchResult {
            title: title.to_string(),
            url: url.to_string(),
            snippet: truncate_chars(text, SNIPPET_CHARS),
        });
    }

    results.truncate(limit);
    results
}
