//! Built-in tool implementations for Turnstile.
//!
//! - `get_current_datetime`: current time with date-range hints
//! - `web_search`: DuckDuckGo instant answers, resolved on first use

pub mod datetime;
pub mod web_search;

use std::sync::Arc;

use turnstile_core::registry::{ToolImpl, ToolRegistry};

pub use datetime::CurrentDateTimeTool;
pub use web_search::WebSearchTool;

/// Create a registry holding every built-in tool.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register_blocking(Arc::new(CurrentDateTimeTool));
    registry.register_lazy(WebSearchTool::spec(), || {
        Ok(ToolImpl::Async(Arc::new(WebSearchTool::new()?)))
    });
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lists_builtins() {
        let registry = default_registry();
        assert_eq!(registry.names(), vec!["get_current_datetime", "web_search"]);
    }

    #[test]
    fn web_search_is_not_built_at_registration() {
        let registry = default_registry();
        assert!(registry.is_resolved("get_current_datetime"));
        assert!(!registry.is_resolved("web_search"));
        assert!(registry.spec("web_search").is_some());
    }

    #[tokio::test]
    async fn datetime_runs_through_registry() {
        let registry = default_registry();
        let output = registry
            .execute_async("get_current_datetime", Default::default())
            .await;
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert!(value["hints"]["last_7_days"].is_string());
    }

    #[test]
    fn web_search_requires_async_path() {
        let registry = default_registry();
        let output = registry.execute("web_search", Default::default());
        assert!(output.contains("execute_async"));
    }
}
