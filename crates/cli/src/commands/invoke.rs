//! `turnstile invoke`: run one tool directly.

use anyhow::{Context, bail};
use turnstile_core::tool::ToolArguments;

pub async fn run(name: &str, args: &str) -> anyhow::Result<()> {
    let registry = turnstile_tools::default_registry();
    if !registry.contains(name) {
        bail!(
            "Unknown tool: {name} (available: {})",
            registry.names().join(", ")
        );
    }

    let arguments = parse_args(args)?;
    let raw = registry.execute_async(name, arguments).await;
    println!("{}", render_result(&raw));
    Ok(())
}

fn parse_args(args: &str) -> anyhow::Result<ToolArguments> {
    serde_json::from_str(args).context("--args must be a JSON object")
}

/// Pretty-print JSON results; anything else is shown as-is.
fn render_result(raw: &str) -> String {
    serde_json::from_str::<serde_json::Value>(raw)
        .and_then(|value| serde_json::to_string_pretty(&value))
        .unwrap_or_else(|_| raw.to_string())
}
