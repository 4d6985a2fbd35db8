//! `turnstile chat`: run one message through the conversation loop locally.
//!
//! Progress events go to stderr as they happen; the final answer goes to
//! stdout.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use turnstile_agent::{ConversationLoop, EventKind, GenerationEvent, ProfileCatalog};
use turnstile_config::AppConfig;
use turnstile_core::profile::truncate_chars;

const PREVIEW_CHARS: usize = 120;

pub async fn run(profile_name: &str, message: &str) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;

    let backend = turnstile_backends::build_from_config(&config.backend)
        .context("Failed to set up the backend")?;
    let registry = Arc::new(turnstile_tools::default_registry());
    let profiles = ProfileCatalog::from_config(&config.profiles, &registry);
    let profile = profiles.get(profile_name).with_context(|| {
        format!(
            "Unknown profile: {profile_name} (available: {})",
            profiles.names().join(", ")
        )
    })?;
    let agent = ConversationLoop::from_config(backend, registry, &config.agent);

    let (tx, mut rx) = mpsc::channel::<GenerationEvent>(config.agent.event_buffer.max(1));
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            eprintln!("  {}", describe(&event));
        }
    });

    let outcome = agent.run(&profile, &[], message, Some(&tx)).await;
    drop(tx);
    let _ = printer.await;

    let response = outcome.context("Conversation failed")?;
    println!("{}", response.content);
    if !response.finished {
        eprintln!(
            "  (stopped after {} rounds without a final answer)",
            response.rounds_used
        );
    }

    Ok(())
}

/// One-line rendering of a progress event.
fn describe(event: &GenerationEvent) -> String {
    match &event.kind {
        EventKind::RoundStart { round, max_rounds } => format!("[round {round}/{max_rounds}]"),
        EventKind::Generating { .. } => "generating...".into(),
        EventKind::Thinking { content, .. } => {
            format!("thinking: {}", truncate_chars(content, PREVIEW_CHARS))
        }
        EventKind::ToolStart {
            tool_name,
            tool_args,
            ..
        } => format!("-> {tool_name} {tool_args}"),
        EventKind::ToolEnd {
            tool_name,
            tool_result,
            ..
        } => format!("<- {tool_name} {}", truncate_chars(tool_result, PREVIEW_CHARS)),
        EventKind::Complete { .. } => "complete".into(),
        EventKind::Error { error } => format!("error: {error}"),
    }
}
