//! `turnstile serve`: start the HTTP gateway.

use anyhow::Context;
use turnstile_config::AppConfig;

pub async fn run(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("Failed to load config")?;

    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }

    println!("Turnstile Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Backend:   {} ({})", config.backend.kind, config.backend.model);
    println!("   Sessions:  {}", config.sessions.data_dir.display());

    turnstile_gateway::start(config)
        .await
        .context("Gateway stopped with an error")?;

    Ok(())
}
