//! `turnstile status`: show configuration and storage status.

use anyhow::Context;
use turnstile_config::AppConfig;
use turnstile_sessions::SessionStore;

pub fn run() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let store = SessionStore::open(&config.sessions.data_dir).context("Failed to open session store")?;
    let sessions = store
        .list_summaries(usize::MAX)
        .context("Failed to list sessions")?;

    println!("Turnstile Status");
    println!("================");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Backend:      {}", config.backend.kind);
    println!("  Model:        {}", config.backend.model);
    if let Some(url) = &config.backend.api_url {
        println!("  Backend URL:  {url}");
    }
    println!("  Gateway:      {}:{}", config.gateway.host, config.gateway.port);
    println!("  Timeout:      {}s (wait + generation)", config.gateway.request_timeout_secs);
    println!("  Data dir:     {}", config.sessions.data_dir.display());
    println!("  Sessions:     {}", sessions.len());
    println!("  Profiles:     {} configured", config.profiles.len());

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  Config file found");
    } else {
        println!("\n  No config file, using defaults. Example:\n");
        println!("{}", AppConfig::default_toml());
    }

    Ok(())
}
