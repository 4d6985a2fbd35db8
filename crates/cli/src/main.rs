//! Turnstile CLI, the main entry point.
//!
//! Commands:
//! - `serve`     Start the HTTP gateway
//! - `chat`      Run one conversation locally, printing progress
//! - `tools`     List registered tools
//! - `invoke`    Run one tool directly
//! - `profiles`  List agent profiles
//! - `status`    Show configuration and storage status

use clap::{Parser, Subcommand};
use turnstile_agent::DEFAULT_PROFILE;

mod commands;

#[derive(Parser)]
#[command(
    name = "turnstile",
    about = "Turnstile: tool-calling agent gateway with single-slot generation admission",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the bind host
        #[arg(long)]
        host: Option<String>,

        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send one message through the conversation loop
    Chat {
        /// Profile to run under
        #[arg(short, long, default_value = DEFAULT_PROFILE)]
        profile: String,

        /// The user message
        message: String,
    },

    /// List registered tools
    Tools,

    /// Invoke a tool directly, bypassing the conversation loop
    Invoke {
        /// Tool name
        name: String,

        /// Arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
    },

    /// List agent profiles
    Profiles,

    /// Show configuration and storage status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Serve { host, port } => commands::serve::run(host, port).await?,
        Commands::Chat { profile, message } => commands::chat::run(&profile, &message).await?,
        Commands::Tools => commands::tools::run()?,
        Commands::Invoke { name, args } => commands::invoke::run(&name, &args).await?,
        Commands::Profiles => commands::profiles::run()?,
        Commands::Status => commands::status::run()?,
    }

    Ok(())
}
