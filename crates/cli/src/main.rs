//! Driftline CLI — the REPL entry point.
//!
//! Loads configuration, wires the chat backend, search pipeline, memory, and
//! agent loop together, spawns the endpoint heartbeat, and hands control to
//! the interactive shell (or processes a single message and exits).

use std::time::Duration;

use clap::Parser;
use driftline_config::AppConfig;
use driftline_providers::run_heartbeat;

mod commands;
mod repl;
mod util;

#[derive(Parser)]
#[command(
    name = "driftline",
    about = "Driftline — a conversational terminal agent with live web search",
    version
)]
struct Cli {
    /// Process a single input and exit instead of entering the REPL
    #[arg(short, long)]
    message: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let session = repl::Session::build(&config);

    if config.heartbeat.enabled {
        tokio::spawn(run_heartbeat(
            config.chat.base_url.clone(),
            Duration::from_secs(config.heartbeat.interval_secs),
        ));
    }

    match cli.message {
        Some(input) => {
            commands::process_input(&session, input.trim()).await;
        }
        None => {
            repl::run(session, &config.chat.model, &config.chat.base_url).await?;
        }
    }

    Ok(())
}
