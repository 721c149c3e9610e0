#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use roomwarden::config::Config;
use roomwarden::gateway::GatewayClient;
use roomwarden::moderation::{ModerationEngine, PolicyClassifier};
use roomwarden::providers;
use std::path::PathBuf;
use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

/// Adaptive long-poll chat room moderator: classify, redact, warn, ban.
#[derive(Parser, Debug)]
#[command(name = "roomwarden")]
#[command(version)]
#[command(about = "Watches one chat room and enforces its content policy", long_about = None)]
struct Cli {
    /// Path to the config file (default: ~/.roomwarden/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start moderating the configured room
    Run,
    /// List rooms the session has joined
    Rooms,
    /// Show recent messages from the configured room
    Messages,
    /// Send a message to the configured room
    Send {
        /// Message text
        text: String,
    },
    /// Check gateway liveness and show the active configuration
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.clone())?;

    match cli.command {
        Commands::Run => run_moderator(config).await,
        Commands::Rooms => list_rooms(config).await,
        Commands::Messages => show_messages(config).await,
        Commands::Send { text } => send_message(config, &text).await,
        Commands::Status => show_status(config).await,
    }
}

/// A gateway client with a live session, running the SSO bootstrap if
/// needed (the operator completes it in a browser).
async fn logged_in_client(config: &Config) -> Result<GatewayClient> {
    let mut gateway = GatewayClient::new(config.gateway.base_url.clone());
    gateway.ensure_session().await?;
    Ok(gateway)
}

async fn run_moderator(config: Config) -> Result<()> {
    let gateway = logged_in_client(&config).await?;
    let provider = providers::create_provider(&config)?;
    let classifier = PolicyClassifier::new(provider, config.model.clone(), config.temperature);

    let cancel = CancellationToken::new();
    spawn_cancel_listeners(cancel.clone());
    println!("Press 'q' then Enter at any time to stop moderation.");

    let mut engine =
        ModerationEngine::new(gateway, classifier, config.gateway.room_id.clone(), cancel);
    engine.run().await
}

/// Two ways to stop: 'q' + Enter on stdin, or Ctrl+C. Both signal the same
/// cancellation token; the loop exits at its next suspension point.
fn spawn_cancel_listeners(cancel: CancellationToken) {
    let stdin_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().eq_ignore_ascii_case("q") {
                tracing::info!("received 'q'; stopping moderation");
                stdin_cancel.cancel();
                break;
            }
        }
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received Ctrl+C; stopping moderation");
            cancel.cancel();
        }
    });
}

async fn list_rooms(config: Config) -> Result<()> {
    let gateway = logged_in_client(&config).await?;
    if let Err(err) = gateway.sync().await {
        tracing::warn!("gateway sync failed ({err}); room list may be stale");
    }
    let rooms = gateway.list_rooms().await?;
    if rooms.is_empty() {
        println!("Not a member of any rooms.");
        return Ok(());
    }
    println!("Joined {} rooms:", rooms.len());
    for room in rooms {
        println!(
            "  {}  {}",
            room.room_id,
            room.name.as_deref().unwrap_or("(unnamed)")
        );
    }
    Ok(())
}

async fn show_messages(config: Config) -> Result<()> {
    let gateway = logged_in_client(&config).await?;
    let messages = gateway.recent_messages(&config.gateway.room_id).await?;
    if messages.is_empty() {
        println!("No messages in {}.", config.gateway.room_id);
        return Ok(());
    }
    for message in messages {
        println!("  {}: {}", message.sender, message.body);
    }
    Ok(())
}

async fn send_message(config: Config, text: &str) -> Result<()> {
    let gateway = logged_in_client(&config).await?;
    let event_id = gateway
        .send_message(&config.gateway.room_id, text)
        .await?;
    println!("Sent to {}. Event id: {event_id}", config.gateway.room_id);
    Ok(())
}

async fn show_status(config: Config) -> Result<()> {
    let gateway = GatewayClient::new(config.gateway.base_url.clone());
    match gateway.gateway_status().await {
        Ok(status) => println!("Gateway at {}: {status}", config.gateway.base_url),
        Err(err) => println!("Gateway at {} unreachable: {err}", config.gateway.base_url),
    }
    println!("Room:  {}", config.gateway.room_id);
    println!("Model: {}", config.model);
    Ok(())
}
