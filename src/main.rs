//! Multi-room Chat Server - Entry Point
//!
//! Loads configuration, starts the server and runs the admin console
//! until asked to stop.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_rooms::{console, listener, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "chat_rooms")]
#[command(about = "Multi-room line-based chat server", long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host address to bind the server to (overrides the config file)
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port number to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_rooms=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_rooms=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    // Failing to bind is fatal
    let handle = listener::start(config).await?;
    info!("Chat server ready on {}", handle.local_addr());

    console::run(&handle).await?;

    handle.stop().await?;
    info!("Exiting");

    Ok(())
}
