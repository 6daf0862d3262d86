//! status-watch - follow live service status from the command line
//!
//! Subscribes to one or more service status streams and prints every
//! status as it arrives, reconnecting on its own when the server drops.

mod config;
mod output;
mod watch;

use anyhow::{Context, Result};
use clap::Parser;
use status_stream::{ClientConfig, StatusClient};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{ArgOverrides, Config};
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "status-watch")]
#[command(author, version, about = "Follow live service status")]
struct Cli {
    /// Service identifier(s) to watch
    #[arg(required = true)]
    services: Vec<String>,

    /// Server URL
    #[arg(short, long, env = "STATUS_SERVER")]
    server: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "STATUS_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Give up after this many consecutive failed reconnects
    #[arg(long, value_name = "N")]
    max_retries: Option<u32>,

    /// Initial delay between reconnects, in milliseconds
    #[arg(long, value_name = "MS")]
    retry_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(&ArgOverrides {
        server: cli.server.as_deref(),
        format: cli.format,
        no_color: cli.no_color,
        max_retries: cli.max_retries,
        retry_ms: cli.retry_ms,
    });

    debug!("Using server {} with {:?}", merged.server, merged.client);

    let ctx = OutputContext::new(merged.format, merged.no_color, cli.quiet);
    let client = create_client(&merged.server, merged.client)?;

    watch::watch(&client, &cli.services, &ctx).await
}

/// Create a status client for the given server URL
fn create_client(server: &str, config: ClientConfig) -> Result<StatusClient> {
    StatusClient::with_config(server, config)
        .with_context(|| format!("Failed to create status client for {}", server))
}
