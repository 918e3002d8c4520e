//! Thinkstream - Headless Terminal Chat Client
//!
//! Sends each line typed on stdin as a chat message and prints the answer,
//! preceded by the thinking timeline when the backend used tools or deep
//! thinking.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (http://localhost:3001, ws://localhost:3001)
//! thinkstream
//!
//! # Custom endpoints
//! thinkstream --api-url http://10.0.0.5:3001 --ws-url ws://10.0.0.5:3001
//!
//! # Continue a conversation, print sessions as JSON lines
//! thinkstream --session 6f1c... --json
//!
//! # Verbose logging (goes to stderr)
//! RUST_LOG=thinkstream_core=debug thinkstream
//! ```

mod render;
mod repl;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use thinkstream_core::config::{load_config, load_config_from_path, ClientConfig, ConfigOverrides};
use thinkstream_core::ChatClient;

use render::RenderOptions;

/// Thinkstream - chat client with live thinking timelines
#[derive(Parser, Debug)]
#[command(name = "thinkstream")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "THINKSTREAM_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Chat API base URL
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Push channel WebSocket URL
    #[arg(long, value_name = "URL")]
    ws_url: Option<String>,

    /// Continue an existing server-side conversation
    #[arg(short = 's', long, value_name = "ID")]
    session: Option<String>,

    /// Always show thinking timelines unfolded
    #[arg(short = 'e', long)]
    expand: bool,

    /// Print each finalized session as a JSON line
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "THINKSTREAM_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

/// Initialize logging to stderr so it never interleaves with the transcript
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("thinkstream={level},thinkstream_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve configuration: defaults, file, environment, then CLI flags
fn resolve_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => load_config_from_path(Some(path.clone()))
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => load_config().context("Failed to load config")?,
    };

    let mut overrides = ConfigOverrides::new();
    if let Some(url) = &args.api_url {
        overrides = overrides.with_api_base_url(url.clone());
    }
    if let Some(url) = &args.ws_url {
        overrides = overrides.with_endpoint(url.clone());
    }
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = resolve_config(&args)?;
    info!(
        api = %config.api_base_url,
        push = %config.transport.endpoint,
        source = %config.source(),
        "Configuration resolved"
    );

    let (client, outputs) = ChatClient::connect(&config).context("Failed to start chat client")?;
    if let Some(conversation) = &args.session {
        client.resume_conversation(conversation.clone());
    }

    let options = RenderOptions {
        expand: args.expand,
        json: args.json,
    };
    repl::run(client, outputs, options).await
}
