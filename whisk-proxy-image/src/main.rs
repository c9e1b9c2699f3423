//! Whisk Proxy MCP Server
//!
//! MCP server for image generation through Google Whisk. Starts the local
//! token relay alongside the MCP transport so the browser extension can
//! deliver a token while the server runs.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use whisk_proxy_common::tracing::init_tracing;
use whisk_proxy_common::{AuthRelay, Config, McpServerBuilder, RelayState, TokenStore, TransportArgs};
use whisk_proxy_image::{WhiskHandler, WhiskServer};

/// Command-line arguments for the MCP server.
#[derive(Parser, Debug)]
#[command(name = "whisk-proxy-mcp")]
#[command(about = "MCP server for image generation through Google Whisk")]
struct Args {
    /// Transport configuration
    #[command(flatten)]
    transport: TransportArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    tracing::info!("whisk-proxy-mcp server starting...");

    let args = Args::parse();

    let config = Config::from_env()?;
    tracing::info!(
        home = %config.home_dir.display(),
        auth_port = config.auth_port,
        "Configuration loaded"
    );

    let store = Arc::new(TokenStore::from_config(&config));

    // The server still works without the relay if a token file already exists.
    let relay = match AuthRelay::new(config.auth_port, store.clone()).start().await {
        Ok(relay) => Some(relay),
        Err(e) => {
            tracing::warn!("Token relay unavailable: {}", e);
            None
        }
    };
    if let Some(RelayState::AlreadyRunning) = relay {
        tracing::info!(port = config.auth_port, "Using the token relay of another process");
    }

    let server = WhiskServer::new(WhiskHandler::new(config), store);

    let transport = args.transport.into_transport();
    let result = McpServerBuilder::new(server).with_transport(transport).run().await;

    if let Some(relay) = relay {
        if let Err(e) = relay.stop().await {
            tracing::warn!("Failed to stop token relay: {}", e);
        }
    }

    result?;
    tracing::info!("Server stopped");
    Ok(())
}
