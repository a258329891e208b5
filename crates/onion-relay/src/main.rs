//! Onion relay node.
//!
//! Generates its key pair locally, publishes the public half to the
//! directory and then serves forwarding requests. The private key never
//! leaves the process.

#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use onion_common::config::check_public_bind_allowed;
use onion_common::{DirectoryClient, PortLayout};
use onion_core::NodeId;
use onion_crypto::RelayKeypair;
use onion_relay::{register_with_retry, RelayNode, RetryPolicy};
use tokio::net::TcpListener;
use tracing::info;

const DEFAULT_FORWARD_TIMEOUT_MS: u64 = 5_000;

#[derive(Parser, Debug)]
#[command(name = "onion-relay")]
#[command(about = "Onion relay node - peels one layer and forwards the remainder")]
struct Args {
    /// Relay id, unique within the network
    #[arg(long, env = "ONION_NODE_ID")]
    node_id: u32,

    /// HTTP listen address (defaults to base relay port + node id)
    #[arg(long, env = "ONION_RELAY_LISTEN")]
    listen: Option<SocketAddr>,

    /// Directory URL (defaults to the registry port of the layout)
    #[arg(long, env = "ONION_REGISTRY_URL")]
    registry_url: Option<String>,

    /// Timeout for handing an envelope to the next hop
    #[arg(long, env = "ONION_FORWARD_TIMEOUT_MS", default_value_t = DEFAULT_FORWARD_TIMEOUT_MS)]
    forward_timeout_ms: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    onion_common::init_tracing_with_default(&args.log_level);

    let node_id = NodeId(args.node_id);
    let layout = PortLayout::from_env()?;
    let listen = match args.listen {
        Some(addr) => addr,
        None => layout
            .relay_addr(node_id)
            .ok_or_else(|| anyhow!("no relay port for node {} in the port layout", node_id))?,
    };
    check_public_bind_allowed(listen)?;

    info!("Starting onion-relay v{}", env!("CARGO_PKG_VERSION"));
    info!("Relay ID: {}", node_id);

    // Key generation failure means no usable entropy; nothing to retry
    let keypair = tokio::task::spawn_blocking(RelayKeypair::generate).await??;

    let node = Arc::new(RelayNode::new(
        node_id,
        keypair,
        Arc::new(layout),
        Duration::from_millis(args.forward_timeout_ms),
    ));

    let listener = TcpListener::bind(listen).await?;
    info!("Relay listening on {}", listener.local_addr()?);

    let registry_url = args.registry_url.unwrap_or_else(|| layout.registry_url());
    let directory = DirectoryClient::new(registry_url);
    register_with_retry(&directory, &node.node_entry()?, RetryPolicy::default()).await?;

    onion_relay::serve(listener, node).await?;
    Ok(())
}
