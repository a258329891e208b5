//! Onion user node.
//!
//! Sends messages through circuits of relays and receives deliveries from
//! exit relays.

#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use onion_common::config::check_public_bind_allowed;
use onion_common::{DirectoryClient, PortLayout};
use onion_core::{UserId, DEFAULT_CIRCUIT_LENGTH};
use onion_user::{SendSettings, UserNode, DEFAULT_SEND_ATTEMPTS};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "onion-user")]
#[command(about = "Onion user node - sends through circuits and receives deliveries")]
struct Args {
    /// User id, unique within the network
    #[arg(long, env = "ONION_USER_ID")]
    user_id: u32,

    /// HTTP listen address (defaults to base user port + user id)
    #[arg(long, env = "ONION_USER_LISTEN")]
    listen: Option<SocketAddr>,

    /// Directory URL (defaults to the registry port of the layout)
    #[arg(long, env = "ONION_REGISTRY_URL")]
    registry_url: Option<String>,

    /// Relays per circuit
    #[arg(long, env = "ONION_CIRCUIT_LENGTH", default_value_t = DEFAULT_CIRCUIT_LENGTH)]
    circuit_length: usize,

    /// Tries per message, each with a fresh circuit
    #[arg(long, env = "ONION_SEND_ATTEMPTS", default_value_t = DEFAULT_SEND_ATTEMPTS)]
    send_attempts: u32,

    /// How long to wait for the entry relay to accept an onion
    #[arg(long, env = "ONION_SEND_TIMEOUT_MS", default_value_t = 20_000)]
    send_timeout_ms: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    onion_common::init_tracing_with_default(&args.log_level);

    if args.circuit_length == 0 {
        bail!("--circuit-length must be at least 1");
    }

    let user_id = UserId(args.user_id);
    let layout = PortLayout::from_env()?;
    let listen = match args.listen {
        Some(addr) => addr,
        None => layout
            .user_addr(user_id)
            .ok_or_else(|| anyhow!("no user port for user {} in the port layout", user_id))?,
    };
    check_public_bind_allowed(listen)?;

    info!("Starting onion-user v{}", env!("CARGO_PKG_VERSION"));

    let registry_url = args.registry_url.unwrap_or_else(|| layout.registry_url());
    let node = Arc::new(UserNode::new(
        user_id,
        DirectoryClient::new(registry_url),
        Arc::new(layout),
        SendSettings {
            circuit_length: args.circuit_length,
            send_attempts: args.send_attempts,
            send_timeout: Duration::from_millis(args.send_timeout_ms),
        },
    ));

    let listener = TcpListener::bind(listen).await?;
    info!("User {} listening on {}", user_id, listener.local_addr()?);

    onion_user::serve(listener, node).await?;
    Ok(())
}
