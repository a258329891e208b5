//! Onion directory server.
//!
//! Holds the in-memory registry of relay public keys for a single run.

#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use onion_common::config::check_public_bind_allowed;
use onion_common::PortLayout;
use onion_directory::Registry;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "onion-directory")]
#[command(about = "Onion directory - registry of relay public keys")]
struct Args {
    /// HTTP listen address (defaults to the registry port of the layout)
    #[arg(long, env = "ONION_DIRECTORY_LISTEN")]
    listen: Option<SocketAddr>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    onion_common::init_tracing_with_default(&args.log_level);

    let listen = match args.listen {
        Some(addr) => addr,
        None => PortLayout::from_env()?.registry_addr(),
    };
    check_public_bind_allowed(listen)?;

    info!("Starting onion-directory v{}", env!("CARGO_PKG_VERSION"));

    let listener = TcpListener::bind(listen).await?;
    info!("Directory listening on {}", listener.local_addr()?);

    onion_directory::serve(listener, Arc::new(Registry::new())).await?;
    Ok(())
}
