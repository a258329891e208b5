//! Start a whole network in one process.
//!
//! Directory first, then relays `0..relays` (each registers itself), then
//! users `0..users`, all at the addresses given by the port layout.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use onion_common::{DirectoryClient, PortLayout};
use onion_core::{NodeId, UserId};
use onion_crypto::RelayKeypair;
use onion_directory::Registry;
use onion_relay::{register_with_retry, RelayNode, RetryPolicy};
use onion_user::{SendSettings, UserNode};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{error, info};

/// Retry schedule while the in-process directory comes up.
const LAUNCH_RETRY: RetryPolicy = RetryPolicy {
    initial_delay: Duration::from_millis(100),
    max_delay: Duration::from_secs(1),
    max_attempts: Some(10),
};

#[derive(Debug, Clone, Copy)]
pub struct LaunchOptions {
    pub relays: u32,
    pub users: u32,
    pub forward_timeout: Duration,
    pub send: SendSettings,
}

/// Run until Ctrl-C or until any service stops.
pub async fn launch(layout: PortLayout, opts: LaunchOptions) -> Result<()> {
    let mut services = JoinSet::new();

    let listener = TcpListener::bind(layout.registry_addr())
        .await
        .with_context(|| format!("binding directory on {}", layout.registry_addr()))?;
    info!("Directory listening on {}", layout.registry_addr());
    services.spawn(onion_directory::serve(listener, Arc::new(Registry::new())));

    let directory = DirectoryClient::new(layout.registry_url());
    let resolver = Arc::new(layout);

    for id in 0..opts.relays {
        let node_id = NodeId(id);
        let addr = layout
            .relay_addr(node_id)
            .ok_or_else(|| anyhow!("no relay port for node {}", node_id))?;

        let keypair = tokio::task::spawn_blocking(RelayKeypair::generate).await??;
        let node = Arc::new(RelayNode::new(
            node_id,
            keypair,
            resolver.clone(),
            opts.forward_timeout,
        ));

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding relay {} on {}", node_id, addr))?;
        register_with_retry(&directory, &node.node_entry()?, LAUNCH_RETRY).await?;
        info!("Relay {} listening on {}", node_id, addr);
        services.spawn(onion_relay::serve(listener, node));
    }

    for id in 0..opts.users {
        let user_id = UserId(id);
        let addr = layout
            .user_addr(user_id)
            .ok_or_else(|| anyhow!("no user port for user {}", user_id))?;

        let node = Arc::new(UserNode::new(
            user_id,
            DirectoryClient::new(layout.registry_url()),
            resolver.clone(),
            opts.send,
        ));

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding user {} on {}", user_id, addr))?;
        info!("User {} listening on {}", user_id, addr);
        services.spawn(onion_user::serve(listener, node));
    }

    info!(
        "Network up: {} relays, {} users, directory at {}",
        opts.relays,
        opts.users,
        layout.registry_url()
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
        Some(done) = services.join_next() => {
            match done {
                Ok(Ok(())) => Err(anyhow!("a service stopped unexpectedly")),
                Ok(Err(e)) => {
                    error!("service failed: {}", e);
                    Err(e.into())
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}
