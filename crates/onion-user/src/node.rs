//! Sending side: circuit selection, wrapping and hand-off to the entry relay.
//! Receiving side: a one-slot mailbox.

use std::sync::Arc;
use std::time::Duration;

use onion_common::{DirectoryClient, HopClient, HopResolver};
use onion_core::{
    build_circuit, wrap, CircuitError, LayerError, NodeId, RelayDescriptor, UserId,
    DEFAULT_CIRCUIT_LENGTH,
};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const DEFAULT_SEND_ATTEMPTS: u32 = 2;
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum SendError {
    #[error("directory unavailable: {0}")]
    Directory(#[source] onion_common::Error),

    #[error("cannot build circuit: {0}")]
    Circuit(#[from] CircuitError),

    #[error("cannot wrap message: {0}")]
    Wrap(#[from] LayerError),

    #[error("message to user {destination} was not delivered: {reason}")]
    Undeliverable { destination: UserId, reason: String },
}

/// Tunables for [`UserNode::send_message`].
#[derive(Debug, Clone, Copy)]
pub struct SendSettings {
    pub circuit_length: usize,
    /// Total tries, each with a fresh circuit and a fresh onion.
    pub send_attempts: u32,
    /// Wait for the entry relay, which answers only after the whole chain did.
    pub send_timeout: Duration,
}

impl Default for SendSettings {
    fn default() -> Self {
        Self {
            circuit_length: DEFAULT_CIRCUIT_LENGTH,
            send_attempts: DEFAULT_SEND_ATTEMPTS,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

/// Whether another circuit might get through.
fn worth_retrying(err: &onion_common::Error) -> bool {
    err.is_transient() || matches!(err, onion_common::Error::Rejected { status: 502, .. })
}

pub struct UserNode {
    user_id: UserId,
    directory: DirectoryClient,
    hop_client: HopClient,
    resolver: Arc<dyn HopResolver>,
    settings: SendSettings,
    last_received: RwLock<Option<String>>,
    last_sent: RwLock<Option<String>>,
    last_circuit: RwLock<Option<Vec<NodeId>>>,
}

impl UserNode {
    pub fn new(
        user_id: UserId,
        directory: DirectoryClient,
        resolver: Arc<dyn HopResolver>,
        settings: SendSettings,
    ) -> Self {
        Self {
            user_id,
            directory,
            hop_client: HopClient::new(settings.send_timeout),
            resolver,
            settings,
            last_received: RwLock::new(None),
            last_sent: RwLock::new(None),
            last_circuit: RwLock::new(None),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn settings(&self) -> SendSettings {
        self.settings
    }

    /// Relays currently usable for a circuit. Entries with an undecodable
    /// key are skipped.
    async fn snapshot(&self) -> Result<Vec<RelayDescriptor>, SendError> {
        let entries = self
            .directory
            .list_nodes()
            .await
            .map_err(SendError::Directory)?;

        let mut relays = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.to_descriptor() {
                Ok(descriptor) => relays.push(descriptor),
                Err(e) => warn!("skipping node {}: {}", entry.node_id, e),
            }
        }
        Ok(relays)
    }

    /// Send `message` to `destination` through a freshly built circuit.
    ///
    /// Returns the circuit used, entry first.
    pub async fn send_message(
        &self,
        destination: UserId,
        message: &str,
    ) -> Result<Vec<NodeId>, SendError> {
        let attempts = self.settings.send_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let relays = self.snapshot().await?;
            let circuit = build_circuit(&relays, self.settings.circuit_length)?;
            let envelope = wrap(&circuit, destination, message.as_bytes())?;
            let path = circuit.node_ids();
            *self.last_circuit.write().await = Some(path.clone());

            let entry = circuit.entry().node_id;
            let url = self.resolver.relay_url(entry).ok_or_else(|| {
                SendError::Undeliverable {
                    destination,
                    reason: format!("no address known for entry relay {}", entry),
                }
            })?;

            debug!(
                "user {} sending {} bytes to user {} via {:?}",
                self.user_id,
                envelope.len(),
                destination,
                path
            );

            match self.hop_client.post_message(&url, envelope.to_encoded()).await {
                Ok(()) => {
                    *self.last_sent.write().await = Some(message.to_string());
                    info!(
                        "user {} delivered message to user {} via {:?}",
                        self.user_id, destination, path
                    );
                    return Ok(path);
                }
                Err(e) if worth_retrying(&e) && attempt < attempts => {
                    warn!(
                        "attempt {}/{} via {:?} failed: {}; rebuilding circuit",
                        attempt, attempts, path, e
                    );
                }
                Err(e) => {
                    return Err(SendError::Undeliverable {
                        destination,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    /// Mailbox: keep the latest delivered plaintext.
    pub async fn receive(&self, message: String) {
        info!("user {} received a message ({} bytes)", self.user_id, message.len());
        *self.last_received.write().await = Some(message);
    }

    pub async fn last_received(&self) -> Option<String> {
        self.last_received.read().await.clone()
    }

    pub async fn last_sent(&self) -> Option<String> {
        self.last_sent.read().await.clone()
    }

    pub async fn last_circuit(&self) -> Option<Vec<NodeId>> {
        self.last_circuit.read().await.clone()
    }
}

impl std::fmt::Debug for UserNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserNode")
            .field("user_id", &self.user_id)
            .field("directory", &self.directory.base_url())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
