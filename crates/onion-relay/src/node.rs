//! Decrypt-and-forward.

use std::sync::Arc;
use std::time::Duration;

use onion_common::{HopClient, HopResolver, NodeEntry};
use onion_core::{peel, Envelope, LayerError, NextHop, NodeId};
use onion_crypto::{encode, CryptoError, RelayKeypair, RelayPublicKey};
use thiserror::Error;
use tracing::{debug, warn};

use crate::state::{ForwardJob, Observations, RelayPhase, RelayStats};

/// Why an envelope was not passed on.
///
/// The first three are the sender's fault (400); the rest concern the next
/// hop (502). None of them are retried here.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("envelope is not valid transport text: {0}")]
    Encoding(#[source] CryptoError),

    #[error("layer could not be removed: {0}")]
    LayerDecryption(#[source] LayerError),

    #[error("malformed layer: {0}")]
    Malformed(String),

    #[error("no address known for {0}")]
    UnknownHop(NextHop),

    #[error("{0} did not answer in time")]
    Timeout(NextHop),

    #[error("{0} is unreachable")]
    Unreachable(NextHop),

    #[error("{hop} refused the message: {reason}")]
    Downstream { hop: NextHop, reason: String },
}

impl ForwardError {
    fn from_layer(err: LayerError) -> Self {
        match err {
            // Authenticated but unparseable: the sender built a bad layer
            LayerError::InvalidMagic(..)
            | LayerError::UnsupportedVersion(..)
            | LayerError::UnknownHopKind(_) => Self::Malformed(err.to_string()),
            other => Self::LayerDecryption(other),
        }
    }

    fn from_downstream(hop: NextHop, err: onion_common::Error) -> Self {
        match err {
            onion_common::Error::Timeout(_) => Self::Timeout(hop),
            onion_common::Error::Unreachable(_) => Self::Unreachable(hop),
            other => Self::Downstream {
                hop,
                reason: other.to_string(),
            },
        }
    }

    /// Whether the envelope itself was at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Encoding(_) | Self::LayerDecryption(_) | Self::Malformed(_)
        )
    }
}

/// A relay: its key pair, where to send things, and what it last saw.
pub struct RelayNode {
    node_id: NodeId,
    keypair: RelayKeypair,
    resolver: Arc<dyn HopResolver>,
    hop_client: HopClient,
    observations: Observations,
    stats: RelayStats,
}

impl RelayNode {
    pub fn new(
        node_id: NodeId,
        keypair: RelayKeypair,
        resolver: Arc<dyn HopResolver>,
        forward_timeout: Duration,
    ) -> Self {
        Self {
            node_id,
            keypair,
            resolver,
            hop_client: HopClient::new(forward_timeout),
            observations: Observations::default(),
            stats: RelayStats::default(),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn public_key(&self) -> &RelayPublicKey {
        self.keypair.public_key()
    }

    /// Directory entry advertising this relay.
    pub fn node_entry(&self) -> Result<NodeEntry, CryptoError> {
        Ok(NodeEntry {
            node_id: self.node_id,
            pub_key: self.public_key().to_encoded()?,
        })
    }

    pub fn observations(&self) -> &Observations {
        &self.observations
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Remove this relay's layer from `message` and hand the remainder to
    /// the next hop, waiting for that hop's answer.
    ///
    /// Returns where the remainder went.
    pub async fn handle_message(&self, message: &str) -> Result<NextHop, ForwardError> {
        let _in_flight = self.stats.begin();
        let mut job = ForwardJob::new(self.node_id);
        job.advance(RelayPhase::Receiving);

        let result = self.process(&mut job, message).await;
        match &result {
            Ok(hop) if hop.is_exit() => self.stats.record_delivered(),
            Ok(_) => self.stats.record_forwarded(),
            Err(e) => {
                self.stats.record_rejected();
                warn!("relay {} rejected envelope: {}", self.node_id, e);
            }
        }

        job.finish();
        result
    }

    async fn process(&self, job: &mut ForwardJob, message: &str) -> Result<NextHop, ForwardError> {
        self.observations.record_envelope(message).await;
        let envelope = Envelope::from_encoded(message).map_err(ForwardError::Encoding)?;

        job.advance(RelayPhase::Unwrapping);
        let peeled = peel(&self.keypair, envelope.as_bytes()).map_err(ForwardError::from_layer)?;
        let next_hop = peeled.next_hop;

        let outbound = match next_hop {
            NextHop::Relay(_) => {
                job.advance(RelayPhase::Forwarding);
                encode(&peeled.remainder)
            }
            NextHop::User(_) => {
                job.advance(RelayPhase::Delivering);
                String::from_utf8(peeled.remainder)
                    .map_err(|_| ForwardError::Malformed("exit payload is not UTF-8".into()))?
            }
        };
        self.observations.record_peeled(&outbound, next_hop).await;

        let url = self
            .resolver
            .hop_url(next_hop)
            .ok_or(ForwardError::UnknownHop(next_hop))?;

        debug!("relay {} -> {} at {}", self.node_id, next_hop, url);
        self.hop_client
            .post_message(&url, outbound)
            .await
            .map_err(|e| ForwardError::from_downstream(next_hop, e))?;

        Ok(next_hop)
    }
}

impl std::fmt::Debug for RelayNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayNode")
            .field("node_id", &self.node_id)
            .field("hop_timeout", &self.hop_client.timeout())
            .finish_non_exhaustive()
    }
}
