//! JSON bodies exchanged between the services.
//!
//! Field names are camelCase on the wire (`nodeId`, `pubKey`,
//! `destinationUserId`).

use onion_core::{NextHop, NodeId, RelayDescriptor, UserId};
use onion_crypto::{CryptoError, RelayPublicKey};
use serde::{Deserialize, Serialize};

/// A directory entry: relay id and its published public key.
///
/// Unknown fields (such as a `prvKey` sent by an old relay) are ignored
/// and never stored.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeEntry {
    pub node_id: NodeId,
    /// Base64 SubjectPublicKeyInfo DER.
    pub pub_key: String,
}

impl NodeEntry {
    /// Decode the published key for circuit building.
    pub fn to_descriptor(&self) -> Result<RelayDescriptor, CryptoError> {
        Ok(RelayDescriptor {
            node_id: self.node_id,
            public_key: RelayPublicKey::from_encoded(&self.pub_key)?,
        })
    }
}

/// Body of `POST /registerNode`.
pub type RegisterNodeRequest = NodeEntry;

/// Body of `GET /getNodeRegistry`.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct NodeRegistryResponse {
    pub nodes: Vec<NodeEntry>,
}

/// Body of `POST /message`.
///
/// For a relay, `message` is a base64 onion envelope. For a user, it is the
/// delivered plaintext.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MessageRequest {
    pub message: String,
}

/// Body of `POST /sendMessage`.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub message: String,
    pub destination_user_id: UserId,
}

/// Successful `POST /sendMessage` answer.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SendMessageResponse {
    /// Relays the onion traversed, entry first.
    pub circuit: Vec<NodeId>,
}

/// Wrapper used by every read-only debug endpoint.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ResultResponse<T> {
    pub result: Option<T>,
}

impl<T> ResultResponse<T> {
    pub fn new(result: Option<T>) -> Self {
        Self { result }
    }
}

/// Error body returned by every service.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(code: &str, error: impl std::fmt::Display) -> Self {
        Self {
            error: error.to_string(),
            code: code.to_string(),
        }
    }
}

/// `GET /stats` on a relay.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatsResponse {
    pub node_id: NodeId,
    pub in_flight: usize,
    pub forwarded: u64,
    pub delivered: u64,
    pub rejected: u64,
}

/// Last forwarding destination as exposed by a relay's debug endpoint.
pub type LastDestination = ResultResponse<NextHop>;
