//! Core onion protocol.
//!
//! Construction and peeling are mirror images:
//!
//! - [`onion::wrap`] builds layers from the exit hop outward, so that
//! - [`layer::peel`] run by each relay in circuit order removes exactly one
//!   layer and learns only the next hop.
//!
//! Nothing in this crate touches the network.

#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod circuit;
pub mod layer;
pub mod onion;

pub use circuit::{build_circuit, Circuit, CircuitError, RelayDescriptor, DEFAULT_CIRCUIT_LENGTH};
pub use layer::{peel, seal, LayerError, PeeledLayer, ROUTING_HEADER_SIZE};
pub use onion::{wrap, Envelope};

/// Relay identifier, unique within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message destination (end user) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u32);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Routing field carried inside every layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum NextHop {
    /// Forward the remainder to another relay.
    Relay(NodeId),
    /// The remainder is plaintext for this destination.
    User(UserId),
}

impl NextHop {
    pub fn is_exit(&self) -> bool {
        matches!(self, NextHop::User(_))
    }
}

impl fmt::Display for NextHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextHop::Relay(id) => write!(f, "relay {}", id),
            NextHop::User(id) => write!(f, "user {}", id),
        }
    }
}
