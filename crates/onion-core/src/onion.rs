//! Onion construction.

use onion_crypto::{decode, encode, CryptoError};

use crate::circuit::Circuit;
use crate::layer::{seal, LayerError};
use crate::{NextHop, UserId};

/// A complete onion, ready for the entry relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope(Vec<u8>);

impl Envelope {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Parse transport text.
    pub fn from_encoded(text: &str) -> Result<Self, CryptoError> {
        decode(text).map(Self)
    }

    /// Transport text, as carried in a relay's `message` field.
    pub fn to_encoded(&self) -> String {
        encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Wrap `plaintext` for delivery to `destination` through `circuit`.
///
/// Layers are built innermost first: the exit relay's layer routes to the
/// destination, and every outer layer routes to the hop after it. Each
/// layer uses its own freshly generated symmetric key.
pub fn wrap(circuit: &Circuit, destination: UserId, plaintext: &[u8]) -> Result<Envelope, LayerError> {
    let mut remainder = plaintext.to_vec();
    let mut next_hop = NextHop::User(destination);

    for hop in circuit.hops().iter().rev() {
        remainder = seal(&hop.public_key, next_hop, &remainder)?;
        next_hop = NextHop::Relay(hop.node_id);
    }

    Ok(Envelope(remainder))
}
