//! Onion layer framing.
//!
//! A layer addressed to one relay is:
//!
//! ```text
//! +----------------------+--------+--------------------------+-----------+
//! | wrapped key (k B)    | IV 16B | AES-256-CBC ciphertext   | tag 32B   |
//! +----------------------+--------+--------------------------+-----------+
//! ```
//!
//! `k` is the relay's RSA modulus size, so the relay can split the layer
//! using nothing but its own key. The ciphertext decrypts to a fixed-width
//! routing header followed by the remainder:
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Magic (0x4F) |    Version    |     Kind      |  Hop ID ...   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |        ... Hop ID (u32 BE)                    |  Remainder... |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The remainder is the next relay's full layer, or plaintext when
//! `Kind` is [`HOP_KIND_USER`].

use onion_crypto::{CryptoError, RelayKeypair, RelayPublicKey, SealedBody, SymmetricKey, IV_SIZE};
use thiserror::Error;

use crate::{NextHop, NodeId, UserId};

/// Magic byte opening every decrypted layer body ('O').
pub const LAYER_MAGIC: u8 = 0x4F;

/// Current layer format version.
pub const LAYER_VERSION: u8 = 1;

/// Routing header size inside a decrypted layer.
pub const ROUTING_HEADER_SIZE: usize = 7;

/// Hop kind: forward to another relay.
pub const HOP_KIND_RELAY: u8 = 0x01;

/// Hop kind: deliver plaintext to a user.
pub const HOP_KIND_USER: u8 = 0x02;

/// Layer errors.
#[derive(Debug, Error)]
pub enum LayerError {
    #[error("layer too short: {0} bytes, minimum {1}")]
    TooShort(usize, usize),

    /// The layer was not addressed to this relay, or was corrupted.
    #[error("layer decryption failed: {0}")]
    Decryption(#[source] CryptoError),

    #[error("invalid magic byte: 0x{0:02x}, expected 0x{1:02x}")]
    InvalidMagic(u8, u8),

    #[error("unsupported layer version: {0}, expected {1}")]
    UnsupportedVersion(u8, u8),

    #[error("unknown hop kind: 0x{0:02x}")]
    UnknownHopKind(u8),

    /// Building a layer failed.
    #[error("layer construction failed: {0}")]
    Seal(#[source] CryptoError),
}

/// Fixed-width routing header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingHeader {
    pub next_hop: NextHop,
}

impl RoutingHeader {
    /// Encode header to bytes.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, LayerError> {
        if buf.len() < ROUTING_HEADER_SIZE {
            return Err(LayerError::TooShort(buf.len(), ROUTING_HEADER_SIZE));
        }

        let (kind, id) = match self.next_hop {
            NextHop::Relay(NodeId(id)) => (HOP_KIND_RELAY, id),
            NextHop::User(UserId(id)) => (HOP_KIND_USER, id),
        };

        buf[0] = LAYER_MAGIC;
        buf[1] = LAYER_VERSION;
        buf[2] = kind;
        buf[3..7].copy_from_slice(&id.to_be_bytes());

        Ok(ROUTING_HEADER_SIZE)
    }

    /// Decode header from bytes.
    pub fn decode(buf: &[u8]) -> Result<Self, LayerError> {
        if buf.len() < ROUTING_HEADER_SIZE {
            return Err(LayerError::TooShort(buf.len(), ROUTING_HEADER_SIZE));
        }
        if buf[0] != LAYER_MAGIC {
            return Err(LayerError::InvalidMagic(buf[0], LAYER_MAGIC));
        }
        if buf[1] != LAYER_VERSION {
            return Err(LayerError::UnsupportedVersion(buf[1], LAYER_VERSION));
        }

        let id = u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]);
        let next_hop = match buf[2] {
            HOP_KIND_RELAY => NextHop::Relay(NodeId(id)),
            HOP_KIND_USER => NextHop::User(UserId(id)),
            other => return Err(LayerError::UnknownHopKind(other)),
        };

        Ok(Self { next_hop })
    }
}

/// Result of removing one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeeledLayer {
    pub next_hop: NextHop,
    /// Next relay's layer, or plaintext at the exit.
    pub remainder: Vec<u8>,
}

/// Build one layer addressed to the holder of `public_key`.
///
/// A fresh symmetric key is generated for the layer and wrapped under
/// `public_key`; `next_hop || inner` is sealed under that key.
pub fn seal(
    public_key: &RelayPublicKey,
    next_hop: NextHop,
    inner: &[u8],
) -> Result<Vec<u8>, LayerError> {
    let mut body = vec![0u8; ROUTING_HEADER_SIZE + inner.len()];
    RoutingHeader { next_hop }.encode(&mut body)?;
    body[ROUTING_HEADER_SIZE..].copy_from_slice(inner);

    let layer_key = SymmetricKey::generate();
    let sealed = layer_key.encrypt(&body).map_err(LayerError::Seal)?;
    let wrapped_key = public_key
        .encrypt(layer_key.as_bytes())
        .map_err(LayerError::Seal)?;

    let mut layer = Vec::with_capacity(wrapped_key.len() + IV_SIZE + sealed.ciphertext.len());
    layer.extend_from_slice(&wrapped_key);
    layer.extend_from_slice(&sealed.iv);
    layer.extend_from_slice(&sealed.ciphertext);
    Ok(layer)
}

/// Remove exactly one layer with this relay's private key.
pub fn peel(keypair: &RelayKeypair, layer: &[u8]) -> Result<PeeledLayer, LayerError> {
    let prefix_len = keypair.wrapped_key_len();
    let min_len = prefix_len + IV_SIZE + SealedBody::MIN_CIPHERTEXT_LEN;
    if layer.len() < min_len {
        return Err(LayerError::TooShort(layer.len(), min_len));
    }

    // 1. Split wrapped key from sealed body
    let (wrapped_key, sealed) = layer.split_at(prefix_len);

    // 2. Unwrap the layer key
    let key_bytes = keypair.decrypt(wrapped_key).map_err(LayerError::Decryption)?;
    let layer_key = SymmetricKey::from_slice(&key_bytes).map_err(LayerError::Decryption)?;

    // 3. Open the body
    let sealed = SealedBody::from_bytes(sealed).map_err(LayerError::Decryption)?;
    let mut body = layer_key
        .decrypt(&sealed.iv, &sealed.ciphertext)
        .map_err(LayerError::Decryption)?;

    // 4. Split routing header from remainder
    let header = RoutingHeader::decode(&body)?;
    let remainder = body.split_off(ROUTING_HEADER_SIZE);

    Ok(PeeledLayer {
        next_hop: header.next_hop,
        remainder,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_header_roundtrip() {
        for hop in [
            NextHop::Relay(NodeId(0)),
            NextHop::Relay(NodeId(u32::MAX)),
            NextHop::User(UserId(7)),
        ] {
            let mut buf = [0u8; ROUTING_HEADER_SIZE];
            assert_eq!(RoutingHeader { next_hop: hop }.encode(&mut buf).unwrap(), 7);
            assert_eq!(RoutingHeader::decode(&buf).unwrap().next_hop, hop);
        }
    }

    #[test]
    fn test_routing_header_wire_layout() {
        let mut buf = [0u8; ROUTING_HEADER_SIZE];
        RoutingHeader {
            next_hop: NextHop::Relay(NodeId(0x0102_0304)),
        }
        .encode(&mut buf)
        .unwrap();

        assert_eq!(buf, [0x4F, 0x01, 0x01, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_routing_header_rejects_garbage() {
        assert!(matches!(
            RoutingHeader::decode(&[0x4F, 0x01]),
            Err(LayerError::TooShort(2, 7))
        ));
        assert!(matches!(
            RoutingHeader::decode(&[0x00, 0x01, 0x01, 0, 0, 0, 1]),
            Err(LayerError::InvalidMagic(0x00, 0x4F))
        ));
        assert!(matches!(
            RoutingHeader::decode(&[0x4F, 0x09, 0x01, 0, 0, 0, 1]),
            Err(LayerError::UnsupportedVersion(9, 1))
        ));
        assert!(matches!(
            RoutingHeader::decode(&[0x4F, 0x01, 0x7F, 0, 0, 0, 1]),
            Err(LayerError::UnknownHopKind(0x7F))
        ));
    }

    #[test]
    fn test_seal_peel_single_layer() {
        let keypair = RelayKeypair::generate().unwrap();
        let layer = seal(keypair.public_key(), NextHop::User(UserId(7)), b"hello").unwrap();

        let peeled = peel(&keypair, &layer).unwrap();
        assert_eq!(peeled.next_hop, NextHop::User(UserId(7)));
        assert_eq!(peeled.remainder, b"hello");
    }

    #[test]
    fn test_peel_with_wrong_key_fails() {
        let owner = RelayKeypair::generate().unwrap();
        let stranger = RelayKeypair::generate().unwrap();
        let layer = seal(owner.public_key(), NextHop::Relay(NodeId(2)), b"inner").unwrap();

        assert!(matches!(
            peel(&stranger, &layer),
            Err(LayerError::Decryption(_))
        ));
    }

    #[test]
    fn test_peel_truncated_layer_fails() {
        let keypair = RelayKeypair::generate().unwrap();
        let layer = seal(keypair.public_key(), NextHop::Relay(NodeId(2)), b"inner").unwrap();

        assert!(matches!(
            peel(&keypair, &layer[..100]),
            Err(LayerError::TooShort(100, _))
        ));
        assert!(peel(&keypair, &layer[..layer.len() - 1]).is_err());
    }
}
