//! Crypto error type.

use thiserror::Error;

/// Errors raised by the layer primitives.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Transport text was not valid base64.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Ciphertext was not produced for this key, or was altered in transit.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// The OS entropy source failed while generating key material.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Encoded key material could not be parsed.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Asymmetric plaintext larger than the padding scheme allows.
    #[error("plaintext too long for RSA-OAEP: {len} bytes, maximum {max}")]
    PlaintextTooLong { len: usize, max: usize },

    #[error("encryption failed: {0}")]
    Encryption(String),
}
