//! Cryptographic primitives for onion layers.
//!
//! This crate provides:
//! - RSA-2048 relay key pairs with OAEP (SHA-256) key wrapping
//! - AES-256-CBC layer sealing with a fresh IV per call and an HMAC-SHA256 tag
//! - Base64 transport encoding for binary material crossing a service boundary
//!
//! # Design
//!
//! Asymmetric encryption is only ever applied to a fixed-size
//! [`SymmetricKey`]; arbitrary payload goes through the symmetric cipher.
//! The symmetric cipher is CBC, which is malleable on its own, so every
//! sealed body carries a MAC over `IV || ciphertext` that is checked before
//! any padding is inspected.

#![forbid(unsafe_code)]

pub mod asymmetric;
pub mod encoding;
pub mod error;
pub mod symmetric;

pub use asymmetric::{RelayKeypair, RelayPublicKey};
pub use encoding::{decode, encode};
pub use error::CryptoError;
pub use symmetric::{SealedBody, SymmetricKey};

/// RSA modulus size in bits for relay key pairs.
pub const RSA_MODULUS_BITS: usize = 2048;

/// Largest plaintext RSA-OAEP with SHA-256 accepts for a 2048-bit modulus.
pub const OAEP_MAX_PLAINTEXT: usize = RSA_MODULUS_BITS / 8 - 2 * 32 - 2;

/// Symmetric key size in bytes (AES-256).
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// CBC initialization vector size in bytes.
pub const IV_SIZE: usize = 16;

/// HMAC-SHA256 tag size in bytes.
pub const TAG_SIZE: usize = 32;
