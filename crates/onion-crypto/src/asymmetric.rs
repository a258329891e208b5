//! RSA relay key pairs.
//!
//! Each relay owns exactly one [`RelayKeypair`]. Only the [`RelayPublicKey`]
//! ever leaves the relay's process, published as base64 of its
//! SubjectPublicKeyInfo DER.
//!
//! # Example
//!
//! ```
//! use onion_crypto::{RelayKeypair, RelayPublicKey, SymmetricKey};
//!
//! let keypair = RelayKeypair::generate().unwrap();
//!
//! // Publish the public half
//! let published = keypair.public_key().to_encoded().unwrap();
//! let public_key = RelayPublicKey::from_encoded(&published).unwrap();
//!
//! // Wrap a layer key for this relay
//! let layer_key = SymmetricKey::generate();
//! let wrapped = public_key.encrypt(layer_key.as_bytes()).unwrap();
//!
//! // Only the relay can unwrap it
//! let unwrapped = keypair.decrypt(&wrapped).unwrap();
//! assert_eq!(&unwrapped[..], layer_key.as_bytes());
//! ```

use std::fmt;

use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::encoding;
use crate::error::CryptoError;
use crate::{OAEP_MAX_PLAINTEXT, RSA_MODULUS_BITS};

/// Public half of a relay key pair.
#[derive(Clone, PartialEq, Eq)]
pub struct RelayPublicKey(RsaPublicKey);

impl RelayPublicKey {
    /// Parse a published key (base64 SPKI DER).
    pub fn from_encoded(text: &str) -> Result<Self, CryptoError> {
        let der = encoding::decode(text)?;
        let key = RsaPublicKey::from_public_key_der(&der)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self(key))
    }

    /// Encode for publication to the directory.
    pub fn to_encoded(&self) -> Result<String, CryptoError> {
        let der = self
            .0
            .to_public_key_der()
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(encoding::encode(der.as_bytes()))
    }

    /// Size of every ciphertext this key produces.
    pub fn ciphertext_len(&self) -> usize {
        self.0.size()
    }

    /// Largest plaintext [`encrypt`](Self::encrypt) accepts.
    pub fn max_plaintext_len(&self) -> usize {
        self.0.size() - 2 * 32 - 2
    }

    /// RSA-OAEP (SHA-256) encryption.
    ///
    /// Only meant for symmetric key material. Oversized input is a caller bug
    /// and is rejected with [`CryptoError::PlaintextTooLong`].
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let max = self.max_plaintext_len();
        if plaintext.len() > max {
            return Err(CryptoError::PlaintextTooLong {
                len: plaintext.len(),
                max,
            });
        }

        self.0
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }
}

impl fmt::Debug for RelayPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RelayPublicKey({} bits)", self.0.size() * 8)
    }
}

/// RSA-2048 key pair held privately by a relay.
///
/// The private key is immutable after generation, so a shared reference can
/// be used by any number of concurrent forwarding jobs.
pub struct RelayKeypair {
    private_key: RsaPrivateKey,
    public_key: RelayPublicKey,
}

impl RelayKeypair {
    /// Generate a fresh key pair from the OS CSPRNG.
    ///
    /// Failure means the entropy source is unusable; callers treat it as fatal.
    pub fn generate() -> Result<Self, CryptoError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, RSA_MODULUS_BITS)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public_key = RelayPublicKey(private_key.to_public_key());

        debug_assert_eq!(public_key.max_plaintext_len(), OAEP_MAX_PLAINTEXT);

        Ok(Self {
            private_key,
            public_key,
        })
    }

    /// Get the public half.
    pub fn public_key(&self) -> &RelayPublicKey {
        &self.public_key
    }

    /// Length of the wrapped-key prefix of a layer addressed to this relay.
    pub fn wrapped_key_len(&self) -> usize {
        self.private_key.size()
    }

    /// RSA-OAEP (SHA-256) decryption.
    ///
    /// Fails with [`CryptoError::Decryption`] when the ciphertext was made for
    /// another key or was corrupted.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        self.private_key
            .decrypt(Oaep::new::<Sha256>(), ciphertext)
            .map(Zeroizing::new)
            .map_err(|e| CryptoError::Decryption(e.to_string()))
    }
}

impl fmt::Debug for RelayKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayKeypair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}
