//! Per-layer symmetric sealing.
//!
//! Each onion layer gets its own [`SymmetricKey`]. The key is expanded with
//! HKDF-SHA256 into an AES-256 key and an HMAC-SHA256 key:
//!
//! ```text
//! seal(k, m)  = IV || AES-256-CBC(k_enc, IV, PKCS7(m)) || HMAC(k_mac, IV || C)
//! ```
//!
//! A fresh random IV is drawn for every call and travels with the ciphertext.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;
use crate::{IV_SIZE, SYMMETRIC_KEY_SIZE, TAG_SIZE};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

const ENC_KEY_INFO: &[u8] = b"onion-layer/v1/aes-256-cbc";
const MAC_KEY_INFO: &[u8] = b"onion-layer/v1/hmac-sha256";

/// Ephemeral 256-bit layer key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; SYMMETRIC_KEY_SIZE]);

/// Output of [`SymmetricKey::encrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBody {
    pub iv: [u8; IV_SIZE],
    /// CBC ciphertext followed by the MAC tag.
    pub ciphertext: Vec<u8>,
}

impl SealedBody {
    /// Smallest valid sealed body: one cipher block plus the tag.
    pub const MIN_CIPHERTEXT_LEN: usize = 16 + TAG_SIZE;

    /// Serialize as `IV || ciphertext || tag`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(IV_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Split `IV || ciphertext || tag` without verifying anything.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < IV_SIZE + Self::MIN_CIPHERTEXT_LEN {
            return Err(CryptoError::Decryption(format!(
                "sealed body too short: {} bytes",
                bytes.len()
            )));
        }

        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&bytes[..IV_SIZE]);
        Ok(Self {
            iv,
            ciphertext: bytes[IV_SIZE..].to_vec(),
        })
    }
}

struct DerivedKeys {
    enc: [u8; 32],
    mac: [u8; 32],
}

impl Drop for DerivedKeys {
    fn drop(&mut self) {
        self.enc.zeroize();
        self.mac.zeroize();
    }
}

impl SymmetricKey {
    /// Generate a new random key using the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SYMMETRIC_KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Rebuild a key from unwrapped bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; SYMMETRIC_KEY_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "symmetric key must be {} bytes, got {}",
                SYMMETRIC_KEY_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_SIZE] {
        &self.0
    }

    fn derive(&self) -> Result<DerivedKeys, CryptoError> {
        let hk = Hkdf::<Sha256>::new(None, &self.0);
        let mut keys = DerivedKeys {
            enc: [0u8; 32],
            mac: [0u8; 32],
        };
        hk.expand(ENC_KEY_INFO, &mut keys.enc)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        hk.expand(MAC_KEY_INFO, &mut keys.mac)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(keys)
    }

    fn tag(mac_key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<HmacSha256, CryptoError> {
        let mut mac = HmacSha256::new_from_slice(mac_key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        mac.update(iv);
        mac.update(ciphertext);
        Ok(mac)
    }

    /// Encrypt under a fresh random IV.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<SealedBody, CryptoError> {
        let keys = self.derive()?;

        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut iv);

        let mut ciphertext = Aes256CbcEnc::new_from_slices(&keys.enc, &iv)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let tag = Self::tag(&keys.mac, &iv, &ciphertext)?.finalize().into_bytes();
        ciphertext.extend_from_slice(&tag);

        Ok(SealedBody { iv, ciphertext })
    }

    /// Verify the tag, then decrypt.
    ///
    /// Any mismatch (wrong key, flipped bit, truncation, bad padding) is a
    /// [`CryptoError::Decryption`].
    pub fn decrypt(&self, iv: &[u8; IV_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < SealedBody::MIN_CIPHERTEXT_LEN {
            return Err(CryptoError::Decryption(format!(
                "ciphertext too short: {} bytes",
                ciphertext.len()
            )));
        }

        let keys = self.derive()?;
        let (body, tag) = ciphertext.split_at(ciphertext.len() - TAG_SIZE);

        Self::tag(&keys.mac, iv, body)?
            .verify_slice(tag)
            .map_err(|_| CryptoError::Decryption("authentication tag mismatch".into()))?;

        Aes256CbcDec::new_from_slices(&keys.enc, iv)
            .map_err(|e| CryptoError::Decryption(e.to_string()))?
            .decrypt_padded_vec_mut::<Pkcs7>(body)
            .map_err(|_| CryptoError::Decryption("invalid padding".into()))
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}
