//! Transport encoding for binary material.
//!
//! Envelopes, wrapped keys and public keys travel inside JSON bodies as
//! standard (padded) base64.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::CryptoError;

/// Encode bytes for transport.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode transport text back into bytes.
pub fn decode(text: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD
        .decode(text.trim())
        .map_err(|e| CryptoError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_arbitrary_bytes() {
        let data: Vec<u8> = (0..=255u8).collect();
        assert_eq!(decode(&encode(&data)).unwrap(), data);
        assert_eq!(decode(&encode(&[])).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_malformed_text_rejected() {
        assert!(matches!(decode("not base64!"), Err(CryptoError::Encoding(_))));
        assert!(matches!(decode("abc"), Err(CryptoError::Encoding(_))));
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        assert_eq!(decode(" aGVsbG8=\n").unwrap(), b"hello");
    }
}
