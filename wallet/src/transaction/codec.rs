//! Canonical binary encoding.
//!
//! Orders, records and proofs are encoded with bincode's default
//! (fixed-width little-endian) configuration. The encoding is what gets
//! signed and hashed, so every type passing through here must serialize
//! deterministically: no maps with unstable iteration order, no
//! `skip_serializing_if`, no internally tagged enums.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::crypto::sha256;

/// Encoding failures. Carries bincode's message, not its error type, so the
/// codec error stays `Clone` and comparable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Encodes `value` to its canonical bytes.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decodes canonical bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

/// SHA-256 of the canonical encoding.
pub fn hash<T: Serialize + ?Sized>(value: &T) -> CodecResult<[u8; 32]> {
    Ok(sha256(&encode(value)?))
}

/// Hex-encoded canonical bytes, the form byte payloads take inside JSON-RPC.
pub fn encode_hex<T: Serialize + ?Sized>(value: &T) -> CodecResult<String> {
    Ok(hex::encode(encode(value)?))
}

/// Inverse of [`encode_hex`].
pub fn decode_hex<T: DeserializeOwned>(s: &str) -> CodecResult<T> {
    let bytes = hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| CodecError::Decode(e.to_string()))?;
    decode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Probe {
        round: u64,
        tag: Option<Vec<u8>>,
    }

    #[test]
    fn hash_is_stable_across_calls() {
        let probe = Probe {
            round: 7,
            tag: Some(vec![1, 2, 3]),
        };
        assert_eq!(hash(&probe).unwrap(), hash(&probe).unwrap());
    }

    #[test]
    fn hash_changes_with_content() {
        let a = Probe { round: 1, tag: None };
        let b = Probe { round: 2, tag: None };
        assert_ne!(hash(&a).unwrap(), hash(&b).unwrap());
    }

    #[test]
    fn hex_form_decodes() {
        let probe = Probe {
            round: 42,
            tag: None,
        };
        let s = encode_hex(&probe).unwrap();
        let back: Probe = decode_hex(&format!("0x{s}")).unwrap();
        assert_eq!(back, probe);
    }

    #[test]
    fn truncated_bytes_fail_to_decode() {
        let bytes = encode(&Probe { round: 1, tag: Some(vec![9; 4]) }).unwrap();
        let err = decode::<Probe>(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
        assert!(decode_hex::<Probe>("not hex").is_err());
    }
}
