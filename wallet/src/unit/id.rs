//! Unit identifiers and owner predicates.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::crypto::{sha256, PublicKey};

/// Length of the hash part of a unit id. The type suffix byte follows it.
pub const UNIT_ID_BODY_LENGTH: usize = 32;

/// Errors raised while parsing a unit id.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitIdError {
    #[error("unit id is not valid hex: {0}")]
    InvalidHex(String),

    #[error("unit id must be {expected} bytes, got {got}")]
    InvalidLength {
        /// Required length including the type byte.
        expected: usize,
        /// Length that was supplied.
        got: usize,
    },

    #[error("unknown unit type suffix 0x{0:02x}")]
    UnknownType(u8),
}

/// Kind of unit, encoded as the last byte of its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitType {
    Bill,
    FeeCredit,
    TokenType,
    FungibleToken,
}

impl UnitType {
    /// Wire suffix byte.
    pub fn suffix(self) -> u8 {
        match self {
            UnitType::Bill => 0x01,
            UnitType::FeeCredit => 0x0f,
            UnitType::TokenType => 0x20,
            UnitType::FungibleToken => 0x21,
        }
    }

    pub fn from_suffix(byte: u8) -> Result<Self, UnitIdError> {
        match byte {
            0x01 => Ok(UnitType::Bill),
            0x0f => Ok(UnitType::FeeCredit),
            0x20 => Ok(UnitType::TokenType),
            0x21 => Ok(UnitType::FungibleToken),
            other => Err(UnitIdError::UnknownType(other)),
        }
    }
}

/// Opaque, partition-scoped unit identifier: a 32-byte body followed by a
/// one-byte [`UnitType`] suffix.
///
/// Ordering is plain byte order. The bill selector and the dust collector
/// rely on it to break ties between equal-valued units deterministically.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId(Vec<u8>);

impl UnitId {
    /// Assembles an id from its body and type.
    pub fn new(body: [u8; UNIT_ID_BODY_LENGTH], unit_type: UnitType) -> Self {
        let mut bytes = Vec::with_capacity(UNIT_ID_BODY_LENGTH + 1);
        bytes.extend_from_slice(&body);
        bytes.push(unit_type.suffix());
        Self(bytes)
    }

    /// Derives an id by hashing `seed` into the body.
    pub fn derive(seed: &[u8], unit_type: UnitType) -> Self {
        Self::new(sha256(seed), unit_type)
    }

    /// Parses a `0x`-optional hex id and checks its length and suffix.
    pub fn from_hex(s: &str) -> Result<Self, UnitIdError> {
        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| UnitIdError::InvalidHex(e.to_string()))?;
        Self::try_from_bytes(bytes)
    }

    /// Validates raw bytes as a unit id.
    pub fn try_from_bytes(bytes: Vec<u8>) -> Result<Self, UnitIdError> {
        if bytes.len() != UNIT_ID_BODY_LENGTH + 1 {
            return Err(UnitIdError::InvalidLength {
                expected: UNIT_ID_BODY_LENGTH + 1,
                got: bytes.len(),
            });
        }
        UnitType::from_suffix(bytes[UNIT_ID_BODY_LENGTH])?;
        Ok(Self(bytes))
    }

    /// The unit type encoded in the suffix byte.
    pub fn unit_type(&self) -> Option<UnitType> {
        self.0
            .last()
            .and_then(|b| UnitType::from_suffix(*b).ok())
    }

    pub fn has_type(&self, unit_type: UnitType) -> bool {
        self.unit_type() == Some(unit_type)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = hex::encode(&self.0);
        if hex_str.len() > 12 {
            write!(f, "UnitId(0x{}..{})", &hex_str[..8], &hex_str[hex_str.len() - 2..])
        } else {
            write!(f, "UnitId(0x{})", hex_str)
        }
    }
}

/// Who may spend a unit.
///
/// Pay-to-public-key-hash: the predicate stores `SHA-256(pubkey)` and is
/// satisfied by an owner proof signed with that key. An empty predicate can
/// never be satisfied and marks a unit that has been swept into another.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerPredicate(Vec<u8>);

impl OwnerPredicate {
    /// Predicate satisfied by `public_key`.
    pub fn p2pkh(public_key: &PublicKey) -> Self {
        Self(sha256(public_key.as_bytes()).to_vec())
    }

    /// Predicate nobody can satisfy.
    pub fn burned() -> Self {
        Self(Vec::new())
    }

    pub fn is_burned(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if `public_key` satisfies this predicate.
    pub fn is_owned_by(&self, public_key: &PublicKey) -> bool {
        !self.is_burned() && self.0 == sha256(public_key.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for OwnerPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_burned() {
            f.write_str("OwnerPredicate(burned)")
        } else {
            write!(f, "OwnerPredicate({}..)", &hex::encode(&self.0)[..8])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    #[test]
    fn new_appends_type_suffix() {
        let id = UnitId::new([0xAA; 32], UnitType::FeeCredit);
        assert_eq!(id.as_bytes().len(), 33);
        assert_eq!(id.as_bytes()[32], 0x0f);
        assert!(id.has_type(UnitType::FeeCredit));
        assert!(!id.has_type(UnitType::Bill));
    }

    #[test]
    fn hex_roundtrip() {
        let id = UnitId::derive(b"bill-1", UnitType::Bill);
        assert!(id.to_hex().starts_with("0x"));
        assert_eq!(UnitId::from_hex(&id.to_hex()).unwrap(), id);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(matches!(
            UnitId::from_hex("0x0101"),
            Err(UnitIdError::InvalidLength { expected: 33, got: 2 })
        ));
        let mut bad_suffix = vec![0u8; 32];
        bad_suffix.push(0x99);
        assert_eq!(
            UnitId::try_from_bytes(bad_suffix),
            Err(UnitIdError::UnknownType(0x99))
        );
        assert!(matches!(UnitId::from_hex("xyz"), Err(UnitIdError::InvalidHex(_))));
    }

    #[test]
    fn ordering_is_bytewise() {
        let low = UnitId::new([0x01; 32], UnitType::Bill);
        let high = UnitId::new([0x02; 32], UnitType::Bill);
        assert!(low < high);
    }

    #[test]
    fn p2pkh_ownership() {
        let owner = Keypair::generate();
        let stranger = Keypair::generate();
        let predicate = OwnerPredicate::p2pkh(&owner.public_key());
        assert!(predicate.is_owned_by(&owner.public_key()));
        assert!(!predicate.is_owned_by(&stranger.public_key()));
    }

    #[test]
    fn burned_predicate_owned_by_nobody() {
        let kp = Keypair::generate();
        let burned = OwnerPredicate::burned();
        assert!(burned.is_burned());
        assert!(!burned.is_owned_by(&kp.public_key()));
    }
}
