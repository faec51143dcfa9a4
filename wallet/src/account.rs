//! # Accounts
//!
//! The engine never stores private keys. It asks an [`AccountKeys`]
//! implementation for the signing key of account `n` whenever it needs to
//! authorise an order, and for the list of public keys when it needs to
//! enumerate what the wallet owns.
//!
//! [`SeedAccounts`] is the built-in implementation: a fixed number of
//! accounts derived deterministically from one 32-byte master seed.
//!
//! ```text
//!   account_key(i) = Ed25519( SHA-256("shard-wallet/account" ‖ seed ‖ i_be) )
//! ```

use thiserror::Error;

use crate::crypto::{sha256_concat, KeyError, Keypair, PublicKey};
use crate::unit::OwnerPredicate;

const DERIVATION_DOMAIN: &[u8] = b"shard-wallet/account";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error("account {index} does not exist ({count} accounts configured)")]
    UnknownAccount { index: u64, count: u64 },

    #[error("invalid master seed: {0}")]
    InvalidSeed(String),

    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Source of account signing keys.
pub trait AccountKeys: Send + Sync {
    fn account_key(&self, index: u64) -> Result<Keypair, AccountError>;

    fn public_keys(&self) -> Vec<PublicKey>;

    /// Owner predicate of account `index`.
    fn owner_predicate(&self, index: u64) -> Result<OwnerPredicate, AccountError> {
        Ok(OwnerPredicate::p2pkh(&self.account_key(index)?.public_key()))
    }
}

/// Accounts `0..count` derived from a master seed.
#[derive(Clone)]
pub struct SeedAccounts {
    seed: [u8; 32],
    count: u64,
}

impl SeedAccounts {
    pub fn new(seed: [u8; 32], count: u64) -> Self {
        Self { seed, count }
    }

    /// Parses a hex master seed (optionally `0x`-prefixed).
    pub fn from_hex(seed_hex: &str, count: u64) -> Result<Self, AccountError> {
        let bytes = hex::decode(seed_hex.trim().trim_start_matches("0x"))
            .map_err(|e| AccountError::InvalidSeed(e.to_string()))?;
        let seed: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            AccountError::InvalidSeed(format!("expected 32 bytes, got {}", b.len()))
        })?;
        Ok(Self::new(seed, count))
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    fn derive(&self, index: u64) -> Keypair {
        let secret = sha256_concat(&[DERIVATION_DOMAIN, &self.seed, &index.to_be_bytes()]);
        Keypair::from_seed(&secret)
    }
}

impl AccountKeys for SeedAccounts {
    fn account_key(&self, index: u64) -> Result<Keypair, AccountError> {
        if index >= self.count {
            return Err(AccountError::UnknownAccount {
                index,
                count: self.count,
            });
        }
        Ok(self.derive(index))
    }

    fn public_keys(&self) -> Vec<PublicKey> {
        (0..self.count).map(|i| self.derive(i).public_key()).collect()
    }
}

impl std::fmt::Debug for SeedAccounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedAccounts")
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let a = SeedAccounts::new([3u8; 32], 2);
        let b = SeedAccounts::new([3u8; 32], 2);
        assert_eq!(
            a.account_key(1).unwrap().public_key(),
            b.account_key(1).unwrap().public_key()
        );
    }

    #[test]
    fn accounts_have_distinct_keys() {
        let accounts = SeedAccounts::new([3u8; 32], 3);
        let keys = accounts.public_keys();
        assert_eq!(keys.len(), 3);
        assert_ne!(keys[0], keys[1]);
        assert_ne!(keys[1], keys[2]);
    }

    #[test]
    fn index_out_of_range_is_rejected() {
        let accounts = SeedAccounts::new([3u8; 32], 1);
        assert_eq!(
            accounts.account_key(1).unwrap_err(),
            AccountError::UnknownAccount { index: 1, count: 1 }
        );
    }

    #[test]
    fn seed_parses_from_hex() {
        let hex_seed = format!("0x{}", "ab".repeat(32));
        let accounts = SeedAccounts::from_hex(&hex_seed, 1).unwrap();
        assert_eq!(
            accounts.account_key(0).unwrap().public_key(),
            SeedAccounts::new([0xab; 32], 1).account_key(0).unwrap().public_key()
        );
        assert!(matches!(
            SeedAccounts::from_hex("abcd", 1),
            Err(AccountError::InvalidSeed(_))
        ));
    }

    #[test]
    fn owner_predicate_matches_key() {
        let accounts = SeedAccounts::new([5u8; 32], 1);
        let pk = accounts.account_key(0).unwrap().public_key();
        assert!(accounts.owner_predicate(0).unwrap().is_owned_by(&pk));
    }
}
