//! # Hashing Utilities
//!
//! SHA-256 is the only digest the ledger speaks: transaction hashes, owner
//! predicates, fee credit record ids and Merkle nodes are all SHA-256.
//! Everything here returns fixed-size arrays so hashes can be compared and
//! used as map keys without allocation.

use sha2::{Digest, Sha256};

/// Length of every digest produced by this module.
pub const HASH_LENGTH: usize = 32;

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; HASH_LENGTH] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 over the concatenation of `parts`, without building the
/// concatenated buffer.
pub fn sha256_concat(parts: &[&[u8]]) -> [u8; HASH_LENGTH] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}
