//! # Cryptographic Primitives
//!
//! The wallet treats cryptography as an opaque capability: sign a payload,
//! verify a signature, hash some bytes. This module is the thin, typed
//! wrapper that provides it.
//!
//! - **Ed25519** for owner proofs and validator certificates.
//! - **SHA-256** for every hash the ledger defines.

pub mod hash;
pub mod keys;

pub use hash::{sha256, sha256_concat, HASH_LENGTH};
pub use keys::{KeyError, Keypair, PublicKey, Signature};
