//! # Transaction Module
//!
//! Everything the wallet needs to turn intent into a submitted, provable
//! ledger transaction.
//!
//! ```text
//! codec.rs   — canonical bincode encoding and hashing
//! types.rs   — TransactionOrder, TxAttributes, TransactionRecord
//! proof.rs   — Merkle inclusion proofs, unicity certificates, TrustBase
//! signing.rs — owner proofs over an order's signing bytes
//! builder.rs — pure order builders with precondition checks
//! ```
//!
//! ## Lifecycle
//!
//! 1. **Build**: a `build_*` function checks unit state and returns an
//!    unsigned [`TransactionOrder`].
//! 2. **Sign**: [`sign_order`] attaches the owner proof.
//! 3. **Publish**: the publisher submits and polls for a [`TxRecordProof`].
//! 4. **Verify**: [`verify_proof`] checks the proof against a [`TrustBase`].

pub mod builder;
pub mod codec;
pub mod proof;
pub mod signing;
pub mod types;

pub use builder::{BuildError, BuildResult, FeeCreditTarget, OrderParams};
pub use codec::{CodecError, CodecResult};
pub use proof::{verify_proof, ProofError, TrustBase, TxProof, TxRecordProof, UnicityCertificate};
pub use signing::{sign_order, signed, verify_owner_proof};
pub use types::{
    ClientMetadata, OwnerProof, ServerMetadata, SplitTarget, TransactionOrder, TransactionRecord,
    TxAttributes, TxHash, TxStatus, TxType,
};
