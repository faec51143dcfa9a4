//! # Inclusion Proofs
//!
//! A transaction is confirmed once the wallet holds a [`TxRecordProof`]: the
//! executed record, a Merkle path from the record's leaf to a block root,
//! and a unicity certificate in which a quorum of the partition's validators
//! signed that root.
//!
//! ```text
//!   leaf = H(0x00 ‖ record)          node = H(0x01 ‖ left ‖ right)
//!
//!                 root  ◀── signed by ≥ quorum validators (UnicityCertificate)
//!                /    \
//!              n01    n23
//!             /  \    /  \
//!           l0   l1  l2   l3
//! ```
//!
//! [`verify_proof`] is a pure function of the record, the proof and an
//! injected [`TrustBase`]; nothing here touches the network.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::codec::{self, CodecError, CodecResult};
use super::types::{TransactionRecord, TxHash};
use crate::crypto::{sha256_concat, Keypair, PublicKey, Signature};
use crate::partition::PartitionId;

const LEAF_PREFIX: [u8; 1] = [0x00];
const NODE_PREFIX: [u8; 1] = [0x01];

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a proof fails verification. Every one of these is an integrity
/// failure; none is retryable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProofError {
    #[error("proof encoding error: {0}")]
    Codec(#[from] CodecError),

    #[error("certificate is for partition {got}, record belongs to {expected}")]
    PartitionMismatch {
        /// Partition of the transaction record.
        expected: PartitionId,
        /// Partition named in the certificate.
        got: PartitionId,
    },

    #[error("merkle path does not lead to the certified root")]
    RootMismatch,

    #[error("certificate signed by unknown validator {0}")]
    UnknownValidator(String),

    #[error("invalid certificate signature from validator {0}")]
    InvalidSignature(String),

    #[error("quorum not reached: {valid} valid signatures, {required} required")]
    QuorumNotReached {
        /// Valid signatures found.
        valid: usize,
        /// Threshold of the trust base.
        required: usize,
    },

    #[error("trust base has no validators")]
    EmptyTrustBase,
}

// ---------------------------------------------------------------------------
// Trust Base
// ---------------------------------------------------------------------------

/// Validator keys and quorum threshold of a partition at a given epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustBase {
    pub epoch: u64,
    /// Keyed by hex-encoded validator public key.
    pub validators: BTreeMap<String, PublicKey>,
    pub quorum_threshold: usize,
}

impl TrustBase {
    pub fn new(
        epoch: u64,
        validators: impl IntoIterator<Item = PublicKey>,
        quorum_threshold: usize,
    ) -> Self {
        Self {
            epoch,
            validators: validators.into_iter().map(|pk| (pk.to_hex(), pk)).collect(),
            quorum_threshold,
        }
    }

    /// Trust base with the usual `⌊2n/3⌋ + 1` threshold.
    pub fn with_supermajority(epoch: u64, validators: impl IntoIterator<Item = PublicKey>) -> Self {
        let mut tb = Self::new(epoch, validators, 0);
        tb.quorum_threshold = tb.validators.len() * 2 / 3 + 1;
        tb
    }

    pub fn validator(&self, node_id: &str) -> Option<&PublicKey> {
        self.validators.get(node_id)
    }
}

// ---------------------------------------------------------------------------
// Certificate & Proof
// ---------------------------------------------------------------------------

/// Validator-signed commitment to a block root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnicityCertificate {
    pub partition_id: PartitionId,
    pub round_number: u64,
    pub root_hash: [u8; 32],
    /// Keyed by hex-encoded validator public key.
    pub signatures: BTreeMap<String, Signature>,
}

#[derive(Serialize)]
struct CertificateView<'a> {
    partition_id: PartitionId,
    round_number: u64,
    root_hash: &'a [u8; 32],
}

impl UnicityCertificate {
    pub fn new(partition_id: PartitionId, round_number: u64, root_hash: [u8; 32]) -> Self {
        Self {
            partition_id,
            round_number,
            root_hash,
            signatures: BTreeMap::new(),
        }
    }

    /// Bytes the validators sign.
    pub fn signing_bytes(&self) -> CodecResult<Vec<u8>> {
        codec::encode(&CertificateView {
            partition_id: self.partition_id,
            round_number: self.round_number,
            root_hash: &self.root_hash,
        })
    }

    /// Adds `validator`'s signature.
    pub fn sign(&mut self, validator: &Keypair) -> CodecResult<()> {
        let bytes = self.signing_bytes()?;
        self.signatures
            .insert(validator.public_key().to_hex(), validator.sign(&bytes));
        Ok(())
    }
}

/// One level of a Merkle path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleStep {
    pub sibling: [u8; 32],
    /// `true` when the sibling is the left child.
    pub sibling_on_left: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxProof {
    pub chain: Vec<MerkleStep>,
    pub certificate: UnicityCertificate,
}

/// An executed transaction together with the evidence of its inclusion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecordProof {
    pub record: TransactionRecord,
    pub proof: TxProof,
}

impl TxRecordProof {
    /// Hash of the order inside the record.
    pub fn tx_hash(&self) -> CodecResult<TxHash> {
        self.record.order.hash()
    }

    pub fn actual_fee(&self) -> u64 {
        self.record.actual_fee()
    }

    /// Round in which the transaction was certified.
    pub fn round_number(&self) -> u64 {
        self.proof.certificate.round_number
    }

    pub fn verify(&self, trust_base: &TrustBase) -> Result<(), ProofError> {
        verify_proof(&self.record, &self.proof, trust_base)
    }
}

// ---------------------------------------------------------------------------
// Merkle Tree
// ---------------------------------------------------------------------------

/// Leaf hash of an executed record.
pub fn leaf_hash(record: &TransactionRecord) -> CodecResult<[u8; 32]> {
    let bytes = codec::encode(record)?;
    Ok(sha256_concat(&[&LEAF_PREFIX, &bytes]))
}

fn node_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    sha256_concat(&[&NODE_PREFIX, left, right])
}

fn next_level(level: &[[u8; 32]]) -> Vec<[u8; 32]> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => node_hash(left, right),
            [single] => *single,
            _ => unreachable!("chunks(2) yields one or two items"),
        })
        .collect()
}

/// Root over `leaves`. An odd node is promoted to the next level unchanged.
/// The root of an empty tree is all zeroes.
pub fn merkle_root(leaves: &[[u8; 32]]) -> [u8; 32] {
    if leaves.is_empty() {
        return [0u8; 32];
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0]
}

/// Path from `leaves[index]` to the root. Empty when `index` is out of range.
pub fn merkle_path(leaves: &[[u8; 32]], index: usize) -> Vec<MerkleStep> {
    let mut chain = Vec::new();
    if index >= leaves.len() {
        return chain;
    }
    let mut idx = index;
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        let sibling = idx ^ 1;
        if sibling < level.len() {
            chain.push(MerkleStep {
                sibling: level[sibling],
                sibling_on_left: idx % 2 == 1,
            });
        }
        idx /= 2;
        level = next_level(&level);
    }
    chain
}

/// Folds `chain` over `leaf`.
pub fn root_from_path(leaf: [u8; 32], chain: &[MerkleStep]) -> [u8; 32] {
    chain.iter().fold(leaf, |acc, step| {
        if step.sibling_on_left {
            node_hash(&step.sibling, &acc)
        } else {
            node_hash(&acc, &step.sibling)
        }
    })
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Checks that `record` was certified by a quorum of `trust_base`.
///
/// 1. The certificate must be for the record's partition.
/// 2. The Merkle path must lead from the record's leaf to the certified root.
/// 3. Every certificate signature must come from a known validator and
///    verify, and there must be at least `quorum_threshold` of them.
pub fn verify_proof(
    record: &TransactionRecord,
    proof: &TxProof,
    trust_base: &TrustBase,
) -> Result<(), ProofError> {
    if trust_base.validators.is_empty() {
        return Err(ProofError::EmptyTrustBase);
    }

    let cert = &proof.certificate;
    if cert.partition_id != record.order.partition_id {
        return Err(ProofError::PartitionMismatch {
            expected: record.order.partition_id,
            got: cert.partition_id,
        });
    }

    let root = root_from_path(leaf_hash(record)?, &proof.chain);
    if root != cert.root_hash {
        return Err(ProofError::RootMismatch);
    }

    let message = cert.signing_bytes()?;
    let mut valid = 0usize;
    for (node_id, signature) in &cert.signatures {
        let key = trust_base
            .validator(node_id)
            .ok_or_else(|| ProofError::UnknownValidator(node_id.clone()))?;
        if !key.verify(&message, signature) {
            return Err(ProofError::InvalidSignature(node_id.clone()));
        }
        valid += 1;
    }

    if valid < trust_base.quorum_threshold {
        return Err(ProofError::QuorumNotReached {
            valid,
            required: trust_base.quorum_threshold,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::types::{
        ClientMetadata, ServerMetadata, TransactionOrder, TxAttributes, TxStatus,
    };
    use crate::unit::{UnitId, UnitType};

    fn record(n: u64) -> TransactionRecord {
        TransactionRecord {
            order: TransactionOrder::new(
                PartitionId(1),
                UnitId::derive(&n.to_be_bytes(), UnitType::Bill),
                TxAttributes::Unlock { counter: n },
                ClientMetadata {
                    timeout: 100,
                    max_fee: 10,
                    fee_credit_record_id: None,
                },
            ),
            server_metadata: ServerMetadata {
                actual_fee: 1,
                status: TxStatus::Successful,
                target_units: vec![],
            },
        }
    }

    /// Builds a certified block of `count` records and returns the proof for
    /// record `index`.
    fn certified(count: u64, index: usize, validators: &[Keypair]) -> TxRecordProof {
        let records: Vec<_> = (0..count).map(record).collect();
        let leaves: Vec<_> = records.iter().map(|r| leaf_hash(r).unwrap()).collect();
        let mut cert = UnicityCertificate::new(PartitionId(1), 5, merkle_root(&leaves));
        for v in validators {
            cert.sign(v).unwrap();
        }
        TxRecordProof {
            record: records[index].clone(),
            proof: TxProof {
                chain: merkle_path(&leaves, index),
                certificate: cert,
            },
        }
    }

    fn validators(n: usize) -> Vec<Keypair> {
        (0..n).map(|i| Keypair::from_seed(&[i as u8 + 1; 32])).collect()
    }

    #[test]
    fn every_leaf_of_odd_tree_verifies() {
        let vals = validators(3);
        let tb = TrustBase::with_supermajority(1, vals.iter().map(|k| k.public_key()));
        for i in 0..5 {
            certified(5, i, &vals).verify(&tb).unwrap();
        }
    }

    #[test]
    fn single_leaf_tree_has_empty_path() {
        let leaves = [[7u8; 32]];
        assert!(merkle_path(&leaves, 0).is_empty());
        assert_eq!(merkle_root(&leaves), [7u8; 32]);
        assert_eq!(merkle_root(&[]), [0u8; 32]);
    }

    #[test]
    fn tampered_record_fails_root_check() {
        let vals = validators(1);
        let tb = TrustBase::new(1, vals.iter().map(|k| k.public_key()), 1);
        let mut p = certified(4, 2, &vals);
        p.record.server_metadata.actual_fee = 0;
        assert_eq!(p.verify(&tb), Err(ProofError::RootMismatch));
    }

    #[test]
    fn tampered_path_fails_root_check() {
        let vals = validators(1);
        let tb = TrustBase::new(1, vals.iter().map(|k| k.public_key()), 1);
        let mut p = certified(4, 1, &vals);
        p.proof.chain[0].sibling[0] ^= 0xFF;
        assert_eq!(p.verify(&tb), Err(ProofError::RootMismatch));
    }

    #[test]
    fn quorum_is_enforced() {
        let vals = validators(4);
        let tb = TrustBase::with_supermajority(1, vals.iter().map(|k| k.public_key()));
        assert_eq!(tb.quorum_threshold, 3);
        let p = certified(2, 0, &vals[..2]);
        assert_eq!(
            p.verify(&tb),
            Err(ProofError::QuorumNotReached {
                valid: 2,
                required: 3
            })
        );
    }

    #[test]
    fn foreign_signer_is_rejected() {
        let vals = validators(2);
        let tb = TrustBase::new(1, vals.iter().map(|k| k.public_key()), 1);
        let stranger = Keypair::generate();
        let p = certified(1, 0, &[stranger.clone()]);
        assert_eq!(
            p.verify(&tb),
            Err(ProofError::UnknownValidator(stranger.public_key().to_hex()))
        );
    }

    #[test]
    fn forged_signature_is_rejected() {
        let vals = validators(1);
        let tb = TrustBase::new(1, vals.iter().map(|k| k.public_key()), 1);
        let mut p = certified(1, 0, &vals);
        let node_id = vals[0].public_key().to_hex();
        p.proof
            .certificate
            .signatures
            .insert(node_id.clone(), vals[0].sign(b"something else"));
        assert_eq!(p.verify(&tb), Err(ProofError::InvalidSignature(node_id)));
    }

    #[test]
    fn wrong_partition_is_rejected() {
        let vals = validators(1);
        let tb = TrustBase::new(1, vals.iter().map(|k| k.public_key()), 1);
        let mut p = certified(1, 0, &vals);
        p.proof.certificate.partition_id = PartitionId(2);
        assert!(matches!(
            p.verify(&tb),
            Err(ProofError::PartitionMismatch { .. })
        ));
    }

    #[test]
    fn empty_trust_base_is_rejected() {
        let vals = validators(1);
        let tb = TrustBase::new(1, Vec::new(), 0);
        assert_eq!(certified(1, 0, &vals).verify(&tb), Err(ProofError::EmptyTrustBase));
    }
}
