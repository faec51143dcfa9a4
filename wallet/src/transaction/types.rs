//! Transaction orders and records.
//!
//! A [`TransactionOrder`] is what the wallet signs and submits. A
//! [`TransactionRecord`] is the same order after execution, with the fee
//! the ledger actually charged. A record plus its [`TxRecordProof`] is the
//! unit of confirmation.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::codec::{self, CodecResult};
use super::proof::TxRecordProof;
use crate::crypto::{PublicKey, Signature};
use crate::partition::PartitionId;
use crate::unit::{LockReason, OwnerPredicate, UnitId};

/// SHA-256 of an encoded order.
pub type TxHash = [u8; 32];

// ---------------------------------------------------------------------------
// TxType
// ---------------------------------------------------------------------------

/// Flat discriminant of [`TxAttributes`], used for logging and counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxType {
    Transfer,
    Split,
    Lock,
    Unlock,
    TransferFeeCredit,
    AddFeeCredit,
    CloseFeeCredit,
    ReclaimFeeCredit,
    LockFeeCredit,
    UnlockFeeCredit,
    DustTransfer,
    SwapDust,
    BurnToken,
    JoinToken,
}

impl TxType {
    /// Fee-credit protocol transactions pay their fee out of the moved
    /// amount instead of out of a fee credit record.
    pub fn pays_fee_from_amount(self) -> bool {
        matches!(
            self,
            TxType::TransferFeeCredit
                | TxType::AddFeeCredit
                | TxType::CloseFeeCredit
                | TxType::ReclaimFeeCredit
        )
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxType::Transfer => "transfer",
            TxType::Split => "split",
            TxType::Lock => "lock",
            TxType::Unlock => "unlock",
            TxType::TransferFeeCredit => "transferFC",
            TxType::AddFeeCredit => "addFC",
            TxType::CloseFeeCredit => "closeFC",
            TxType::ReclaimFeeCredit => "reclaimFC",
            TxType::LockFeeCredit => "lockFC",
            TxType::UnlockFeeCredit => "unlockFC",
            TxType::DustTransfer => "transDC",
            TxType::SwapDust => "swapDC",
            TxType::BurnToken => "burnFT",
            TxType::JoinToken => "joinFT",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// One output of a split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitTarget {
    pub amount: u64,
    pub owner: OwnerPredicate,
}

/// Type-specific payload of an order.
///
/// Every variant that spends an existing unit quotes that unit's current
/// `counter`; the ledger rejects the order if the unit has moved on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxAttributes {
    /// Hand the whole bill to a new owner.
    Transfer {
        new_owner: OwnerPredicate,
        value: u64,
        counter: u64,
    },
    /// Carve `targets` out of the bill; the bill keeps the remainder.
    Split {
        targets: Vec<SplitTarget>,
        counter: u64,
    },
    /// Lock a bill or token.
    Lock { reason: LockReason, counter: u64 },
    /// Unlock a bill or token.
    Unlock { counter: u64 },
    /// Money side of fee-credit creation. Removes `amount` from the bill.
    TransferFeeCredit {
        amount: u64,
        target_partition: PartitionId,
        target_record_id: UnitId,
        /// Counter of the target record, `None` when it does not exist yet.
        target_record_counter: Option<u64>,
        earliest_addition_time: u64,
        latest_addition_time: u64,
        counter: u64,
    },
    /// Target side of fee-credit creation, backed by the transfer's proof.
    AddFeeCredit {
        owner: OwnerPredicate,
        transfer: Box<TxRecordProof>,
    },
    /// Empties a fee credit record towards a money bill.
    CloseFeeCredit {
        amount: u64,
        target_unit_id: UnitId,
        target_unit_counter: u64,
        counter: u64,
    },
    /// Money side of fee-credit return, backed by the close proof.
    ReclaimFeeCredit {
        close: Box<TxRecordProof>,
        counter: u64,
    },
    LockFeeCredit { reason: LockReason, counter: u64 },
    UnlockFeeCredit { counter: u64 },
    /// Zeroes a bill on behalf of a dust-collection target.
    DustTransfer {
        value: u64,
        target_unit_id: UnitId,
        target_unit_counter: u64,
        counter: u64,
    },
    /// Folds confirmed dust transfers into the target bill and unlocks it.
    SwapDust {
        transfers: Vec<TxRecordProof>,
        counter: u64,
    },
    /// Token counterpart of [`TxAttributes::DustTransfer`].
    BurnToken {
        type_id: UnitId,
        value: u64,
        target_token_id: UnitId,
        target_token_counter: u64,
        counter: u64,
    },
    /// Token counterpart of [`TxAttributes::SwapDust`].
    JoinToken {
        burns: Vec<TxRecordProof>,
        counter: u64,
    },
}

impl TxAttributes {
    pub fn tx_type(&self) -> TxType {
        match self {
            TxAttributes::Transfer { .. } => TxType::Transfer,
            TxAttributes::Split { .. } => TxType::Split,
            TxAttributes::Lock { .. } => TxType::Lock,
            TxAttributes::Unlock { .. } => TxType::Unlock,
            TxAttributes::TransferFeeCredit { .. } => TxType::TransferFeeCredit,
            TxAttributes::AddFeeCredit { .. } => TxType::AddFeeCredit,
            TxAttributes::CloseFeeCredit { .. } => TxType::CloseFeeCredit,
            TxAttributes::ReclaimFeeCredit { .. } => TxType::ReclaimFeeCredit,
            TxAttributes::LockFeeCredit { .. } => TxType::LockFeeCredit,
            TxAttributes::UnlockFeeCredit { .. } => TxType::UnlockFeeCredit,
            TxAttributes::DustTransfer { .. } => TxType::DustTransfer,
            TxAttributes::SwapDust { .. } => TxType::SwapDust,
            TxAttributes::BurnToken { .. } => TxType::BurnToken,
            TxAttributes::JoinToken { .. } => TxType::JoinToken,
        }
    }

    /// Counter of the order's own unit, when the order spends an existing one.
    ///
    /// `addFC` has none: it may create its record.
    pub fn counter(&self) -> Option<u64> {
        match self {
            TxAttributes::AddFeeCredit { .. } => None,
            TxAttributes::Transfer { counter, .. }
            | TxAttributes::Split { counter, .. }
            | TxAttributes::Lock { counter, .. }
            | TxAttributes::Unlock { counter }
            | TxAttributes::TransferFeeCredit { counter, .. }
            | TxAttributes::CloseFeeCredit { counter, .. }
            | TxAttributes::ReclaimFeeCredit { counter, .. }
            | TxAttributes::LockFeeCredit { counter, .. }
            | TxAttributes::UnlockFeeCredit { counter }
            | TxAttributes::DustTransfer { counter, .. }
            | TxAttributes::SwapDust { counter, .. }
            | TxAttributes::BurnToken { counter, .. }
            | TxAttributes::JoinToken { counter, .. } => Some(*counter),
        }
    }
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// Client-chosen execution bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    /// Last round in which the order may be included.
    pub timeout: u64,
    /// Most the order may be charged.
    pub max_fee: u64,
    /// Record paying the fee. `None` for fee-credit protocol transactions.
    pub fee_credit_record_id: Option<UnitId>,
}

/// Proof that the order was authorised by the unit's owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerProof {
    pub public_key: PublicKey,
    pub signature: Signature,
}

/// A transaction as submitted by the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOrder {
    pub partition_id: PartitionId,
    pub unit_id: UnitId,
    pub attributes: TxAttributes,
    pub client_metadata: ClientMetadata,
    pub owner_proof: Option<OwnerProof>,
}

/// Borrowed view of the signed fields of an order.
#[derive(Serialize)]
struct SigningView<'a> {
    partition_id: PartitionId,
    unit_id: &'a UnitId,
    attributes: &'a TxAttributes,
    client_metadata: &'a ClientMetadata,
}

impl TransactionOrder {
    pub fn new(
        partition_id: PartitionId,
        unit_id: UnitId,
        attributes: TxAttributes,
        client_metadata: ClientMetadata,
    ) -> Self {
        Self {
            partition_id,
            unit_id,
            attributes,
            client_metadata,
            owner_proof: None,
        }
    }

    pub fn tx_type(&self) -> TxType {
        self.attributes.tx_type()
    }

    pub fn timeout(&self) -> u64 {
        self.client_metadata.timeout
    }

    /// Bytes covered by the owner proof: everything except the proof itself.
    pub fn signing_bytes(&self) -> CodecResult<Vec<u8>> {
        codec::encode(&SigningView {
            partition_id: self.partition_id,
            unit_id: &self.unit_id,
            attributes: &self.attributes,
            client_metadata: &self.client_metadata,
        })
    }

    /// Hash of the full encoded order, owner proof included.
    pub fn hash(&self) -> CodecResult<TxHash> {
        codec::hash(self)
    }

    pub fn is_signed(&self) -> bool {
        self.owner_proof.is_some()
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Execution outcome recorded by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Successful,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMetadata {
    pub actual_fee: u64,
    pub status: TxStatus,
    /// Units created or modified by the transaction.
    pub target_units: Vec<UnitId>,
}

/// An executed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub order: TransactionOrder,
    pub server_metadata: ServerMetadata,
}

impl TransactionRecord {
    pub fn actual_fee(&self) -> u64 {
        self.server_metadata.actual_fee
    }

    pub fn is_successful(&self) -> bool {
        self.server_metadata.status == TxStatus::Successful
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::unit::UnitType;

    fn order(counter: u64) -> TransactionOrder {
        TransactionOrder::new(
            PartitionId(1),
            UnitId::derive(b"bill", UnitType::Bill),
            TxAttributes::Unlock { counter },
            ClientMetadata {
                timeout: 20,
                max_fee: 10,
                fee_credit_record_id: None,
            },
        )
    }

    #[test]
    fn signing_bytes_ignore_owner_proof() {
        let mut o = order(3);
        let before = o.signing_bytes().unwrap();
        let kp = Keypair::generate();
        o.owner_proof = Some(OwnerProof {
            public_key: kp.public_key(),
            signature: kp.sign(&before),
        });
        assert_eq!(o.signing_bytes().unwrap(), before);
    }

    #[test]
    fn hash_covers_owner_proof() {
        let mut o = order(3);
        let unsigned = o.hash().unwrap();
        let kp = Keypair::generate();
        o.owner_proof = Some(OwnerProof {
            public_key: kp.public_key(),
            signature: kp.sign(b"x"),
        });
        assert_ne!(o.hash().unwrap(), unsigned);
    }

    #[test]
    fn counter_is_exposed_for_spending_orders() {
        assert_eq!(order(9).attributes.counter(), Some(9));
    }

    #[test]
    fn fee_credit_types_pay_from_amount() {
        assert!(TxType::TransferFeeCredit.pays_fee_from_amount());
        assert!(TxType::ReclaimFeeCredit.pays_fee_from_amount());
        assert!(!TxType::LockFeeCredit.pays_fee_from_amount());
        assert!(!TxType::Split.pays_fee_from_amount());
        assert_eq!(TxType::TransferFeeCredit.to_string(), "transferFC");
    }
}
