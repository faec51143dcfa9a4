//! # Ledger RPC Surface
//!
//! The engine talks to each partition through one narrow async trait,
//! [`LedgerClient`]. Everything else (building, signing, proof checking,
//! persistence) happens on the wallet side.
//!
//! ```text
//! mod.rs    — LedgerClient trait, LedgerError, typed fetch helpers
//! rpc.rs    — JsonRpcLedger: JSON-RPC 2.0 over HTTP, one endpoint per partition
//! memory.rs — InMemoryLedger: single-process ledger simulation for tests and devnets
//! ```
//!
//! Submission errors are surfaced as-is and never retried here. Whether a
//! failed submission is safe to repeat is a protocol decision that belongs
//! to the caller.

pub mod memory;
pub mod rpc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::partition::PartitionId;
use crate::transaction::{TransactionOrder, TrustBase, TxHash, TxRecordProof};
use crate::unit::{Bill, FeeCreditRecord, FungibleToken, OwnerPredicate, UnitId, UnitState};

pub use memory::{InMemoryLedger, LEDGER_FEE};
pub use rpc::{JsonRpcLedger, RpcEndpoints};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The partition refused the order.
    #[error("partition {partition} rejected transaction: {reason}")]
    Rejected {
        partition: PartitionId,
        reason: String,
    },

    /// The order's `max_fee` is below what the partition charges.
    #[error("fee policy: max fee {max_fee} is below required fee {required}")]
    FeePolicy { max_fee: u64, required: u64 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("no endpoint configured for partition {0}")]
    UnknownPartition(PartitionId),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// ---------------------------------------------------------------------------
// Client trait
// ---------------------------------------------------------------------------

/// A unit as returned by the ledger, with the hash of the transaction that
/// last modified it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub state: UnitState,
    pub last_tx_hash: Option<TxHash>,
}

/// Per-partition read and submit operations.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submits a signed order. Returns the order hash on acceptance.
    async fn submit_transaction(&self, order: &TransactionOrder) -> LedgerResult<TxHash>;

    /// Current state of `unit_id`, or `None` if the unit does not exist.
    async fn get_unit(
        &self,
        partition: PartitionId,
        unit_id: &UnitId,
    ) -> LedgerResult<Option<UnitRecord>>;

    async fn get_round_number(&self, partition: PartitionId) -> LedgerResult<u64>;

    /// Inclusion proof for `tx_hash` on `unit_id`, once it is certified.
    async fn get_transaction_proof(
        &self,
        partition: PartitionId,
        unit_id: &UnitId,
        tx_hash: TxHash,
    ) -> LedgerResult<Option<TxRecordProof>>;

    async fn get_trust_base(&self, partition: PartitionId) -> LedgerResult<TrustBase>;

    /// Ids of every unit on `partition` currently owned by `owner`.
    async fn get_units_by_owner(
        &self,
        partition: PartitionId,
        owner: &OwnerPredicate,
    ) -> LedgerResult<Vec<UnitId>>;
}

// ---------------------------------------------------------------------------
// Typed helpers
// ---------------------------------------------------------------------------

/// Non-zero bills owned by `owner` on the money partition.
pub async fn fetch_bills(
    ledger: &dyn LedgerClient,
    money: PartitionId,
    owner: &OwnerPredicate,
) -> LedgerResult<Vec<Bill>> {
    let mut bills = Vec::new();
    for id in ledger.get_units_by_owner(money, owner).await? {
        if let Some(bill) = fetch_bill(ledger, money, &id).await? {
            if bill.value > 0 {
                bills.push(bill);
            }
        }
    }
    Ok(bills)
}

pub async fn fetch_bill(
    ledger: &dyn LedgerClient,
    money: PartitionId,
    id: &UnitId,
) -> LedgerResult<Option<Bill>> {
    Ok(ledger
        .get_unit(money, id)
        .await?
        .and_then(|r| r.state.into_bill()))
}

pub async fn fetch_fee_credit(
    ledger: &dyn LedgerClient,
    partition: PartitionId,
    id: &UnitId,
) -> LedgerResult<Option<FeeCreditRecord>> {
    Ok(ledger
        .get_unit(partition, id)
        .await?
        .and_then(|r| r.state.into_fee_credit()))
}

/// Non-zero tokens of `type_id` owned by `owner`.
pub async fn fetch_tokens(
    ledger: &dyn LedgerClient,
    tokens: PartitionId,
    owner: &OwnerPredicate,
    type_id: &UnitId,
) -> LedgerResult<Vec<FungibleToken>> {
    let mut out = Vec::new();
    for id in ledger.get_units_by_owner(tokens, owner).await? {
        let token = ledger
            .get_unit(tokens, &id)
            .await?
            .and_then(|r| r.state.into_token());
        if let Some(token) = token {
            if token.value > 0 && token.type_id == *type_id {
                out.push(token);
            }
        }
    }
    Ok(out)
}
