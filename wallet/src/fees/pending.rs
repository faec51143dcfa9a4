//! The persisted record of an unfinished fee-credit operation.
//!
//! Adding or reclaiming fee credit takes two transactions on two different
//! partitions. Between them the value exists only as a proof held by the
//! wallet, so the wallet writes down where it is before every broadcast and
//! after every confirmation.
//!
//! ```text
//! add:      [LockFeeCreditBroadcast] → TransferFcBroadcast → TransferFcConfirmed → AddFcBroadcast
//! reclaim:  [LockBillBroadcast]      → CloseFcBroadcast    → CloseFcConfirmed    → ReclaimFcBroadcast
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::partition::Partition;
use crate::transaction::{TransactionOrder, TxRecordProof};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessKind {
    Add,
    Reclaim,
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessKind::Add => f.write_str("add"),
            ProcessKind::Reclaim => f.write_str("reclaim"),
        }
    }
}

/// Where a pending process stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeStage {
    /// Lock of the target fee credit record submitted.
    LockFeeCreditBroadcast { order: TransactionOrder },
    /// `transferFC` about to be, or already, submitted.
    TransferFcBroadcast { order: TransactionOrder },
    /// `transferFC` confirmed; the value now lives in this proof.
    TransferFcConfirmed { transfer: TxRecordProof },
    AddFcBroadcast {
        transfer: TxRecordProof,
        order: TransactionOrder,
    },

    /// Lock of the target bill submitted.
    LockBillBroadcast { order: TransactionOrder },
    CloseFcBroadcast { order: TransactionOrder },
    /// `closeFC` confirmed; the value now lives in this proof.
    CloseFcConfirmed { close: TxRecordProof },
    ReclaimFcBroadcast {
        close: TxRecordProof,
        order: TransactionOrder,
    },
}

impl FeeStage {
    pub fn name(&self) -> &'static str {
        match self {
            FeeStage::LockFeeCreditBroadcast { .. } => "lock-fee-credit-broadcast",
            FeeStage::TransferFcBroadcast { .. } => "transfer-fc-broadcast",
            FeeStage::TransferFcConfirmed { .. } => "transfer-fc-confirmed",
            FeeStage::AddFcBroadcast { .. } => "add-fc-broadcast",
            FeeStage::LockBillBroadcast { .. } => "lock-bill-broadcast",
            FeeStage::CloseFcBroadcast { .. } => "close-fc-broadcast",
            FeeStage::CloseFcConfirmed { .. } => "close-fc-confirmed",
            FeeStage::ReclaimFcBroadcast { .. } => "reclaim-fc-broadcast",
        }
    }

    pub fn kind(&self) -> ProcessKind {
        match self {
            FeeStage::LockFeeCreditBroadcast { .. }
            | FeeStage::TransferFcBroadcast { .. }
            | FeeStage::TransferFcConfirmed { .. }
            | FeeStage::AddFcBroadcast { .. } => ProcessKind::Add,
            FeeStage::LockBillBroadcast { .. }
            | FeeStage::CloseFcBroadcast { .. }
            | FeeStage::CloseFcConfirmed { .. }
            | FeeStage::ReclaimFcBroadcast { .. } => ProcessKind::Reclaim,
        }
    }

    /// The order this stage is waiting on, if any.
    pub fn in_flight(&self) -> Option<&TransactionOrder> {
        match self {
            FeeStage::LockFeeCreditBroadcast { order }
            | FeeStage::TransferFcBroadcast { order }
            | FeeStage::AddFcBroadcast { order, .. }
            | FeeStage::LockBillBroadcast { order }
            | FeeStage::CloseFcBroadcast { order }
            | FeeStage::ReclaimFcBroadcast { order, .. } => Some(order),
            FeeStage::TransferFcConfirmed { .. } | FeeStage::CloseFcConfirmed { .. } => None,
        }
    }

    /// The confirmed first-leg proof holding the value, if the stage has one.
    pub fn held_proof(&self) -> Option<&TxRecordProof> {
        match self {
            FeeStage::TransferFcConfirmed { transfer } | FeeStage::AddFcBroadcast { transfer, .. } => {
                Some(transfer)
            }
            FeeStage::CloseFcConfirmed { close } | FeeStage::ReclaimFcBroadcast { close, .. } => {
                Some(close)
            }
            _ => None,
        }
    }
}

/// At most one of these exists per account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFeeProcess {
    pub id: Uuid,
    pub kind: ProcessKind,
    pub account_index: u64,
    pub target_partition: Partition,
    /// Amount moved by the current cycle.
    pub amount: u64,
    /// Amount an add still owes after the current cycle.
    pub remaining: u64,
    pub stage: FeeStage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PendingFeeProcess {
    pub fn new(
        account_index: u64,
        target_partition: Partition,
        amount: u64,
        stage: FeeStage,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind: stage.kind(),
            account_index,
            target_partition,
            amount,
            remaining: 0,
            stage,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_remaining(mut self, remaining: u64) -> Self {
        self.remaining = remaining;
        self
    }

    /// Same process, moved to `stage`.
    pub fn advance(&self, stage: FeeStage) -> Self {
        Self {
            stage,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::PartitionId;
    use crate::transaction::{ClientMetadata, TxAttributes};
    use crate::unit::{UnitId, UnitType};

    fn order() -> TransactionOrder {
        TransactionOrder::new(
            PartitionId(1),
            UnitId::derive(b"bill", UnitType::Bill),
            TxAttributes::Unlock { counter: 2 },
            ClientMetadata {
                timeout: 9,
                max_fee: 10,
                fee_credit_record_id: None,
            },
        )
    }

    #[test]
    fn stage_kind_follows_path() {
        assert_eq!(
            FeeStage::TransferFcBroadcast { order: order() }.kind(),
            ProcessKind::Add
        );
        assert_eq!(
            FeeStage::CloseFcBroadcast { order: order() }.kind(),
            ProcessKind::Reclaim
        );
    }

    #[test]
    fn broadcast_stages_expose_in_flight_order() {
        let stage = FeeStage::LockBillBroadcast { order: order() };
        assert_eq!(stage.in_flight(), Some(&order()));
        assert!(stage.held_proof().is_none());
    }

    #[test]
    fn advance_keeps_identity() {
        let process = PendingFeeProcess::new(
            3,
            Partition::Evm,
            100,
            FeeStage::TransferFcBroadcast { order: order() },
        );
        let next = process.advance(FeeStage::CloseFcBroadcast { order: order() });
        assert_eq!(next.id, process.id);
        assert_eq!(next.remaining, 0);
        assert_eq!(next.account_index, 3);
        assert_eq!(next.created_at, process.created_at);
        assert!(next.updated_at >= process.updated_at);
    }

    #[test]
    fn record_survives_bincode() {
        let process = PendingFeeProcess::new(
            0,
            Partition::Tokens,
            42,
            FeeStage::TransferFcBroadcast { order: order() },
        )
        .with_remaining(58);
        let bytes = bincode::serialize(&process).unwrap();
        let back: PendingFeeProcess = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, process);
    }
}
