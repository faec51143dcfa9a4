//! Error types for fee-credit operations.
//!
//! Every [`FeeManager`](super::FeeManager) operation returns a [`FeeError`].
//! Failures of a ledger step are wrapped in [`FeeError::Step`] so the caller
//! always learns which transaction on which partition went wrong.

use thiserror::Error;

use super::pending::ProcessKind;
use crate::account::AccountError;
use crate::ledger::LedgerError;
use crate::partition::Partition;
use crate::publisher::PublishError;
use crate::storage::DbError;
use crate::transaction::{BuildError, CodecError, TxType};
use crate::unit::LockStatus;

#[derive(Debug, Error)]
pub enum FeeError {
    /// A protocol transaction failed to submit or confirm.
    #[error("{step} on the {partition} partition failed: {source}")]
    Step {
        /// Transaction type of the failing step.
        step: TxType,
        /// Partition the step was sent to.
        partition: Partition,
        #[source]
        source: PublishError,
    },

    /// The account has an unfinished process for another partition.
    #[error("a pending fee credit process targets the {pending} partition, not {requested}")]
    InvalidPartition {
        pending: Partition,
        requested: Partition,
    },

    /// The account has an unfinished process of the other kind.
    #[error("a pending {pending} process must finish before starting a {requested}")]
    ProcessConflict {
        pending: ProcessKind,
        requested: ProcessKind,
    },

    #[error("amount {amount} is below the minimum fee credit amount {minimum}")]
    MinimumFeeAmount { amount: u64, minimum: u64 },

    /// Not enough value in bills large enough to fund fee credit.
    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: u64, required: u64 },

    #[error("no fee credit on the {0} partition")]
    NoFeeCredit(Partition),

    #[error("fee credit record on the {partition} partition is {status}")]
    FeeCreditLocked {
        partition: Partition,
        status: LockStatus,
    },

    /// No bill can receive reclaimed fee credit.
    #[error("no bill available to receive reclaimed fee credit")]
    NoTargetBill,

    #[error("the {0} partition does not support locking")]
    LockingUnsupported(Partition),

    #[error("not enough fee credit in wallet on the {partition} partition")]
    InsufficientFeeCredit { partition: Partition },

    /// Refusal to abandon a process whose order may still execute.
    #[error("pending {stage} order may still execute until round {timeout} (ledger at round {round})")]
    InFlight {
        stage: &'static str,
        timeout: u64,
        round: u64,
    },

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub type FeeResult<T> = Result<T, FeeError>;

impl FeeError {
    /// The publisher error behind this failure, if any.
    pub fn publish_error(&self) -> Option<&PublishError> {
        match self {
            FeeError::Step { source, .. } => Some(source),
            FeeError::Publish(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.publish_error(), Some(PublishError::Cancelled))
    }
}
