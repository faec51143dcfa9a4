//! Error types for bill selection, sending and dust collection.

use thiserror::Error;

use crate::account::AccountError;
use crate::ledger::LedgerError;
use crate::partition::Partition;
use crate::publisher::PublishError;
use crate::storage::DbError;
use crate::transaction::{BuildError, CodecError};
use crate::unit::UnitId;

/// Why no set of bills could be chosen.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectionError {
    /// Spendable bills do not cover the requested amount.
    #[error("insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: u64, required: u64 },

    #[error("amount must be greater than zero")]
    ZeroAmount,
}

#[derive(Debug, Error)]
pub enum MoneyError {
    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error("no receivers given")]
    NoReceivers,

    /// Payments to several receivers are made from one split, so one bill
    /// must cover all of them.
    #[error("paying several receivers needs one bill of at least {required}, largest is {largest}")]
    SingleBillRequired { required: u64, largest: u64 },

    #[error("amount overflow")]
    AmountOverflow,

    #[error("not enough fee credit in wallet on the {partition} partition: have {available}, need {required}")]
    InsufficientFeeCredit {
        partition: Partition,
        available: u64,
        required: u64,
    },

    #[error("unit {0} not found in account")]
    UnitNotFound(UnitId),

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

    #[error(transparent)]
    Db(#[from] DbError),
}

pub type MoneyResult<T> = Result<T, MoneyError>;
