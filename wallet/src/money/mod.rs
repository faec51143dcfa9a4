//! # Money
//!
//! Spending and consolidating units.
//!
//! - `selector.rs` — which bills pay for an amount
//! - `dust.rs`     — merges many small bills (or tokens) into one
//! - `wallet.rs`   — [`MoneyWallet`], the account-level façade
//!
//! Every order built here pays its fee from the account's fee credit record
//! on the order's partition, so the record is checked up front for enough
//! balance to cover `max_fee` per order.

pub mod dust;
pub mod error;
pub mod selector;
pub mod wallet;

pub use dust::{DustCollector, DustKind, DustOutcome, PendingDustBatch};
pub use error::{MoneyError, MoneyResult, SelectionError};
pub use selector::select_bills_for_amount;
pub use wallet::{MoneyWallet, Receiver, SendOutcome};

use crate::crypto::PublicKey;
use crate::ledger::{fetch_fee_credit, LedgerClient};
use crate::partition::Partition;
use crate::unit::FeeCreditRecord;

/// The owner's fee credit record on `partition`, provided it can pay for
/// `orders` orders at `max_fee` each.
pub(crate) async fn fee_credit_for(
    ledger: &dyn LedgerClient,
    partition: Partition,
    owner: &PublicKey,
    orders: u64,
    max_fee: u64,
) -> MoneyResult<FeeCreditRecord> {
    let required = orders.saturating_mul(max_fee);
    let id = partition.fee_credit_record_id(owner);
    let record = fetch_fee_credit(ledger, partition.id(), &id).await?;
    match record {
        Some(record) if record.balance >= required => Ok(record),
        other => Err(MoneyError::InsufficientFeeCredit {
            partition,
            available: other.map(|r| r.balance).unwrap_or(0),
            required,
        }),
    }
}
