//! # Fee Credit
//!
//! A partition accepts transactions only from owners holding fee credit on
//! it. Fee credit is bought with bills and sold back for bills through two
//! cross-partition protocols:
//!
//! ```text
//!   add:      money: transferFC(bill) ──proof──▶ target: addFC(record)
//!   reclaim:  target: closeFC(record) ──proof──▶ money: reclaimFC(bill)
//! ```
//!
//! Between the two legs the value exists only as a proof in the wallet's
//! hands. [`FeeManager`] records every step in the [`WalletDB`] before it
//! broadcasts and after it confirms, so a crashed or cancelled operation is
//! resumed instead of repeated.
//!
//! - `pending.rs` — the persisted [`PendingFeeProcess`] and its stages
//! - `manager.rs` — the add / reclaim / lock / unlock state machine
//! - `error.rs`   — [`FeeError`]
//!
//! [`WalletDB`]: crate::storage::WalletDB

pub mod error;
pub mod manager;
pub mod pending;

pub use error::{FeeError, FeeResult};
pub use manager::{AddFeeCreditOutcome, FeeManager, ReclaimFeeCreditOutcome};
pub use pending::{FeeStage, PendingFeeProcess, ProcessKind};
