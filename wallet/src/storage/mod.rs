//! # Storage Module
//!
//! Local persistence for the wallet engine. The ledger is the source of
//! truth for unit state; what the wallet must remember across restarts is
//! how far each account got through a fee-credit operation, and which dust
//! transfers still wait for their swap.
//!
//! ```text
//! db.rs — WalletDB: sled trees `fee_processes`, `dust_batches` and `metadata`
//! ```
//!
//! Records are bincode-encoded and written with compare-and-swap, so the
//! at-most-one-pending-process rule holds even with several writers.

pub mod db;

pub use db::{DbError, DbResult, WalletDB, SCHEMA_VERSION};
