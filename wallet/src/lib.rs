// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Shard Wallet — Engine Library
//!
//! Client-side engine for a ledger split into partitions, where every
//! transaction is paid from a fee credit record the sender holds on the
//! partition it targets.
//!
//! The engine builds and signs transactions, submits them, waits for
//! proofs it verifies against the partition's trust base, and drives the
//! two-leg protocols that move value between bills and fee credit. Every
//! step of those protocols is recorded in a local database so a crashed or
//! cancelled run resumes where it stopped.
//!
//! ## Architecture
//!
//! ```text
//!   FeeManager ──┐                 ┌── InMemoryLedger
//!   MoneyWallet ─┼─▶ TxPublisher ─▶│
//!   DustCollector┘        │        └── JsonRpcLedger
//!                         ▼
//!                   verify_proof(trust base)
//! ```
//!
//! - **unit** — unit ids, lock states and typed unit records.
//! - **transaction** — orders, codec, signing, proofs and pure builders.
//! - **partition** — the closed set of partitions and their capabilities.
//! - **ledger** — the [`ledger::LedgerClient`] seam and its implementations.
//! - **publisher** — submit, poll, verify.
//! - **fees** — add / reclaim fee credit and the persisted pending process.
//! - **money** — bill selection, sending, dust collection.
//! - **storage** — the sled-backed wallet database.
//! - **account** — account key derivation.
//! - **config** — protocol constants and runtime knobs.

pub mod account;
pub mod cancel;
pub mod config;
pub mod crypto;
pub mod fees;
pub mod ledger;
pub mod money;
pub mod partition;
pub mod publisher;
pub mod storage;
pub mod transaction;
pub mod unit;
