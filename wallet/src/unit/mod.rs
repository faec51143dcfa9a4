//! # Unit Model
//!
//! Value types for everything the ledger stores on the wallet's behalf.
//!
//! ```text
//! id.rs    — UnitId (32-byte body + type suffix), OwnerPredicate (p2pkh)
//! lock.rs  — LockStatus state machine and spend permissions
//! types.rs — Bill, FeeCreditRecord, FungibleToken, UnitState
//! ```

pub mod id;
pub mod lock;
pub mod types;

pub use id::{OwnerPredicate, UnitId, UnitIdError, UnitType};
pub use lock::{LockError, LockReason, LockStatus, SpendPurpose};
pub use types::{Bill, FeeCreditRecord, FungibleToken, FungibleUnit, UnitState};
