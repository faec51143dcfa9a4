//! Unit value types: bills, fee credit records and fungible tokens.
//!
//! These are snapshots of ledger state as last read by the wallet. The engine
//! never mutates them locally; it re-reads a unit right before building a
//! transaction that spends it.

use serde::{Deserialize, Serialize};

use super::id::{OwnerPredicate, UnitId};
use super::lock::LockStatus;

/// A value-holding unit on the money partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill {
    pub id: UnitId,
    /// Amount in base units.
    pub value: u64,
    /// Bumped by every accepted transaction touching the bill. Spending
    /// orders must quote the current value.
    pub counter: u64,
    pub lock_status: LockStatus,
    pub owner: OwnerPredicate,
}

impl Bill {
    /// Non-zero and unlocked.
    pub fn is_spendable(&self) -> bool {
        self.value > 0 && !self.lock_status.is_locked()
    }
}

/// Prepaid fee balance for one (partition, owner key) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeCreditRecord {
    pub id: UnitId,
    pub balance: u64,
    pub counter: u64,
    pub lock_status: LockStatus,
    pub owner: OwnerPredicate,
    /// Last round the record is guaranteed to exist.
    pub timeout: u64,
}

impl FeeCreditRecord {
    /// Whether the record can pay for one more transaction capped at `max_fee`.
    pub fn can_pay(&self, max_fee: u64) -> bool {
        self.balance >= max_fee
    }
}

/// A fungible token unit on the tokens partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FungibleToken {
    pub id: UnitId,
    /// Token type; dust collection only joins tokens of the same type.
    pub type_id: UnitId,
    pub value: u64,
    pub counter: u64,
    pub lock_status: LockStatus,
    pub owner: OwnerPredicate,
}

/// Any unit the ledger can return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitState {
    Bill(Bill),
    FeeCredit(FeeCreditRecord),
    Token(FungibleToken),
}

impl UnitState {
    pub fn id(&self) -> &UnitId {
        match self {
            UnitState::Bill(b) => &b.id,
            UnitState::FeeCredit(f) => &f.id,
            UnitState::Token(t) => &t.id,
        }
    }

    pub fn counter(&self) -> u64 {
        match self {
            UnitState::Bill(b) => b.counter,
            UnitState::FeeCredit(f) => f.counter,
            UnitState::Token(t) => t.counter,
        }
    }

    pub fn owner(&self) -> &OwnerPredicate {
        match self {
            UnitState::Bill(b) => &b.owner,
            UnitState::FeeCredit(f) => &f.owner,
            UnitState::Token(t) => &t.owner,
        }
    }

    pub fn lock_status(&self) -> LockStatus {
        match self {
            UnitState::Bill(b) => b.lock_status,
            UnitState::FeeCredit(f) => f.lock_status,
            UnitState::Token(t) => t.lock_status,
        }
    }

    pub fn into_bill(self) -> Option<Bill> {
        match self {
            UnitState::Bill(b) => Some(b),
            _ => None,
        }
    }

    pub fn into_fee_credit(self) -> Option<FeeCreditRecord> {
        match self {
            UnitState::FeeCredit(f) => Some(f),
            _ => None,
        }
    }

    pub fn into_token(self) -> Option<FungibleToken> {
        match self {
            UnitState::Token(t) => Some(t),
            _ => None,
        }
    }
}

/// A lockable unit that can be the subject of lock, unlock and dust orders.
///
/// Implemented by bills and fungible tokens so the builder and the dust
/// collector can treat both kinds alike.
pub trait FungibleUnit {
    fn id(&self) -> &UnitId;
    fn value(&self) -> u64;
    fn counter(&self) -> u64;
    fn lock_status(&self) -> LockStatus;
}

impl FungibleUnit for Bill {
    fn id(&self) -> &UnitId {
        &self.id
    }
    fn value(&self) -> u64 {
        self.value
    }
    fn counter(&self) -> u64 {
        self.counter
    }
    fn lock_status(&self) -> LockStatus {
        self.lock_status
    }
}

impl FungibleUnit for FungibleToken {
    fn id(&self) -> &UnitId {
        &self.id
    }
    fn value(&self) -> u64 {
        self.value
    }
    fn counter(&self) -> u64 {
        self.counter
    }
    fn lock_status(&self) -> LockStatus {
        self.lock_status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::id::UnitType;

    fn bill(value: u64, lock_status: LockStatus) -> Bill {
        Bill {
            id: UnitId::derive(b"b", UnitType::Bill),
            value,
            counter: 0,
            lock_status,
            owner: OwnerPredicate::burned(),
        }
    }

    #[test]
    fn spendable_requires_value_and_no_lock() {
        assert!(bill(5, LockStatus::Unlocked).is_spendable());
        assert!(!bill(0, LockStatus::Unlocked).is_spendable());
        assert!(!bill(5, LockStatus::LockedManual).is_spendable());
    }

    #[test]
    fn unit_state_accessors() {
        let b = bill(9, LockStatus::LockedForDustCollection);
        let state = UnitState::Bill(b.clone());
        assert_eq!(state.id(), &b.id);
        assert_eq!(state.lock_status(), LockStatus::LockedForDustCollection);
        assert_eq!(state.clone().into_bill(), Some(b));
        assert!(state.into_fee_credit().is_none());
    }

    #[test]
    fn fee_credit_can_pay() {
        let fcr = FeeCreditRecord {
            id: UnitId::derive(b"f", UnitType::FeeCredit),
            balance: 10,
            counter: 0,
            lock_status: LockStatus::Unlocked,
            owner: OwnerPredicate::burned(),
            timeout: 0,
        };
        assert!(fcr.can_pay(10));
        assert!(!fcr.can_pay(11));
    }
}
