//! # Lock/Unlock State Machine
//!
//! Bills, tokens and fee credit records share one lock model:
//!
//! ```text
//!                 lock(reason)
//!   Unlocked  ───────────────────▶  LockedManual
//!      ▲                            LockedForAddFee
//!      │          unlock            LockedForReclaimFee
//!      └────────────────────────── LockedForDustCollection
//! ```
//!
//! Locking is only legal from `Unlocked`; unlocking only from a locked state.
//! A unit locked for a reason may only be spent by the flow that owns that
//! reason (see [`LockStatus::permits`]). A manual lock permits nothing.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a unit is being locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockReason {
    Manual,
    AddFee,
    ReclaimFee,
    DustCollection,
}

/// Current lock state of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LockStatus {
    #[default]
    Unlocked,
    LockedManual,
    LockedForAddFee,
    LockedForReclaimFee,
    LockedForDustCollection,
}

/// What a transaction is about to do with a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendPurpose {
    /// Ordinary transfer or split.
    Transfer,
    /// Source bill of a `transferFC`.
    AddFee,
    /// Target bill of a `reclaimFC`.
    ReclaimFee,
    /// Source or target of a dust sweep.
    DustCollection,
}

/// Illegal lock transitions.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    #[error("unit is already locked ({current})")]
    AlreadyLocked {
        /// State the unit is in.
        current: LockStatus,
    },

    #[error("unit is not locked")]
    NotLocked,
}

impl From<LockReason> for LockStatus {
    fn from(reason: LockReason) -> Self {
        match reason {
            LockReason::Manual => LockStatus::LockedManual,
            LockReason::AddFee => LockStatus::LockedForAddFee,
            LockReason::ReclaimFee => LockStatus::LockedForReclaimFee,
            LockReason::DustCollection => LockStatus::LockedForDustCollection,
        }
    }
}

impl LockStatus {
    pub fn is_locked(self) -> bool {
        self != LockStatus::Unlocked
    }

    /// The reason behind a locked state, `None` when unlocked.
    pub fn reason(self) -> Option<LockReason> {
        match self {
            LockStatus::Unlocked => None,
            LockStatus::LockedManual => Some(LockReason::Manual),
            LockStatus::LockedForAddFee => Some(LockReason::AddFee),
            LockStatus::LockedForReclaimFee => Some(LockReason::ReclaimFee),
            LockStatus::LockedForDustCollection => Some(LockReason::DustCollection),
        }
    }

    /// Transition into a locked state.
    pub fn lock(self, reason: LockReason) -> Result<LockStatus, LockError> {
        if self.is_locked() {
            return Err(LockError::AlreadyLocked { current: self });
        }
        Ok(reason.into())
    }

    /// Transition back to `Unlocked`.
    pub fn unlock(self) -> Result<LockStatus, LockError> {
        if !self.is_locked() {
            return Err(LockError::NotLocked);
        }
        Ok(LockStatus::Unlocked)
    }

    /// Whether a unit in this state may be consumed for `purpose`.
    ///
    /// Unlocked units may be used for anything. A locked unit is reserved
    /// for the one flow that locked it.
    pub fn permits(self, purpose: SpendPurpose) -> bool {
        match self {
            LockStatus::Unlocked => true,
            LockStatus::LockedManual => false,
            LockStatus::LockedForAddFee => purpose == SpendPurpose::AddFee,
            LockStatus::LockedForReclaimFee => purpose == SpendPurpose::ReclaimFee,
            LockStatus::LockedForDustCollection => purpose == SpendPurpose::DustCollection,
        }
    }
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LockStatus::Unlocked => "unlocked",
            LockStatus::LockedManual => "locked (manual)",
            LockStatus::LockedForAddFee => "locked for adding fees",
            LockStatus::LockedForReclaimFee => "locked for reclaiming fees",
            LockStatus::LockedForDustCollection => "locked for dust collection",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_REASONS: [LockReason; 4] = [
        LockReason::Manual,
        LockReason::AddFee,
        LockReason::ReclaimFee,
        LockReason::DustCollection,
    ];

    #[test]
    fn lock_from_unlocked_succeeds_for_every_reason() {
        for reason in ALL_REASONS {
            let locked = LockStatus::Unlocked.lock(reason).unwrap();
            assert!(locked.is_locked());
            assert_eq!(locked.reason(), Some(reason));
        }
    }

    #[test]
    fn double_lock_fails() {
        let locked = LockStatus::Unlocked.lock(LockReason::Manual).unwrap();
        assert_eq!(
            locked.lock(LockReason::AddFee),
            Err(LockError::AlreadyLocked {
                current: LockStatus::LockedManual
            })
        );
    }

    #[test]
    fn unlock_requires_lock() {
        assert_eq!(LockStatus::Unlocked.unlock(), Err(LockError::NotLocked));
        for reason in ALL_REASONS {
            let status: LockStatus = reason.into();
            assert_eq!(status.unlock(), Ok(LockStatus::Unlocked));
        }
    }

    #[test]
    fn unlocked_permits_everything() {
        for purpose in [
            SpendPurpose::Transfer,
            SpendPurpose::AddFee,
            SpendPurpose::ReclaimFee,
            SpendPurpose::DustCollection,
        ] {
            assert!(LockStatus::Unlocked.permits(purpose));
        }
    }

    #[test]
    fn locked_units_only_permit_their_owner() {
        assert!(LockStatus::LockedForReclaimFee.permits(SpendPurpose::ReclaimFee));
        assert!(!LockStatus::LockedForReclaimFee.permits(SpendPurpose::Transfer));
        assert!(!LockStatus::LockedForReclaimFee.permits(SpendPurpose::AddFee));

        assert!(LockStatus::LockedForAddFee.permits(SpendPurpose::AddFee));
        assert!(!LockStatus::LockedForAddFee.permits(SpendPurpose::DustCollection));

        assert!(LockStatus::LockedForDustCollection.permits(SpendPurpose::DustCollection));
        assert!(!LockStatus::LockedForDustCollection.permits(SpendPurpose::Transfer));
    }

    #[test]
    fn manual_lock_permits_nothing() {
        for purpose in [
            SpendPurpose::Transfer,
            SpendPurpose::AddFee,
            SpendPurpose::ReclaimFee,
            SpendPurpose::DustCollection,
        ] {
            assert!(!LockStatus::LockedManual.permits(purpose));
        }
    }
}
