//! # Transaction Builder
//!
//! Pure functions that turn unit state plus an intent into an unsigned
//! [`TransactionOrder`]. No I/O, no keys, no clocks: callers pass the state
//! they just read and the current round, and get back either an order or a
//! [`BuildError`] explaining which precondition failed.
//!
//! ## Preconditions enforced here
//!
//! - Locked units are refused unless the lock belongs to the flow building
//!   the order ([`LockStatus::permits`]).
//! - Amounts are non-zero and every sum is overflow-checked.
//! - Fee-credit transactions respect the fee cap, the addition window and
//!   the minimum fee amount.
//!
//! The ledger re-checks all of this; failing early here just gives the user
//! a useful message instead of a rejected submission.

use thiserror::Error;

use super::codec::CodecError;
use super::proof::TxRecordProof;
use super::types::{ClientMetadata, SplitTarget, TransactionOrder, TxAttributes, TxType};
use crate::config::WalletConfig;
use crate::partition::{Partition, PartitionId};
use crate::unit::{
    Bill, FeeCreditRecord, FungibleToken, FungibleUnit, LockError, LockReason, LockStatus,
    OwnerPredicate, SpendPurpose, UnitId,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons an order cannot be built from the given state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("unit {unit_id} is {status} and cannot be used for {purpose:?}")]
    Locked {
        unit_id: UnitId,
        status: LockStatus,
        purpose: SpendPurpose,
    },

    #[error("unit {unit_id}: {source}")]
    LockTransition {
        unit_id: UnitId,
        #[source]
        source: LockError,
    },

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("amount overflow")]
    AmountOverflow,

    #[error("split has no targets")]
    NoTargets,

    #[error("unit {unit_id} holds {value}, {required} required")]
    InsufficientValue {
        unit_id: UnitId,
        value: u64,
        required: u64,
    },

    #[error("max fee {max_fee} exceeds transferred amount {amount}")]
    FeeExceedsAmount { amount: u64, max_fee: u64 },

    #[error("addition window is empty: earliest {earliest} > latest {latest}")]
    InvalidAdditionWindow { earliest: u64, latest: u64 },

    #[error("fee credit transfer proof expired: latest addition time {latest_addition_time}, current round {current_round}")]
    ProofExpired {
        latest_addition_time: u64,
        current_round: u64,
    },

    #[error("amount {amount} is below the minimum fee amount {minimum}")]
    BelowMinimum { amount: u64, minimum: u64 },

    #[error("expected a {expected} record, got {got}")]
    WrongTransaction { expected: TxType, got: TxType },

    #[error("transfer targets partition {got}, not {expected}")]
    PartitionMismatch {
        expected: PartitionId,
        got: PartitionId,
    },

    #[error("proof targets unit {expected}, not {got}")]
    TargetMismatch { expected: UnitId, got: UnitId },

    #[error("proof was made against counter {expected} of {unit_id}, unit is now at {actual}")]
    StaleTarget {
        unit_id: UnitId,
        expected: u64,
        actual: u64,
    },

    #[error("token type {got} does not match target type {expected}")]
    TokenTypeMismatch { expected: UnitId, got: UnitId },

    #[error("dust source and target are the same unit {0}")]
    SameUnit(UnitId),

    #[error("nothing to swap")]
    EmptyBatch,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub type BuildResult<T> = Result<T, BuildError>;

// ---------------------------------------------------------------------------
// Common parameters
// ---------------------------------------------------------------------------

/// Client metadata shared by every builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderParams {
    /// Last round the order may be included in.
    pub timeout: u64,
    pub max_fee: u64,
}

impl OrderParams {
    /// Timeout `config.tx_timeout_rounds` past `current_round`.
    pub fn new(current_round: u64, config: &WalletConfig) -> Self {
        Self {
            timeout: current_round.saturating_add(config.tx_timeout_rounds),
            max_fee: config.max_fee,
        }
    }

    fn metadata(self, fee_credit_record_id: Option<&UnitId>) -> ClientMetadata {
        ClientMetadata {
            timeout: self.timeout,
            max_fee: self.max_fee,
            fee_credit_record_id: fee_credit_record_id.cloned(),
        }
    }
}

fn ensure_permits(unit_id: &UnitId, status: LockStatus, purpose: SpendPurpose) -> BuildResult<()> {
    if status.permits(purpose) {
        Ok(())
    } else {
        Err(BuildError::Locked {
            unit_id: unit_id.clone(),
            status,
            purpose,
        })
    }
}

fn checked_sum(amounts: impl IntoIterator<Item = u64>) -> BuildResult<u64> {
    amounts
        .into_iter()
        .try_fold(0u64, |acc, v| acc.checked_add(v))
        .ok_or(BuildError::AmountOverflow)
}

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// Transfers the whole bill to `new_owner`.
pub fn build_transfer(
    bill: &Bill,
    new_owner: OwnerPredicate,
    fee_credit_record_id: &UnitId,
    params: OrderParams,
) -> BuildResult<TransactionOrder> {
    ensure_permits(&bill.id, bill.lock_status, SpendPurpose::Transfer)?;
    if bill.value == 0 {
        return Err(BuildError::ZeroAmount);
    }
    Ok(TransactionOrder::new(
        Partition::Money.id(),
        bill.id.clone(),
        TxAttributes::Transfer {
            new_owner,
            value: bill.value,
            counter: bill.counter,
        },
        params.metadata(Some(fee_credit_record_id)),
    ))
}

/// Splits `targets` off `bill`. The bill keeps `value - sum(targets)`,
/// which may be zero.
pub fn build_split(
    bill: &Bill,
    targets: Vec<SplitTarget>,
    fee_credit_record_id: &UnitId,
    params: OrderParams,
) -> BuildResult<TransactionOrder> {
    ensure_permits(&bill.id, bill.lock_status, SpendPurpose::Transfer)?;
    if targets.is_empty() {
        return Err(BuildError::NoTargets);
    }
    if targets.iter().any(|t| t.amount == 0) {
        return Err(BuildError::ZeroAmount);
    }
    let total = checked_sum(targets.iter().map(|t| t.amount))?;
    if total > bill.value {
        return Err(BuildError::InsufficientValue {
            unit_id: bill.id.clone(),
            value: bill.value,
            required: total,
        });
    }
    Ok(TransactionOrder::new(
        Partition::Money.id(),
        bill.id.clone(),
        TxAttributes::Split {
            targets,
            counter: bill.counter,
        },
        params.metadata(Some(fee_credit_record_id)),
    ))
}

// ---------------------------------------------------------------------------
// Locking
// ---------------------------------------------------------------------------

/// Locks a bill or token on `partition`.
pub fn build_lock<U: FungibleUnit>(
    partition: Partition,
    unit: &U,
    reason: LockReason,
    fee_credit_record_id: &UnitId,
    params: OrderParams,
) -> BuildResult<TransactionOrder> {
    unit.lock_status()
        .lock(reason)
        .map_err(|source| BuildError::LockTransition {
            unit_id: unit.id().clone(),
            source,
        })?;
    Ok(TransactionOrder::new(
        partition.id(),
        unit.id().clone(),
        TxAttributes::Lock {
            reason,
            counter: unit.counter(),
        },
        params.metadata(Some(fee_credit_record_id)),
    ))
}

/// Unlocks a bill or token on `partition`.
pub fn build_unlock<U: FungibleUnit>(
    partition: Partition,
    unit: &U,
    fee_credit_record_id: &UnitId,
    params: OrderParams,
) -> BuildResult<TransactionOrder> {
    unit.lock_status()
        .unlock()
        .map_err(|source| BuildError::LockTransition {
            unit_id: unit.id().clone(),
            source,
        })?;
    Ok(TransactionOrder::new(
        partition.id(),
        unit.id().clone(),
        TxAttributes::Unlock {
            counter: unit.counter(),
        },
        params.metadata(Some(fee_credit_record_id)),
    ))
}

/// Locks a fee credit record. The record pays for its own lock.
pub fn build_lock_fc(
    partition: Partition,
    fcr: &FeeCreditRecord,
    reason: LockReason,
    params: OrderParams,
) -> BuildResult<TransactionOrder> {
    fcr.lock_status
        .lock(reason)
        .map_err(|source| BuildError::LockTransition {
            unit_id: fcr.id.clone(),
            source,
        })?;
    Ok(TransactionOrder::new(
        partition.id(),
        fcr.id.clone(),
        TxAttributes::LockFeeCredit {
            reason,
            counter: fcr.counter,
        },
        params.metadata(Some(&fcr.id)),
    ))
}

/// Unlocks a fee credit record. The record pays for its own unlock.
pub fn build_unlock_fc(
    partition: Partition,
    fcr: &FeeCreditRecord,
    params: OrderParams,
) -> BuildResult<TransactionOrder> {
    fcr.lock_status
        .unlock()
        .map_err(|source| BuildError::LockTransition {
            unit_id: fcr.id.clone(),
            source,
        })?;
    Ok(TransactionOrder::new(
        partition.id(),
        fcr.id.clone(),
        TxAttributes::UnlockFeeCredit {
            counter: fcr.counter,
        },
        params.metadata(Some(&fcr.id)),
    ))
}

// ---------------------------------------------------------------------------
// Fee credit
// ---------------------------------------------------------------------------

/// Target side of a `transferFC`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeCreditTarget {
    pub partition: Partition,
    pub record_id: UnitId,
    /// Current counter of the record, `None` if it does not exist yet.
    pub record_counter: Option<u64>,
    pub earliest_addition_time: u64,
    pub latest_addition_time: u64,
}

/// Moves `amount` out of `bill` towards a fee credit record on another (or
/// the same) partition. The fee is paid out of `amount`.
pub fn build_transfer_fc(
    bill: &Bill,
    amount: u64,
    target: &FeeCreditTarget,
    params: OrderParams,
) -> BuildResult<TransactionOrder> {
    ensure_permits(&bill.id, bill.lock_status, SpendPurpose::AddFee)?;
    if amount == 0 {
        return Err(BuildError::ZeroAmount);
    }
    if params.max_fee > amount {
        return Err(BuildError::FeeExceedsAmount {
            amount,
            max_fee: params.max_fee,
        });
    }
    if amount > bill.value {
        return Err(BuildError::InsufficientValue {
            unit_id: bill.id.clone(),
            value: bill.value,
            required: amount,
        });
    }
    if target.earliest_addition_time > target.latest_addition_time {
        return Err(BuildError::InvalidAdditionWindow {
            earliest: target.earliest_addition_time,
            latest: target.latest_addition_time,
        });
    }
    Ok(TransactionOrder::new(
        Partition::Money.id(),
        bill.id.clone(),
        TxAttributes::TransferFeeCredit {
            amount,
            target_partition: target.partition.id(),
            target_record_id: target.record_id.clone(),
            target_record_counter: target.record_counter,
            earliest_addition_time: target.earliest_addition_time,
            latest_addition_time: target.latest_addition_time,
            counter: bill.counter,
        },
        params.metadata(None),
    ))
}

/// Credits the fee credit record named in a confirmed `transferFC`.
///
/// Fails with [`BuildError::ProofExpired`] once `current_round` is past the
/// transfer's latest addition time. The order's timeout is clamped to that
/// bound, so a built `addFC` can never outlive its proof.
pub fn build_add_fc(
    partition: Partition,
    owner: OwnerPredicate,
    transfer: &TxRecordProof,
    current_round: u64,
    params: OrderParams,
) -> BuildResult<TransactionOrder> {
    let order = &transfer.record.order;
    let TxAttributes::TransferFeeCredit {
        target_partition,
        target_record_id,
        latest_addition_time,
        ..
    } = &order.attributes
    else {
        return Err(BuildError::WrongTransaction {
            expected: TxType::TransferFeeCredit,
            got: order.tx_type(),
        });
    };
    if *target_partition != partition.id() {
        return Err(BuildError::PartitionMismatch {
            expected: partition.id(),
            got: *target_partition,
        });
    }
    if current_round > *latest_addition_time {
        return Err(BuildError::ProofExpired {
            latest_addition_time: *latest_addition_time,
            current_round,
        });
    }
    let params = OrderParams {
        timeout: params.timeout.min(*latest_addition_time),
        ..params
    };
    Ok(TransactionOrder::new(
        partition.id(),
        target_record_id.clone(),
        TxAttributes::AddFeeCredit {
            owner,
            transfer: Box::new(transfer.clone()),
        },
        params.metadata(None),
    ))
}

/// Empties `fcr` towards `target_bill` on the money partition.
pub fn build_close_fc(
    partition: Partition,
    fcr: &FeeCreditRecord,
    target_bill: &Bill,
    minimum: u64,
    params: OrderParams,
) -> BuildResult<TransactionOrder> {
    if fcr.balance < minimum {
        return Err(BuildError::BelowMinimum {
            amount: fcr.balance,
            minimum,
        });
    }
    if fcr.lock_status.is_locked() {
        return Err(BuildError::Locked {
            unit_id: fcr.id.clone(),
            status: fcr.lock_status,
            purpose: SpendPurpose::ReclaimFee,
        });
    }
    ensure_permits(&target_bill.id, target_bill.lock_status, SpendPurpose::ReclaimFee)?;
    Ok(TransactionOrder::new(
        partition.id(),
        fcr.id.clone(),
        TxAttributes::CloseFeeCredit {
            amount: fcr.balance,
            target_unit_id: target_bill.id.clone(),
            target_unit_counter: target_bill.counter,
            counter: fcr.counter,
        },
        params.metadata(None),
    ))
}

/// Folds a confirmed `closeFC` back into `bill`.
pub fn build_reclaim_fc(
    bill: &Bill,
    close: &TxRecordProof,
    minimum: u64,
    params: OrderParams,
) -> BuildResult<TransactionOrder> {
    let order = &close.record.order;
    let TxAttributes::CloseFeeCredit {
        amount,
        target_unit_id,
        target_unit_counter,
        ..
    } = &order.attributes
    else {
        return Err(BuildError::WrongTransaction {
            expected: TxType::CloseFeeCredit,
            got: order.tx_type(),
        });
    };
    if *target_unit_id != bill.id {
        return Err(BuildError::TargetMismatch {
            expected: target_unit_id.clone(),
            got: bill.id.clone(),
        });
    }
    if *amount < minimum {
        return Err(BuildError::BelowMinimum {
            amount: *amount,
            minimum,
        });
    }
    if *target_unit_counter != bill.counter {
        return Err(BuildError::StaleTarget {
            unit_id: bill.id.clone(),
            expected: *target_unit_counter,
            actual: bill.counter,
        });
    }
    ensure_permits(&bill.id, bill.lock_status, SpendPurpose::ReclaimFee)?;
    Ok(TransactionOrder::new(
        Partition::Money.id(),
        bill.id.clone(),
        TxAttributes::ReclaimFeeCredit {
            close: Box::new(close.clone()),
            counter: bill.counter,
        },
        params.metadata(None),
    ))
}

// ---------------------------------------------------------------------------
// Dust collection
// ---------------------------------------------------------------------------

fn check_dust_pair<U: FungibleUnit>(source: &U, target: &U) -> BuildResult<()> {
    if source.id() == target.id() {
        return Err(BuildError::SameUnit(source.id().clone()));
    }
    if source.lock_status().is_locked() {
        return Err(BuildError::Locked {
            unit_id: source.id().clone(),
            status: source.lock_status(),
            purpose: SpendPurpose::DustCollection,
        });
    }
    if source.value() == 0 {
        return Err(BuildError::ZeroAmount);
    }
    ensure_permits(target.id(), target.lock_status(), SpendPurpose::DustCollection)
}

/// Zeroes `source` on behalf of `target`. The value reappears in the target
/// when the matching swap executes.
pub fn build_dust_transfer(
    source: &Bill,
    target: &Bill,
    fee_credit_record_id: &UnitId,
    params: OrderParams,
) -> BuildResult<TransactionOrder> {
    check_dust_pair(source, target)?;
    Ok(TransactionOrder::new(
        Partition::Money.id(),
        source.id.clone(),
        TxAttributes::DustTransfer {
            value: source.value,
            target_unit_id: target.id.clone(),
            target_unit_counter: target.counter,
            counter: source.counter,
        },
        params.metadata(Some(fee_credit_record_id)),
    ))
}

/// Sums confirmed dust transfers into `target` and releases its lock.
pub fn build_dust_swap(
    target: &Bill,
    transfers: Vec<TxRecordProof>,
    fee_credit_record_id: &UnitId,
    params: OrderParams,
) -> BuildResult<TransactionOrder> {
    if transfers.is_empty() {
        return Err(BuildError::EmptyBatch);
    }
    ensure_permits(&target.id, target.lock_status, SpendPurpose::DustCollection)?;
    let mut values = Vec::with_capacity(transfers.len());
    for proof in &transfers {
        match &proof.record.order.attributes {
            TxAttributes::DustTransfer {
                value,
                target_unit_id,
                ..
            } => {
                if *target_unit_id != target.id {
                    return Err(BuildError::TargetMismatch {
                        expected: target.id.clone(),
                        got: target_unit_id.clone(),
                    });
                }
                values.push(*value);
            }
            other => {
                return Err(BuildError::WrongTransaction {
                    expected: TxType::DustTransfer,
                    got: other.tx_type(),
                })
            }
        }
    }
    checked_sum(values.iter().copied().chain([target.value]))?;
    Ok(TransactionOrder::new(
        Partition::Money.id(),
        target.id.clone(),
        TxAttributes::SwapDust {
            transfers,
            counter: target.counter,
        },
        params.metadata(Some(fee_credit_record_id)),
    ))
}

/// Burns `source` towards a join into `target`. Both must share a type.
pub fn build_token_burn(
    source: &FungibleToken,
    target: &FungibleToken,
    fee_credit_record_id: &UnitId,
    params: OrderParams,
) -> BuildResult<TransactionOrder> {
    if source.type_id != target.type_id {
        return Err(BuildError::TokenTypeMismatch {
            expected: target.type_id.clone(),
            got: source.type_id.clone(),
        });
    }
    check_dust_pair(source, target)?;
    Ok(TransactionOrder::new(
        Partition::Tokens.id(),
        source.id.clone(),
        TxAttributes::BurnToken {
            type_id: source.type_id.clone(),
            value: source.value,
            target_token_id: target.id.clone(),
            target_token_counter: target.counter,
            counter: source.counter,
        },
        params.metadata(Some(fee_credit_record_id)),
    ))
}

/// Joins confirmed burns into `target` and releases its lock.
pub fn build_token_join(
    target: &FungibleToken,
    burns: Vec<TxRecordProof>,
    fee_credit_record_id: &UnitId,
    params: OrderParams,
) -> BuildResult<TransactionOrder> {
    if burns.is_empty() {
        return Err(BuildError::EmptyBatch);
    }
    ensure_permits(&target.id, target.lock_status, SpendPurpose::DustCollection)?;
    let mut values = Vec::with_capacity(burns.len());
    for proof in &burns {
        match &proof.record.order.attributes {
            TxAttributes::BurnToken {
                type_id,
                value,
                target_token_id,
                ..
            } => {
                if *type_id != target.type_id {
                    return Err(BuildError::TokenTypeMismatch {
                        expected: target.type_id.clone(),
                        got: type_id.clone(),
                    });
                }
                if *target_token_id != target.id {
                    return Err(BuildError::TargetMismatch {
                        expected: target.id.clone(),
                        got: target_token_id.clone(),
                    });
                }
                values.push(*value);
            }
            other => {
                return Err(BuildError::WrongTransaction {
                    expected: TxType::BurnToken,
                    got: other.tx_type(),
                })
            }
        }
    }
    checked_sum(values.iter().copied().chain([target.value]))?;
    Ok(TransactionOrder::new(
        Partition::Tokens.id(),
        target.id.clone(),
        TxAttributes::JoinToken {
            burns,
            counter: target.counter,
        },
        params.metadata(Some(fee_credit_record_id)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::transaction::proof::{TxProof, UnicityCertificate};
    use crate::transaction::types::{ServerMetadata, TransactionRecord, TxStatus};
    use crate::unit::UnitType;

    const PARAMS: OrderParams = OrderParams {
        timeout: 20,
        max_fee: 10,
    };

    fn bill(seed: &[u8], value: u64) -> Bill {
        Bill {
            id: UnitId::derive(seed, UnitType::Bill),
            value,
            counter: 3,
            lock_status: LockStatus::Unlocked,
            owner: OwnerPredicate::burned(),
        }
    }

    fn fcr(balance: u64) -> FeeCreditRecord {
        FeeCreditRecord {
            id: UnitId::derive(b"fcr", UnitType::FeeCredit),
            balance,
            counter: 1,
            lock_status: LockStatus::Unlocked,
            owner: OwnerPredicate::burned(),
            timeout: 100,
        }
    }

    fn fcr_id() -> UnitId {
        UnitId::derive(b"fcr", UnitType::FeeCredit)
    }

    fn target(window: (u64, u64)) -> FeeCreditTarget {
        FeeCreditTarget {
            partition: Partition::Tokens,
            record_id: fcr_id(),
            record_counter: None,
            earliest_addition_time: window.0,
            latest_addition_time: window.1,
        }
    }

    /// Wraps an order in an uncertified record; builders never verify proofs.
    fn confirmed(order: TransactionOrder) -> TxRecordProof {
        TxRecordProof {
            record: TransactionRecord {
                order,
                server_metadata: ServerMetadata {
                    actual_fee: 1,
                    status: TxStatus::Successful,
                    target_units: vec![],
                },
            },
            proof: TxProof {
                chain: vec![],
                certificate: UnicityCertificate::new(Partition::Money.id(), 1, [0u8; 32]),
            },
        }
    }

    fn owner() -> OwnerPredicate {
        OwnerPredicate::p2pkh(&Keypair::from_seed(&[9u8; 32]).public_key())
    }

    // -- transfer / split ---------------------------------------------------

    #[test]
    fn transfer_quotes_value_and_counter() {
        let b = bill(b"a", 100);
        let order = build_transfer(&b, owner(), &fcr_id(), PARAMS).unwrap();
        assert_eq!(order.unit_id, b.id);
        assert_eq!(order.client_metadata.timeout, 20);
        assert_eq!(order.client_metadata.fee_credit_record_id, Some(fcr_id()));
        assert!(matches!(
            order.attributes,
            TxAttributes::Transfer { value: 100, counter: 3, .. }
        ));
    }

    #[test]
    fn locked_bill_cannot_be_transferred_or_split() {
        for status in [
            LockStatus::LockedManual,
            LockStatus::LockedForAddFee,
            LockStatus::LockedForReclaimFee,
            LockStatus::LockedForDustCollection,
        ] {
            let mut b = bill(b"a", 100);
            b.lock_status = status;
            assert!(matches!(
                build_transfer(&b, owner(), &fcr_id(), PARAMS),
                Err(BuildError::Locked { .. })
            ));
            let targets = vec![SplitTarget { amount: 1, owner: owner() }];
            assert!(matches!(
                build_split(&b, targets, &fcr_id(), PARAMS),
                Err(BuildError::Locked { .. })
            ));
        }
    }

    #[test]
    fn split_leaves_remainder_on_source() {
        let b = bill(b"a", 100);
        let targets = vec![SplitTarget { amount: 50, owner: owner() }];
        let order = build_split(&b, targets, &fcr_id(), PARAMS).unwrap();
        let TxAttributes::Split { targets, counter } = order.attributes else {
            panic!("expected split");
        };
        assert_eq!(counter, 3);
        assert_eq!(targets.iter().map(|t| t.amount).sum::<u64>(), 50);
    }

    #[test]
    fn split_of_entire_value_is_allowed() {
        let b = bill(b"a", 100);
        let targets = vec![
            SplitTarget { amount: 60, owner: owner() },
            SplitTarget { amount: 40, owner: owner() },
        ];
        assert!(build_split(&b, targets, &fcr_id(), PARAMS).is_ok());
    }

    #[test]
    fn split_rejects_bad_amounts() {
        let b = bill(b"a", 100);
        assert_eq!(
            build_split(&b, vec![], &fcr_id(), PARAMS),
            Err(BuildError::NoTargets)
        );
        assert_eq!(
            build_split(&b, vec![SplitTarget { amount: 0, owner: owner() }], &fcr_id(), PARAMS),
            Err(BuildError::ZeroAmount)
        );
        assert!(matches!(
            build_split(&b, vec![SplitTarget { amount: 101, owner: owner() }], &fcr_id(), PARAMS),
            Err(BuildError::InsufficientValue { value: 100, required: 101, .. })
        ));
        let overflow = vec![
            SplitTarget { amount: u64::MAX, owner: owner() },
            SplitTarget { amount: 1, owner: owner() },
        ];
        assert_eq!(
            build_split(&b, overflow, &fcr_id(), PARAMS),
            Err(BuildError::AmountOverflow)
        );
    }

    // -- locks --------------------------------------------------------------

    #[test]
    fn lock_and_unlock_follow_state_machine() {
        let mut b = bill(b"a", 5);
        let order = build_lock(Partition::Money, &b, LockReason::Manual, &fcr_id(), PARAMS).unwrap();
        assert!(matches!(
            order.attributes,
            TxAttributes::Lock { reason: LockReason::Manual, counter: 3 }
        ));
        assert!(matches!(
            build_unlock(Partition::Money, &b, &fcr_id(), PARAMS),
            Err(BuildError::LockTransition { source: LockError::NotLocked, .. })
        ));

        b.lock_status = LockStatus::LockedManual;
        assert!(build_unlock(Partition::Money, &b, &fcr_id(), PARAMS).is_ok());
        assert!(matches!(
            build_lock(Partition::Money, &b, LockReason::AddFee, &fcr_id(), PARAMS),
            Err(BuildError::LockTransition { .. })
        ));
    }

    #[test]
    fn fee_credit_lock_pays_from_itself() {
        let record = fcr(50);
        let order = build_lock_fc(Partition::Tokens, &record, LockReason::Manual, PARAMS).unwrap();
        assert_eq!(order.partition_id, Partition::Tokens.id());
        assert_eq!(order.client_metadata.fee_credit_record_id, Some(record.id.clone()));
        assert!(build_unlock_fc(Partition::Tokens, &record, PARAMS).is_err());
    }

    // -- transferFC / addFC -------------------------------------------------

    #[test]
    fn transfer_fc_checks_amount_bounds() {
        let b = bill(b"a", 100);
        assert_eq!(
            build_transfer_fc(&b, 5, &target((1, 11)), PARAMS),
            Err(BuildError::FeeExceedsAmount { amount: 5, max_fee: 10 })
        );
        assert!(matches!(
            build_transfer_fc(&b, 101, &target((1, 11)), PARAMS),
            Err(BuildError::InsufficientValue { .. })
        ));
        assert_eq!(
            build_transfer_fc(&b, 0, &target((1, 11)), PARAMS),
            Err(BuildError::ZeroAmount)
        );
        assert!(matches!(
            build_transfer_fc(&b, 50, &target((12, 11)), PARAMS),
            Err(BuildError::InvalidAdditionWindow { .. })
        ));
        let order = build_transfer_fc(&b, 100, &target((1, 11)), PARAMS).unwrap();
        assert_eq!(order.client_metadata.fee_credit_record_id, None);
    }

    #[test]
    fn transfer_fc_accepts_bill_locked_for_add_fee_only() {
        let mut b = bill(b"a", 100);
        b.lock_status = LockStatus::LockedForAddFee;
        assert!(build_transfer_fc(&b, 50, &target((1, 11)), PARAMS).is_ok());
        b.lock_status = LockStatus::LockedForReclaimFee;
        assert!(matches!(
            build_transfer_fc(&b, 50, &target((1, 11)), PARAMS),
            Err(BuildError::Locked { .. })
        ));
    }

    #[test]
    fn add_fc_timeout_is_clamped_to_latest_addition_time() {
        let b = bill(b"a", 100);
        let transfer = confirmed(build_transfer_fc(&b, 60, &target((1, 15)), PARAMS).unwrap());
        let order = build_add_fc(Partition::Tokens, owner(), &transfer, 12, PARAMS).unwrap();
        assert_eq!(order.client_metadata.timeout, 15);
        assert_eq!(order.unit_id, fcr_id());
        assert_eq!(order.partition_id, Partition::Tokens.id());
    }

    #[test]
    fn add_fc_rejects_expired_proof() {
        let b = bill(b"a", 100);
        let transfer = confirmed(build_transfer_fc(&b, 60, &target((1, 15)), PARAMS).unwrap());
        assert_eq!(
            build_add_fc(Partition::Tokens, owner(), &transfer, 16, PARAMS),
            Err(BuildError::ProofExpired {
                latest_addition_time: 15,
                current_round: 16
            })
        );
    }

    #[test]
    fn add_fc_rejects_other_partition_or_type() {
        let b = bill(b"a", 100);
        let transfer = confirmed(build_transfer_fc(&b, 60, &target((1, 15)), PARAMS).unwrap());
        assert!(matches!(
            build_add_fc(Partition::Evm, owner(), &transfer, 2, PARAMS),
            Err(BuildError::PartitionMismatch { .. })
        ));
        let not_transfer = confirmed(build_transfer(&b, owner(), &fcr_id(), PARAMS).unwrap());
        assert!(matches!(
            build_add_fc(Partition::Tokens, owner(), &not_transfer, 2, PARAMS),
            Err(BuildError::WrongTransaction { .. })
        ));
    }

    // -- closeFC / reclaimFC ------------------------------------------------

    #[test]
    fn close_fc_requires_minimum_balance() {
        let b = bill(b"a", 1);
        assert_eq!(
            build_close_fc(Partition::Tokens, &fcr(29), &b, 30, PARAMS),
            Err(BuildError::BelowMinimum { amount: 29, minimum: 30 })
        );
        let order = build_close_fc(Partition::Tokens, &fcr(30), &b, 30, PARAMS).unwrap();
        assert!(matches!(
            order.attributes,
            TxAttributes::CloseFeeCredit { amount: 30, target_unit_counter: 3, counter: 1, .. }
        ));
    }

    #[test]
    fn close_fc_refuses_locked_record() {
        let mut record = fcr(100);
        record.lock_status = LockStatus::LockedManual;
        assert!(matches!(
            build_close_fc(Partition::Tokens, &record, &bill(b"a", 1), 30, PARAMS),
            Err(BuildError::Locked { .. })
        ));
    }

    #[test]
    fn reclaim_fc_checks_target_and_counter() {
        let b = bill(b"a", 1);
        let close = confirmed(build_close_fc(Partition::Tokens, &fcr(100), &b, 30, PARAMS).unwrap());
        assert!(build_reclaim_fc(&b, &close, 30, PARAMS).is_ok());

        let other = bill(b"b", 1);
        assert!(matches!(
            build_reclaim_fc(&other, &close, 30, PARAMS),
            Err(BuildError::TargetMismatch { .. })
        ));

        let mut moved = b.clone();
        moved.counter += 1;
        assert!(matches!(
            build_reclaim_fc(&moved, &close, 30, PARAMS),
            Err(BuildError::StaleTarget { expected: 3, actual: 4, .. })
        ));
    }

    #[test]
    fn reclaim_fc_only_spends_unlocked_or_reclaim_locked_bill() {
        let mut b = bill(b"a", 1);
        b.lock_status = LockStatus::LockedForReclaimFee;
        let close = confirmed(build_close_fc(Partition::Tokens, &fcr(100), &b, 30, PARAMS).unwrap());
        assert!(build_reclaim_fc(&b, &close, 30, PARAMS).is_ok());
        b.lock_status = LockStatus::LockedForDustCollection;
        assert!(matches!(
            build_reclaim_fc(&b, &close, 30, PARAMS),
            Err(BuildError::Locked { .. })
        ));
    }

    // -- dust ---------------------------------------------------------------

    #[test]
    fn dust_transfer_and_swap() {
        let mut target_bill = bill(b"t", 100);
        target_bill.lock_status = LockStatus::LockedForDustCollection;
        let source = bill(b"s", 1);

        let transfer = build_dust_transfer(&source, &target_bill, &fcr_id(), PARAMS).unwrap();
        assert!(matches!(
            transfer.attributes,
            TxAttributes::DustTransfer { value: 1, target_unit_counter: 3, .. }
        ));

        let swap =
            build_dust_swap(&target_bill, vec![confirmed(transfer)], &fcr_id(), PARAMS).unwrap();
        assert_eq!(swap.unit_id, target_bill.id);
        assert_eq!(swap.tx_type(), TxType::SwapDust);
    }

    #[test]
    fn dust_rejects_self_locked_sources_and_foreign_proofs() {
        let target_bill = bill(b"t", 100);
        assert!(matches!(
            build_dust_transfer(&target_bill, &target_bill, &fcr_id(), PARAMS),
            Err(BuildError::SameUnit(_))
        ));

        let mut locked_source = bill(b"s", 1);
        locked_source.lock_status = LockStatus::LockedManual;
        assert!(matches!(
            build_dust_transfer(&locked_source, &target_bill, &fcr_id(), PARAMS),
            Err(BuildError::Locked { .. })
        ));

        assert_eq!(
            build_dust_swap(&target_bill, vec![], &fcr_id(), PARAMS),
            Err(BuildError::EmptyBatch)
        );

        let elsewhere = bill(b"x", 7);
        let foreign =
            build_dust_transfer(&bill(b"s", 1), &elsewhere, &fcr_id(), PARAMS).unwrap();
        assert!(matches!(
            build_dust_swap(&target_bill, vec![confirmed(foreign)], &fcr_id(), PARAMS),
            Err(BuildError::TargetMismatch { .. })
        ));
    }

    #[test]
    fn token_burn_requires_matching_type() {
        let token = |seed: &[u8], type_seed: &[u8]| FungibleToken {
            id: UnitId::derive(seed, UnitType::FungibleToken),
            type_id: UnitId::derive(type_seed, UnitType::TokenType),
            value: 5,
            counter: 0,
            lock_status: LockStatus::Unlocked,
            owner: OwnerPredicate::burned(),
        };
        let target_token = token(b"t", b"gold");
        assert!(matches!(
            build_token_burn(&token(b"s", b"silver"), &target_token, &fcr_id(), PARAMS),
            Err(BuildError::TokenTypeMismatch { .. })
        ));
        let burn = build_token_burn(&token(b"s", b"gold"), &target_token, &fcr_id(), PARAMS).unwrap();
        assert_eq!(burn.partition_id, Partition::Tokens.id());
        let join = build_token_join(&target_token, vec![confirmed(burn)], &fcr_id(), PARAMS).unwrap();
        assert_eq!(join.tx_type(), TxType::JoinToken);
    }
}
