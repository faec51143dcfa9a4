//! # Fee Credit Manager
//!
//! Drives the add and reclaim protocols one persisted stage at a time.
//!
//! ```text
//!   add:      Idle ─▶ [LockFeeCreditBroadcast] ─▶ TransferFcBroadcast ─▶ TransferFcConfirmed
//!                                                                         │
//!                                  Idle ◀── AddFcBroadcast ◀──────────────┘
//!
//!   reclaim:  Idle ─▶ [LockBillBroadcast] ─▶ CloseFcBroadcast ─▶ CloseFcConfirmed
//!                                                                  │
//!                             Idle ◀── ReclaimFcBroadcast ◀────────┘
//! ```
//!
//! Every stage is written to the [`WalletDB`] before its order is broadcast
//! and replaced once the order confirms. Calling `add_fee_credit` or
//! `reclaim_fee_credit` again for an account with a pending process picks up
//! at the recorded stage: a recorded broadcast is confirmed, never resent.
//!
//! ## Failure handling
//!
//! | Failure                                  | Pending record                 |
//! |------------------------------------------|--------------------------------|
//! | first-leg order will never execute       | removed, nothing is in transit |
//! | second-leg order will never execute      | kept, order rebuilt            |
//! | addFC proof expired / reclaim target gone | removed, value lost, `warn!`  |
//! | cancelled, wait budget, transport error  | kept, resumable                |

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::{FeeError, FeeResult};
use super::pending::{FeeStage, PendingFeeProcess, ProcessKind};
use crate::account::AccountKeys;
use crate::cancel::CancelToken;
use crate::config::WalletConfig;
use crate::crypto::{Keypair, PublicKey};
use crate::ledger::{fetch_bill, fetch_bills, fetch_fee_credit, LedgerClient};
use crate::partition::Partition;
use crate::publisher::{PublishError, TxPublisher};
use crate::storage::WalletDB;
use crate::transaction::builder::{
    build_add_fc, build_close_fc, build_lock, build_lock_fc, build_reclaim_fc,
    build_transfer_fc, build_unlock_fc,
};
use crate::transaction::{
    signed, BuildError, FeeCreditTarget, OrderParams, TransactionOrder, TxAttributes,
    TxRecordProof, TxType,
};
use crate::unit::{Bill, FeeCreditRecord, LockReason, LockStatus, OwnerPredicate, SpendPurpose};

/// Rebuilds of a dead second-leg order before giving the process back to
/// the caller.
const MAX_SECOND_LEG_ATTEMPTS: u32 = 3;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct AddFeeCreditOutcome {
    /// Confirmed proofs in execution order.
    pub proofs: Vec<TxRecordProof>,
    pub fee_paid: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ReclaimFeeCreditOutcome {
    pub lock: Option<TxRecordProof>,
    pub close_fc: Option<TxRecordProof>,
    pub reclaim_fc: Option<TxRecordProof>,
    pub fee_paid: u64,
    /// Value credited to the target bill.
    pub reclaimed: u64,
}

/// Proofs confirmed during one call.
#[derive(Debug, Default)]
struct Progress {
    proofs: Vec<TxRecordProof>,
}

impl Progress {
    fn push(&mut self, proof: TxRecordProof) -> TxRecordProof {
        self.proofs.push(proof.clone());
        proof
    }

    fn fee_paid(&self) -> u64 {
        self.proofs.iter().map(TxRecordProof::actual_fee).sum()
    }

    fn into_add(self) -> AddFeeCreditOutcome {
        AddFeeCreditOutcome {
            fee_paid: self.fee_paid(),
            proofs: self.proofs,
        }
    }

    fn into_reclaim(self) -> ReclaimFeeCreditOutcome {
        let mut outcome = ReclaimFeeCreditOutcome {
            fee_paid: self.fee_paid(),
            ..Default::default()
        };
        for proof in self.proofs {
            match proof.record.order.tx_type() {
                TxType::Lock => outcome.lock = Some(proof),
                TxType::CloseFeeCredit => outcome.close_fc = Some(proof),
                TxType::ReclaimFeeCredit => outcome.reclaim_fc = Some(proof),
                _ => {}
            }
        }
        if let Some(reclaim) = &outcome.reclaim_fc {
            if let TxAttributes::ReclaimFeeCredit { close, .. } = &reclaim.record.order.attributes {
                if let TxAttributes::CloseFeeCredit { amount, .. } = &close.record.order.attributes {
                    outcome.reclaimed = amount
                        .saturating_sub(close.actual_fee())
                        .saturating_sub(reclaim.actual_fee());
                }
                // Confirmed by an earlier call when resuming.
                if outcome.close_fc.is_none() {
                    outcome.close_fc = Some((**close).clone());
                }
            }
        }
        outcome
    }
}

/// `true` when the failed step's order is known never to execute.
fn order_is_dead(err: &FeeError) -> bool {
    match err {
        FeeError::Step { source, .. } => source.order_never_executes(),
        _ => false,
    }
}

struct Account {
    index: u64,
    key: Keypair,
    owner: OwnerPredicate,
}

impl Account {
    fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }
}

// ---------------------------------------------------------------------------
// FeeManager
// ---------------------------------------------------------------------------

pub struct FeeManager {
    publisher: Arc<TxPublisher>,
    accounts: Arc<dyn AccountKeys>,
    db: WalletDB,
    account_locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl FeeManager {
    pub fn new(publisher: Arc<TxPublisher>, accounts: Arc<dyn AccountKeys>, db: WalletDB) -> Self {
        Self {
            publisher,
            accounts,
            db,
            account_locks: DashMap::new(),
        }
    }

    fn config(&self) -> &WalletConfig {
        self.publisher.config()
    }

    fn ledger(&self) -> &dyn LedgerClient {
        self.publisher.ledger().as_ref()
    }

    fn account_lock(&self, index: u64) -> Arc<Mutex<()>> {
        self.account_locks.entry(index).or_default().value().clone()
    }

    fn account(&self, index: u64) -> FeeResult<Account> {
        let key = self.accounts.account_key(index)?;
        let owner = OwnerPredicate::p2pkh(&key.public_key());
        Ok(Account { index, key, owner })
    }

    // -- Public operations --------------------------------------------------

    /// Moves `amount` from the account's bills into fee credit on
    /// `partition`, one bill per cycle, largest first.
    ///
    /// With a pending add for the same partition, finishes that process and
    /// then the cycles it still owed; `amount` is ignored.
    pub async fn add_fee_credit(
        &self,
        account_index: u64,
        amount: u64,
        partition: Partition,
        cancel: &CancelToken,
    ) -> FeeResult<AddFeeCreditOutcome> {
        let lock = self.account_lock(account_index);
        let _guard = lock.lock().await;
        let account = self.account(account_index)?;
        let mut progress = Progress::default();

        if let Some(pending) = self.db.get_pending(account_index)? {
            check_pending(&pending, ProcessKind::Add, partition)?;
            let remaining = pending.remaining;
            info!(
                account = account_index,
                %partition,
                stage = pending.stage.name(),
                remaining,
                "resuming pending fee credit addition"
            );
            self.drive(&account, pending, false, &mut progress, cancel)
                .await?;
            self.add_cycles(&account, partition, remaining, &mut progress, cancel)
                .await?;
            return Ok(progress.into_add());
        }

        let minimum = self.config().minimum_fee_amount;
        if amount.saturating_sub(self.config().max_fee) < minimum {
            return Err(FeeError::MinimumFeeAmount { amount, minimum });
        }
        let available = self
            .add_fee_sources(&account)
            .await?
            .iter()
            .fold(0u64, |acc, b| acc.saturating_add(b.value));
        if available < amount {
            return Err(FeeError::InsufficientBalance {
                available,
                required: amount,
            });
        }

        self.add_cycles(&account, partition, amount, &mut progress, cancel)
            .await?;

        let outcome = progress.into_add();
        info!(
            account = account_index,
            %partition,
            amount,
            fee = outcome.fee_paid,
            "fee credit added"
        );
        Ok(outcome)
    }

    /// Returns the whole fee credit balance on `partition` to one of the
    /// account's bills.
    pub async fn reclaim_fee_credit(
        &self,
        account_index: u64,
        partition: Partition,
        cancel: &CancelToken,
    ) -> FeeResult<ReclaimFeeCreditOutcome> {
        let lock = self.account_lock(account_index);
        let _guard = lock.lock().await;
        let account = self.account(account_index)?;
        let mut progress = Progress::default();

        if let Some(pending) = self.db.get_pending(account_index)? {
            check_pending(&pending, ProcessKind::Reclaim, partition)?;
            info!(
                account = account_index,
                %partition,
                stage = pending.stage.name(),
                "resuming pending fee credit reclaim"
            );
            self.drive(&account, pending, false, &mut progress, cancel)
                .await?;
            return Ok(progress.into_reclaim());
        }

        let record = self
            .fee_credit_record(&account, partition)
            .await?
            .ok_or(FeeError::NoFeeCredit(partition))?;
        let minimum = self.config().minimum_fee_amount;
        if record.balance < minimum {
            return Err(FeeError::MinimumFeeAmount {
                amount: record.balance,
                minimum,
            });
        }
        if record.lock_status.is_locked() {
            return Err(FeeError::FeeCreditLocked {
                partition,
                status: record.lock_status,
            });
        }

        let bill = self.reclaim_target(&account).await?;
        let stage = match self.bill_lock_order(&account, partition, &bill).await? {
            Some(order) => FeeStage::LockBillBroadcast { order },
            None => FeeStage::CloseFcBroadcast {
                order: self.close_order(&account, partition).await?,
            },
        };
        let pending = PendingFeeProcess::new(account_index, partition, record.balance, stage);
        self.db.create_pending(&pending)?;
        info!(
            account = account_index,
            %partition,
            balance = record.balance,
            bill = %bill.id,
            "starting fee credit reclaim"
        );
        self.drive(&account, pending, true, &mut progress, cancel)
            .await?;

        let outcome = progress.into_reclaim();
        info!(
            account = account_index,
            %partition,
            reclaimed = outcome.reclaimed,
            fee = outcome.fee_paid,
            "fee credit reclaimed"
        );
        Ok(outcome)
    }

    /// Locks the fee credit record manually. The record pays for its lock.
    pub async fn lock_fee_credit(
        &self,
        account_index: u64,
        partition: Partition,
        cancel: &CancelToken,
    ) -> FeeResult<TxRecordProof> {
        let lock = self.account_lock(account_index);
        let _guard = lock.lock().await;
        let account = self.account(account_index)?;
        let record = self.paying_record(&account, partition).await?;
        let order = build_lock_fc(
            partition,
            &record,
            LockReason::Manual,
            self.params(partition).await?,
        )?;
        let order = signed(order, &account.key)?;
        let proof = self.publish(partition, &order, true, cancel).await?;
        info!(account = account_index, %partition, "fee credit locked");
        Ok(proof)
    }

    /// Unlocks the fee credit record. The record pays for its unlock.
    pub async fn unlock_fee_credit(
        &self,
        account_index: u64,
        partition: Partition,
        cancel: &CancelToken,
    ) -> FeeResult<TxRecordProof> {
        let lock = self.account_lock(account_index);
        let _guard = lock.lock().await;
        let account = self.account(account_index)?;
        let record = self.paying_record(&account, partition).await?;
        let order = build_unlock_fc(partition, &record, self.params(partition).await?)?;
        let order = signed(order, &account.key)?;
        let proof = self.publish(partition, &order, true, cancel).await?;
        info!(account = account_index, %partition, "fee credit unlocked");
        Ok(proof)
    }

    /// The account's fee credit record on `partition`, `None` when it has
    /// never been created.
    pub async fn get_fee_credit(
        &self,
        account_index: u64,
        partition: Partition,
    ) -> FeeResult<Option<FeeCreditRecord>> {
        let account = self.account(account_index)?;
        self.fee_credit_record(&account, partition).await
    }

    pub fn pending_process(&self, account_index: u64) -> FeeResult<Option<PendingFeeProcess>> {
        Ok(self.db.get_pending(account_index)?)
    }

    /// Drops the account's pending process without finishing it.
    ///
    /// Refused while the recorded order can still be included. Abandoning
    /// a process that holds a confirmed first-leg proof forfeits its value.
    pub async fn abandon_pending(
        &self,
        account_index: u64,
    ) -> FeeResult<Option<PendingFeeProcess>> {
        let lock = self.account_lock(account_index);
        let _guard = lock.lock().await;
        let Some(pending) = self.db.get_pending(account_index)? else {
            return Ok(None);
        };
        if let Some(order) = pending.stage.in_flight() {
            let round = self.ledger().get_round_number(order.partition_id).await?;
            if round <= order.timeout() {
                return Err(FeeError::InFlight {
                    stage: pending.stage.name(),
                    timeout: order.timeout(),
                    round,
                });
            }
        }
        if pending.stage.held_proof().is_some() {
            warn!(
                account = account_index,
                partition = %pending.target_partition,
                amount = pending.amount,
                stage = pending.stage.name(),
                "abandoning a confirmed first leg, its value will not be credited"
            );
        }
        self.db.remove_pending(&pending)?;
        info!(account = account_index, stage = pending.stage.name(), "pending fee process abandoned");
        Ok(Some(pending))
    }

    // -- State machine ------------------------------------------------------

    /// Starts add cycles until `remaining` has been moved. Each cycle
    /// records what is left after it, so a resumed call can carry on.
    async fn add_cycles(
        &self,
        account: &Account,
        partition: Partition,
        mut remaining: u64,
        progress: &mut Progress,
        cancel: &CancelToken,
    ) -> FeeResult<()> {
        let minimum = self.config().minimum_fee_amount;
        while remaining > 0 {
            if cancel.is_cancelled() {
                return Err(PublishError::Cancelled.into());
            }
            let Some(bill) = self.add_fee_sources(account).await?.into_iter().next() else {
                return Err(FeeError::InsufficientBalance {
                    available: 0,
                    required: remaining,
                });
            };
            let cycle = remaining.max(minimum).min(bill.value);
            let stage = match self.fee_credit_lock_order(account, partition).await? {
                Some(order) => FeeStage::LockFeeCreditBroadcast { order },
                None => FeeStage::TransferFcBroadcast {
                    order: self.transfer_order(account, partition, cycle).await?,
                },
            };
            let left = remaining.saturating_sub(cycle);
            let pending =
                PendingFeeProcess::new(account.index, partition, cycle, stage).with_remaining(left);
            self.db.create_pending(&pending)?;
            info!(
                account = account.index,
                %partition,
                amount = cycle,
                remaining,
                "starting fee credit cycle"
            );
            self.drive(account, pending, true, progress, cancel).await?;
            remaining = left;
        }
        Ok(())
    }

    /// Runs `pending` to completion. When `submit` is false the first
    /// recorded order is only confirmed, as it was broadcast by an earlier
    /// call.
    async fn drive(
        &self,
        account: &Account,
        mut pending: PendingFeeProcess,
        mut submit: bool,
        progress: &mut Progress,
        cancel: &CancelToken,
    ) -> FeeResult<()> {
        let partition = pending.target_partition;
        let mut attempts = 0;
        loop {
            let next = match &pending.stage {
                FeeStage::LockFeeCreditBroadcast { order } => {
                    match self.publish(partition, order, submit, cancel).await {
                        Ok(proof) => {
                            progress.push(proof);
                        }
                        Err(e) => return self.first_leg_failed(&pending, e),
                    }
                    match self.transfer_order(account, partition, pending.amount).await {
                        Ok(order) => FeeStage::TransferFcBroadcast { order },
                        Err(e) => {
                            self.db.remove_pending(&pending)?;
                            return Err(e);
                        }
                    }
                }

                FeeStage::TransferFcBroadcast { order } => {
                    match self.publish(Partition::Money, order, submit, cancel).await {
                        Ok(proof) => FeeStage::TransferFcConfirmed {
                            transfer: progress.push(proof),
                        },
                        Err(e) => return self.first_leg_failed(&pending, e),
                    }
                }

                FeeStage::TransferFcConfirmed { transfer } => {
                    match self.add_order(account, partition, transfer).await {
                        Ok(order) => FeeStage::AddFcBroadcast {
                            transfer: transfer.clone(),
                            order,
                        },
                        Err(e @ FeeError::Build(BuildError::ProofExpired { .. })) => {
                            warn!(
                                account = account.index,
                                %partition,
                                amount = pending.amount,
                                "transferFC proof expired before it was added, value is lost"
                            );
                            self.db.remove_pending(&pending)?;
                            return Err(e);
                        }
                        Err(e) => return Err(e),
                    }
                }

                FeeStage::AddFcBroadcast { transfer, order } => {
                    match self.publish(partition, order, submit, cancel).await {
                        Ok(proof) => {
                            progress.push(proof);
                            self.db.remove_pending(&pending)?;
                            debug!(account = account.index, %partition, "fee credit cycle complete");
                            return Ok(());
                        }
                        Err(e) if order_is_dead(&e) && attempts < MAX_SECOND_LEG_ATTEMPTS => {
                            attempts += 1;
                            warn!(error = %e, attempts, "addFC will not execute, rebuilding");
                            FeeStage::TransferFcConfirmed {
                                transfer: transfer.clone(),
                            }
                        }
                        Err(e) => return Err(e),
                    }
                }

                FeeStage::LockBillBroadcast { order } => {
                    match self.publish(Partition::Money, order, submit, cancel).await {
                        Ok(proof) => {
                            progress.push(proof);
                        }
                        Err(e) => return self.first_leg_failed(&pending, e),
                    }
                    match self.close_order(account, partition).await {
                        Ok(order) => FeeStage::CloseFcBroadcast { order },
                        Err(e) => {
                            self.db.remove_pending(&pending)?;
                            return Err(e);
                        }
                    }
                }

                FeeStage::CloseFcBroadcast { order } => {
                    match self.publish(partition, order, submit, cancel).await {
                        Ok(proof) => FeeStage::CloseFcConfirmed {
                            close: progress.push(proof),
                        },
                        Err(e) => return self.first_leg_failed(&pending, e),
                    }
                }

                FeeStage::CloseFcConfirmed { close } => match self.reclaim_order(account, close).await {
                    Ok(order) => FeeStage::ReclaimFcBroadcast {
                        close: close.clone(),
                        order,
                    },
                    Err(
                        e @ (FeeError::NoTargetBill
                        | FeeError::Build(BuildError::StaleTarget { .. })),
                    ) => {
                        warn!(
                            account = account.index,
                            %partition,
                            amount = pending.amount,
                            error = %e,
                            "closed fee credit can no longer be reclaimed, value is lost"
                        );
                        self.db.remove_pending(&pending)?;
                        return Err(e);
                    }
                    Err(e) => return Err(e),
                },

                FeeStage::ReclaimFcBroadcast { close, order } => {
                    match self.publish(Partition::Money, order, submit, cancel).await {
                        Ok(proof) => {
                            progress.push(proof);
                            self.db.remove_pending(&pending)?;
                            return Ok(());
                        }
                        Err(e) if order_is_dead(&e) && attempts < MAX_SECOND_LEG_ATTEMPTS => {
                            attempts += 1;
                            warn!(error = %e, attempts, "reclaimFC will not execute, rebuilding");
                            FeeStage::CloseFcConfirmed {
                                close: close.clone(),
                            }
                        }
                        Err(e) => return Err(e),
                    }
                }
            };

            let advanced = pending.advance(next);
            self.db.update_pending(&pending, &advanced)?;
            debug!(
                account = account.index,
                stage = advanced.stage.name(),
                "fee process advanced"
            );
            pending = advanced;
            submit = true;
        }
    }

    /// Clears the record when the failed first-leg order can never
    /// execute; nothing has moved yet in that case.
    fn first_leg_failed(&self, pending: &PendingFeeProcess, err: FeeError) -> FeeResult<()> {
        if order_is_dead(&err) {
            warn!(
                account = pending.account_index,
                stage = pending.stage.name(),
                error = %err,
                "order will not execute, clearing pending fee process"
            );
            self.db.remove_pending(pending)?;
        }
        Err(err)
    }

    async fn publish(
        &self,
        partition: Partition,
        order: &TransactionOrder,
        submit: bool,
        cancel: &CancelToken,
    ) -> FeeResult<TxRecordProof> {
        let step = order.tx_type();
        let result = async {
            if cancel.is_cancelled() {
                return Err(PublishError::Cancelled);
            }
            if submit {
                self.publisher.submit(order).await?;
            }
            self.publisher.confirm(order, cancel).await
        }
        .await;
        result.map_err(|source| FeeError::Step {
            step,
            partition,
            source,
        })
    }

    // -- Order construction -------------------------------------------------

    async fn params(&self, partition: Partition) -> FeeResult<OrderParams> {
        let round = self.ledger().get_round_number(partition.id()).await?;
        Ok(OrderParams::new(round, self.config()))
    }

    async fn fee_credit_record(
        &self,
        account: &Account,
        partition: Partition,
    ) -> FeeResult<Option<FeeCreditRecord>> {
        let id = partition.fee_credit_record_id(&account.public_key());
        Ok(fetch_fee_credit(self.ledger(), partition.id(), &id).await?)
    }

    /// A lockable record able to pay for its own lock or unlock.
    async fn paying_record(
        &self,
        account: &Account,
        partition: Partition,
    ) -> FeeResult<FeeCreditRecord> {
        if !partition.supports_locking() {
            return Err(FeeError::LockingUnsupported(partition));
        }
        self.fee_credit_record(account, partition)
            .await?
            .filter(|r| r.can_pay(self.config().max_fee))
            .ok_or(FeeError::InsufficientFeeCredit { partition })
    }

    /// Bills that can fund a cycle, largest first.
    async fn add_fee_sources(&self, account: &Account) -> FeeResult<Vec<Bill>> {
        let minimum = self.config().minimum_fee_amount;
        let mut bills: Vec<Bill> = fetch_bills(self.ledger(), Partition::Money.id(), &account.owner)
            .await?
            .into_iter()
            .filter(|b| b.value >= minimum && b.lock_status.permits(SpendPurpose::AddFee))
            .collect();
        bills.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.id.cmp(&b.id)));
        Ok(bills)
    }

    /// A bill already locked for reclaim, otherwise the largest unlocked one.
    async fn reclaim_target(&self, account: &Account) -> FeeResult<Bill> {
        let bills = fetch_bills(self.ledger(), Partition::Money.id(), &account.owner).await?;
        if let Some(bill) = bills
            .iter()
            .find(|b| b.lock_status == LockStatus::LockedForReclaimFee)
        {
            return Ok(bill.clone());
        }
        bills
            .into_iter()
            .filter(|b| !b.lock_status.is_locked())
            .max_by(|a, b| a.value.cmp(&b.value).then_with(|| b.id.cmp(&a.id)))
            .ok_or(FeeError::NoTargetBill)
    }

    /// Lock protecting an existing record during an add cycle. Skipped
    /// when locking is disabled, the record does not exist or is already
    /// locked, or it cannot pay for the lock.
    async fn fee_credit_lock_order(
        &self,
        account: &Account,
        partition: Partition,
    ) -> FeeResult<Option<TransactionOrder>> {
        if !self.config().lock_fee_credit_on_add || !partition.supports_locking() {
            return Ok(None);
        }
        let Some(record) = self.fee_credit_record(account, partition).await? else {
            return Ok(None);
        };
        if record.lock_status.is_locked() || !record.can_pay(self.config().max_fee) {
            debug!(
                %partition,
                status = %record.lock_status,
                balance = record.balance,
                "adding fee credit without locking the record"
            );
            return Ok(None);
        }
        let order = build_lock_fc(
            partition,
            &record,
            LockReason::AddFee,
            self.params(partition).await?,
        )?;
        Ok(Some(signed(order, &account.key)?))
    }

    async fn transfer_order(
        &self,
        account: &Account,
        partition: Partition,
        amount: u64,
    ) -> FeeResult<TransactionOrder> {
        let Some(bill) = self.add_fee_sources(account).await?.into_iter().next() else {
            return Err(FeeError::InsufficientBalance {
                available: 0,
                required: amount,
            });
        };
        let amount = amount.min(bill.value);
        let record_id = partition.fee_credit_record_id(&account.public_key());
        let record = fetch_fee_credit(self.ledger(), partition.id(), &record_id).await?;
        let round = self.ledger().get_round_number(partition.id()).await?;
        let target = FeeCreditTarget {
            partition,
            record_id,
            record_counter: record.map(|r| r.counter),
            earliest_addition_time: round,
            latest_addition_time: round.saturating_add(self.config().fc_addition_window),
        };
        let order = build_transfer_fc(&bill, amount, &target, self.params(Partition::Money).await?)?;
        debug!(bill = %bill.id, amount, %partition, "built transferFC");
        Ok(signed(order, &account.key)?)
    }

    async fn add_order(
        &self,
        account: &Account,
        partition: Partition,
        transfer: &TxRecordProof,
    ) -> FeeResult<TransactionOrder> {
        let round = self.ledger().get_round_number(partition.id()).await?;
        let order = build_add_fc(
            partition,
            account.owner.clone(),
            transfer,
            round,
            OrderParams::new(round, self.config()),
        )?;
        Ok(signed(order, &account.key)?)
    }

    /// Lock reserving the reclaim target. Paid from the money partition's
    /// fee credit, so skipped when there is none to pay with.
    async fn bill_lock_order(
        &self,
        account: &Account,
        partition: Partition,
        bill: &Bill,
    ) -> FeeResult<Option<TransactionOrder>> {
        if !self.config().lock_bill_on_reclaim
            || !partition.supports_locking()
            || bill.lock_status.is_locked()
        {
            return Ok(None);
        }
        let Some(money_record) = self
            .fee_credit_record(account, Partition::Money)
            .await?
            .filter(|r| r.can_pay(self.config().max_fee))
        else {
            debug!(bill = %bill.id, "no money fee credit for the bill lock, reclaiming without it");
            return Ok(None);
        };
        let order = build_lock(
            Partition::Money,
            bill,
            LockReason::ReclaimFee,
            &money_record.id,
            self.params(Partition::Money).await?,
        )?;
        Ok(Some(signed(order, &account.key)?))
    }

    async fn close_order(
        &self,
        account: &Account,
        partition: Partition,
    ) -> FeeResult<TransactionOrder> {
        let record = self
            .fee_credit_record(account, partition)
            .await?
            .ok_or(FeeError::NoFeeCredit(partition))?;
        let bill = self.reclaim_target(account).await?;
        let order = build_close_fc(
            partition,
            &record,
            &bill,
            self.config().minimum_fee_amount,
            self.params(partition).await?,
        )?;
        Ok(signed(order, &account.key)?)
    }

    async fn reclaim_order(
        &self,
        account: &Account,
        close: &TxRecordProof,
    ) -> FeeResult<TransactionOrder> {
        let close_order = &close.record.order;
        let TxAttributes::CloseFeeCredit { target_unit_id, .. } = &close_order.attributes else {
            return Err(BuildError::WrongTransaction {
                expected: TxType::CloseFeeCredit,
                got: close_order.tx_type(),
            }
            .into());
        };
        let bill = fetch_bill(self.ledger(), Partition::Money.id(), target_unit_id)
            .await?
            .ok_or(FeeError::NoTargetBill)?;
        let order = build_reclaim_fc(
            &bill,
            close,
            self.config().minimum_fee_amount,
            self.params(Partition::Money).await?,
        )?;
        Ok(signed(order, &account.key)?)
    }
}

fn check_pending(
    pending: &PendingFeeProcess,
    kind: ProcessKind,
    partition: Partition,
) -> FeeResult<()> {
    if pending.target_partition != partition {
        return Err(FeeError::InvalidPartition {
            pending: pending.target_partition,
            requested: partition,
        });
    }
    if pending.kind != kind {
        return Err(FeeError::ProcessConflict {
            pending: pending.kind,
            requested: kind,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
