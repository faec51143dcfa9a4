//! # Dust Collection
//!
//! Merges an account's small units into its largest one:
//!
//! ```text
//!   lock(target) ─▶ transfer/burn(source₁..ₙ → target) ─▶ swap/join(target, proofs)
//! ```
//!
//! Bills and fungible tokens run the same loop; [`DustUnit`] supplies the
//! partition-specific orders. Each batch handles at most
//! `dust_batch_size` sources, and the loop repeats until a single unlocked
//! unit remains.
//!
//! The transfers of a batch are recorded in the [`WalletDB`] before they are
//! broadcast. Until the swap confirms, their value exists only as proofs the
//! target can redeem, so a run that finds its target still
//! `LockedForDustCollection` first confirms the recorded transfers and
//! finishes that swap. A leftover lock with no record is simply reused.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::error::{MoneyError, MoneyResult};
use super::fee_credit_for;
use crate::account::AccountKeys;
use crate::cancel::CancelToken;
use crate::crypto::Keypair;
use crate::partition::Partition;
use crate::publisher::{BatchOutcome, PublishError, TxPublisher};
use crate::storage::WalletDB;
use crate::transaction::builder::{
    build_dust_swap, build_dust_transfer, build_lock, build_token_burn, build_token_join,
    build_unlock,
};
use crate::transaction::{signed, BuildResult, OrderParams, TransactionOrder, TxRecordProof};
use crate::unit::{
    Bill, FungibleToken, FungibleUnit, LockReason, LockStatus, OwnerPredicate, UnitId, UnitState,
};

/// What to consolidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DustKind {
    /// Bills on the money partition.
    Money,
    /// Fungible tokens of the given type on the tokens partition.
    Token(UnitId),
}

impl DustKind {
    pub fn partition(&self) -> Partition {
        match self {
            DustKind::Money => Partition::Money,
            DustKind::Token(_) => Partition::Tokens,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DustOutcome {
    /// Fees of every confirmed order of the run.
    pub fee_paid: u64,
    /// The unit everything was merged into, `None` if the account owns none.
    pub target: Option<UnitId>,
    /// Value of the target after the last batch.
    pub value: u64,
    /// Number of swaps or joins executed.
    pub batches: usize,
}

/// Source orders of one batch, stored until their swap or join confirms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDustBatch {
    pub account_index: u64,
    /// Unit the orders move value into.
    pub target: UnitId,
    pub orders: Vec<TransactionOrder>,
    pub created_at: DateTime<Utc>,
}

impl PendingDustBatch {
    pub fn new(account_index: u64, target: UnitId, orders: Vec<TransactionOrder>) -> Self {
        Self {
            account_index,
            target,
            orders,
            created_at: Utc::now(),
        }
    }
}

/// A unit kind that can be merged.
pub trait DustUnit: FungibleUnit + Clone + Send + Sync + Sized {
    /// Extracts a unit of this kind from raw ledger state, filtering out
    /// units the run does not cover.
    fn from_state(state: UnitState, kind: &DustKind) -> Option<Self>;

    /// Order moving this unit's value towards `target`.
    fn source_order(
        &self,
        target: &Self,
        fee_credit_record_id: &UnitId,
        params: OrderParams,
    ) -> BuildResult<TransactionOrder>;

    /// Order crediting `target` with the confirmed source proofs.
    fn merge_order(
        target: &Self,
        proofs: Vec<TxRecordProof>,
        fee_credit_record_id: &UnitId,
        params: OrderParams,
    ) -> BuildResult<TransactionOrder>;
}

impl DustUnit for Bill {
    fn from_state(state: UnitState, kind: &DustKind) -> Option<Self> {
        match kind {
            DustKind::Money => state.into_bill(),
            DustKind::Token(_) => None,
        }
    }

    fn source_order(
        &self,
        target: &Self,
        fee_credit_record_id: &UnitId,
        params: OrderParams,
    ) -> BuildResult<TransactionOrder> {
        build_dust_transfer(self, target, fee_credit_record_id, params)
    }

    fn merge_order(
        target: &Self,
        proofs: Vec<TxRecordProof>,
        fee_credit_record_id: &UnitId,
        params: OrderParams,
    ) -> BuildResult<TransactionOrder> {
        build_dust_swap(target, proofs, fee_credit_record_id, params)
    }
}

impl DustUnit for FungibleToken {
    fn from_state(state: UnitState, kind: &DustKind) -> Option<Self> {
        match kind {
            DustKind::Token(type_id) => state.into_token().filter(|t| t.type_id == *type_id),
            DustKind::Money => None,
        }
    }

    fn source_order(
        &self,
        target: &Self,
        fee_credit_record_id: &UnitId,
        params: OrderParams,
    ) -> BuildResult<TransactionOrder> {
        build_token_burn(self, target, fee_credit_record_id, params)
    }

    fn merge_order(
        target: &Self,
        proofs: Vec<TxRecordProof>,
        fee_credit_record_id: &UnitId,
        params: OrderParams,
    ) -> BuildResult<TransactionOrder> {
        build_token_join(target, proofs, fee_credit_record_id, params)
    }
}

/// Picks the unit to merge into: a leftover dust-locked unit first,
/// otherwise the largest unlocked one.
fn pick_target<U: DustUnit>(units: &[U]) -> Option<U> {
    units
        .iter()
        .find(|u| u.lock_status() == LockStatus::LockedForDustCollection)
        .or_else(|| {
            units
                .iter()
                .filter(|u| !u.lock_status().is_locked())
                .max_by(|a, b| a.value().cmp(&b.value()).then_with(|| b.id().cmp(a.id())))
        })
        .cloned()
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

pub struct DustCollector {
    publisher: Arc<TxPublisher>,
    accounts: Arc<dyn AccountKeys>,
    db: WalletDB,
}

impl DustCollector {
    pub fn new(publisher: Arc<TxPublisher>, accounts: Arc<dyn AccountKeys>, db: WalletDB) -> Self {
        Self {
            publisher,
            accounts,
            db,
        }
    }

    /// Merges every unlocked unit of `kind` owned by the account into one.
    ///
    /// `cancel` is honoured between batches. A batch that has started its
    /// transfers runs through to its swap; if it cannot, the batch stays
    /// recorded and the next run finishes it.
    pub async fn collect(
        &self,
        account_index: u64,
        kind: &DustKind,
        cancel: &CancelToken,
    ) -> MoneyResult<DustOutcome> {
        match kind {
            DustKind::Money => self.run::<Bill>(account_index, kind, cancel).await,
            DustKind::Token(_) => self.run::<FungibleToken>(account_index, kind, cancel).await,
        }
    }

    /// Recorded batches of the account whose value is not merged yet.
    pub fn pending_batches(&self, account_index: u64) -> MoneyResult<Vec<PendingDustBatch>> {
        Ok(self.db.list_dust_batches(account_index)?)
    }

    async fn run<U: DustUnit>(
        &self,
        account_index: u64,
        kind: &DustKind,
        cancel: &CancelToken,
    ) -> MoneyResult<DustOutcome> {
        let key = self.accounts.account_key(account_index)?;
        let public_key = key.public_key();
        let owner = OwnerPredicate::p2pkh(&public_key);
        let partition = kind.partition();
        let config = self.publisher.config();
        let in_batch = CancelToken::new();
        let mut outcome = DustOutcome::default();

        loop {
            let units: Vec<U> = self.units(kind, &owner).await?;
            let Some(mut target) = pick_target(&units) else {
                break;
            };
            outcome.target = Some(target.id().clone());
            outcome.value = target.value();

            if let Some(batch) = self.db.get_dust_batch(account_index, target.id())? {
                if target.lock_status() == LockStatus::LockedForDustCollection {
                    info!(
                        %partition,
                        target = %target.id(),
                        orders = batch.orders.len(),
                        "finishing interrupted dust batch"
                    );
                    let result = self.publisher.confirm_batch(&batch.orders, &in_batch).await;
                    match self.merge::<U>(&batch, result, kind, &key, &mut outcome).await {
                        // Nothing moved; the sources are still spendable.
                        Err(MoneyError::Publish(PublishError::Batch {
                            confirmed,
                            failures,
                            ..
                        })) if confirmed.is_empty()
                            && failures.iter().all(|(_, e)| e.order_never_executes()) =>
                        {
                            warn!(%partition, target = %target.id(), "recorded dust batch never executed");
                        }
                        other => other?,
                    }
                    continue;
                }
                // The swap confirmed but the record outlived it.
                debug!(%partition, target = %target.id(), "dropping settled dust batch record");
                self.db.remove_dust_batch(&batch)?;
            }

            let mut sources: Vec<U> = units
                .into_iter()
                .filter(|u| u.id() != target.id() && !u.lock_status().is_locked())
                .collect();
            sources.sort_by(|a, b| a.value().cmp(&b.value()).then_with(|| a.id().cmp(b.id())));
            sources.truncate(config.dust_batch_size);

            if sources.is_empty() {
                if target.lock_status() == LockStatus::LockedForDustCollection {
                    let fcr = fee_credit_for(
                        self.publisher.ledger().as_ref(),
                        partition,
                        &public_key,
                        1,
                        config.max_fee,
                    )
                    .await?;
                    let params = self.params(partition).await?;
                    let order = signed(build_unlock(partition, &target, &fcr.id, params)?, &key)?;
                    outcome.fee_paid += self.send(&order, &in_batch).await?.actual_fee();
                    info!(%partition, unit = %target.id(), "released leftover dust lock");
                }
                break;
            }

            if cancel.is_cancelled() {
                return Err(PublishError::Cancelled.into());
            }

            let orders = sources.len() as u64 + 2;
            let fcr = fee_credit_for(
                self.publisher.ledger().as_ref(),
                partition,
                &public_key,
                orders,
                config.max_fee,
            )
            .await?;

            if !target.lock_status().is_locked() {
                let params = self.params(partition).await?;
                let order = signed(
                    build_lock(partition, &target, LockReason::DustCollection, &fcr.id, params)?,
                    &key,
                )?;
                outcome.fee_paid += self.send(&order, &in_batch).await?.actual_fee();
                target = self.reload(kind, target.id()).await?;
            }

            let params = self.params(partition).await?;
            let transfers = sources
                .iter()
                .map(|source| {
                    let order = source.source_order(&target, &fcr.id, params)?;
                    Ok(signed(order, &key)?)
                })
                .collect::<MoneyResult<Vec<_>>>()?;

            let batch = PendingDustBatch::new(account_index, target.id().clone(), transfers);
            self.db.put_dust_batch(&batch)?;
            let result = self.publisher.send_batch(batch.orders.clone(), &in_batch).await;
            self.merge::<U>(&batch, result, kind, &key, &mut outcome)
                .await?;
        }

        debug!(%partition, account = account_index, ?outcome, "dust collection finished");
        Ok(outcome)
    }

    /// Redeems the confirmed orders of `batch` into its target and clears
    /// the record.
    ///
    /// The record is kept while any order of the batch may still execute,
    /// so a later run can collect its proof too.
    async fn merge<U: DustUnit>(
        &self,
        batch: &PendingDustBatch,
        result: Result<BatchOutcome, PublishError>,
        kind: &DustKind,
        key: &Keypair,
        outcome: &mut DustOutcome,
    ) -> MoneyResult<()> {
        let partition = kind.partition();
        let (proofs, fee_paid) = match result {
            Ok(done) => (done.proofs, done.fee_paid),
            Err(PublishError::Batch {
                confirmed,
                fee_paid,
                failures,
            }) => {
                let settled = failures.iter().all(|(_, e)| e.order_never_executes());
                if !settled || confirmed.is_empty() {
                    if settled {
                        self.db.remove_dust_batch(batch)?;
                    }
                    return Err(PublishError::Batch {
                        confirmed,
                        fee_paid,
                        failures,
                    }
                    .into());
                }
                for (unit, error) in &failures {
                    warn!(%partition, %unit, %error, "dust source not moved");
                }
                (confirmed, fee_paid)
            }
            Err(e) => return Err(e.into()),
        };
        outcome.fee_paid += fee_paid;

        let merged = proofs.len();
        let target: U = self.reload(kind, &batch.target).await?;
        let fcr = fee_credit_for(
            self.publisher.ledger().as_ref(),
            partition,
            &key.public_key(),
            1,
            self.publisher.config().max_fee,
        )
        .await?;
        let params = self.params(partition).await?;
        let order = signed(U::merge_order(&target, proofs, &fcr.id, params)?, key)?;
        outcome.fee_paid += self.send(&order, &CancelToken::new()).await?.actual_fee();
        self.db.remove_dust_batch(batch)?;
        outcome.batches += 1;

        info!(
            %partition,
            target = %target.id(),
            merged,
            batch = outcome.batches,
            "dust batch merged"
        );
        Ok(())
    }

    async fn units<U: DustUnit>(&self, kind: &DustKind, owner: &OwnerPredicate) -> MoneyResult<Vec<U>> {
        let partition = kind.partition().id();
        let ledger = self.publisher.ledger();
        let mut units = Vec::new();
        for id in ledger.get_units_by_owner(partition, owner).await? {
            let unit = ledger
                .get_unit(partition, &id)
                .await?
                .and_then(|record| U::from_state(record.state, kind));
            if let Some(unit) = unit {
                if unit.value() > 0 {
                    units.push(unit);
                }
            }
        }
        Ok(units)
    }

    async fn reload<U: DustUnit>(&self, kind: &DustKind, id: &UnitId) -> MoneyResult<U> {
        self.publisher
            .ledger()
            .get_unit(kind.partition().id(), id)
            .await?
            .and_then(|record| U::from_state(record.state, kind))
            .ok_or_else(|| MoneyError::UnitNotFound(id.clone()))
    }

    async fn params(&self, partition: Partition) -> MoneyResult<OrderParams> {
        let round = self
            .publisher
            .ledger()
            .get_round_number(partition.id())
            .await?;
        Ok(OrderParams::new(round, self.publisher.config()))
    }

    async fn send(&self, order: &TransactionOrder, cancel: &CancelToken) -> MoneyResult<TxRecordProof> {
        self.publisher.submit(order).await?;
        Ok(self.publisher.confirm(order, cancel).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::SeedAccounts;
    use crate::config::WalletConfig;
    use crate::crypto::{Keypair, PublicKey};
    use crate::ledger::{InMemoryLedger, LedgerClient};
    use crate::transaction::TxType;
    use crate::unit::UnitType;

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        collector: DustCollector,
        db: WalletDB,
        key: Keypair,
    }

    fn fixture_with(config: WalletConfig) -> Fixture {
        let ledger = Arc::new(InMemoryLedger::default());
        let accounts = SeedAccounts::new([3u8; 32], 1);
        let key = accounts.account_key(0).unwrap();
        let publisher = Arc::new(TxPublisher::new(ledger.clone(), config));
        let db = WalletDB::open_temporary().unwrap();
        Fixture {
            ledger,
            collector: DustCollector::new(publisher, Arc::new(accounts), db.clone()),
            db,
            key,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(WalletConfig::fast())
    }

    fn manual_lock(partition: Partition, unit: &impl FungibleUnit, fcr: &UnitId, round: u64, key: &Keypair) -> TransactionOrder {
        let params = OrderParams::new(round, &WalletConfig::default());
        let order = build_lock(partition, unit, LockReason::Manual, fcr, params).unwrap();
        signed(order, key).unwrap()
    }

    impl Fixture {
        fn public_key(&self) -> PublicKey {
            self.key.public_key()
        }

        /// Dust-locks `target` the way a run does before its transfers.
        async fn dust_lock(&self, target: &Bill, fcr: &UnitId) -> Bill {
            let params = OrderParams::new(self.ledger.round(Partition::Money), &WalletConfig::default());
            let order = build_lock(Partition::Money, target, LockReason::DustCollection, fcr, params)
                .unwrap();
            self.ledger
                .submit_transaction(&signed(order, &self.key).unwrap())
                .await
                .unwrap();
            self.ledger
                .unit(Partition::Money, &target.id)
                .and_then(UnitState::into_bill)
                .unwrap()
        }

        fn dust_transfer(&self, source: &Bill, target: &Bill, fcr: &UnitId) -> TransactionOrder {
            let params = OrderParams::new(self.ledger.round(Partition::Money), &WalletConfig::default());
            signed(build_dust_transfer(source, target, fcr, params).unwrap(), &self.key).unwrap()
        }

        async fn bill_values(&self) -> Vec<u64> {
            let mut values: Vec<u64> = self
                .owned(Partition::Money)
                .await
                .into_iter()
                .filter_map(UnitState::into_bill)
                .map(|b| b.value)
                .filter(|v| *v > 0)
                .collect();
            values.sort_unstable();
            values
        }

        async fn owned(&self, partition: Partition) -> Vec<UnitState> {
            let owner = OwnerPredicate::p2pkh(&self.public_key());
            let ids = self
                .ledger
                .get_units_by_owner(partition.id(), &owner)
                .await
                .unwrap();
            ids.iter()
                .filter_map(|id| self.ledger.unit(partition, id))
                .collect()
        }
    }

    #[tokio::test]
    async fn small_bill_is_merged_into_large_one() {
        let f = fixture();
        let large = f.ledger.mint_bill(&f.public_key(), 100);
        f.ledger.mint_bill(&f.public_key(), 1);
        f.ledger.credit_fee_record(Partition::Money, &f.public_key(), 50);

        let outcome = f
            .collector
            .collect(0, &DustKind::Money, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.batches, 1);
        assert_eq!(outcome.target, Some(large.id.clone()));
        assert_eq!(outcome.value, 101);
        assert_eq!(outcome.fee_paid, 3);
        assert_eq!(f.bill_values().await, vec![101]);
        let merged = f
            .ledger
            .unit(Partition::Money, &large.id)
            .and_then(UnitState::into_bill)
            .unwrap();
        assert_eq!(merged.lock_status, LockStatus::Unlocked);
    }

    #[tokio::test]
    async fn single_bill_is_a_no_op() {
        let f = fixture();
        f.ledger.mint_bill(&f.public_key(), 100);

        let outcome = f
            .collector
            .collect(0, &DustKind::Money, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.batches, 0);
        assert_eq!(outcome.fee_paid, 0);
        assert_eq!(outcome.value, 100);
        assert_eq!(f.ledger.submissions(TxType::Lock), 0);
    }

    #[tokio::test]
    async fn batches_are_bounded() {
        let f = fixture_with(WalletConfig {
            dust_batch_size: 2,
            ..WalletConfig::fast()
        });
        f.ledger.mint_bill(&f.public_key(), 500);
        for value in 1..=5 {
            f.ledger.mint_bill(&f.public_key(), value);
        }
        f.ledger.credit_fee_record(Partition::Money, &f.public_key(), 200);

        let outcome = f
            .collector
            .collect(0, &DustKind::Money, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.batches, 3);
        assert_eq!(outcome.value, 515);
        assert_eq!(f.bill_values().await, vec![515]);
        assert_eq!(f.ledger.submissions(TxType::SwapDust), 3);
    }

    #[tokio::test]
    async fn locked_bills_are_left_alone() {
        let f = fixture();
        f.ledger.mint_bill(&f.public_key(), 100);
        f.ledger.mint_bill(&f.public_key(), 2);
        let locked = f.ledger.mint_bill(&f.public_key(), 7);
        let fcr = f.ledger.credit_fee_record(Partition::Money, &f.public_key(), 100);
        let round = f.ledger.round(Partition::Money);
        let order = manual_lock(Partition::Money, &locked, &fcr.id, round, &f.key);
        f.ledger.submit_transaction(&order).await.unwrap();

        let outcome = f
            .collector
            .collect(0, &DustKind::Money, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.value, 102);
        assert_eq!(f.bill_values().await, vec![7, 102]);
        let still_locked = f
            .ledger
            .unit(Partition::Money, &locked.id)
            .and_then(UnitState::into_bill)
            .unwrap();
        assert_eq!(still_locked.lock_status, LockStatus::LockedManual);
    }

    #[tokio::test]
    async fn tokens_of_one_type_are_joined() {
        let f = fixture();
        let type_id = UnitId::derive(b"gold", UnitType::TokenType);
        let other_type = UnitId::derive(b"silver", UnitType::TokenType);
        for value in [10, 20, 30] {
            f.ledger.mint_token(&f.public_key(), &type_id, value);
        }
        let other = f.ledger.mint_token(&f.public_key(), &other_type, 5);
        f.ledger.credit_fee_record(Partition::Tokens, &f.public_key(), 100);

        let outcome = f
            .collector
            .collect(0, &DustKind::Token(type_id.clone()), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.batches, 1);
        assert_eq!(outcome.value, 60);
        assert_eq!(f.ledger.submissions(TxType::BurnToken), 2);
        let untouched = f
            .ledger
            .unit(Partition::Tokens, &other.id)
            .and_then(UnitState::into_token)
            .unwrap();
        assert_eq!(untouched.value, 5);
    }

    #[tokio::test]
    async fn missing_fee_credit_fails_before_any_submission() {
        let f = fixture();
        f.ledger.mint_bill(&f.public_key(), 100);
        f.ledger.mint_bill(&f.public_key(), 1);
        f.ledger.credit_fee_record(Partition::Money, &f.public_key(), 20);

        let err = f
            .collector
            .collect(0, &DustKind::Money, &CancelToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MoneyError::InsufficientFeeCredit {
                available: 20,
                required: 30,
                ..
            }
        ));
        assert_eq!(f.ledger.submissions(TxType::Lock), 0);
    }

    #[tokio::test]
    async fn run_stopped_before_swap_is_finished_by_next_run() {
        let f = fixture();
        let target = f.ledger.mint_bill(&f.public_key(), 100);
        let dust = f.ledger.mint_bill(&f.public_key(), 7);
        let fcr = f.ledger.credit_fee_record(Partition::Money, &f.public_key(), 100);

        // A run that stopped after its transfer confirmed.
        let target = f.dust_lock(&target, &fcr.id).await;
        let transfer = f.dust_transfer(&dust, &target, &fcr.id);
        f.db.put_dust_batch(&PendingDustBatch::new(0, target.id.clone(), vec![transfer.clone()]))
            .unwrap();
        f.ledger.submit_transaction(&transfer).await.unwrap();
        assert_eq!(f.bill_values().await, vec![100]);
        assert_eq!(f.collector.pending_batches(0).unwrap().len(), 1);

        let outcome = f
            .collector
            .collect(0, &DustKind::Money, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.batches, 1);
        assert_eq!(outcome.value, 107);
        assert_eq!(f.bill_values().await, vec![107]);
        assert_eq!(f.ledger.submissions(TxType::DustTransfer), 1);
        assert_eq!(f.ledger.submissions(TxType::SwapDust), 1);
        assert!(f.collector.pending_batches(0).unwrap().is_empty());
        let merged = f
            .ledger
            .unit(Partition::Money, &target.id)
            .and_then(UnitState::into_bill)
            .unwrap();
        assert_eq!(merged.lock_status, LockStatus::Unlocked);
    }

    #[tokio::test]
    async fn recorded_batch_that_never_executed_is_rebuilt() {
        let f = fixture();
        let target = f.ledger.mint_bill(&f.public_key(), 100);
        let dust = f.ledger.mint_bill(&f.public_key(), 7);
        let fcr = f.ledger.credit_fee_record(Partition::Money, &f.public_key(), 100);

        // Recorded, then the process died before broadcasting.
        let target = f.dust_lock(&target, &fcr.id).await;
        let transfer = f.dust_transfer(&dust, &target, &fcr.id);
        f.db.put_dust_batch(&PendingDustBatch::new(0, target.id.clone(), vec![transfer]))
            .unwrap();
        f.ledger.advance_rounds(Partition::Money, 20);

        let outcome = f
            .collector
            .collect(0, &DustKind::Money, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.batches, 1);
        assert_eq!(f.bill_values().await, vec![107]);
        assert_eq!(f.ledger.submissions(TxType::DustTransfer), 1);
        assert!(f.collector.pending_batches(0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_outliving_its_swap_is_dropped() {
        let f = fixture();
        let bill = f.ledger.mint_bill(&f.public_key(), 100);
        let fcr = f.ledger.credit_fee_record(Partition::Money, &f.public_key(), 100);
        let spent = Bill {
            id: UnitId::derive(b"spent", UnitType::Bill),
            value: 5,
            counter: 0,
            lock_status: LockStatus::Unlocked,
            owner: OwnerPredicate::p2pkh(&f.public_key()),
        };
        let stale = f.dust_transfer(&spent, &bill, &fcr.id);
        f.db.put_dust_batch(&PendingDustBatch::new(0, bill.id.clone(), vec![stale]))
            .unwrap();

        let outcome = f
            .collector
            .collect(0, &DustKind::Money, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.batches, 0);
        assert_eq!(outcome.fee_paid, 0);
        assert!(f.collector.pending_batches(0).unwrap().is_empty());
        assert_eq!(f.ledger.submissions(TxType::SwapDust), 0);
    }

    #[tokio::test]
    async fn cancelled_run_submits_nothing() {
        let f = fixture();
        f.ledger.mint_bill(&f.public_key(), 100);
        f.ledger.mint_bill(&f.public_key(), 1);
        f.ledger.credit_fee_record(Partition::Money, &f.public_key(), 50);
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = f
            .collector
            .collect(0, &DustKind::Money, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, MoneyError::Publish(PublishError::Cancelled)));
        assert_eq!(f.bill_values().await, vec![1, 100]);
    }
}
