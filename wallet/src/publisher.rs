//! # Confirmation Protocol
//!
//! [`TxPublisher`] submits signed orders and waits for their inclusion
//! proofs. Every confirmation is checked against the partition's trust base
//! before it is handed back to the caller.
//!
//! ```text
//!   submit ──▶ poll ──┬── proof found ──▶ verify ──▶ Ok(proof)
//!                     ├── unit moved by a foreign tx ──▶ Conflict
//!                     ├── round > order.timeout ──▶ ConfirmationTimeout
//!                     ├── elapsed > max_wait ──▶ WaitBudgetExceeded
//!                     └── sleep(poll_interval) | cancelled ──▶ Cancelled
//! ```
//!
//! Submission errors are returned immediately and never retried. A
//! `ConfirmationTimeout` is terminal for that order: the ledger guarantees it
//! can no longer be included, so the caller may safely build a replacement.

use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::WalletConfig;
use crate::ledger::{LedgerClient, LedgerError};
use crate::partition::PartitionId;
use crate::transaction::{
    CodecError, ProofError, TransactionOrder, TrustBase, TxHash, TxRecordProof, TxType,
};
use crate::unit::UnitId;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PublishError {
    /// The ledger refused the submission.
    #[error("submitting {tx_type} failed: {source}")]
    Submit {
        tx_type: TxType,
        #[source]
        source: LedgerError,
    },

    /// A read during polling failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Another transaction consumed the counter this order references.
    #[error("unit {unit_id} was modified by another transaction (expected counter {expected}, found {actual})")]
    Conflict {
        unit_id: UnitId,
        expected: u64,
        actual: u64,
    },

    /// The ledger passed the order's timeout round without including it.
    #[error("transaction 0x{} not confirmed by round {timeout} (ledger at round {round})", hex::encode(.tx_hash))]
    ConfirmationTimeout {
        tx_hash: TxHash,
        timeout: u64,
        round: u64,
    },

    /// The local wait budget ran out before the timeout round was reached.
    /// The order may still be included later.
    #[error("gave up waiting for 0x{} after {waited:?}", hex::encode(.tx_hash))]
    WaitBudgetExceeded { tx_hash: TxHash, waited: Duration },

    #[error("proof verification failed: {0}")]
    Verification(#[from] ProofError),

    /// Included, but executed with a failed status. The fee was still charged.
    #[error("{tx_type} on {unit_id} was included but failed (fee {fee})")]
    ExecutionFailed {
        tx_type: TxType,
        unit_id: UnitId,
        fee: u64,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Some orders of a batch failed. `confirmed` holds the ones that did not.
    #[error("{} of {} batch orders failed", .failures.len(), .failures.len() + .confirmed.len())]
    Batch {
        confirmed: Vec<TxRecordProof>,
        fee_paid: u64,
        failures: Vec<(UnitId, PublishError)>,
    },
}

impl PublishError {
    /// `true` when the order is known never to execute, so it is safe to
    /// build a replacement spending the same counter.
    pub fn is_terminal_for_order(&self) -> bool {
        matches!(
            self,
            PublishError::Submit { .. }
                | PublishError::ConfirmationTimeout { .. }
                | PublishError::Conflict { .. }
        )
    }

    /// `true` when the order will never move value: it cannot be included,
    /// or it was included with a failed status.
    pub fn order_never_executes(&self) -> bool {
        self.is_terminal_for_order() || matches!(self, PublishError::ExecutionFailed { .. })
    }
}

/// Result of a fully confirmed batch.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub proofs: Vec<TxRecordProof>,
    /// Sum of actual fees of the confirmed orders.
    pub fee_paid: u64,
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

pub struct TxPublisher {
    ledger: Arc<dyn LedgerClient>,
    config: WalletConfig,
    trust_bases: DashMap<PartitionId, TrustBase>,
}

impl TxPublisher {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: WalletConfig) -> Self {
        Self {
            ledger,
            config,
            trust_bases: DashMap::new(),
        }
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    /// Submits `order` without waiting.
    pub async fn submit(&self, order: &TransactionOrder) -> Result<TxHash, PublishError> {
        let tx_type = order.tx_type();
        let tx_hash = self
            .ledger
            .submit_transaction(order)
            .await
            .map_err(|source| PublishError::Submit { tx_type, source })?;
        info!(
            %tx_type,
            partition = %order.partition_id,
            unit = %order.unit_id,
            tx_hash = %hex::encode(tx_hash),
            timeout = order.timeout(),
            "submitted transaction"
        );
        Ok(tx_hash)
    }

    /// Submits `order` and, when `wait` is set, blocks until it is confirmed.
    ///
    /// Returns `Ok(None)` when `wait` is `false`.
    pub async fn send_tx(
        &self,
        order: &TransactionOrder,
        wait: bool,
        cancel: &CancelToken,
    ) -> Result<Option<TxRecordProof>, PublishError> {
        if cancel.is_cancelled() {
            return Err(PublishError::Cancelled);
        }
        self.submit(order).await?;
        if !wait {
            return Ok(None);
        }
        self.confirm(order, cancel).await.map(Some)
    }

    /// Waits for an already submitted order to be confirmed.
    ///
    /// Safe to call for orders submitted by an earlier process.
    pub async fn confirm(
        &self,
        order: &TransactionOrder,
        cancel: &CancelToken,
    ) -> Result<TxRecordProof, PublishError> {
        let tx_hash = order.hash()?;
        let partition = order.partition_id;
        let started = Instant::now();

        loop {
            if cancel.is_cancelled() {
                return Err(PublishError::Cancelled);
            }

            if let Some(proof) = self.fetch_proof(order, tx_hash).await? {
                return Ok(proof);
            }

            if let Some(expected) = order.attributes.counter() {
                if let Some(unit) = self.ledger.get_unit(partition, &order.unit_id).await? {
                    let actual = unit.state.counter();
                    if actual > expected && unit.last_tx_hash != Some(tx_hash) {
                        warn!(unit = %order.unit_id, expected, actual, "unit moved under pending order");
                        return Err(PublishError::Conflict {
                            unit_id: order.unit_id.clone(),
                            expected,
                            actual,
                        });
                    }
                }
            }

            let round = self.ledger.get_round_number(partition).await?;
            if round > order.timeout() {
                // The block certifying the order may have landed between the
                // proof poll and the round read.
                if let Some(proof) = self.fetch_proof(order, tx_hash).await? {
                    return Ok(proof);
                }
                warn!(
                    tx_type = %order.tx_type(),
                    timeout = order.timeout(),
                    round,
                    "transaction timed out"
                );
                return Err(PublishError::ConfirmationTimeout {
                    tx_hash,
                    timeout: order.timeout(),
                    round,
                });
            }

            let waited = started.elapsed();
            if waited >= self.config.max_wait {
                return Err(PublishError::WaitBudgetExceeded { tx_hash, waited });
            }

            debug!(tx_type = %order.tx_type(), round, "awaiting confirmation");
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = cancel.cancelled() => return Err(PublishError::Cancelled),
            }
        }
    }

    /// Submits every order, then confirms them concurrently.
    ///
    /// Orders are independent: a failure of one does not stop the others.
    pub async fn send_batch(
        &self,
        orders: Vec<TransactionOrder>,
        cancel: &CancelToken,
    ) -> Result<BatchOutcome, PublishError> {
        if cancel.is_cancelled() {
            return Err(PublishError::Cancelled);
        }
        let mut failures = Vec::new();
        let mut submitted = Vec::with_capacity(orders.len());
        for order in orders {
            match self.submit(&order).await {
                Ok(_) => submitted.push(order),
                Err(e) => failures.push((order.unit_id.clone(), e)),
            }
        }

        self.confirm_all(&submitted, failures, cancel).await
    }

    /// Confirms orders submitted earlier, possibly by another process.
    pub async fn confirm_batch(
        &self,
        orders: &[TransactionOrder],
        cancel: &CancelToken,
    ) -> Result<BatchOutcome, PublishError> {
        if cancel.is_cancelled() {
            return Err(PublishError::Cancelled);
        }
        self.confirm_all(orders, Vec::new(), cancel).await
    }

    async fn confirm_all(
        &self,
        orders: &[TransactionOrder],
        mut failures: Vec<(UnitId, PublishError)>,
        cancel: &CancelToken,
    ) -> Result<BatchOutcome, PublishError> {
        let results = join_all(orders.iter().map(|order| self.confirm(order, cancel))).await;
        let mut proofs = Vec::with_capacity(orders.len());
        for (order, result) in orders.iter().zip(results) {
            match result {
                Ok(proof) => proofs.push(proof),
                Err(e) => failures.push((order.unit_id.clone(), e)),
            }
        }

        let fee_paid = proofs.iter().map(TxRecordProof::actual_fee).sum();
        if failures.is_empty() {
            Ok(BatchOutcome { proofs, fee_paid })
        } else {
            Err(PublishError::Batch {
                confirmed: proofs,
                fee_paid,
                failures,
            })
        }
    }

    async fn fetch_proof(
        &self,
        order: &TransactionOrder,
        tx_hash: TxHash,
    ) -> Result<Option<TxRecordProof>, PublishError> {
        let Some(proof) = self
            .ledger
            .get_transaction_proof(order.partition_id, &order.unit_id, tx_hash)
            .await?
        else {
            return Ok(None);
        };
        self.verify(order.partition_id, &proof).await?;
        if !proof.record.is_successful() {
            return Err(PublishError::ExecutionFailed {
                tx_type: order.tx_type(),
                unit_id: order.unit_id.clone(),
                fee: proof.actual_fee(),
            });
        }
        info!(
            tx_type = %order.tx_type(),
            unit = %order.unit_id,
            round = proof.round_number(),
            fee = proof.actual_fee(),
            "transaction confirmed"
        );
        Ok(Some(proof))
    }

    /// Verifies against the cached trust base, refreshing it once on failure
    /// in case the validator set rotated.
    async fn verify(&self, partition: PartitionId, proof: &TxRecordProof) -> Result<(), PublishError> {
        let cached = self.trust_base(partition).await?;
        let Err(first) = proof.verify(&cached) else {
            return Ok(());
        };
        let fresh = self.refresh_trust_base(partition).await?;
        if fresh == cached {
            warn!(%partition, error = %first, "proof failed verification");
            return Err(first.into());
        }
        proof.verify(&fresh).map_err(|e| {
            warn!(%partition, error = %e, "proof failed verification after trust base refresh");
            e.into()
        })
    }

    async fn trust_base(&self, partition: PartitionId) -> Result<TrustBase, LedgerError> {
        if let Some(cached) = self.trust_bases.get(&partition).map(|e| e.value().clone()) {
            return Ok(cached);
        }
        self.refresh_trust_base(partition).await
    }

    async fn refresh_trust_base(&self, partition: PartitionId) -> Result<TrustBase, LedgerError> {
        let trust_base = self.ledger.get_trust_base(partition).await?;
        debug!(%partition, epoch = trust_base.epoch, "loaded trust base");
        self.trust_bases.insert(partition, trust_base.clone());
        Ok(trust_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::ledger::InMemoryLedger;
    use crate::partition::Partition;
    use crate::transaction::builder::{build_lock, OrderParams};
    use crate::transaction::signed;
    use crate::unit::{Bill, LockReason};

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        publisher: TxPublisher,
        key: Keypair,
        fcr: UnitId,
    }

    fn fixture(config: WalletConfig) -> Fixture {
        let ledger = Arc::new(InMemoryLedger::default());
        let key = Keypair::from_seed(&[4u8; 32]);
        let fcr = ledger
            .credit_fee_record(Partition::Money, &key.public_key(), 100)
            .id;
        let publisher = TxPublisher::new(ledger.clone(), config);
        Fixture {
            ledger,
            publisher,
            key,
            fcr,
        }
    }

    impl Fixture {
        fn lock_order(&self, bill: &Bill, timeout: u64) -> TransactionOrder {
            let params = OrderParams {
                timeout,
                max_fee: 10,
            };
            let order = build_lock(Partition::Money, bill, LockReason::Manual, &self.fcr, params)
                .unwrap();
            signed(order, &self.key).unwrap()
        }

        fn bill(&self, value: u64) -> Bill {
            self.ledger.mint_bill(&self.key.public_key(), value)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_order_returns_verified_proof() {
        let f = fixture(WalletConfig::fast());
        let bill = f.bill(10);
        let order = f.lock_order(&bill, 20);
        let proof = f
            .publisher
            .send_tx(&order, true, &CancelToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(proof.record.order, order);
        assert_eq!(proof.actual_fee(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_wait_returns_none_after_submission() {
        let f = fixture(WalletConfig::fast());
        let order = f.lock_order(&f.bill(10), 20);
        let result = f
            .publisher
            .send_tx(&order, false, &CancelToken::new())
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(f.ledger.submissions(TxType::Lock), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn submission_errors_are_not_retried() {
        let f = fixture(WalletConfig::fast());
        let bill = f.bill(10);
        let order = f.lock_order(&bill, 20);
        f.publisher
            .send_tx(&order, true, &CancelToken::new())
            .await
            .unwrap();
        let err = f
            .publisher
            .send_tx(&order, true, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Submit { tx_type: TxType::Lock, .. }));
        assert!(err.is_terminal_for_order());
        assert_eq!(f.ledger.submissions(TxType::Lock), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_partition_times_out_at_order_timeout() {
        let f = fixture(WalletConfig::fast());
        f.ledger.set_stalled(Partition::Money, true);
        let order = f.lock_order(&f.bill(10), 5);
        let err = f
            .publisher
            .send_tx(&order, true, &CancelToken::new())
            .await
            .unwrap_err();
        match err {
            PublishError::ConfirmationTimeout { timeout, round, .. } => {
                assert_eq!(timeout, 5);
                assert!(round > 5);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn wait_budget_bounds_polling() {
        let config = WalletConfig {
            poll_interval: Duration::from_millis(10),
            max_wait: Duration::from_millis(50),
            ..WalletConfig::default()
        };
        let f = fixture(config);
        f.ledger.set_stalled(Partition::Money, true);
        let order = f.lock_order(&f.bill(10), 10_000);
        let err = f
            .publisher
            .send_tx(&order, true, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::WaitBudgetExceeded { .. }));
        assert!(!err.is_terminal_for_order());
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_counter_bump_is_a_conflict() {
        let f = fixture(WalletConfig::fast());
        let bill = f.bill(10);
        f.ledger.set_stalled(Partition::Money, true);
        let order = f.lock_order(&bill, 1_000);
        f.publisher.submit(&order).await.unwrap();
        f.ledger.inject_conflict(Partition::Money, &bill.id);

        let err = f
            .publisher
            .confirm(&order, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PublishError::Conflict {
                expected: 0,
                actual: 1,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn tampered_proof_is_fatal() {
        let f = fixture(WalletConfig::fast());
        f.ledger.set_tamper_proofs(true);
        let order = f.lock_order(&f.bill(10), 20);
        let err = f
            .publisher
            .send_tx(&order, true, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Verification(ProofError::RootMismatch)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_execution_is_reported() {
        let f = fixture(WalletConfig::fast());
        f.ledger.fail_next(Partition::Money);
        let order = f.lock_order(&f.bill(10), 20);
        let err = f
            .publisher
            .send_tx(&order, true, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::ExecutionFailed { fee: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_wait() {
        let f = fixture(WalletConfig::default());
        f.ledger.set_stalled(Partition::Money, true);
        let order = f.lock_order(&f.bill(10), 10_000);
        f.publisher.submit(&order).await.unwrap();

        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2_500)).await;
            trigger.cancel();
        });
        let err = f.publisher.confirm(&order, &cancel).await.unwrap_err();
        assert!(matches!(err, PublishError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn batch_reports_fee_of_confirmed_orders_only() {
        let f = fixture(WalletConfig::fast());
        let a = f.bill(10);
        let b = f.bill(20);
        let outcome = f
            .publisher
            .send_batch(vec![f.lock_order(&a, 20), f.lock_order(&b, 20)], &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.proofs.len(), 2);
        assert_eq!(outcome.fee_paid, 2);

        // `a` is now locked at counter 1; a second lock quoting counter 0 is stale.
        let c = f.bill(30);
        let err = f
            .publisher
            .send_batch(vec![f.lock_order(&a, 20), f.lock_order(&c, 20)], &CancelToken::new())
            .await
            .unwrap_err();
        match err {
            PublishError::Batch {
                confirmed,
                fee_paid,
                failures,
            } => {
                assert_eq!(confirmed.len(), 1);
                assert_eq!(fee_paid, 1);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].0, a.id);
            }
            other => panic!("expected batch error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn batch_confirmation_does_not_resubmit() {
        let f = fixture(WalletConfig::fast());
        let a = f.bill(10);
        let b = f.bill(20);
        let submitted = f.lock_order(&a, 20);
        f.publisher.submit(&submitted).await.unwrap();
        let never_sent = f.lock_order(&b, 2);
        f.ledger.advance_rounds(Partition::Money, 5);

        let err = f
            .publisher
            .confirm_batch(&[submitted, never_sent], &CancelToken::new())
            .await
            .unwrap_err();
        match err {
            PublishError::Batch {
                confirmed,
                failures,
                ..
            } => {
                assert_eq!(confirmed.len(), 1);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].0, b.id);
                assert!(failures[0].1.order_never_executes());
            }
            other => panic!("expected batch error, got {other:?}"),
        }
        assert_eq!(f.ledger.submissions(TxType::Lock), 1);
    }
}
