//! Account-level money operations.

use std::sync::Arc;

use tracing::info;

use super::dust::{DustCollector, DustKind, DustOutcome, PendingDustBatch};
use super::error::{MoneyError, MoneyResult, SelectionError};
use super::fee_credit_for;
use super::selector::{select_bills_for_amount, spending_order};
use crate::account::AccountKeys;
use crate::cancel::CancelToken;
use crate::crypto::{Keypair, PublicKey};
use crate::ledger::{fetch_bill, fetch_bills};
use crate::partition::Partition;
use crate::publisher::TxPublisher;
use crate::storage::WalletDB;
use crate::transaction::builder::{build_lock, build_split, build_transfer, build_unlock};
use crate::transaction::{
    signed, OrderParams, SplitTarget, TransactionOrder, TxHash, TxRecordProof,
};
use crate::unit::{Bill, LockReason, OwnerPredicate, UnitId};

/// One payee of a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receiver {
    pub public_key: PublicKey,
    pub amount: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SendOutcome {
    /// Hashes of the submitted orders, in submission order.
    pub tx_hashes: Vec<TxHash>,
    /// Confirmed proofs; empty when the send did not wait.
    pub proofs: Vec<TxRecordProof>,
    pub fee_paid: u64,
}

pub struct MoneyWallet {
    publisher: Arc<TxPublisher>,
    accounts: Arc<dyn AccountKeys>,
    dust: DustCollector,
}

impl MoneyWallet {
    pub fn new(publisher: Arc<TxPublisher>, accounts: Arc<dyn AccountKeys>, db: WalletDB) -> Self {
        let dust = DustCollector::new(publisher.clone(), accounts.clone(), db);
        Self {
            publisher,
            accounts,
            dust,
        }
    }

    /// Pays `receivers` from the account's bills.
    ///
    /// A single covering bill pays everyone with one split, or with a plain
    /// transfer when one receiver takes the whole bill. A single receiver
    /// may also be paid from several bills: whole-bill transfers plus a
    /// split of the last one.
    pub async fn send_bills(
        &self,
        account_index: u64,
        receivers: &[Receiver],
        wait: bool,
        cancel: &CancelToken,
    ) -> MoneyResult<SendOutcome> {
        if receivers.is_empty() {
            return Err(MoneyError::NoReceivers);
        }
        if receivers.iter().any(|r| r.amount == 0) {
            return Err(SelectionError::ZeroAmount.into());
        }
        let total = receivers
            .iter()
            .try_fold(0u64, |acc, r| acc.checked_add(r.amount))
            .ok_or(MoneyError::AmountOverflow)?;

        let key = self.accounts.account_key(account_index)?;
        let bills = self.bills_of(&key.public_key()).await?;
        let selected = select_bills_for_amount(&bills, total)?;

        let ledger = self.publisher.ledger().as_ref();
        let fcr_id = Partition::Money.fee_credit_record_id(&key.public_key());
        let params = self.params().await?;

        let unsigned = if let [bill] = selected.as_slice() {
            single_bill_orders(bill, receivers, total, &fcr_id, params)?
        } else if let [receiver] = receivers {
            multi_bill_orders(&selected, receiver, &fcr_id, params)?
        } else {
            return Err(MoneyError::SingleBillRequired {
                required: total,
                largest: selected.first().map(|b| b.value).unwrap_or(0),
            });
        };

        fee_credit_for(
            ledger,
            Partition::Money,
            &key.public_key(),
            unsigned.len() as u64,
            self.publisher.config().max_fee,
        )
        .await?;

        let orders = unsigned
            .into_iter()
            .map(|order| Ok(signed(order, &key)?))
            .collect::<MoneyResult<Vec<_>>>()?;
        let tx_hashes = orders
            .iter()
            .map(|order| order.hash())
            .collect::<Result<Vec<_>, _>>()?;

        let outcome = if wait {
            let batch = self.publisher.send_batch(orders, cancel).await?;
            SendOutcome {
                tx_hashes,
                proofs: batch.proofs,
                fee_paid: batch.fee_paid,
            }
        } else {
            for order in &orders {
                self.publisher.submit(order).await?;
            }
            SendOutcome {
                tx_hashes,
                ..SendOutcome::default()
            }
        };

        info!(
            account = account_index,
            receivers = receivers.len(),
            amount = total,
            orders = outcome.tx_hashes.len(),
            fee_paid = outcome.fee_paid,
            "bills sent"
        );
        Ok(outcome)
    }

    /// Merges the account's bills into one.
    pub async fn collect_dust(
        &self,
        account_index: u64,
        cancel: &CancelToken,
    ) -> MoneyResult<DustOutcome> {
        self.dust.collect(account_index, &DustKind::Money, cancel).await
    }

    /// Merges the account's tokens of `type_id` into one.
    pub async fn collect_token_dust(
        &self,
        account_index: u64,
        type_id: UnitId,
        cancel: &CancelToken,
    ) -> MoneyResult<DustOutcome> {
        self.dust
            .collect(account_index, &DustKind::Token(type_id), cancel)
            .await
    }

    /// Dust batches whose transfers may have moved value that no swap has
    /// redeemed yet. The next `collect_dust` finishes them.
    pub fn pending_dust(&self, account_index: u64) -> MoneyResult<Vec<PendingDustBatch>> {
        self.dust.pending_batches(account_index)
    }

    /// Manually locks a bill so no flow spends it.
    pub async fn lock_bill(
        &self,
        account_index: u64,
        bill_id: &UnitId,
        cancel: &CancelToken,
    ) -> MoneyResult<TxRecordProof> {
        let key = self.accounts.account_key(account_index)?;
        let bill = self.owned_bill(&key.public_key(), bill_id).await?;
        let fcr = self.fee_credit(&key.public_key()).await?;
        let order = build_lock(
            Partition::Money,
            &bill,
            LockReason::Manual,
            &fcr,
            self.params().await?,
        )?;
        let proof = self.send_one(order, &key, cancel).await?;
        info!(account = account_index, bill = %bill_id, "bill locked");
        Ok(proof)
    }

    /// Releases any lock held on a bill.
    pub async fn unlock_bill(
        &self,
        account_index: u64,
        bill_id: &UnitId,
        cancel: &CancelToken,
    ) -> MoneyResult<TxRecordProof> {
        let key = self.accounts.account_key(account_index)?;
        let bill = self.owned_bill(&key.public_key(), bill_id).await?;
        let fcr = self.fee_credit(&key.public_key()).await?;
        let order = build_unlock(Partition::Money, &bill, &fcr, self.params().await?)?;
        let proof = self.send_one(order, &key, cancel).await?;
        info!(account = account_index, bill = %bill_id, "bill unlocked");
        Ok(proof)
    }

    /// The account's non-zero bills in spending order.
    pub async fn list_bills(&self, account_index: u64) -> MoneyResult<Vec<Bill>> {
        let key = self.accounts.account_key(account_index)?;
        let mut bills = self.bills_of(&key.public_key()).await?;
        bills.sort_by(spending_order);
        Ok(bills)
    }

    /// Sum of every bill the account owns, locked ones included.
    pub async fn total_balance(&self, account_index: u64) -> MoneyResult<u64> {
        let bills = self.list_bills(account_index).await?;
        bills
            .iter()
            .try_fold(0u64, |acc, b| acc.checked_add(b.value))
            .ok_or(MoneyError::AmountOverflow)
    }

    async fn bills_of(&self, public_key: &PublicKey) -> MoneyResult<Vec<Bill>> {
        Ok(fetch_bills(
            self.publisher.ledger().as_ref(),
            Partition::Money.id(),
            &OwnerPredicate::p2pkh(public_key),
        )
        .await?)
    }

    async fn owned_bill(&self, public_key: &PublicKey, bill_id: &UnitId) -> MoneyResult<Bill> {
        fetch_bill(self.publisher.ledger().as_ref(), Partition::Money.id(), bill_id)
            .await?
            .filter(|bill| bill.owner.is_owned_by(public_key))
            .ok_or_else(|| MoneyError::UnitNotFound(bill_id.clone()))
    }

    async fn fee_credit(&self, public_key: &PublicKey) -> MoneyResult<UnitId> {
        let record = fee_credit_for(
            self.publisher.ledger().as_ref(),
            Partition::Money,
            public_key,
            1,
            self.publisher.config().max_fee,
        )
        .await?;
        Ok(record.id)
    }

    async fn params(&self) -> MoneyResult<OrderParams> {
        let round = self
            .publisher
            .ledger()
            .get_round_number(Partition::Money.id())
            .await?;
        Ok(OrderParams::new(round, self.publisher.config()))
    }

    async fn send_one(
        &self,
        order: TransactionOrder,
        key: &Keypair,
        cancel: &CancelToken,
    ) -> MoneyResult<TxRecordProof> {
        let order = signed(order, key)?;
        self.publisher.submit(&order).await?;
        Ok(self.publisher.confirm(&order, cancel).await?)
    }
}

fn single_bill_orders(
    bill: &Bill,
    receivers: &[Receiver],
    total: u64,
    fcr_id: &UnitId,
    params: OrderParams,
) -> MoneyResult<Vec<TransactionOrder>> {
    if let [receiver] = receivers {
        if total == bill.value {
            let owner = OwnerPredicate::p2pkh(&receiver.public_key);
            return Ok(vec![build_transfer(bill, owner, fcr_id, params)?]);
        }
    }
    let targets = receivers
        .iter()
        .map(|r| SplitTarget {
            amount: r.amount,
            owner: OwnerPredicate::p2pkh(&r.public_key),
        })
        .collect();
    Ok(vec![build_split(bill, targets, fcr_id, params)?])
}

/// Whole-bill transfers for every bill but the last, which is split or
/// transferred to cover what is left.
fn multi_bill_orders(
    bills: &[Bill],
    receiver: &Receiver,
    fcr_id: &UnitId,
    params: OrderParams,
) -> MoneyResult<Vec<TransactionOrder>> {
    let owner = OwnerPredicate::p2pkh(&receiver.public_key);
    let mut remaining = receiver.amount;
    let mut orders = Vec::with_capacity(bills.len());
    for bill in bills {
        if remaining == 0 {
            break;
        }
        if bill.value <= remaining {
            orders.push(build_transfer(bill, owner.clone(), fcr_id, params)?);
            remaining -= bill.value;
        } else {
            let target = SplitTarget {
                amount: remaining,
                owner: owner.clone(),
            };
            orders.push(build_split(bill, vec![target], fcr_id, params)?);
            remaining = 0;
        }
    }
    Ok(orders)
}
