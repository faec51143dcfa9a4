//! # In-Memory Ledger
//!
//! A single-process simulation of the three partitions, close enough to the
//! real protocol that the engine cannot tell the difference: counters are
//! enforced, locks are honoured, fee credit is charged, and every executed
//! transaction ends up in a certified block with a Merkle inclusion proof
//! signed by a quorum of (simulated) validators.
//!
//! ```text
//!   submit ──▶ validate + execute ──▶ open block
//!                                         │  next read of the partition
//!                                         ▼
//!                     round += 1, Merkle root, UC signed by every validator
//!                                         │
//!                                         ▼
//!                               proofs indexed by tx hash
//! ```
//!
//! Test knobs:
//!
//! - [`set_stalled`](InMemoryLedger::set_stalled): orders queue instead of
//!   executing, and every round query advances the round. Unstalling
//!   executes the queue in one block, dropping orders whose timeout passed.
//! - [`inject_conflict`](InMemoryLedger::inject_conflict): moves a unit's
//!   counter on behalf of a foreign transaction.
//! - [`set_tamper_proofs`](InMemoryLedger::set_tamper_proofs): returns
//!   proofs whose certified root no longer matches.
//! - [`fail_next`](InMemoryLedger::fail_next): the next executed order is
//!   recorded with a failed status.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use super::{LedgerClient, LedgerError, LedgerResult, UnitRecord};
use crate::crypto::{sha256_concat, Keypair, PublicKey};
use crate::partition::{Partition, PartitionId};
use crate::transaction::codec::CodecResult;
use crate::transaction::proof::{leaf_hash, merkle_path, merkle_root, TxProof, UnicityCertificate};
use crate::transaction::{
    verify_owner_proof, ServerMetadata, TransactionOrder, TransactionRecord, TrustBase, TxAttributes,
    TxHash, TxRecordProof, TxStatus, TxType,
};
use crate::unit::{
    Bill, FeeCreditRecord, FungibleToken, LockStatus, OwnerPredicate, SpendPurpose, UnitId,
    UnitState, UnitType,
};

/// Fee charged for every transaction.
pub const LEDGER_FEE: u64 = 1;

/// Rounds a fee credit record is kept alive past its last addition window.
pub const FEE_CREDIT_LIFETIME: u64 = 1_000;

const DEFAULT_VALIDATORS: usize = 4;

// ---------------------------------------------------------------------------
// Partition state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredUnit {
    state: UnitState,
    last_tx_hash: Option<TxHash>,
}

type Exec<T> = Result<T, String>;

struct PartitionLedger {
    partition: Partition,
    /// Last certified round.
    round: u64,
    units: BTreeMap<UnitId, StoredUnit>,
    open_block: Vec<TransactionRecord>,
    proofs: HashMap<TxHash, TxRecordProof>,
    /// Proof-carrying transactions already consumed (addFC, reclaimFC, swaps, joins).
    consumed: HashSet<TxHash>,
    stalled: bool,
    queued: Vec<TransactionOrder>,
    fail_next: bool,
}

fn check_owner(owner: &OwnerPredicate, signer: &OwnerPredicate) -> Exec<()> {
    if owner != signer {
        return Err("owner proof does not match unit owner".into());
    }
    Ok(())
}

fn check_counter(quoted: u64, actual: u64) -> Exec<()> {
    if quoted != actual {
        return Err(format!("stale counter: order quotes {quoted}, unit is at {actual}"));
    }
    Ok(())
}

fn check_permits(status: LockStatus, purpose: SpendPurpose) -> Exec<()> {
    if !status.permits(purpose) {
        return Err(format!("unit is {status}"));
    }
    Ok(())
}

/// Owner, counter and lock of a bill or token.
fn lockable_mut(state: &mut UnitState) -> Option<(&OwnerPredicate, &mut u64, &mut LockStatus)> {
    match state {
        UnitState::Bill(b) => Some((&b.owner, &mut b.counter, &mut b.lock_status)),
        UnitState::Token(t) => Some((&t.owner, &mut t.counter, &mut t.lock_status)),
        UnitState::FeeCredit(_) => None,
    }
}

impl PartitionLedger {
    fn new(partition: Partition) -> Self {
        Self {
            partition,
            round: 1,
            units: BTreeMap::new(),
            open_block: Vec::new(),
            proofs: HashMap::new(),
            consumed: HashSet::new(),
            stalled: false,
            queued: Vec::new(),
            fail_next: false,
        }
    }

    fn require(&self, partition: Partition, what: &str) -> Exec<()> {
        if self.partition != partition {
            return Err(format!("{what} is only valid on the {partition} partition"));
        }
        Ok(())
    }

    fn unit_mut(&mut self, id: &UnitId) -> Exec<&mut StoredUnit> {
        self.units
            .get_mut(id)
            .ok_or_else(|| format!("unit {id} does not exist"))
    }

    fn bill(&self, id: &UnitId) -> Exec<&Bill> {
        match self.units.get(id).map(|u| &u.state) {
            Some(UnitState::Bill(b)) => Ok(b),
            _ => Err(format!("bill {id} does not exist")),
        }
    }

    fn bill_mut(&mut self, id: &UnitId) -> Exec<&mut Bill> {
        match self.units.get_mut(id).map(|u| &mut u.state) {
            Some(UnitState::Bill(b)) => Ok(b),
            _ => Err(format!("bill {id} does not exist")),
        }
    }

    fn token(&self, id: &UnitId) -> Exec<&FungibleToken> {
        match self.units.get(id).map(|u| &u.state) {
            Some(UnitState::Token(t)) => Ok(t),
            _ => Err(format!("token {id} does not exist")),
        }
    }

    fn token_mut(&mut self, id: &UnitId) -> Exec<&mut FungibleToken> {
        match self.units.get_mut(id).map(|u| &mut u.state) {
            Some(UnitState::Token(t)) => Ok(t),
            _ => Err(format!("token {id} does not exist")),
        }
    }

    fn fee_credit(&self, id: &UnitId) -> Exec<&FeeCreditRecord> {
        match self.units.get(id).map(|u| &u.state) {
            Some(UnitState::FeeCredit(f)) => Ok(f),
            _ => Err(format!("fee credit record {id} does not exist")),
        }
    }

    fn fee_credit_mut(&mut self, id: &UnitId) -> Exec<&mut FeeCreditRecord> {
        match self.units.get_mut(id).map(|u| &mut u.state) {
            Some(UnitState::FeeCredit(f)) => Ok(f),
            _ => Err(format!("fee credit record {id} does not exist")),
        }
    }

    fn unconsumed_hash(&self, proof: &TxRecordProof) -> Exec<TxHash> {
        let hash = proof.tx_hash().map_err(|e| e.to_string())?;
        if self.consumed.contains(&hash) {
            return Err("proof already consumed".into());
        }
        Ok(hash)
    }

    /// Certifies the open block.
    fn seal(&mut self, validators: &[Keypair]) -> CodecResult<()> {
        if self.open_block.is_empty() {
            return Ok(());
        }
        self.round += 1;
        let records = std::mem::take(&mut self.open_block);
        let leaves = records.iter().map(leaf_hash).collect::<CodecResult<Vec<_>>>()?;
        let mut certificate =
            UnicityCertificate::new(self.partition.id(), self.round, merkle_root(&leaves));
        for validator in validators {
            certificate.sign(validator)?;
        }
        for (index, record) in records.into_iter().enumerate() {
            let hash = record.order.hash()?;
            let proof = TxRecordProof {
                record,
                proof: TxProof {
                    chain: merkle_path(&leaves, index),
                    certificate: certificate.clone(),
                },
            };
            self.proofs.insert(hash, proof);
        }
        debug!(partition = %self.partition, round = self.round, "sealed block");
        Ok(())
    }

    /// Validates `order` against current state and, if valid, applies it and
    /// appends its record to the open block.
    fn execute(&mut self, order: &TransactionOrder, trust_base: &TrustBase) -> Exec<()> {
        let hash = order.hash().map_err(|e| e.to_string())?;
        let next_round = self.round + 1;
        if order.timeout() < next_round {
            return Err(format!(
                "order timed out at round {}, next round is {next_round}",
                order.timeout()
            ));
        }
        let signer = match &order.owner_proof {
            Some(proof) if verify_owner_proof(order) => OwnerPredicate::p2pkh(&proof.public_key),
            Some(_) => return Err("invalid owner proof".into()),
            None => return Err("missing owner proof".into()),
        };

        let fee_payer = if order.tx_type().pays_fee_from_amount() {
            None
        } else {
            let id = order
                .client_metadata
                .fee_credit_record_id
                .clone()
                .ok_or("missing fee credit record reference")?;
            let fcr = self.fee_credit(&id)?;
            check_owner(&fcr.owner, &signer)?;
            if fcr.balance < LEDGER_FEE {
                return Err(format!("fee credit record {id} cannot pay the fee"));
            }
            Some(id)
        };

        let (status, target_units) = if std::mem::take(&mut self.fail_next) {
            (TxStatus::Failed, Vec::new())
        } else {
            let touched = self.apply(order, &signer, next_round, trust_base)?;
            for id in &touched {
                if let Some(unit) = self.units.get_mut(id) {
                    unit.last_tx_hash = Some(hash);
                }
            }
            (TxStatus::Successful, touched)
        };

        if let Some(id) = fee_payer {
            let fcr = self.fee_credit_mut(&id)?;
            fcr.balance -= LEDGER_FEE;
        }
        debug!(
            partition = %self.partition,
            tx_type = %order.tx_type(),
            unit = %order.unit_id,
            ?status,
            "executed transaction"
        );
        self.open_block.push(TransactionRecord {
            order: order.clone(),
            server_metadata: ServerMetadata {
                actual_fee: LEDGER_FEE,
                status,
                target_units,
            },
        });
        Ok(())
    }

    /// Applies the state transition. Returns the units it touched.
    fn apply(
        &mut self,
        order: &TransactionOrder,
        signer: &OwnerPredicate,
        next_round: u64,
        trust_base: &TrustBase,
    ) -> Exec<Vec<UnitId>> {
        let unit = &order.unit_id;
        match &order.attributes {
            TxAttributes::Transfer {
                new_owner,
                value,
                counter,
            } => {
                self.require(Partition::Money, "transfer")?;
                let bill = self.bill_mut(unit)?;
                check_owner(&bill.owner, signer)?;
                check_counter(*counter, bill.counter)?;
                check_permits(bill.lock_status, SpendPurpose::Transfer)?;
                if *value != bill.value {
                    return Err(format!("transfer quotes {value}, bill holds {}", bill.value));
                }
                bill.owner = new_owner.clone();
                bill.counter += 1;
                Ok(vec![unit.clone()])
            }

            TxAttributes::Split { targets, counter } => {
                self.require(Partition::Money, "split")?;
                let total = targets
                    .iter()
                    .try_fold(0u64, |acc, t| acc.checked_add(t.amount))
                    .ok_or("split amount overflow")?;
                if targets.is_empty() || targets.iter().any(|t| t.amount == 0) {
                    return Err("split targets must be non-empty and non-zero".into());
                }
                let bill = self.bill_mut(unit)?;
                check_owner(&bill.owner, signer)?;
                check_counter(*counter, bill.counter)?;
                check_permits(bill.lock_status, SpendPurpose::Transfer)?;
                if total > bill.value {
                    return Err(format!("split of {total} exceeds bill value {}", bill.value));
                }
                bill.value -= total;
                bill.counter += 1;

                let order_hash = order.hash().map_err(|e| e.to_string())?;
                let mut touched = vec![unit.clone()];
                for (index, target) in targets.iter().enumerate() {
                    let body = sha256_concat(&[
                        unit.as_bytes(),
                        &order_hash,
                        &(index as u64).to_be_bytes(),
                    ]);
                    let id = UnitId::new(body, UnitType::Bill);
                    let bill = Bill {
                        id: id.clone(),
                        value: target.amount,
                        counter: 0,
                        lock_status: LockStatus::Unlocked,
                        owner: target.owner.clone(),
                    };
                    self.units.insert(
                        id.clone(),
                        StoredUnit {
                            state: UnitState::Bill(bill),
                            last_tx_hash: None,
                        },
                    );
                    touched.push(id);
                }
                Ok(touched)
            }

            TxAttributes::Lock { reason, counter } => {
                if !self.partition.supports_locking() {
                    return Err(format!("{} does not support locking", self.partition));
                }
                let stored = self.unit_mut(unit)?;
                let (owner, unit_counter, status) =
                    lockable_mut(&mut stored.state).ok_or("unit cannot be locked")?;
                check_owner(owner, signer)?;
                check_counter(*counter, *unit_counter)?;
                *status = status.lock(*reason).map_err(|e| e.to_string())?;
                *unit_counter += 1;
                Ok(vec![unit.clone()])
            }

            TxAttributes::Unlock { counter } => {
                let stored = self.unit_mut(unit)?;
                let (owner, unit_counter, status) =
                    lockable_mut(&mut stored.state).ok_or("unit cannot be unlocked")?;
                check_owner(owner, signer)?;
                check_counter(*counter, *unit_counter)?;
                *status = status.unlock().map_err(|e| e.to_string())?;
                *unit_counter += 1;
                Ok(vec![unit.clone()])
            }

            TxAttributes::LockFeeCredit { reason, counter } => {
                if !self.partition.supports_locking() {
                    return Err(format!("{} does not support locking", self.partition));
                }
                let fcr = self.fee_credit_mut(unit)?;
                check_owner(&fcr.owner, signer)?;
                check_counter(*counter, fcr.counter)?;
                fcr.lock_status = fcr.lock_status.lock(*reason).map_err(|e| e.to_string())?;
                fcr.counter += 1;
                Ok(vec![unit.clone()])
            }

            TxAttributes::UnlockFeeCredit { counter } => {
                let fcr = self.fee_credit_mut(unit)?;
                check_owner(&fcr.owner, signer)?;
                check_counter(*counter, fcr.counter)?;
                fcr.lock_status = fcr.lock_status.unlock().map_err(|e| e.to_string())?;
                fcr.counter += 1;
                Ok(vec![unit.clone()])
            }

            TxAttributes::TransferFeeCredit {
                amount, counter, ..
            } => {
                self.require(Partition::Money, "transferFC")?;
                let bill = self.bill_mut(unit)?;
                check_owner(&bill.owner, signer)?;
                check_counter(*counter, bill.counter)?;
                check_permits(bill.lock_status, SpendPurpose::AddFee)?;
                if *amount > bill.value || *amount < LEDGER_FEE {
                    return Err(format!("cannot transfer {amount} from bill of {}", bill.value));
                }
                bill.value -= amount;
                bill.counter += 1;
                Ok(vec![unit.clone()])
            }

            TxAttributes::AddFeeCredit { owner, transfer } => {
                check_owner(owner, signer)?;
                transfer
                    .verify(trust_base)
                    .map_err(|e| format!("transfer proof: {e}"))?;
                let transfer_order = &transfer.record.order;
                let TxAttributes::TransferFeeCredit {
                    amount,
                    target_partition,
                    target_record_id,
                    target_record_counter,
                    earliest_addition_time,
                    latest_addition_time,
                    ..
                } = &transfer_order.attributes
                else {
                    return Err("addFC must carry a transferFC proof".into());
                };
                if transfer_order.partition_id != Partition::Money.id()
                    || *target_partition != self.partition.id()
                    || target_record_id != unit
                {
                    return Err("transferFC targets another record".into());
                }
                if next_round < *earliest_addition_time || next_round > *latest_addition_time {
                    return Err(format!(
                        "round {next_round} outside addition window [{earliest_addition_time}, {latest_addition_time}]"
                    ));
                }
                let transfer_hash = self.unconsumed_hash(transfer)?;
                let credit = amount
                    .checked_sub(transfer.actual_fee())
                    .and_then(|v| v.checked_sub(LEDGER_FEE))
                    .ok_or("transferred amount does not cover fees")?;

                let existing = match self.units.get(unit).map(|u| &u.state) {
                    Some(UnitState::FeeCredit(f)) => Some(f.counter),
                    Some(_) => return Err(format!("{unit} is not a fee credit record")),
                    None => None,
                };
                if existing != *target_record_counter {
                    return Err(format!(
                        "stale fee credit counter: transfer quotes {target_record_counter:?}, record is at {existing:?}"
                    ));
                }
                let lifetime = latest_addition_time.saturating_add(FEE_CREDIT_LIFETIME);
                if existing.is_some() {
                    let fcr = self.fee_credit_mut(unit)?;
                    check_owner(&fcr.owner, owner)?;
                    fcr.balance = fcr.balance.checked_add(credit).ok_or("balance overflow")?;
                    fcr.counter += 1;
                    fcr.timeout = fcr.timeout.max(lifetime);
                    if fcr.lock_status == LockStatus::LockedForAddFee {
                        fcr.lock_status = LockStatus::Unlocked;
                    }
                } else {
                    let fcr = FeeCreditRecord {
                        id: unit.clone(),
                        balance: credit,
                        counter: 0,
                        lock_status: LockStatus::Unlocked,
                        owner: owner.clone(),
                        timeout: lifetime,
                    };
                    self.units.insert(
                        unit.clone(),
                        StoredUnit {
                            state: UnitState::FeeCredit(fcr),
                            last_tx_hash: None,
                        },
                    );
                }
                self.consumed.insert(transfer_hash);
                Ok(vec![unit.clone()])
            }

            TxAttributes::CloseFeeCredit {
                amount, counter, ..
            } => {
                let fcr = self.fee_credit_mut(unit)?;
                check_owner(&fcr.owner, signer)?;
                check_counter(*counter, fcr.counter)?;
                if fcr.lock_status.is_locked() {
                    return Err(format!("fee credit record is {}", fcr.lock_status));
                }
                if *amount != fcr.balance || *amount < LEDGER_FEE {
                    return Err(format!(
                        "closeFC amount {amount} must equal balance {}",
                        fcr.balance
                    ));
                }
                fcr.balance = 0;
                fcr.counter += 1;
                Ok(vec![unit.clone()])
            }

            TxAttributes::ReclaimFeeCredit { close, counter } => {
                self.require(Partition::Money, "reclaimFC")?;
                close
                    .verify(trust_base)
                    .map_err(|e| format!("close proof: {e}"))?;
                let TxAttributes::CloseFeeCredit {
                    amount,
                    target_unit_id,
                    target_unit_counter,
                    ..
                } = &close.record.order.attributes
                else {
                    return Err("reclaimFC must carry a closeFC proof".into());
                };
                if target_unit_id != unit {
                    return Err("closeFC targets another bill".into());
                }
                let close_hash = self.unconsumed_hash(close)?;
                let credit = amount
                    .checked_sub(close.actual_fee())
                    .and_then(|v| v.checked_sub(LEDGER_FEE))
                    .ok_or("closed amount does not cover fees")?;
                let bill = self.bill_mut(unit)?;
                check_owner(&bill.owner, signer)?;
                check_counter(*counter, bill.counter)?;
                check_counter(*target_unit_counter, bill.counter)?;
                check_permits(bill.lock_status, SpendPurpose::ReclaimFee)?;
                bill.value = bill.value.checked_add(credit).ok_or("value overflow")?;
                bill.counter += 1;
                if bill.lock_status == LockStatus::LockedForReclaimFee {
                    bill.lock_status = LockStatus::Unlocked;
                }
                self.consumed.insert(close_hash);
                Ok(vec![unit.clone()])
            }

            TxAttributes::DustTransfer {
                value,
                target_unit_id,
                counter,
                ..
            } => {
                self.require(Partition::Money, "dust transfer")?;
                self.bill(target_unit_id)?;
                let bill = self.bill_mut(unit)?;
                check_owner(&bill.owner, signer)?;
                check_counter(*counter, bill.counter)?;
                if bill.lock_status.is_locked() {
                    return Err(format!("dust source is {}", bill.lock_status));
                }
                if *value != bill.value {
                    return Err(format!("dust transfer quotes {value}, bill holds {}", bill.value));
                }
                bill.value = 0;
                bill.owner = OwnerPredicate::burned();
                bill.counter += 1;
                Ok(vec![unit.clone()])
            }

            TxAttributes::SwapDust { transfers, counter } => {
                self.require(Partition::Money, "dust swap")?;
                let target = self.bill(unit)?.clone();
                check_owner(&target.owner, signer)?;
                check_counter(*counter, target.counter)?;
                check_permits(target.lock_status, SpendPurpose::DustCollection)?;
                let mut hashes = Vec::with_capacity(transfers.len());
                let mut total = 0u64;
                for proof in transfers {
                    proof
                        .verify(trust_base)
                        .map_err(|e| format!("dust proof: {e}"))?;
                    let TxAttributes::DustTransfer {
                        value,
                        target_unit_id,
                        target_unit_counter,
                        ..
                    } = &proof.record.order.attributes
                    else {
                        return Err("swap must carry dust transfer proofs".into());
                    };
                    if target_unit_id != unit {
                        return Err("dust transfer targets another bill".into());
                    }
                    check_counter(*target_unit_counter, target.counter)?;
                    let hash = self.unconsumed_hash(proof)?;
                    if hashes.contains(&hash) {
                        return Err("duplicate dust transfer".into());
                    }
                    hashes.push(hash);
                    total = total.checked_add(*value).ok_or("value overflow")?;
                }
                let bill = self.bill_mut(unit)?;
                bill.value = bill.value.checked_add(total).ok_or("value overflow")?;
                bill.counter += 1;
                if bill.lock_status == LockStatus::LockedForDustCollection {
                    bill.lock_status = LockStatus::Unlocked;
                }
                self.consumed.extend(hashes);
                Ok(vec![unit.clone()])
            }

            TxAttributes::BurnToken {
                type_id,
                value,
                target_token_id,
                counter,
                ..
            } => {
                self.require(Partition::Tokens, "token burn")?;
                if self.token(target_token_id)?.type_id != *type_id {
                    return Err("burn target has another token type".into());
                }
                let token = self.token_mut(unit)?;
                check_owner(&token.owner, signer)?;
                check_counter(*counter, token.counter)?;
                if token.lock_status.is_locked() {
                    return Err(format!("burn source is {}", token.lock_status));
                }
                if token.type_id != *type_id || *value != token.value {
                    return Err("burn does not match token".into());
                }
                token.value = 0;
                token.owner = OwnerPredicate::burned();
                token.counter += 1;
                Ok(vec![unit.clone()])
            }

            TxAttributes::JoinToken { burns, counter } => {
                self.require(Partition::Tokens, "token join")?;
                let target = self.token(unit)?.clone();
                check_owner(&target.owner, signer)?;
                check_counter(*counter, target.counter)?;
                check_permits(target.lock_status, SpendPurpose::DustCollection)?;
                let mut hashes = Vec::with_capacity(burns.len());
                let mut total = 0u64;
                for proof in burns {
                    proof
                        .verify(trust_base)
                        .map_err(|e| format!("burn proof: {e}"))?;
                    let TxAttributes::BurnToken {
                        type_id,
                        value,
                        target_token_id,
                        target_token_counter,
                        ..
                    } = &proof.record.order.attributes
                    else {
                        return Err("join must carry burn proofs".into());
                    };
                    if target_token_id != unit || *type_id != target.type_id {
                        return Err("burn targets another token".into());
                    }
                    check_counter(*target_token_counter, target.counter)?;
                    let hash = self.unconsumed_hash(proof)?;
                    if hashes.contains(&hash) {
                        return Err("duplicate burn".into());
                    }
                    hashes.push(hash);
                    total = total.checked_add(*value).ok_or("value overflow")?;
                }
                let token = self.token_mut(unit)?;
                token.value = token.value.checked_add(total).ok_or("value overflow")?;
                token.counter += 1;
                if token.lock_status == LockStatus::LockedForDustCollection {
                    token.lock_status = LockStatus::Unlocked;
                }
                self.consumed.extend(hashes);
                Ok(vec![unit.clone()])
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

struct LedgerState {
    partitions: BTreeMap<PartitionId, PartitionLedger>,
    submissions: HashMap<TxType, usize>,
    tamper_proofs: bool,
    mint_nonce: u64,
}

impl LedgerState {
    fn partition_mut(&mut self, id: PartitionId) -> LedgerResult<&mut PartitionLedger> {
        self.partitions
            .get_mut(&id)
            .ok_or(LedgerError::UnknownPartition(id))
    }

    fn ledger(&mut self, partition: Partition) -> &mut PartitionLedger {
        self.partitions
            .entry(partition.id())
            .or_insert_with(|| PartitionLedger::new(partition))
    }

    fn next_unit_id(&mut self, kind: &[u8], unit_type: UnitType) -> UnitId {
        self.mint_nonce += 1;
        UnitId::new(
            sha256_concat(&[b"mint", kind, &self.mint_nonce.to_be_bytes()]),
            unit_type,
        )
    }
}

/// Deterministic single-process ledger covering every [`Partition`].
pub struct InMemoryLedger {
    validators: Vec<Keypair>,
    trust_base: TrustBase,
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    /// Ledger certified by `validator_count` validators with a
    /// supermajority quorum.
    pub fn new(validator_count: usize) -> Self {
        let validators: Vec<Keypair> = (0..validator_count as u64)
            .map(|i| Keypair::from_seed(&sha256_concat(&[b"validator", &i.to_be_bytes()])))
            .collect();
        let trust_base =
            TrustBase::with_supermajority(1, validators.iter().map(Keypair::public_key));
        let partitions = Partition::ALL
            .iter()
            .map(|p| (p.id(), PartitionLedger::new(*p)))
            .collect();
        Self {
            validators,
            trust_base,
            state: Mutex::new(LedgerState {
                partitions,
                submissions: HashMap::new(),
                tamper_proofs: false,
                mint_nonce: 0,
            }),
        }
    }

    fn with_partition<T>(
        &self,
        partition: PartitionId,
        f: impl FnOnce(&mut PartitionLedger) -> T,
    ) -> LedgerResult<T> {
        let mut state = self.state.lock();
        let ledger = state.partition_mut(partition)?;
        ledger
            .seal(&self.validators)
            .map_err(|e| LedgerError::Decode(e.to_string()))?;
        Ok(f(ledger))
    }

    // -- Genesis ------------------------------------------------------------

    /// Creates a bill of `value` owned by `owner`.
    pub fn mint_bill(&self, owner: &PublicKey, value: u64) -> Bill {
        let mut state = self.state.lock();
        let id = state.next_unit_id(b"bill", UnitType::Bill);
        let bill = Bill {
            id: id.clone(),
            value,
            counter: 0,
            lock_status: LockStatus::Unlocked,
            owner: OwnerPredicate::p2pkh(owner),
        };
        state.ledger(Partition::Money).units.insert(
            id,
            StoredUnit {
                state: UnitState::Bill(bill.clone()),
                last_tx_hash: None,
            },
        );
        bill
    }

    /// Creates a fungible token of `type_id` owned by `owner`.
    pub fn mint_token(&self, owner: &PublicKey, type_id: &UnitId, value: u64) -> FungibleToken {
        let mut state = self.state.lock();
        let id = state.next_unit_id(b"token", UnitType::FungibleToken);
        let token = FungibleToken {
            id: id.clone(),
            type_id: type_id.clone(),
            value,
            counter: 0,
            lock_status: LockStatus::Unlocked,
            owner: OwnerPredicate::p2pkh(owner),
        };
        state.ledger(Partition::Tokens).units.insert(
            id,
            StoredUnit {
                state: UnitState::Token(token.clone()),
                last_tx_hash: None,
            },
        );
        token
    }

    /// Creates or tops up `owner`'s fee credit record on `partition`
    /// without going through the transferFC/addFC protocol.
    pub fn credit_fee_record(
        &self,
        partition: Partition,
        owner: &PublicKey,
        balance: u64,
    ) -> FeeCreditRecord {
        let id = partition.fee_credit_record_id(owner);
        let mut state = self.state.lock();
        let ledger = state.ledger(partition);
        let existing = ledger.units.get(&id);
        let last_tx_hash = existing.and_then(|u| u.last_tx_hash);
        let fcr = match existing.map(|u| &u.state) {
            Some(UnitState::FeeCredit(current)) => FeeCreditRecord {
                balance: current.balance + balance,
                ..current.clone()
            },
            _ => FeeCreditRecord {
                id: id.clone(),
                balance,
                counter: 0,
                lock_status: LockStatus::Unlocked,
                owner: OwnerPredicate::p2pkh(owner),
                timeout: ledger.round + FEE_CREDIT_LIFETIME,
            },
        };
        ledger.units.insert(
            id,
            StoredUnit {
                state: UnitState::FeeCredit(fcr.clone()),
                last_tx_hash,
            },
        );
        fcr
    }

    // -- Knobs --------------------------------------------------------------

    /// Stops (or resumes) block production on `partition`.
    pub fn set_stalled(&self, partition: Partition, stalled: bool) {
        let mut state = self.state.lock();
        let ledger = state.ledger(partition);
        ledger.stalled = stalled;
        if stalled {
            return;
        }
        for order in std::mem::take(&mut ledger.queued) {
            if let Err(reason) = ledger.execute(&order, &self.trust_base) {
                debug!(%partition, tx_type = %order.tx_type(), %reason, "dropped queued order");
            }
        }
    }

    /// Certifies pending work and moves `partition` forward `rounds` rounds.
    pub fn advance_rounds(&self, partition: Partition, rounds: u64) {
        let _ = self.with_partition(partition.id(), |ledger| ledger.round += rounds);
    }

    /// Simulates a foreign transaction on `unit_id`: bumps its counter and
    /// replaces its last transaction hash.
    pub fn inject_conflict(&self, partition: Partition, unit_id: &UnitId) {
        let foreign: TxHash = rand::random();
        let _ = self.with_partition(partition.id(), |ledger| {
            if let Some(unit) = ledger.units.get_mut(unit_id) {
                match &mut unit.state {
                    UnitState::Bill(b) => b.counter += 1,
                    UnitState::FeeCredit(f) => f.counter += 1,
                    UnitState::Token(t) => t.counter += 1,
                }
                unit.last_tx_hash = Some(foreign);
            }
        });
    }

    pub fn set_tamper_proofs(&self, tamper: bool) {
        self.state.lock().tamper_proofs = tamper;
    }

    /// Records the next executed order on `partition` as failed.
    pub fn fail_next(&self, partition: Partition) {
        self.state.lock().ledger(partition).fail_next = true;
    }

    // -- Inspection ---------------------------------------------------------

    /// Number of submissions of `tx_type`, accepted or not.
    pub fn submissions(&self, tx_type: TxType) -> usize {
        self.state
            .lock()
            .submissions
            .get(&tx_type)
            .copied()
            .unwrap_or(0)
    }

    pub fn unit(&self, partition: Partition, unit_id: &UnitId) -> Option<UnitState> {
        self.with_partition(partition.id(), |ledger| {
            ledger.units.get(unit_id).map(|u| u.state.clone())
        })
        .ok()
        .flatten()
    }

    pub fn round(&self, partition: Partition) -> u64 {
        self.with_partition(partition.id(), |ledger| ledger.round)
            .unwrap_or_default()
    }

    pub fn trust_base(&self) -> TrustBase {
        self.trust_base.clone()
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(DEFAULT_VALIDATORS)
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn submit_transaction(&self, order: &TransactionOrder) -> LedgerResult<TxHash> {
        let hash = order
            .hash()
            .map_err(|e| LedgerError::Decode(e.to_string()))?;
        let mut guard = self.state.lock();
        let state = &mut *guard;
        *state.submissions.entry(order.tx_type()).or_default() += 1;
        if order.client_metadata.max_fee < LEDGER_FEE {
            return Err(LedgerError::FeePolicy {
                max_fee: order.client_metadata.max_fee,
                required: LEDGER_FEE,
            });
        }
        let ledger = state.partition_mut(order.partition_id)?;
        if ledger.stalled {
            ledger.queued.push(order.clone());
            return Ok(hash);
        }
        ledger
            .execute(order, &self.trust_base)
            .map_err(|reason| LedgerError::Rejected {
                partition: order.partition_id,
                reason,
            })?;
        Ok(hash)
    }

    async fn get_unit(
        &self,
        partition: PartitionId,
        unit_id: &UnitId,
    ) -> LedgerResult<Option<UnitRecord>> {
        self.with_partition(partition, |ledger| {
            ledger.units.get(unit_id).map(|u| UnitRecord {
                state: u.state.clone(),
                last_tx_hash: u.last_tx_hash,
            })
        })
    }

    async fn get_round_number(&self, partition: PartitionId) -> LedgerResult<u64> {
        self.with_partition(partition, |ledger| {
            if ledger.stalled {
                ledger.round += 1;
            }
            ledger.round
        })
    }

    async fn get_transaction_proof(
        &self,
        partition: PartitionId,
        unit_id: &UnitId,
        tx_hash: TxHash,
    ) -> LedgerResult<Option<TxRecordProof>> {
        let tamper = self.state.lock().tamper_proofs;
        self.with_partition(partition, |ledger| {
            ledger
                .proofs
                .get(&tx_hash)
                .filter(|p| p.record.order.unit_id == *unit_id)
                .cloned()
                .map(|mut proof| {
                    if tamper {
                        proof.proof.certificate.root_hash[0] ^= 0xff;
                    }
                    proof
                })
        })
    }

    async fn get_trust_base(&self, partition: PartitionId) -> LedgerResult<TrustBase> {
        self.with_partition(partition, |_| self.trust_base.clone())
    }

    async fn get_units_by_owner(
        &self,
        partition: PartitionId,
        owner: &OwnerPredicate,
    ) -> LedgerResult<Vec<UnitId>> {
        self.with_partition(partition, |ledger| {
            ledger
                .units
                .values()
                .filter(|u| u.state.owner() == owner)
                .map(|u| u.state.id().clone())
                .collect()
        })
    }
}
