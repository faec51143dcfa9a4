// Wallet engine benchmarks.
//
// Covers proof verification against trust bases of growing size and bill
// selection over wallets of growing size.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use shard_wallet::config::WalletConfig;
use shard_wallet::crypto::Keypair;
use shard_wallet::ledger::{InMemoryLedger, LedgerClient};
use shard_wallet::money::select_bills_for_amount;
use shard_wallet::partition::Partition;
use shard_wallet::transaction::builder::build_transfer;
use shard_wallet::transaction::{signed, verify_proof, OrderParams, TxRecordProof};
use shard_wallet::unit::{Bill, LockStatus, OwnerPredicate, UnitId, UnitType};

/// A confirmed transfer and the ledger that certified it.
fn confirmed_transfer(validators: usize) -> (InMemoryLedger, TxRecordProof) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let ledger = InMemoryLedger::new(validators);
    let key = Keypair::from_seed(&[9u8; 32]);
    let bill = ledger.mint_bill(&key.public_key(), 1_000);
    let fcr = ledger.credit_fee_record(Partition::Money, &key.public_key(), 100);
    let params = OrderParams::new(ledger.round(Partition::Money), &WalletConfig::default());
    let receiver = OwnerPredicate::p2pkh(&Keypair::from_seed(&[8u8; 32]).public_key());
    let order = signed(build_transfer(&bill, receiver, &fcr.id, params).unwrap(), &key).unwrap();

    let proof = runtime.block_on(async {
        let hash = ledger.submit_transaction(&order).await.unwrap();
        ledger
            .get_transaction_proof(Partition::Money.id(), &bill.id, hash)
            .await
            .unwrap()
            .unwrap()
    });
    (ledger, proof)
}

fn bench_verify_proof(c: &mut Criterion) {
    let mut group = c.benchmark_group("proof/verify");

    for validators in [1usize, 4, 16] {
        let (ledger, proof) = confirmed_transfer(validators);
        let trust_base = ledger.trust_base();
        group.bench_with_input(
            BenchmarkId::from_parameter(validators),
            &validators,
            |b, _| {
                b.iter(|| verify_proof(black_box(&proof.record), &proof.proof, &trust_base).unwrap());
            },
        );
    }

    group.finish();
}

fn wallet(size: usize) -> Vec<Bill> {
    (0..size)
        .map(|i| Bill {
            id: UnitId::derive(&(i as u64).to_be_bytes(), UnitType::Bill),
            value: (i as u64 * 7_919) % 10_000 + 1,
            counter: 0,
            lock_status: if i % 10 == 0 {
                LockStatus::LockedManual
            } else {
                LockStatus::Unlocked
            },
            owner: OwnerPredicate::burned(),
        })
        .collect()
}

fn bench_select_bills(c: &mut Criterion) {
    let mut group = c.benchmark_group("money/select_bills");

    for size in [10usize, 100, 1_000] {
        let bills = wallet(size);
        let spendable: u64 = bills
            .iter()
            .filter(|b| b.is_spendable())
            .map(|b| b.value)
            .sum();
        let target = spendable / 2;
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &bills, |b, bills| {
            b.iter(|| select_bills_for_amount(black_box(bills), target).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_verify_proof, bench_select_bills);
criterion_main!(benches);
