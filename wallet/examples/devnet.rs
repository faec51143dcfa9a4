//! Walks one account through every engine flow on an in-process ledger.
//!
//! Mints a bill, buys fee credit on the tokens partition, pays a second
//! account, sweeps the resulting change into one bill and sells the fee
//! credit back.
//!
//! Run with:
//!   cargo run --example devnet

use std::sync::Arc;

use shard_wallet::account::{AccountKeys, SeedAccounts};
use shard_wallet::cancel::CancelToken;
use shard_wallet::config::WalletConfig;
use shard_wallet::fees::FeeManager;
use shard_wallet::ledger::InMemoryLedger;
use shard_wallet::money::{MoneyWallet, Receiver};
use shard_wallet::partition::Partition;
use shard_wallet::publisher::TxPublisher;
use shard_wallet::storage::WalletDB;

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn step(title: &str) {
    println!("\n{BOLD}== {title}{RESET}");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = Arc::new(InMemoryLedger::new(4));
    let accounts = Arc::new(SeedAccounts::new([1u8; 32], 2));
    let alice = accounts.account_key(0)?.public_key();
    let bob = accounts.account_key(1)?.public_key();

    let publisher = Arc::new(TxPublisher::new(ledger.clone(), WalletConfig::fast()));
    let db = WalletDB::open_temporary()?;
    let fees = FeeManager::new(publisher.clone(), accounts.clone(), db.clone());
    let money = MoneyWallet::new(publisher, accounts, db);
    let cancel = CancelToken::new();

    step("genesis");
    ledger.mint_bill(&alice, 10_000);
    ledger.mint_bill(&alice, 40);
    ledger.credit_fee_record(Partition::Money, &alice, 200);
    println!("alice holds {} in bills", money.total_balance(0).await?);

    step("add fee credit on tokens");
    let added = fees
        .add_fee_credit(0, 1_000, Partition::Tokens, &cancel)
        .await?;
    let record = fees.get_fee_credit(0, Partition::Tokens).await?;
    println!(
        "{} transactions, fee {}, balance {}",
        added.proofs.len(),
        added.fee_paid,
        record.map(|r| r.balance).unwrap_or(0)
    );

    step("pay bob");
    let sent = money
        .send_bills(0, &[Receiver { public_key: bob, amount: 2_500 }], true, &cancel)
        .await?;
    println!("fee {}, bob holds {}", sent.fee_paid, money.total_balance(1).await?);

    step("collect dust");
    let dust = money.collect_dust(0, &cancel).await?;
    println!("{} batches, final bill {}, fee {}", dust.batches, dust.value, dust.fee_paid);

    step("reclaim fee credit");
    let reclaimed = fees.reclaim_fee_credit(0, Partition::Tokens, &cancel).await?;
    println!("reclaimed {}, fee {}", reclaimed.reclaimed, reclaimed.fee_paid);

    for bill in money.list_bills(0).await? {
        println!("  {} {:>8} {}", bill.id, bill.value, bill.lock_status);
    }
    Ok(())
}
