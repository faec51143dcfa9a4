// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Shard Wallet CLI
//!
//! Entry point for the `shard-wallet` binary. Parses CLI arguments,
//! initializes logging, wires the engine to the partitions' JSON-RPC
//! endpoints, and runs one command.
//!
//! - `fees`         — add, reclaim, lock, unlock, show, pending, abandon
//! - `send`         — pay receivers from bills
//! - `collect-dust` — merge small bills or tokens
//! - `bills`        — list, lock, unlock
//!
//! Ctrl+C cancels the running command at its next safe point. An
//! interrupted fee process stays in the wallet database and is resumed by
//! re-running the same command.

mod amount;
mod cli;
mod logging;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use shard_wallet::account::SeedAccounts;
use shard_wallet::cancel::CancelToken;
use shard_wallet::config::WalletConfig;
use shard_wallet::crypto::PublicKey;
use shard_wallet::fees::{FeeManager, PendingFeeProcess};
use shard_wallet::ledger::{JsonRpcLedger, LedgerClient, RpcEndpoints};
use shard_wallet::money::{MoneyWallet, Receiver};
use shard_wallet::partition::Partition;
use shard_wallet::publisher::TxPublisher;
use shard_wallet::storage::WalletDB;
use shard_wallet::transaction::TxRecordProof;
use shard_wallet::unit::UnitId;

use amount::{format_amount, parse_amount};
use cli::{BillsCommand, Commands, FeesCommand, GlobalArgs, WalletCli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = WalletCli::parse();
    logging::init_logging(&cli.global.log_level, cli.global.log_format)?;

    let engine = Engine::open(&cli.global)?;
    let cancel = CancelToken::new();
    spawn_interrupt_handler(cancel.clone());

    match cli.command {
        Commands::Fees { command } => engine.fees(command, &cancel).await,
        Commands::Send(args) => {
            let receivers = args
                .receivers
                .iter()
                .map(String::as_str)
                .map(parse_receiver)
                .collect::<Result<Vec<_>>>()?;
            let outcome = engine
                .money
                .send_bills(args.account.account, &receivers, !args.no_wait, &cancel)
                .await
                .context("send failed")?;
            for hash in &outcome.tx_hashes {
                println!("{}", hex::encode(hash));
            }
            if !args.no_wait {
                println!("confirmed, fee paid {}", outcome.fee_paid);
            }
            Ok(())
        }
        Commands::CollectDust(args) => {
            let account = args.account.account;
            let outcome = match args.token_type {
                Some(type_hex) => {
                    let type_id = UnitId::from_hex(&type_hex).context("invalid token type id")?;
                    engine
                        .money
                        .collect_token_dust(account, type_id, &cancel)
                        .await
                }
                None => engine.money.collect_dust(account, &cancel).await,
            }
            .context("dust collection failed")?;
            match &outcome.target {
                Some(target) => println!(
                    "{} batches merged into {target} (value {}), fee paid {}",
                    outcome.batches,
                    format_amount(outcome.value),
                    outcome.fee_paid
                ),
                None => println!("nothing to collect"),
            }
            Ok(())
        }
        Commands::Bills { command } => engine.bills(command, &cancel).await,
    }
}

/// The engine's façades, wired to JSON-RPC endpoints.
struct Engine {
    fees: FeeManager,
    money: MoneyWallet,
    partitions: Vec<Partition>,
}

impl Engine {
    fn open(args: &GlobalArgs) -> Result<Self> {
        let seed = args
            .seed
            .as_deref()
            .context("no master seed given (use --seed or SHARD_WALLET_SEED)")?;
        let accounts = Arc::new(
            SeedAccounts::from_hex(seed, args.accounts).context("invalid master seed")?,
        );

        let mut partitions = vec![Partition::Money];
        let mut endpoints = RpcEndpoints::new().with(Partition::Money, &args.money_rpc);
        for (partition, url) in [
            (Partition::Tokens, &args.tokens_rpc),
            (Partition::Evm, &args.evm_rpc),
        ] {
            if let Some(url) = url {
                endpoints = endpoints.with(partition, url);
                partitions.push(partition);
            }
        }
        let ledger: Arc<dyn LedgerClient> =
            Arc::new(JsonRpcLedger::new(endpoints).context("failed to build RPC client")?);

        let config = WalletConfig {
            poll_interval: Duration::from_millis(args.poll_ms),
            max_wait: Duration::from_secs(args.max_wait_secs),
            ..WalletConfig::default()
        };
        config.validate().context("invalid wallet configuration")?;

        let db = WalletDB::open(&args.db).with_context(|| {
            format!("failed to open wallet database at {}", args.db.display())
        })?;
        tracing::debug!(path = %args.db.display(), "wallet database opened");

        let publisher = Arc::new(TxPublisher::new(ledger, config));
        Ok(Self {
            fees: FeeManager::new(publisher.clone(), accounts.clone(), db.clone()),
            money: MoneyWallet::new(publisher, accounts, db),
            partitions,
        })
    }

    async fn fees(&self, command: FeesCommand, cancel: &CancelToken) -> Result<()> {
        match command {
            FeesCommand::Add {
                account,
                amount,
                partition,
            } => {
                let amount = parse_amount(&amount)?;
                let outcome = self
                    .fees
                    .add_fee_credit(account.account, amount, partition, cancel)
                    .await
                    .with_context(|| format!("adding fee credit on {partition} failed"))?;
                print_proofs(&outcome.proofs);
                println!("fee credit added on {partition}, fee paid {}", outcome.fee_paid);
            }
            FeesCommand::Reclaim { account, partition } => {
                let outcome = self
                    .fees
                    .reclaim_fee_credit(account.account, partition, cancel)
                    .await
                    .with_context(|| format!("reclaiming fee credit on {partition} failed"))?;
                println!(
                    "reclaimed {} from {partition}, fee paid {}",
                    format_amount(outcome.reclaimed),
                    outcome.fee_paid
                );
            }
            FeesCommand::Lock { account, partition } => {
                let proof = self
                    .fees
                    .lock_fee_credit(account.account, partition, cancel)
                    .await
                    .context("locking fee credit failed")?;
                print_proofs(std::slice::from_ref(&proof));
            }
            FeesCommand::Unlock { account, partition } => {
                let proof = self
                    .fees
                    .unlock_fee_credit(account.account, partition, cancel)
                    .await
                    .context("unlocking fee credit failed")?;
                print_proofs(std::slice::from_ref(&proof));
            }
            FeesCommand::Show { account, partition } => {
                let partitions = match partition {
                    Some(p) => vec![p],
                    None => self.partitions.clone(),
                };
                for partition in partitions {
                    let record = self
                        .fees
                        .get_fee_credit(account.account, partition)
                        .await
                        .with_context(|| format!("reading fee credit on {partition} failed"))?;
                    match record {
                        Some(r) => println!(
                            "{partition:<7} {} ({})",
                            format_amount(r.balance),
                            r.lock_status
                        ),
                        None => println!("{partition:<7} -"),
                    }
                }
            }
            FeesCommand::Pending { account } => {
                match self.fees.pending_process(account.account)? {
                    Some(pending) => print_pending(&pending),
                    None => println!("no pending fee credit process"),
                }
            }
            FeesCommand::Abandon { account } => {
                match self.fees.abandon_pending(account.account).await? {
                    Some(pending) => {
                        print_pending(&pending);
                        println!("abandoned");
                    }
                    None => println!("no pending fee credit process"),
                }
            }
        }
        Ok(())
    }

    async fn bills(&self, command: BillsCommand, cancel: &CancelToken) -> Result<()> {
        match command {
            BillsCommand::List { account } => {
                let bills = self.money.list_bills(account.account).await?;
                for bill in &bills {
                    println!(
                        "{} {:>20} {}",
                        bill.id,
                        format_amount(bill.value),
                        bill.lock_status
                    );
                }
                let total = self.money.total_balance(account.account).await?;
                println!("total {}", format_amount(total));
                for batch in self.money.pending_dust(account.account)? {
                    println!(
                        "unmerged dust batch into {} ({} orders), run collect-dust to finish it",
                        batch.target,
                        batch.orders.len()
                    );
                }
            }
            BillsCommand::Lock { account, bill_id } => {
                let id = UnitId::from_hex(&bill_id).context("invalid bill id")?;
                let proof = self
                    .money
                    .lock_bill(account.account, &id, cancel)
                    .await
                    .context("locking bill failed")?;
                print_proofs(std::slice::from_ref(&proof));
            }
            BillsCommand::Unlock { account, bill_id } => {
                let id = UnitId::from_hex(&bill_id).context("invalid bill id")?;
                let proof = self
                    .money
                    .unlock_bill(account.account, &id, cancel)
                    .await
                    .context("unlocking bill failed")?;
                print_proofs(std::slice::from_ref(&proof));
            }
        }
        Ok(())
    }
}

/// Parses `<pubkey-hex>:<amount>`.
fn parse_receiver(s: &str) -> Result<Receiver> {
    let Some((key, amount)) = s.split_once(':') else {
        bail!("receiver '{s}' must look like <pubkey>:<amount>");
    };
    Ok(Receiver {
        public_key: PublicKey::from_hex(key)
            .with_context(|| format!("invalid receiver key '{key}'"))?,
        amount: parse_amount(amount)?,
    })
}

fn print_proofs(proofs: &[TxRecordProof]) {
    for proof in proofs {
        let order = &proof.record.order;
        println!(
            "{:<18} {} round {} fee {}",
            order.tx_type().to_string(),
            order.unit_id,
            proof.round_number(),
            proof.actual_fee()
        );
    }
}

fn print_pending(pending: &PendingFeeProcess) {
    println!("process   {}", pending.id);
    println!("kind      {}", pending.kind);
    println!("partition {}", pending.target_partition);
    println!("amount    {}", format_amount(pending.amount));
    if pending.remaining > 0 {
        println!("then      {} more", format_amount(pending.remaining));
    }
    println!("stage     {}", pending.stage.name());
    println!("updated   {}", pending.updated_at.to_rfc3339());
}

/// Cancels `token` on Ctrl+C.
fn spawn_interrupt_handler(token: CancelToken) {
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping at the next safe point");
            token.cancel();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use shard_wallet::crypto::Keypair;

    #[test]
    fn receiver_parses_key_and_amount() {
        let key = Keypair::from_seed(&[1u8; 32]).public_key();
        let receiver = parse_receiver(&format!("{}:2.5", key.to_hex())).unwrap();
        assert_eq!(receiver.public_key, key);
        assert_eq!(receiver.amount, 250_000_000);
    }

    #[test]
    fn receiver_without_amount_is_rejected() {
        assert!(parse_receiver("abcd").is_err());
        assert!(parse_receiver("zz:1").is_err());
    }
}
