//! # CLI Interface
//!
//! Defines the command-line argument structure for `shard-wallet` using
//! `clap` derive. Connection and key material come from global flags (or
//! their environment variables); each subcommand names the account index
//! it acts for.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use shard_wallet::partition::Partition;

use crate::logging::LogFormat;

/// Wallet for a sharded fee-credit ledger.
///
/// Sends bills, consolidates dust, and moves value between bills and the
/// per-partition fee credit that pays for transactions.
#[derive(Parser, Debug)]
#[command(
    name = "shard-wallet",
    about = "Wallet for a sharded fee-credit ledger",
    version,
    propagate_version = true
)]
pub struct WalletCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every subcommand.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Path to the wallet database holding unfinished fee-credit processes
    /// and dust batches.
    #[arg(long, env = "SHARD_WALLET_DB", default_value = "wallet.db", global = true)]
    pub db: PathBuf,

    /// Hex-encoded 32-byte master seed that account keys derive from.
    #[arg(long, env = "SHARD_WALLET_SEED", hide_env_values = true, global = true)]
    pub seed: Option<String>,

    /// Number of accounts derived from the seed.
    #[arg(long, env = "SHARD_WALLET_ACCOUNTS", default_value_t = 10, global = true)]
    pub accounts: u64,

    /// JSON-RPC endpoint of the money partition.
    #[arg(
        long,
        env = "SHARD_MONEY_RPC",
        default_value = "http://127.0.0.1:26866/rpc",
        global = true
    )]
    pub money_rpc: String,

    /// JSON-RPC endpoint of the tokens partition.
    #[arg(long, env = "SHARD_TOKENS_RPC", global = true)]
    pub tokens_rpc: Option<String>,

    /// JSON-RPC endpoint of the EVM partition.
    #[arg(long, env = "SHARD_EVM_RPC", global = true)]
    pub evm_rpc: Option<String>,

    /// Milliseconds between confirmation polls.
    #[arg(long, env = "SHARD_WALLET_POLL_MS", default_value_t = 1_000, global = true)]
    pub poll_ms: u64,

    /// Seconds to wait for one confirmation before giving up.
    #[arg(long, env = "SHARD_WALLET_MAX_WAIT_SECS", default_value_t = 120, global = true)]
    pub max_wait_secs: u64,

    /// Log output format.
    #[arg(
        long,
        env = "SHARD_WALLET_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Pretty,
        global = true
    )]
    pub log_format: LogFormat,

    /// Log filter directives when `RUST_LOG` is unset.
    #[arg(long, default_value = "shard_wallet=info,shard_wallet_cli=info", global = true)]
    pub log_level: String,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fee credit management.
    Fees {
        #[command(subcommand)]
        command: FeesCommand,
    },
    /// Pay one or more receivers from an account's bills.
    Send(SendArgs),
    /// Merge an account's small bills (or tokens of one type) into one.
    CollectDust(CollectDustArgs),
    /// Bill inspection and manual locking.
    Bills {
        #[command(subcommand)]
        command: BillsCommand,
    },
}

#[derive(Args, Debug, Clone, Copy)]
pub struct AccountArg {
    /// Account index.
    #[arg(long, short = 'k', default_value_t = 0)]
    pub account: u64,
}

#[derive(Subcommand, Debug)]
pub enum FeesCommand {
    /// Move bill value into fee credit on a partition.
    Add {
        #[command(flatten)]
        account: AccountArg,
        /// Amount, e.g. `1.5`.
        amount: String,
        /// Target partition: money, tokens or evm.
        #[arg(long, short = 'p', default_value = "money")]
        partition: Partition,
    },
    /// Return all fee credit on a partition to a bill.
    Reclaim {
        #[command(flatten)]
        account: AccountArg,
        #[arg(long, short = 'p', default_value = "money")]
        partition: Partition,
    },
    /// Lock the fee credit record so it can neither pay nor be closed.
    Lock {
        #[command(flatten)]
        account: AccountArg,
        #[arg(long, short = 'p', default_value = "money")]
        partition: Partition,
    },
    /// Unlock the fee credit record.
    Unlock {
        #[command(flatten)]
        account: AccountArg,
        #[arg(long, short = 'p', default_value = "money")]
        partition: Partition,
    },
    /// Print fee credit balances.
    Show {
        #[command(flatten)]
        account: AccountArg,
        /// Only this partition; every partition when omitted.
        #[arg(long, short = 'p')]
        partition: Option<Partition>,
    },
    /// Print the account's unfinished add or reclaim process, if any.
    Pending {
        #[command(flatten)]
        account: AccountArg,
    },
    /// Drop the unfinished process once its order can no longer execute.
    Abandon {
        #[command(flatten)]
        account: AccountArg,
    },
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub account: AccountArg,

    /// Receivers as `<pubkey-hex>:<amount>`.
    #[arg(required = true, num_args = 1..)]
    pub receivers: Vec<String>,

    /// Return after submission instead of waiting for proofs.
    #[arg(long)]
    pub no_wait: bool,
}

#[derive(Args, Debug)]
pub struct CollectDustArgs {
    #[command(flatten)]
    pub account: AccountArg,

    /// Collect tokens of this type (hex unit id) instead of bills.
    #[arg(long)]
    pub token_type: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum BillsCommand {
    /// List the account's bills, largest first.
    List {
        #[command(flatten)]
        account: AccountArg,
    },
    /// Lock a bill so it is never spent.
    Lock {
        #[command(flatten)]
        account: AccountArg,
        /// Hex unit id of the bill.
        bill_id: String,
    },
    /// Unlock a bill.
    Unlock {
        #[command(flatten)]
        account: AccountArg,
        bill_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        WalletCli::command().debug_assert();
    }

    #[test]
    fn parses_fee_add() {
        let cli = WalletCli::try_parse_from([
            "shard-wallet",
            "--seed",
            "00",
            "fees",
            "add",
            "-k",
            "2",
            "150",
            "-p",
            "tokens",
            "--log-format",
            "compact",
        ])
        .unwrap();
        assert_eq!(cli.global.log_format, LogFormat::Compact);
        match cli.command {
            Commands::Fees {
                command:
                    FeesCommand::Add {
                        account,
                        amount,
                        partition,
                    },
            } => {
                assert_eq!(account.account, 2);
                assert_eq!(amount, "150");
                assert_eq!(partition, Partition::Tokens);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn send_requires_a_receiver() {
        assert!(WalletCli::try_parse_from(["shard-wallet", "send"]).is_err());
    }
}
