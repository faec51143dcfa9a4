//! # Engine Configuration & Constants
//!
//! Every protocol number the wallet engine depends on lives here: fee caps,
//! the fee-credit minimum, timeout windows, and the poll cadence of the
//! confirmation loop. Callers that need to tune behaviour at runtime do it
//! through [`WalletConfig`]; the constants are the defaults it starts from.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Partition Identifiers
// ---------------------------------------------------------------------------

/// Money partition. Bills live here, and so does every `transferFC` and
/// `reclaimFC`.
pub const MONEY_PARTITION_ID: u32 = 0x0000_0001;

/// Fungible and non-fungible token partition.
pub const TOKENS_PARTITION_ID: u32 = 0x0000_0002;

/// EVM partition. Accepts fee credit but refuses lock transactions.
pub const EVM_PARTITION_ID: u32 = 0x0000_0003;

// ---------------------------------------------------------------------------
// Fee Parameters
// ---------------------------------------------------------------------------

/// Number of decimal places in the money partition's display unit.
/// `1.0` in the CLI is `10^8` base units on the ledger.
pub const AMOUNT_DECIMALS: u32 = 8;

/// Upper bound on the fee any single transaction built by the engine may
/// consume. Written into every order's `max_fee`.
pub const MAX_FEE: u64 = 10;

/// Smallest fee-credit amount worth moving. Anything below this is eaten
/// by the `transferFC` + `addFC` (or `closeFC` + `reclaimFC`) fee pair
/// before it does anything useful.
pub const MINIMUM_FEE_AMOUNT: u64 = 3 * MAX_FEE;

// ---------------------------------------------------------------------------
// Round Windows
// ---------------------------------------------------------------------------

/// How many rounds past the current one an order stays eligible for
/// inclusion. The publisher stops waiting once the ledger passes it.
pub const TX_TIMEOUT_ROUNDS: u64 = 10;

/// Width of the `[earliest, latest]` addition window stamped on a
/// `transferFC`. The matching `addFC` must land inside it.
pub const FC_ADDITION_WINDOW: u64 = 10;

// ---------------------------------------------------------------------------
// Confirmation Loop
// ---------------------------------------------------------------------------

/// Delay between two proof polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_000);

/// Wall-clock ceiling on a single confirmation wait. The round timeout
/// normally fires first; this only guards against a ledger whose round
/// counter stops moving.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(120);

// ---------------------------------------------------------------------------
// Dust Collection
// ---------------------------------------------------------------------------

/// Maximum number of source units swept into the target in one swap.
pub const MAX_DUST_BATCH: usize = 100;

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Errors raised by [`WalletConfig::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("poll interval must be non-zero")]
    ZeroPollInterval,

    #[error("max wait ({max_wait_ms}ms) must be at least one poll interval ({poll_ms}ms)")]
    WaitShorterThanPoll {
        /// Configured wait budget in milliseconds.
        max_wait_ms: u128,
        /// Configured poll interval in milliseconds.
        poll_ms: u128,
    },

    #[error("{field} must be non-zero")]
    ZeroValue {
        /// Name of the offending field.
        field: &'static str,
    },

    #[error("minimum fee amount {minimum} must exceed two max fees ({max_fee} each)")]
    MinimumTooSmall {
        /// Configured minimum fee-credit amount.
        minimum: u64,
        /// Configured max fee.
        max_fee: u64,
    },
}

/// Runtime knobs for the engine.
///
/// `Default` gives the protocol constants above. Tests shrink the poll
/// interval and wait budget; everything else is rarely touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Delay between confirmation polls.
    pub poll_interval: Duration,
    /// Wall-clock budget for one confirmation wait.
    pub max_wait: Duration,
    /// Rounds added to the current round to form an order's timeout.
    pub tx_timeout_rounds: u64,
    /// Width of the fee-credit addition window in rounds.
    pub fc_addition_window: u64,
    /// Fee cap stamped on every order.
    pub max_fee: u64,
    /// Smallest amount accepted by add and reclaim.
    pub minimum_fee_amount: u64,
    /// Source units per dust swap.
    pub dust_batch_size: usize,
    /// Lock the target fee credit record while an add cycle is in flight.
    pub lock_fee_credit_on_add: bool,
    /// Lock the target bill before closing fee credit into it.
    pub lock_bill_on_reclaim: bool,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
            tx_timeout_rounds: TX_TIMEOUT_ROUNDS,
            fc_addition_window: FC_ADDITION_WINDOW,
            max_fee: MAX_FEE,
            minimum_fee_amount: MINIMUM_FEE_AMOUNT,
            dust_batch_size: MAX_DUST_BATCH,
            lock_fee_credit_on_add: true,
            lock_bill_on_reclaim: true,
        }
    }
}

impl WalletConfig {
    /// Checks the cross-field constraints the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.max_wait < self.poll_interval {
            return Err(ConfigError::WaitShorterThanPoll {
                max_wait_ms: self.max_wait.as_millis(),
                poll_ms: self.poll_interval.as_millis(),
            });
        }
        if self.tx_timeout_rounds == 0 {
            return Err(ConfigError::ZeroValue {
                field: "tx_timeout_rounds",
            });
        }
        if self.fc_addition_window == 0 {
            return Err(ConfigError::ZeroValue {
                field: "fc_addition_window",
            });
        }
        if self.dust_batch_size == 0 {
            return Err(ConfigError::ZeroValue {
                field: "dust_batch_size",
            });
        }
        if self.minimum_fee_amount <= self.max_fee.saturating_mul(2) {
            return Err(ConfigError::MinimumTooSmall {
                minimum: self.minimum_fee_amount,
                max_fee: self.max_fee,
            });
        }
        Ok(())
    }

    /// A configuration with a fast poll loop, for tests and local devnets.
    pub fn fast() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            max_wait: Duration::from_secs(5),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_ids_are_distinct() {
        assert_ne!(MONEY_PARTITION_ID, TOKENS_PARTITION_ID);
        assert_ne!(MONEY_PARTITION_ID, EVM_PARTITION_ID);
        assert_ne!(TOKENS_PARTITION_ID, EVM_PARTITION_ID);
    }

    #[test]
    fn minimum_covers_a_fee_pair() {
        // transferFC + addFC must never be able to eat the whole minimum.
        assert!(MINIMUM_FEE_AMOUNT > 2 * MAX_FEE);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(WalletConfig::default().validate().is_ok());
        assert!(WalletConfig::fast().validate().is_ok());
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let cfg = WalletConfig {
            poll_interval: Duration::ZERO,
            ..WalletConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroPollInterval));
    }

    #[test]
    fn wait_shorter_than_poll_rejected() {
        let cfg = WalletConfig {
            poll_interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(1),
            ..WalletConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::WaitShorterThanPoll { .. })
        ));
    }

    #[test]
    fn tiny_minimum_rejected() {
        let cfg = WalletConfig {
            minimum_fee_amount: 20,
            max_fee: 10,
            ..WalletConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MinimumTooSmall { .. })
        ));
    }

    #[test]
    fn config_survives_json() {
        let cfg = WalletConfig::fast();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: WalletConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
