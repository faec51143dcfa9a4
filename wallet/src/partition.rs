//! # Partitions
//!
//! The ledger is split into independently validated partitions. The wallet
//! knows a closed set of them, and each one answers the same few capability
//! questions: what is its id, does it accept lock transactions, and where
//! does a given key's fee credit record live.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{EVM_PARTITION_ID, MONEY_PARTITION_ID, TOKENS_PARTITION_ID};
use crate::crypto::{sha256_concat, PublicKey};
use crate::unit::{UnitId, UnitType};

/// Numeric partition identifier as carried in transaction orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionId(pub u32);

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Error returned when a partition name or id is not recognised.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown partition '{0}' (expected money, tokens or evm)")]
pub struct UnknownPartition(pub String);

/// The partitions the wallet can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Partition {
    Money,
    Tokens,
    Evm,
}

impl Partition {
    pub const ALL: [Partition; 3] = [Partition::Money, Partition::Tokens, Partition::Evm];

    pub fn id(self) -> PartitionId {
        match self {
            Partition::Money => PartitionId(MONEY_PARTITION_ID),
            Partition::Tokens => PartitionId(TOKENS_PARTITION_ID),
            Partition::Evm => PartitionId(EVM_PARTITION_ID),
        }
    }

    pub fn from_id(id: PartitionId) -> Result<Self, UnknownPartition> {
        Self::ALL
            .into_iter()
            .find(|p| p.id() == id)
            .ok_or_else(|| UnknownPartition(id.to_string()))
    }

    pub fn name(self) -> &'static str {
        match self {
            Partition::Money => "money",
            Partition::Tokens => "tokens",
            Partition::Evm => "evm",
        }
    }

    /// The EVM partition has no lock transactions; fee credit there is
    /// added and reclaimed without the protective lock step.
    pub fn supports_locking(self) -> bool {
        !matches!(self, Partition::Evm)
    }

    /// Deterministic id of `owner`'s fee credit record on this partition.
    ///
    /// `SHA-256(salt ‖ partition_id_be ‖ pubkey)` with the fee-credit type
    /// suffix. Money and tokens share an empty salt; EVM derives its record
    /// ids from a salted hash so they never collide with account addresses.
    pub fn fee_credit_record_id(self, owner: &PublicKey) -> UnitId {
        let salt: &[u8] = match self {
            Partition::Evm => b"evm-fcr",
            Partition::Money | Partition::Tokens => b"",
        };
        let body = sha256_concat(&[salt, &self.id().0.to_be_bytes(), owner.as_bytes()]);
        UnitId::new(body, UnitType::FeeCredit)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Partition {
    type Err = UnknownPartition;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "money" => Ok(Partition::Money),
            "tokens" | "token" => Ok(Partition::Tokens),
            "evm" => Ok(Partition::Evm),
            other => Err(UnknownPartition(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    #[test]
    fn ids_roundtrip() {
        for p in Partition::ALL {
            assert_eq!(Partition::from_id(p.id()).unwrap(), p);
        }
        assert!(Partition::from_id(PartitionId(0xdead)).is_err());
    }

    #[test]
    fn parse_names() {
        assert_eq!("money".parse::<Partition>().unwrap(), Partition::Money);
        assert_eq!("EVM".parse::<Partition>().unwrap(), Partition::Evm);
        assert_eq!("tokens".parse::<Partition>().unwrap(), Partition::Tokens);
        assert!("orchestration".parse::<Partition>().is_err());
    }

    #[test]
    fn only_evm_refuses_locking() {
        assert!(Partition::Money.supports_locking());
        assert!(Partition::Tokens.supports_locking());
        assert!(!Partition::Evm.supports_locking());
    }

    #[test]
    fn fee_credit_ids_are_deterministic_and_partition_scoped() {
        let pk = Keypair::from_seed(&[1u8; 32]).public_key();
        let money = Partition::Money.fee_credit_record_id(&pk);
        assert_eq!(money, Partition::Money.fee_credit_record_id(&pk));
        assert_ne!(money, Partition::Tokens.fee_credit_record_id(&pk));
        assert_ne!(money, Partition::Evm.fee_credit_record_id(&pk));
        assert!(money.has_type(UnitType::FeeCredit));
    }

    #[test]
    fn fee_credit_ids_differ_per_key() {
        let a = Keypair::from_seed(&[1u8; 32]).public_key();
        let b = Keypair::from_seed(&[2u8; 32]).public_key();
        assert_ne!(
            Partition::Money.fee_credit_record_id(&a),
            Partition::Money.fee_credit_record_id(&b)
        );
    }
}
