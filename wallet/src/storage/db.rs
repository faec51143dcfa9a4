//! # WalletDB
//!
//! The wallet's only durable state: the pending fee-credit process of each
//! account and the dust batches whose value is still in transit. Everything
//! else is re-read from the ledger.
//!
//! ## Tree Layout
//!
//! | Tree            | Key                                  | Value                        |
//! |-----------------|--------------------------------------|------------------------------|
//! | `fee_processes` | `account_index` (8B BE)              | `bincode(PendingFeeProcess)` |
//! | `dust_batches`  | `account_index` (8B BE) ‖ target id  | `bincode(PendingDustBatch)`  |
//! | `metadata`      | key (UTF-8)                          | value (bytes)                |
//!
//! ## Atomicity
//!
//! Every write is a compare-and-swap against the bytes the caller last read.
//! Two writers (two tasks, or two processes sharing the directory) can never
//! both create a record for the same account, and a stale writer cannot
//! overwrite a newer stage. Writes are flushed before returning so a stage
//! recorded before a broadcast is on disk when the broadcast happens.
//!
//! Dust batches have a single writer per target unit (the run holding the
//! target's dust lock), so they are plain inserts.

use serde::{de::DeserializeOwned, Serialize};
use sled::{Db, Tree};
use std::path::Path;
use tracing::debug;

use crate::fees::pending::PendingFeeProcess;
use crate::money::dust::PendingDustBatch;
use crate::unit::UnitId;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("account {account} already has a pending fee process")]
    PendingExists { account: u64 },

    #[error("pending fee process of account {account} was modified concurrently")]
    ConcurrentModification { account: u64 },

    #[error("database schema version {found} is not supported (expected {expected})")]
    SchemaMismatch { found: u32, expected: u32 },
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

const META_SCHEMA_VERSION: &[u8] = b"schema_version";

/// Version of the on-disk record layout.
pub const SCHEMA_VERSION: u32 = 2;

fn encode<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

fn dust_key(account: u64, target: &UnitId) -> Vec<u8> {
    let mut key = account.to_be_bytes().to_vec();
    key.extend_from_slice(target.as_bytes());
    key
}

// ---------------------------------------------------------------------------
// WalletDB
// ---------------------------------------------------------------------------

/// Persistent store for pending fee processes and dust batches.
///
/// Cheap to clone; clones share the same sled handle.
#[derive(Debug, Clone)]
pub struct WalletDB {
    db: Db,
    fee_processes: Tree,
    dust_batches: Tree,
    metadata: Tree,
}

impl WalletDB {
    /// Opens or creates a database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory database removed on drop. Used by tests.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let fee_processes = db.open_tree("fee_processes")?;
        let dust_batches = db.open_tree("dust_batches")?;
        let metadata = db.open_tree("metadata")?;

        match metadata.get(META_SCHEMA_VERSION)? {
            Some(bytes) => {
                let found = u32::from_be_bytes(bytes.as_ref().try_into().map_err(|_| {
                    DbError::Serialization("invalid schema version bytes".to_string())
                })?);
                if found != SCHEMA_VERSION {
                    return Err(DbError::SchemaMismatch {
                        found,
                        expected: SCHEMA_VERSION,
                    });
                }
            }
            None => {
                metadata.insert(META_SCHEMA_VERSION, &SCHEMA_VERSION.to_be_bytes())?;
            }
        }

        Ok(Self {
            db,
            fee_processes,
            dust_batches,
            metadata,
        })
    }

    /// Pending process of `account`, if any.
    pub fn get_pending(&self, account: u64) -> DbResult<Option<PendingFeeProcess>> {
        self.fee_processes
            .get(account.to_be_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Stores a new process. Fails with [`DbError::PendingExists`] if the
    /// account already has one.
    pub fn create_pending(&self, process: &PendingFeeProcess) -> DbResult<()> {
        let account = process.account_index;
        let swapped = self.fee_processes.compare_and_swap(
            account.to_be_bytes(),
            None::<&[u8]>,
            Some(encode(process)?),
        )?;
        if swapped.is_err() {
            return Err(DbError::PendingExists { account });
        }
        debug!(account, stage = process.stage.name(), "created pending fee process");
        self.flush()
    }

    /// Replaces `previous` with `next`.
    pub fn update_pending(
        &self,
        previous: &PendingFeeProcess,
        next: &PendingFeeProcess,
    ) -> DbResult<()> {
        let account = previous.account_index;
        let swapped = self.fee_processes.compare_and_swap(
            account.to_be_bytes(),
            Some(encode(previous)?),
            Some(encode(next)?),
        )?;
        if swapped.is_err() {
            return Err(DbError::ConcurrentModification { account });
        }
        debug!(account, stage = next.stage.name(), "advanced pending fee process");
        self.flush()
    }

    /// Deletes `process`, provided it is still the stored one.
    pub fn remove_pending(&self, process: &PendingFeeProcess) -> DbResult<()> {
        let account = process.account_index;
        let swapped = self.fee_processes.compare_and_swap(
            account.to_be_bytes(),
            Some(encode(process)?),
            None::<Vec<u8>>,
        )?;
        if swapped.is_err() {
            return Err(DbError::ConcurrentModification { account });
        }
        debug!(account, "cleared pending fee process");
        self.flush()
    }

    /// All pending processes, ordered by account index.
    pub fn list_pending(&self) -> DbResult<Vec<PendingFeeProcess>> {
        self.fee_processes
            .iter()
            .map(|entry| {
                let (_key, value) = entry?;
                decode(&value)
            })
            .collect()
    }

    /// Records a dust batch before its orders are broadcast, replacing any
    /// earlier record for the same target.
    pub fn put_dust_batch(&self, batch: &PendingDustBatch) -> DbResult<()> {
        self.dust_batches.insert(
            dust_key(batch.account_index, &batch.target),
            encode(batch)?,
        )?;
        debug!(
            account = batch.account_index,
            target = %batch.target,
            orders = batch.orders.len(),
            "recorded dust batch"
        );
        self.flush()
    }

    pub fn get_dust_batch(
        &self,
        account: u64,
        target: &UnitId,
    ) -> DbResult<Option<PendingDustBatch>> {
        self.dust_batches
            .get(dust_key(account, target))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Dust batches of `account` that have not been merged yet.
    pub fn list_dust_batches(&self, account: u64) -> DbResult<Vec<PendingDustBatch>> {
        self.dust_batches
            .scan_prefix(account.to_be_bytes())
            .map(|entry| {
                let (_key, value) = entry?;
                decode(&value)
            })
            .collect()
    }

    pub fn remove_dust_batch(&self, batch: &PendingDustBatch) -> DbResult<()> {
        self.dust_batches
            .remove(dust_key(batch.account_index, &batch.target))?;
        debug!(account = batch.account_index, target = %batch.target, "cleared dust batch");
        self.flush()
    }

    pub fn schema_version(&self) -> DbResult<Option<u32>> {
        Ok(self
            .metadata
            .get(META_SCHEMA_VERSION)?
            .and_then(|bytes| bytes.as_ref().try_into().ok().map(u32::from_be_bytes)))
    }

    /// Blocks until all writes are durable.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
