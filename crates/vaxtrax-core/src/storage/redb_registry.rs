//! # redb-backed Batch Registry
//!
//! A disk-backed registry using the redb embedded database.
//!
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Each batch is one row: id → header + postcard(Batch). The version check
//! of `save` runs inside the same write transaction as the insert, so two
//! processes sharing a database file cannot overwrite each other's appends.

use crate::formats::{batch_from_bytes, batch_to_bytes};
use crate::registry::{BatchRegistry, NewBatch, check_version, format_batch_id};
use crate::{Batch, BatchId, VaxtraxError};
use chrono::{DateTime, Datelike, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;

/// Table for batches: id -> serialized batch record
const BATCHES: TableDefinition<&str, &[u8]> = TableDefinition::new("batches");

/// Table for metadata: key string -> value u64 (`seq:<year>` counters)
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

fn io_err(e: impl std::fmt::Display) -> VaxtraxError {
    VaxtraxError::IoError(e.to_string())
}

fn seq_key(year: i32) -> String {
    format!("seq:{year}")
}

/// A disk-backed batch registry using redb.
pub struct RedbRegistry {
    db: Database,
}

impl std::fmt::Debug for RedbRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbRegistry").finish_non_exhaustive()
    }
}

impl RedbRegistry {
    /// Open or create a registry database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VaxtraxError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(io_err)?;
            let _ = write_txn.open_table(BATCHES).map_err(io_err)?;
            let _ = write_txn.open_table(METADATA).map_err(io_err)?;
            write_txn.commit().map_err(io_err)?;
        }

        Ok(Self { db })
    }

    /// Number of stored batches.
    pub fn batch_count(&self) -> Result<u64, VaxtraxError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(BATCHES).map_err(io_err)?;
        table.len().map_err(io_err)
    }
}

impl BatchRegistry for RedbRegistry {
    fn create(&self, new: NewBatch, now: DateTime<Utc>) -> Result<Batch, VaxtraxError> {
        new.validate()?;

        let year = now.year();
        let key = seq_key(year);
        let write_txn = self.db.begin_write().map_err(io_err)?;

        let batch = {
            let mut meta = write_txn.open_table(METADATA).map_err(io_err)?;
            let seq = meta
                .get(key.as_str())
                .map_err(io_err)?
                .map(|v| v.value())
                .unwrap_or(0)
                .saturating_add(1);
            meta.insert(key.as_str(), seq).map_err(io_err)?;

            let id = format_batch_id(year, seq);
            let batch = Batch::new(id, new.location, new.stage, new.temp_limits, now);
            let bytes = batch_to_bytes(&batch)?;

            let mut batches = write_txn.open_table(BATCHES).map_err(io_err)?;
            batches
                .insert(batch.id().as_str(), bytes.as_slice())
                .map_err(io_err)?;
            batch
        };

        write_txn.commit().map_err(io_err)?;
        Ok(batch)
    }

    fn find(&self, id: &BatchId) -> Result<Batch, VaxtraxError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(BATCHES).map_err(io_err)?;
        let guard = table
            .get(id.as_str())
            .map_err(io_err)?
            .ok_or_else(|| VaxtraxError::NotFound(id.clone()))?;
        batch_from_bytes(guard.value())
    }

    fn save(&self, batch: &Batch, expected_version: u64) -> Result<(), VaxtraxError> {
        let bytes = batch_to_bytes(batch)?;
        let write_txn = self.db.begin_write().map_err(io_err)?;

        {
            let mut table = write_txn.open_table(BATCHES).map_err(io_err)?;
            let stored_version = {
                let guard = table
                    .get(batch.id().as_str())
                    .map_err(io_err)?
                    .ok_or_else(|| VaxtraxError::NotFound(batch.id().clone()))?;
                batch_from_bytes(guard.value())?.version()
            };
            check_version(batch.id(), stored_version, expected_version)?;
            table
                .insert(batch.id().as_str(), bytes.as_slice())
                .map_err(io_err)?;
        }

        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<Batch>, VaxtraxError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(BATCHES).map_err(io_err)?;
        let mut batches = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            batches.push(batch_from_bytes(value.value())?);
        }
        // Keys iterate in string order.
        batches.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(batches)
    }
}

// =============================================================================
// TESTS
// =============================================================================
