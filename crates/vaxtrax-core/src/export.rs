//! # Canonical Export Module
//!
//! Deterministic, self-checking serialization of one batch and its ledger.
//!
//! The redb file is the runtime store; it is not guaranteed to be
//! byte-identical across runs. `export_batch()` produces a postcard stream
//! that is, and is what auditors exchange and verify.
//!
//! Format:
//! ```text
//! [header_len: u32 LE] [CanonicalHeader (postcard)] [CanonicalBatch (postcard)]
//! ```

use crate::primitives::MAX_LEDGER_LENGTH;
use crate::stage::{Stage, StageTracker};
use crate::{Batch, BatchId, GateState, ScanEvent, Status, TempLimits, VaxtraxError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// CANONICAL FORMAT
// =============================================================================

/// Magic bytes for canonical export format.
pub const CANONICAL_MAGIC: [u8; 4] = *b"VXEX";

/// Current canonical format version.
pub const CANONICAL_VERSION: u8 = 1;

/// Maximum allowed ledger length in canonical imports.
pub const MAX_IMPORT_EVENT_COUNT: u64 = MAX_LEDGER_LENGTH as u64;

/// Header for canonical export files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalHeader {
    /// Magic bytes to identify the format.
    pub magic: [u8; 4],

    /// Format version for compatibility.
    pub version: u8,

    /// Number of ledger entries in the export.
    pub event_count: u64,

    /// FNV-1a checksum of the data section.
    pub checksum: u64,
}

impl CanonicalHeader {
    #[must_use]
    pub fn new(event_count: u64, checksum: u64) -> Self {
        Self {
            magic: CANONICAL_MAGIC,
            version: CANONICAL_VERSION,
            event_count,
            checksum,
        }
    }

    /// Validate the header.
    ///
    /// Error messages are generic on purpose; the bytes may come from anyone.
    pub fn validate(&self) -> Result<(), VaxtraxError> {
        if self.magic != CANONICAL_MAGIC {
            return Err(VaxtraxError::SerializationError(
                "Invalid file format".to_string(),
            ));
        }
        if self.version != CANONICAL_VERSION {
            return Err(VaxtraxError::SerializationError(
                "Unsupported file version".to_string(),
            ));
        }
        if self.event_count > MAX_IMPORT_EVENT_COUNT {
            return Err(VaxtraxError::SerializationError(format!(
                "Event count {} exceeds maximum allowed {}",
                self.event_count, MAX_IMPORT_EVENT_COUNT
            )));
        }
        Ok(())
    }
}

// =============================================================================
// CANONICAL BATCH
// =============================================================================

/// A batch in canonical form. The gate is not exported: an imported batch
/// always awaits a fresh scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalBatch {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub location: String,
    pub stage: Stage,
    pub status: Status,
    pub temperature: Option<f64>,
    pub temp_limits: Option<TempLimits>,
    /// Ledger in chronological order.
    pub events: Vec<ScanEvent>,
}

impl CanonicalBatch {
    #[must_use]
    pub fn from_batch(batch: &Batch) -> Self {
        Self {
            id: batch.id().to_string(),
            created_at: batch.created_at(),
            last_updated: batch.last_updated(),
            location: batch.location().to_string(),
            stage: batch.stage(),
            status: batch.status(),
            temperature: batch.temperature(),
            temp_limits: batch.temp_limits(),
            events: batch.scan_history().to_vec(),
        }
    }

    /// Rebuild a batch. Version restarts at the ledger length.
    #[must_use]
    pub fn to_batch(&self) -> Batch {
        Batch {
            id: BatchId::new(self.id.clone()),
            temperature: self.temperature,
            location: self.location.clone(),
            stage: self.stage,
            status: self.status,
            last_updated: self.last_updated,
            created_at: self.created_at,
            temp_limits: self.temp_limits,
            scan_history: self.events.clone(),
            gate: GateState::AwaitingScan,
            version: self.events.len() as u64,
        }
    }

    /// Check the ledger invariants a stored batch always satisfies:
    /// chronological entries, monotonic stages, snapshot equal to the
    /// latest entry.
    pub fn validate(&self) -> Result<(), VaxtraxError> {
        if self.id.trim().is_empty() {
            return Err(VaxtraxError::Validation("batch id is empty".to_string()));
        }
        if let Some(limits) = &self.temp_limits {
            limits.validate()?;
        }

        for pair in self.events.windows(2) {
            if let [prev, next] = pair {
                if next.timestamp < prev.timestamp {
                    return Err(VaxtraxError::TemporalOrdering {
                        latest: prev.timestamp,
                        attempted: next.timestamp,
                    });
                }
                StageTracker::advance(prev.stage, next.stage)?;
            }
        }
        for event in &self.events {
            event.validate()?;
        }

        if let Some(latest) = self.events.last() {
            let matches = latest.stage == self.stage
                && latest.status == self.status
                && latest.temperature == self.temperature
                && latest.location == self.location
                && latest.timestamp == self.last_updated;
            if !matches {
                return Err(VaxtraxError::Validation(
                    "batch snapshot does not match its latest ledger entry".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// FNV-1a over the postcard encoding.
    ///
    /// Detects accidental corruption only; use the BLAKE3 hash where
    /// tampering matters.
    pub fn checksum(&self) -> Result<u64, VaxtraxError> {
        let bytes = postcard::to_allocvec(self)
            .map_err(|e| VaxtraxError::SerializationError(e.to_string()))?;
        Ok(fnv1a(&bytes))
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

// =============================================================================
// EXPORT FUNCTIONS
// =============================================================================

/// Export a batch to canonical postcard format.
pub fn export_batch(batch: &Batch) -> Result<Vec<u8>, VaxtraxError> {
    let canonical = CanonicalBatch::from_batch(batch);
    let header = CanonicalHeader::new(canonical.events.len() as u64, canonical.checksum()?);

    let header_bytes = postcard::to_allocvec(&header)
        .map_err(|e| VaxtraxError::SerializationError(format!("Header: {}", e)))?;
    let data_bytes = postcard::to_allocvec(&canonical)
        .map_err(|e| VaxtraxError::SerializationError(format!("Data: {}", e)))?;

    let mut result = Vec::with_capacity(4 + header_bytes.len() + data_bytes.len());
    result.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    result.extend_from_slice(&header_bytes);
    result.extend_from_slice(&data_bytes);
    Ok(result)
}

/// Import a batch from canonical postcard format.
///
/// Header, counts and checksum are checked, then the ledger itself.
pub fn import_batch(data: &[u8]) -> Result<Batch, VaxtraxError> {
    let Some((len_bytes, rest)) = data.split_first_chunk::<4>() else {
        return Err(VaxtraxError::SerializationError(
            "Data too short".to_string(),
        ));
    };
    let header_len = u32::from_le_bytes(*len_bytes) as usize;

    if rest.len() < header_len {
        return Err(VaxtraxError::SerializationError(
            "Data too short for header".to_string(),
        ));
    }
    let (header_bytes, data_bytes) = rest.split_at(header_len);

    let header: CanonicalHeader = postcard::from_bytes(header_bytes)
        .map_err(|e| VaxtraxError::SerializationError(format!("Header: {}", e)))?;
    header.validate()?;

    let canonical: CanonicalBatch = postcard::from_bytes(data_bytes)
        .map_err(|e| VaxtraxError::SerializationError(format!("Data: {}", e)))?;

    let computed = canonical.checksum()?;
    if computed != header.checksum {
        return Err(VaxtraxError::SerializationError(format!(
            "Checksum mismatch: expected {}, got {}",
            header.checksum, computed
        )));
    }
    if canonical.events.len() as u64 != header.event_count {
        return Err(VaxtraxError::SerializationError(
            "Event count mismatch".to_string(),
        ));
    }

    canonical.validate()?;
    Ok(canonical.to_batch())
}

/// Check that `data` is a valid export of exactly this batch.
pub fn verify_batch(batch: &Batch, data: &[u8]) -> Result<bool, VaxtraxError> {
    let imported = import_batch(data)?;
    Ok(CanonicalBatch::from_batch(batch) == CanonicalBatch::from_batch(&imported))
}

/// Canonical checksum of a batch.
pub fn batch_checksum(batch: &Batch) -> Result<u64, VaxtraxError> {
    CanonicalBatch::from_batch(batch).checksum()
}

// =============================================================================
// CRYPTOGRAPHIC HASH SUPPORT
// =============================================================================

/// BLAKE3 hash (hex) of the canonical export of a batch.
#[cfg(feature = "crypto-hash")]
pub fn batch_crypto_hash(batch: &Batch) -> Result<String, VaxtraxError> {
    Ok(compute_blake3_hash(&export_batch(batch)?))
}

/// BLAKE3 hash (hex) of raw bytes.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn compute_blake3_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

// =============================================================================
// TESTS
// =============================================================================
