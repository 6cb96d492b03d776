//! # Batch Registry
//!
//! Storage seam for batches. Every implementation provides:
//! - `create`: validate input, allocate a fresh id, store an empty ledger
//! - `find`: load the latest snapshot or fail with `NotFound`
//! - `save`: persist a snapshot with compare-and-swap on `version`
//! - `list`: all batches ordered by id
//!
//! Ids are allocated per calendar year: `VAX-2025-001`, `VAX-2025-002`, ...

use crate::primitives::{BATCH_ID_PREFIX, BATCH_SEQ_WIDTH, DEFAULT_TEMP_MAX, DEFAULT_TEMP_MIN};
use crate::stage::Stage;
use crate::types::validate_location;
use crate::{Batch, BatchId, TempLimits, VaxtraxError};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

// =============================================================================
// NEW BATCH INPUT
// =============================================================================

/// Input for registering a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBatch {
    pub location: String,
    #[serde(default = "default_stage")]
    pub stage: Stage,
    #[serde(default)]
    pub temp_limits: Option<TempLimits>,
}

fn default_stage() -> Stage {
    Stage::Factory
}

impl NewBatch {
    /// A batch starting at `Factory` with global thresholds.
    #[must_use]
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            stage: Stage::Factory,
            temp_limits: None,
        }
    }

    #[must_use]
    pub fn at_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: Option<TempLimits>) -> Self {
        self.temp_limits = limits;
        self
    }

    /// Check location and limits before anything is allocated.
    pub fn validate(&self) -> Result<(), VaxtraxError> {
        validate_location(&self.location)?;
        if let Some(limits) = &self.temp_limits {
            limits.validate()?;
        }
        Ok(())
    }
}

/// Build limits from optional bounds.
///
/// Neither bound means the batch uses the global thresholds. A single bound
/// is completed from the defaults (min −20 °C, max −15 °C).
pub fn limits_from_bounds(
    min: Option<f64>,
    max: Option<f64>,
) -> Result<Option<TempLimits>, VaxtraxError> {
    match (min, max) {
        (None, None) => Ok(None),
        (min, max) => TempLimits::new(
            min.unwrap_or(DEFAULT_TEMP_MIN),
            max.unwrap_or(DEFAULT_TEMP_MAX),
        )
        .map(Some),
    }
}

/// Format a registry id, e.g. `format_batch_id(2025, 7)` → `VAX-2025-007`.
#[must_use]
pub fn format_batch_id(year: i32, seq: u64) -> BatchId {
    BatchId(format!(
        "{BATCH_ID_PREFIX}-{year}-{seq:0width$}",
        width = BATCH_SEQ_WIDTH
    ))
}

/// Check a stored version against the version the caller loaded.
pub(crate) fn check_version(
    id: &BatchId,
    stored: u64,
    expected: u64,
) -> Result<(), VaxtraxError> {
    if stored == expected {
        Ok(())
    } else {
        Err(VaxtraxError::ConcurrentModification(id.clone()))
    }
}

// =============================================================================
// REGISTRY TRAIT
// =============================================================================

/// Batch storage shared across request handlers.
///
/// Methods take `&self`; implementations synchronize internally so a single
/// registry can sit behind an `Arc`.
pub trait BatchRegistry: Send + Sync {
    /// Register a new batch and return its initial snapshot.
    fn create(&self, new: NewBatch, now: DateTime<Utc>) -> Result<Batch, VaxtraxError>;

    /// Load a batch by id.
    fn find(&self, id: &BatchId) -> Result<Batch, VaxtraxError>;

    /// Persist `batch` if the stored version still equals `expected_version`.
    fn save(&self, batch: &Batch, expected_version: u64) -> Result<(), VaxtraxError>;

    /// All batches ordered by id.
    fn list(&self) -> Result<Vec<Batch>, VaxtraxError>;
}

// =============================================================================
// IN-MEMORY REGISTRY
// =============================================================================

#[derive(Debug, Default)]
struct MemoryInner {
    batches: BTreeMap<BatchId, Batch>,
    sequences: BTreeMap<i32, u64>,
}

/// Volatile registry backed by a `BTreeMap`.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    inner: RwLock<MemoryInner>,
}

impl MemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored batches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .batches
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BatchRegistry for MemoryRegistry {
    fn create(&self, new: NewBatch, now: DateTime<Utc>) -> Result<Batch, VaxtraxError> {
        new.validate()?;

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let year = now.year();
        let seq = inner
            .sequences
            .get(&year)
            .copied()
            .unwrap_or(0)
            .saturating_add(1);
        let id = format_batch_id(year, seq);

        let batch = Batch::new(id.clone(), new.location, new.stage, new.temp_limits, now);
        inner.sequences.insert(year, seq);
        inner.batches.insert(id, batch.clone());
        Ok(batch)
    }

    fn find(&self, id: &BatchId) -> Result<Batch, VaxtraxError> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .batches
            .get(id)
            .cloned()
            .ok_or_else(|| VaxtraxError::NotFound(id.clone()))
    }

    fn save(&self, batch: &Batch, expected_version: u64) -> Result<(), VaxtraxError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let stored = inner
            .batches
            .get(batch.id())
            .ok_or_else(|| VaxtraxError::NotFound(batch.id().clone()))?;
        check_version(batch.id(), stored.version(), expected_version)?;
        inner.batches.insert(batch.id().clone(), batch.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<Batch>, VaxtraxError> {
        Ok(self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .batches
            .values()
            .cloned()
            .collect())
    }
}

// =============================================================================
// TESTS
// =============================================================================
