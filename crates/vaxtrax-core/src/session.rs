//! # Custody Desk
//!
//! Orchestrates every batch operation against a registry.
//!
//! Each mutating operation runs the same cycle under the lock for its batch:
//!
//! ```text
//! find → validate / apply in memory → save (compare-and-swap on version)
//! ```
//!
//! Operations on different batches run in parallel. Nothing is written
//! unless the whole cycle succeeds.
//!
//! ## Storage Backends
//!
//! - `InMemory`: `MemoryRegistry` (fast, volatile)
//! - `Persistent`: `RedbRegistry` for disk-backed ACID storage

use crate::classifier::{ThresholdConfig, thresholds_for};
use crate::gate::{GateAction, RecommendationGate};
use crate::ledger::ScanLedger;
use crate::nfc::parse_payload;
use crate::primitives::MAX_SCAN_CLOCK_SKEW_SECS;
use crate::registry::{BatchRegistry, MemoryRegistry, NewBatch};
use crate::stage::Stage;
use crate::storage::RedbRegistry;
use crate::{
    Batch, BatchId, Recommendation, RequestContext, ScanEvent, Status, VaxtraxError,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// Registry selected at startup.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory registry (fast, volatile).
    InMemory(MemoryRegistry),
    /// Disk-backed registry using redb (ACID, persistent).
    Persistent(RedbRegistry),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryRegistry::new())
    }
}

impl StorageBackend {
    /// Open or create a redb registry at `path`.
    pub fn persistent(path: impl AsRef<Path>) -> Result<Self, VaxtraxError> {
        Ok(Self::Persistent(RedbRegistry::open(path)?))
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, StorageBackend::Persistent(_))
    }

    fn registry(&self) -> &dyn BatchRegistry {
        match self {
            StorageBackend::InMemory(r) => r,
            StorageBackend::Persistent(r) => r,
        }
    }
}

impl BatchRegistry for StorageBackend {
    fn create(&self, new: NewBatch, now: DateTime<Utc>) -> Result<Batch, VaxtraxError> {
        self.registry().create(new, now)
    }

    fn find(&self, id: &BatchId) -> Result<Batch, VaxtraxError> {
        self.registry().find(id)
    }

    fn save(&self, batch: &Batch, expected_version: u64) -> Result<(), VaxtraxError> {
        self.registry().save(batch, expected_version)
    }

    fn list(&self) -> Result<Vec<Batch>, VaxtraxError> {
        self.registry().list()
    }
}

// =============================================================================
// REQUESTS
// =============================================================================

/// A checkpoint scan submission.
///
/// The reading comes from `temperature` when present, otherwise from the
/// NFC `payload`. Missing `location`, `stage` and `timestamp` default to the
/// batch's current location and stage and the request time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub scanned_by: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub stage: Option<Stage>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ScanRequest {
    /// A manual reading with everything else defaulted.
    #[must_use]
    pub fn reading(temperature: f64) -> Self {
        Self {
            temperature: Some(temperature),
            ..Self::default()
        }
    }

    /// A raw tag payload with everything else defaulted.
    #[must_use]
    pub fn payload(payload: impl Into<String>) -> Self {
        Self {
            payload: Some(payload.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn at_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    #[must_use]
    pub fn at_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    #[must_use]
    pub fn at_time(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Resolve the reading: explicit temperature first, then the payload.
    pub fn resolve_temperature(&self) -> Result<f64, VaxtraxError> {
        match (self.temperature, self.payload.as_deref()) {
            (Some(t), _) => Ok(t),
            (None, Some(payload)) => Ok(parse_payload(payload)?.temperature),
            (None, None) => Err(VaxtraxError::Validation(
                "scan requires a temperature or an NFC payload".to_string(),
            )),
        }
    }

    /// Timestamp of the entry: the submitted one, or `now` when absent.
    ///
    /// A timestamp more than `MAX_SCAN_CLOCK_SKEW_SECS` after `now` is
    /// rejected.
    pub fn resolve_timestamp(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, VaxtraxError> {
        let Some(timestamp) = self.timestamp else {
            return Ok(now);
        };
        if timestamp > now + Duration::seconds(MAX_SCAN_CLOCK_SKEW_SECS) {
            return Err(VaxtraxError::Validation(format!(
                "scan timestamp {timestamp} is in the future (request time {now})"
            )));
        }
        Ok(timestamp)
    }
}

/// A manual status and/or stage change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideRequest {
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub stage: Option<Stage>,
}

/// Result of a scan: the new snapshot and the gate's recommendation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    pub batch: Batch,
    pub recommendation: Recommendation,
}

// =============================================================================
// CUSTODY DESK
// =============================================================================

/// Entry point for all batch operations.
#[derive(Debug)]
pub struct CustodyDesk<R: BatchRegistry> {
    registry: R,
    thresholds: ThresholdConfig,
    locks: Mutex<BTreeMap<BatchId, Arc<Mutex<()>>>>,
}

impl Default for CustodyDesk<StorageBackend> {
    fn default() -> Self {
        Self::new(StorageBackend::default())
    }
}

impl<R: BatchRegistry> CustodyDesk<R> {
    /// Desk with the default thresholds.
    #[must_use]
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            thresholds: ThresholdConfig::default(),
            locks: Mutex::new(BTreeMap::new()),
        }
    }

    /// Desk with validated thresholds.
    pub fn with_thresholds(registry: R, thresholds: ThresholdConfig) -> Result<Self, VaxtraxError> {
        thresholds.validate()?;
        Ok(Self {
            thresholds,
            ..Self::new(registry)
        })
    }

    #[must_use]
    pub fn registry(&self) -> &R {
        &self.registry
    }

    #[must_use]
    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    fn batch_lock(&self, id: &BatchId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(id.clone()).or_default())
    }

    /// Drop `lock` and remove its entry when no other caller holds it.
    ///
    /// Clones are only taken under the map lock, so a count of two (map plus
    /// `lock`) cannot grow while we hold it.
    fn release_lock(&self, id: &BatchId, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(id);
        }
    }

    /// Run find → apply → save for one batch under its lock.
    ///
    /// The lock entry is released on every path, including `NotFound`.
    fn mutate<T>(
        &self,
        id: &BatchId,
        apply: impl FnOnce(&Batch) -> Result<(Batch, T), VaxtraxError>,
    ) -> Result<(Batch, T), VaxtraxError> {
        let lock = self.batch_lock(id);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.registry.find(id).and_then(|current| {
                let (next, extra) = apply(&current)?;
                self.registry.save(&next, current.version())?;
                Ok((next, extra))
            })
        };
        self.release_lock(id, lock);
        result
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    /// Register a new batch.
    pub fn create_batch(&self, ctx: &RequestContext, new: NewBatch) -> Result<Batch, VaxtraxError> {
        self.registry.create(new, ctx.now)
    }

    /// Record a scan and decide the recommendation.
    pub fn submit_scan(
        &self,
        ctx: &RequestContext,
        id: &BatchId,
        request: ScanRequest,
    ) -> Result<ScanOutcome, VaxtraxError> {
        let temperature = request.resolve_temperature()?;
        let timestamp = request.resolve_timestamp(ctx.now)?;

        let (batch, recommendation) = self.mutate(id, |current| {
            let event = ScanEvent::scan(
                timestamp,
                request
                    .location
                    .clone()
                    .unwrap_or_else(|| current.location().to_string()),
                temperature,
                request.stage.unwrap_or(current.stage()),
            )
            .scanned_by(request.scanned_by.clone().or_else(|| ctx.operator.clone()))
            .device(request.device.clone().or_else(|| ctx.device.clone()));

            let thresholds = thresholds_for(current, &self.thresholds);
            let mut next = ScanLedger::append(current, event, &thresholds)?;
            let recommendation = RecommendationGate::on_scan(&mut next)?;
            Ok((next, recommendation))
        })?;

        Ok(ScanOutcome {
            batch,
            recommendation,
        })
    }

    /// Manually set status and/or stage.
    pub fn override_batch(
        &self,
        ctx: &RequestContext,
        id: &BatchId,
        request: OverrideRequest,
    ) -> Result<Batch, VaxtraxError> {
        self.mutate(id, |current| {
            let thresholds = thresholds_for(current, &self.thresholds);
            let next = ScanLedger::record_override(
                current,
                request.status,
                request.stage,
                ctx,
                &thresholds,
            )?;
            Ok((next, ()))
        })
        .map(|(batch, ())| batch)
    }

    /// Accept a proceed recommendation.
    pub fn proceed(&self, ctx: &RequestContext, id: &BatchId) -> Result<Batch, VaxtraxError> {
        self.gate_action(ctx, id, GateAction::Proceed)
    }

    /// Halt the batch.
    pub fn halt(&self, ctx: &RequestContext, id: &BatchId) -> Result<Batch, VaxtraxError> {
        self.gate_action(ctx, id, GateAction::Halt)
    }

    fn gate_action(
        &self,
        ctx: &RequestContext,
        id: &BatchId,
        action: GateAction,
    ) -> Result<Batch, VaxtraxError> {
        self.mutate(id, |current| {
            let thresholds = thresholds_for(current, &self.thresholds);
            let next = RecommendationGate::on_action(current, action, ctx, &thresholds)?;
            Ok((next, ()))
        })
        .map(|(batch, ())| batch)
    }

    /// Load a batch.
    pub fn find(&self, id: &BatchId) -> Result<Batch, VaxtraxError> {
        self.registry.find(id)
    }

    /// Ledger of a batch, newest entry first.
    pub fn history(&self, id: &BatchId) -> Result<Vec<ScanEvent>, VaxtraxError> {
        let batch = self.registry.find(id)?;
        Ok(ScanLedger::history(&batch).cloned().collect())
    }

    /// All batches ordered by id.
    pub fn list(&self) -> Result<Vec<Batch>, VaxtraxError> {
        self.registry.list()
    }
}

// =============================================================================
// TESTS
// =============================================================================
