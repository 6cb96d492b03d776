//! # Core Type Definitions
//!
//! This module contains the data model of the custody ledger:
//! - Identifiers (`BatchId`)
//! - Safety classification (`Status`) and temperature bands (`TempLimits`)
//! - Ledger records (`ScanEvent`, `Action`)
//! - The batch snapshot (`Batch`) and its gate state (`GateState`)
//! - Per-request context (`RequestContext`)
//! - Error types (`VaxtraxError`)
//!
//! ## Mutation Guarantees
//!
//! `Batch` fields are crate-private. Outside this crate a batch can only be
//! read; every change goes through `ScanLedger::append`, which is the single
//! place where the snapshot is recomputed.

use crate::primitives::{MAX_DEVICE_LENGTH, MAX_LOCATION_LENGTH, MAX_OPERATOR_LENGTH};
use crate::stage::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Unique, immutable identifier of a vaccine batch (e.g. `VAX-2025-001`).
///
/// Ordered by the part before the last `-`, then by the trailing sequence
/// number numerically, so `VAX-2025-999` sorts before `VAX-2025-1000`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub String);

impl BatchId {
    /// Create a batch id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn order_key(&self) -> (&str, Option<u64>, &str) {
        match self.0.rsplit_once('-') {
            Some((head, seq)) if !seq.is_empty() && seq.bytes().all(|b| b.is_ascii_digit()) => {
                (head, seq.parse().ok(), &self.0)
            }
            _ => (&self.0, None, &self.0),
        }
    }
}

impl Ord for BatchId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.order_key().cmp(&other.order_key())
    }
}

impl PartialOrd for BatchId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// STATUS
// =============================================================================

/// Safety classification of a batch, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Within the safe band.
    Safe,
    /// Above the at-risk threshold but not yet unsafe.
    #[serde(rename = "At Risk", alias = "AtRisk", alias = "at-risk")]
    AtRisk,
    /// Above the unsafe threshold.
    Unsafe,
}

impl Status {
    /// Human-readable name, matching the wire representation.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Status::Safe => "Safe",
            Status::AtRisk => "At Risk",
            Status::Unsafe => "Unsafe",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Status {
    type Err = VaxtraxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "safe" => Ok(Status::Safe),
            "at risk" | "atrisk" | "at-risk" | "at_risk" => Ok(Status::AtRisk),
            "unsafe" => Ok(Status::Unsafe),
            other => Err(VaxtraxError::Validation(format!(
                "invalid status value: {other:?}"
            ))),
        }
    }
}

// =============================================================================
// TEMPERATURE LIMITS
// =============================================================================

/// Batch-specific temperature band overriding the global thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempLimits {
    /// Lower bound in °C.
    pub min: f64,
    /// Upper bound in °C. Readings above this are unsafe.
    pub max: f64,
}

impl TempLimits {
    /// Create validated limits. Rejects `min >= max` and non-finite bounds.
    pub fn new(min: f64, max: f64) -> Result<Self, VaxtraxError> {
        let limits = Self { min, max };
        limits.validate()?;
        Ok(limits)
    }

    /// Check that both bounds are finite and `min < max`.
    pub fn validate(&self) -> Result<(), VaxtraxError> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(VaxtraxError::Validation(
                "temperature limits must be finite".to_string(),
            ));
        }
        if self.min >= self.max {
            return Err(VaxtraxError::Validation(format!(
                "temperature limits invalid: min ({}) must be below max ({})",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

// =============================================================================
// LEDGER RECORDS
// =============================================================================

/// Tag carried by non-scan ledger entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Operator accepted a proceed recommendation.
    Proceed,
    /// Operator halted the batch.
    Halt,
    /// Status was set manually, bypassing classification for this entry.
    StatusOverride,
    /// Stage was changed manually without a new reading.
    StageOverride,
}

impl Action {
    /// Wire name of the action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Proceed => "proceed",
            Action::Halt => "halt",
            Action::StatusOverride => "status-override",
            Action::StageOverride => "stage-override",
        }
    }
}

/// One immutable checkpoint record in a batch ledger.
///
/// `status` is whatever the ledger derived at append time. A caller-supplied
/// value is discarded unless the entry is a `StatusOverride`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub timestamp: DateTime<Utc>,
    pub location: String,
    pub scanned_by: Option<String>,
    pub device: Option<String>,
    /// Reading in °C. `None` only for actions logged before the first scan.
    pub temperature: Option<f64>,
    pub status: Status,
    pub stage: Stage,
    pub action: Option<Action>,
}

impl ScanEvent {
    /// A plain temperature scan. Status is filled in by the ledger.
    #[must_use]
    pub fn scan(
        timestamp: DateTime<Utc>,
        location: impl Into<String>,
        temperature: f64,
        stage: Stage,
    ) -> Self {
        Self {
            timestamp,
            location: location.into(),
            scanned_by: None,
            device: None,
            temperature: Some(temperature),
            status: Status::Safe,
            stage,
            action: None,
        }
    }

    /// Set the operator identity.
    #[must_use]
    pub fn scanned_by(mut self, operator: Option<String>) -> Self {
        self.scanned_by = operator;
        self
    }

    /// Set the scanning device.
    #[must_use]
    pub fn device(mut self, device: Option<String>) -> Self {
        self.device = device;
        self
    }

    /// True for temperature scans (no action tag).
    #[must_use]
    pub fn is_scan(&self) -> bool {
        self.action.is_none()
    }

    /// Check free-text fields against the input limits.
    pub fn validate(&self) -> Result<(), VaxtraxError> {
        validate_location(&self.location)?;
        if let Some(t) = self.temperature
            && !t.is_finite()
        {
            return Err(VaxtraxError::Validation(format!(
                "temperature must be a finite number, got {t}"
            )));
        }
        if self.is_scan() && self.temperature.is_none() {
            return Err(VaxtraxError::Validation(
                "scan requires a temperature reading".to_string(),
            ));
        }
        validate_optional("scanned_by", self.scanned_by.as_deref(), MAX_OPERATOR_LENGTH)?;
        validate_optional("device", self.device.as_deref(), MAX_DEVICE_LENGTH)?;
        Ok(())
    }
}

/// Validate a location string (non-empty, bounded).
pub fn validate_location(location: &str) -> Result<(), VaxtraxError> {
    if location.trim().is_empty() {
        return Err(VaxtraxError::Validation(
            "location must not be empty".to_string(),
        ));
    }
    if location.len() > MAX_LOCATION_LENGTH {
        return Err(VaxtraxError::Validation(format!(
            "location length {} exceeds maximum {} bytes",
            location.len(),
            MAX_LOCATION_LENGTH
        )));
    }
    Ok(())
}

fn validate_optional(field: &str, value: Option<&str>, max: usize) -> Result<(), VaxtraxError> {
    match value {
        Some(v) if v.len() > max => Err(VaxtraxError::Validation(format!(
            "{field} length {} exceeds maximum {max} bytes",
            v.len()
        ))),
        _ => Ok(()),
    }
}

// =============================================================================
// GATE STATE
// =============================================================================

/// Output of the recommendation gate after a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Proceed,
    Halt,
}

impl Recommendation {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Proceed => "proceed",
            Recommendation::Halt => "halt",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-batch gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum GateState {
    /// No pending decision; a fresh scan is required.
    #[default]
    AwaitingScan,
    /// A scan was just recorded and produced this recommendation.
    Decided(Recommendation),
}

impl GateState {
    /// The pending recommendation, if any.
    #[must_use]
    pub fn recommendation(&self) -> Option<Recommendation> {
        match self {
            GateState::AwaitingScan => None,
            GateState::Decided(r) => Some(*r),
        }
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateState::AwaitingScan => f.write_str("awaiting-scan"),
            GateState::Decided(r) => write!(f, "decided({r})"),
        }
    }
}

// =============================================================================
// BATCH
// =============================================================================

/// Live snapshot of a vaccine batch plus its full ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub(crate) id: BatchId,
    pub(crate) temperature: Option<f64>,
    pub(crate) location: String,
    pub(crate) stage: Stage,
    pub(crate) status: Status,
    pub(crate) last_updated: DateTime<Utc>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) temp_limits: Option<TempLimits>,
    pub(crate) scan_history: Vec<ScanEvent>,
    pub(crate) gate: GateState,
    pub(crate) version: u64,
}

impl Batch {
    /// Fresh batch: status Safe, empty ledger, gate awaiting a scan.
    pub(crate) fn new(
        id: BatchId,
        location: String,
        stage: Stage,
        temp_limits: Option<TempLimits>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            temperature: None,
            location,
            stage,
            status: Status::Safe,
            last_updated: now,
            created_at: now,
            temp_limits,
            scan_history: Vec::new(),
            gate: GateState::AwaitingScan,
            version: 0,
        }
    }

    #[must_use]
    pub fn id(&self) -> &BatchId {
        &self.id
    }

    /// Latest reading in °C, `None` before the first scan.
    #[must_use]
    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn temp_limits(&self) -> Option<TempLimits> {
        self.temp_limits
    }

    /// Ledger in storage (chronological) order.
    #[must_use]
    pub fn scan_history(&self) -> &[ScanEvent] {
        &self.scan_history
    }

    #[must_use]
    pub fn gate(&self) -> GateState {
        self.gate
    }

    /// Number of successful appends; used for compare-and-swap saves.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }
}

// =============================================================================
// REQUEST CONTEXT
// =============================================================================

/// Explicit per-request context passed to every mutating operation.
///
/// Replaces any notion of a "current batch" or "last recommendation" held
/// outside the call: two sessions never share in-flight state.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    /// Operator identity recorded as `scanned_by`.
    pub operator: Option<String>,
    /// Device recorded on ledger entries.
    pub device: Option<String>,
    /// Wall-clock time of the request.
    pub now: DateTime<Utc>,
}

impl RequestContext {
    /// Context stamped with the current time.
    #[must_use]
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    /// Context stamped with a fixed time.
    #[must_use]
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            operator: None,
            device: None,
            now,
        }
    }

    #[must_use]
    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    #[must_use]
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the VaxTrax system.
///
/// - No silent failures
/// - Every error is scoped to one batch operation; none is fatal
/// - A failed operation never leaves a partially mutated batch behind
#[derive(Debug, Error)]
pub enum VaxtraxError {
    /// The requested batch does not exist.
    #[error("Batch not found: {0}")]
    NotFound(BatchId),

    /// Input failed validation (limits, location, temperature, payload).
    #[error("Validation error: {0}")]
    Validation(String),

    /// A ledger entry predates the latest stored entry.
    #[error("Scan at {attempted} precedes latest ledger entry at {latest}")]
    TemporalOrdering {
        latest: DateTime<Utc>,
        attempted: DateTime<Utc>,
    },

    /// A stage change would move the batch backward.
    #[error("Stage regression: cannot move from {from} to {to}")]
    StageRegression { from: Stage, to: Stage },

    /// Proceed was attempted while the batch is not cleared to proceed.
    #[error("Gate violation: cannot proceed with status {status} and gate {gate}")]
    GateViolation { status: Status, gate: GateState },

    /// The stored batch changed since it was loaded.
    #[error("Concurrent modification of batch {0}")]
    ConcurrentModification(BatchId),

    /// An external collaborator (scanner, network) failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O or storage error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl VaxtraxError {
    /// Stable machine-readable name of the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            VaxtraxError::NotFound(_) => "not_found",
            VaxtraxError::Validation(_) => "validation",
            VaxtraxError::TemporalOrdering { .. } => "temporal_ordering",
            VaxtraxError::StageRegression { .. } => "stage_regression",
            VaxtraxError::GateViolation { .. } => "gate_violation",
            VaxtraxError::ConcurrentModification(_) => "concurrent_modification",
            VaxtraxError::Transport(_) => "transport",
            VaxtraxError::SerializationError(_) => "serialization",
            VaxtraxError::IoError(_) => "io",
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
