//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.
//!
//! Every response carries `success` and `error`; failures also carry a
//! stable `error_kind` (see `VaxtraxError::kind`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vaxtrax_core::{
    BatchProjection, EventProjection, NewBatch, OverrideRequest, Recommendation, Role,
    ScanRequest, Stage, Status, VaxtraxError, limits_from_bounds,
};

// =============================================================================
// FAILURE BODIES
// =============================================================================

/// Response types that can describe a failed request.
pub trait ApiFailure {
    fn failure(kind: &str, message: String) -> Self;
}

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// QUERY PARAMETERS
// =============================================================================

/// `?view=operator|company|public`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewQuery {
    pub view: Option<String>,
}

impl ViewQuery {
    /// Requested role; operator when absent.
    pub fn role(&self) -> Result<Role, VaxtraxError> {
        match self.view.as_deref() {
            Some(view) => view.parse(),
            None => Ok(Role::default()),
        }
    }
}

// =============================================================================
// CREATE BATCH
// =============================================================================

/// Batch registration request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateBatchRequest {
    pub location: String,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub temp_min: Option<f64>,
    #[serde(default)]
    pub temp_max: Option<f64>,
}

impl CreateBatchRequest {
    /// Convert to core input, validating stage and limits.
    pub fn to_new_batch(&self) -> Result<NewBatch, VaxtraxError> {
        let stage = match self.stage.as_deref() {
            Some(stage) => stage.parse::<Stage>()?,
            None => Stage::Factory,
        };
        let limits = limits_from_bounds(self.temp_min, self.temp_max)?;
        let new = NewBatch::new(self.location.clone())
            .at_stage(stage)
            .with_limits(limits);
        new.validate()?;
        Ok(new)
    }
}

// =============================================================================
// SCAN SUBMISSION
// =============================================================================

/// Checkpoint scan request.
///
/// `reader_error` lets a client report that its NFC reader failed; the scan
/// is then refused with a transport error and nothing is recorded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanSubmission {
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
    pub stage: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reader_error: Option<String>,
}

impl ScanSubmission {
    pub fn to_scan_request(&self) -> Result<ScanRequest, VaxtraxError> {
        if let Some(reason) = &self.reader_error {
            return Err(VaxtraxError::Transport(format!("NFC reader failed: {reason}")));
        }
        let stage = self
            .stage
            .as_deref()
            .map(str::parse::<Stage>)
            .transpose()?;
        Ok(ScanRequest {
            temperature: self.temperature,
            payload: self.payload.clone(),
            scanned_by: self.scanned_by.clone(),
            device: self.device.clone(),
            location: self.location.clone(),
            stage,
            timestamp: self.timestamp,
        })
    }
}

// =============================================================================
// OVERRIDE SUBMISSION
// =============================================================================

/// Manual status/stage change request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverrideSubmission {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub stage: Option<String>,
}

impl OverrideSubmission {
    pub fn to_override_request(&self) -> Result<OverrideRequest, VaxtraxError> {
        Ok(OverrideRequest {
            status: self
                .status
                .as_deref()
                .map(str::parse::<Status>)
                .transpose()?,
            stage: self
                .stage
                .as_deref()
                .map(str::parse::<Stage>)
                .transpose()?,
        })
    }
}

// =============================================================================
// BATCH RESPONSES
// =============================================================================

/// Single batch response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub success: bool,
    pub batch: Option<BatchProjection>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl BatchResponse {
    pub fn success(batch: BatchProjection) -> Self {
        Self {
            success: true,
            batch: Some(batch),
            error: None,
            error_kind: None,
        }
    }
}

impl ApiFailure for BatchResponse {
    fn failure(kind: &str, message: String) -> Self {
        Self {
            success: false,
            batch: None,
            error: Some(message),
            error_kind: Some(kind.to_string()),
        }
    }
}

/// Batch list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchListResponse {
    pub success: bool,
    pub batches: Vec<BatchProjection>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl BatchListResponse {
    pub fn success(batches: Vec<BatchProjection>) -> Self {
        Self {
            success: true,
            batches,
            error: None,
            error_kind: None,
        }
    }
}

impl ApiFailure for BatchListResponse {
    fn failure(kind: &str, message: String) -> Self {
        Self {
            success: false,
            batches: Vec::new(),
            error: Some(message),
            error_kind: Some(kind.to_string()),
        }
    }
}

/// Ledger response, newest entry first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub batch_id: Option<String>,
    pub history: Vec<EventProjection>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl HistoryResponse {
    pub fn success(batch: BatchProjection) -> Self {
        Self {
            success: true,
            batch_id: Some(batch.id),
            history: batch.history,
            error: None,
            error_kind: None,
        }
    }
}

impl ApiFailure for HistoryResponse {
    fn failure(kind: &str, message: String) -> Self {
        Self {
            success: false,
            batch_id: None,
            history: Vec::new(),
            error: Some(message),
            error_kind: Some(kind.to_string()),
        }
    }
}

/// Scan response: new snapshot plus the gate's recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResponse {
    pub success: bool,
    pub batch: Option<BatchProjection>,
    pub recommendation: Option<Recommendation>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl ScanResponse {
    pub fn success(batch: BatchProjection, recommendation: Recommendation) -> Self {
        Self {
            success: true,
            batch: Some(batch),
            recommendation: Some(recommendation),
            error: None,
            error_kind: None,
        }
    }
}

impl ApiFailure for ScanResponse {
    fn failure(kind: &str, message: String) -> Self {
        Self {
            success: false,
            batch: None,
            recommendation: None,
            error: Some(message),
            error_kind: Some(kind.to_string()),
        }
    }
}

// =============================================================================
// EXPORT RESPONSE
// =============================================================================

/// Canonical export response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub success: bool,
    pub data: Option<String>, // Base64 encoded
    pub checksum: Option<u64>,
    pub blake3: Option<String>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl ExportResponse {
    pub fn success(data: &[u8], checksum: u64, blake3: String) -> Self {
        Self {
            success: true,
            data: Some(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                data,
            )),
            checksum: Some(checksum),
            blake3: Some(blake3),
            error: None,
            error_kind: None,
        }
    }
}

impl ApiFailure for ExportResponse {
    fn failure(kind: &str, message: String) -> Self {
        Self {
            success: false,
            data: None,
            checksum: None,
            blake3: None,
            error: Some(message),
            error_kind: Some(kind.to_string()),
        }
    }
}
