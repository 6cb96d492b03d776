//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.
//!
//! Core calls are synchronous and short; no handler awaits while it holds a
//! batch lock.

use super::{
    AppState,
    types::{
        ApiFailure, BatchListResponse, BatchResponse, CreateBatchRequest, ExportResponse,
        HealthResponse, HistoryResponse, OverrideSubmission, ScanResponse, ScanSubmission,
        ViewQuery,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use vaxtrax_core::{
    BatchId, RequestContext, Role, VaxtraxError, batch_checksum, batch_crypto_hash, export_batch,
};

/// Header carrying the operator identity recorded on ledger entries.
pub const OPERATOR_HEADER: &str = "x-operator";

/// Header carrying the device recorded on ledger entries.
pub const DEVICE_HEADER: &str = "x-device";

/// Device recorded when a request names none.
pub const DEFAULT_DEVICE: &str = "Web Interface";

// =============================================================================
// HELPERS
// =============================================================================

/// HTTP status for a core error.
#[must_use]
pub fn status_for(error: &VaxtraxError) -> StatusCode {
    match error {
        VaxtraxError::NotFound(_) => StatusCode::NOT_FOUND,
        VaxtraxError::Validation(_) => StatusCode::BAD_REQUEST,
        VaxtraxError::TemporalOrdering { .. }
        | VaxtraxError::StageRegression { .. }
        | VaxtraxError::GateViolation { .. }
        | VaxtraxError::ConcurrentModification(_) => StatusCode::CONFLICT,
        VaxtraxError::Transport(_) => StatusCode::BAD_GATEWAY,
        VaxtraxError::SerializationError(_) | VaxtraxError::IoError(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Log a failed operation and build its response.
fn fail<T: ApiFailure>(operation: &str, error: &VaxtraxError) -> (StatusCode, Json<T>) {
    let status = status_for(error);
    if status.is_server_error() {
        tracing::error!(event = operation, kind = error.kind(), "{}", error);
    } else {
        tracing::warn!(event = operation, kind = error.kind(), "Rejected: {}", error);
    }
    (status, Json(T::failure(error.kind(), error.to_string())))
}

/// Build the request context from headers.
fn request_context(headers: &HeaderMap) -> RequestContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let mut ctx = RequestContext::now()
        .with_device(header(DEVICE_HEADER).unwrap_or_else(|| DEFAULT_DEVICE.to_string()));
    ctx.operator = header(OPERATOR_HEADER);
    ctx
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// BATCH HANDLERS
// =============================================================================

/// List all batches.
pub async fn list_batches_handler(
    State(state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> impl IntoResponse {
    let role = match query.role() {
        Ok(role) => role,
        Err(e) => return fail::<BatchListResponse>("list", &e),
    };
    match state.desk.list() {
        Ok(batches) => (
            StatusCode::OK,
            Json(BatchListResponse::success(
                batches.iter().map(|b| role.project(b)).collect(),
            )),
        ),
        Err(e) => fail("list", &e),
    }
}

/// Register a batch.
pub async fn create_batch_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateBatchRequest>,
) -> impl IntoResponse {
    let new = match request.to_new_batch() {
        Ok(new) => new,
        Err(e) => return fail::<BatchResponse>("create", &e),
    };

    match state.desk.create_batch(&request_context(&headers), new) {
        Ok(batch) => {
            tracing::info!(
                event = "create",
                batch_id = %batch.id(),
                stage = %batch.stage(),
                "Batch registered"
            );
            (
                StatusCode::CREATED,
                Json(BatchResponse::success(Role::Operator.project(&batch))),
            )
        }
        Err(e) => fail("create", &e),
    }
}

/// Get one batch.
pub async fn get_batch_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ViewQuery>,
) -> impl IntoResponse {
    let role = match query.role() {
        Ok(role) => role,
        Err(e) => return fail::<BatchResponse>("show", &e),
    };
    match state.desk.find(&BatchId::new(id)) {
        Ok(batch) => (
            StatusCode::OK,
            Json(BatchResponse::success(role.project(&batch))),
        ),
        Err(e) => fail("show", &e),
    }
}

/// Ledger of one batch, newest first.
pub async fn history_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ViewQuery>,
) -> impl IntoResponse {
    let role = match query.role() {
        Ok(role) => role,
        Err(e) => return fail::<HistoryResponse>("history", &e),
    };
    match state.desk.find(&BatchId::new(id)) {
        Ok(batch) => (
            StatusCode::OK,
            Json(HistoryResponse::success(role.project(&batch))),
        ),
        Err(e) => fail("history", &e),
    }
}

// =============================================================================
// CUSTODY HANDLERS
// =============================================================================

/// Record a checkpoint scan.
pub async fn scan_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(submission): Json<ScanSubmission>,
) -> impl IntoResponse {
    let request = match submission.to_scan_request() {
        Ok(request) => request,
        Err(e) => return fail::<ScanResponse>("scan", &e),
    };

    let id = BatchId::new(id);
    match state
        .desk
        .submit_scan(&request_context(&headers), &id, request)
    {
        Ok(outcome) => {
            tracing::info!(
                event = "scan",
                batch_id = %id,
                status = %outcome.batch.status(),
                stage = %outcome.batch.stage(),
                recommendation = %outcome.recommendation,
                "Scan recorded"
            );
            (
                StatusCode::OK,
                Json(ScanResponse::success(
                    Role::Operator.project(&outcome.batch),
                    outcome.recommendation,
                )),
            )
        }
        Err(e) => fail("scan", &e),
    }
}

/// Manually override status and/or stage.
pub async fn override_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(submission): Json<OverrideSubmission>,
) -> impl IntoResponse {
    let request = match submission.to_override_request() {
        Ok(request) => request,
        Err(e) => return fail::<BatchResponse>("override", &e),
    };

    let id = BatchId::new(id);
    match state
        .desk
        .override_batch(&request_context(&headers), &id, request)
    {
        Ok(batch) => {
            tracing::info!(
                event = "override",
                batch_id = %id,
                status = %batch.status(),
                stage = %batch.stage(),
                "Batch overridden"
            );
            (
                StatusCode::OK,
                Json(BatchResponse::success(Role::Operator.project(&batch))),
            )
        }
        Err(e) => fail("override", &e),
    }
}

/// Accept a proceed recommendation.
pub async fn proceed_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let id = BatchId::new(id);
    match state.desk.proceed(&request_context(&headers), &id) {
        Ok(batch) => {
            tracing::info!(event = "proceed", batch_id = %id, stage = %batch.stage(), "Custody proceeds");
            (
                StatusCode::OK,
                Json(BatchResponse::success(Role::Operator.project(&batch))),
            )
        }
        Err(e) => fail("proceed", &e),
    }
}

/// Halt a batch.
pub async fn halt_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let id = BatchId::new(id);
    match state.desk.halt(&request_context(&headers), &id) {
        Ok(batch) => {
            tracing::warn!(
                event = "halt",
                batch_id = %id,
                status = %batch.status(),
                stage = %batch.stage(),
                "Batch halted"
            );
            (
                StatusCode::OK,
                Json(BatchResponse::success(Role::Operator.project(&batch))),
            )
        }
        Err(e) => fail("halt", &e),
    }
}

// =============================================================================
// EXPORT HANDLER
// =============================================================================

/// Export one batch in canonical format.
pub async fn export_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let exported = state.desk.find(&BatchId::new(id)).and_then(|batch| {
        let data = export_batch(&batch)?;
        let checksum = batch_checksum(&batch)?;
        let hash = batch_crypto_hash(&batch)?;
        Ok((data, checksum, hash))
    });

    match exported {
        Ok((data, checksum, hash)) => (
            StatusCode::OK,
            Json(ExportResponse::success(&data, checksum, hash)),
        ),
        Err(e) => fail("export", &e),
    }
}
