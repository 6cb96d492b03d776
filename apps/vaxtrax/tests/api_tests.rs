//! Integration tests for the VaxTrax HTTP API.
//!
//! Uses axum-test to test the API handlers without starting a real server.

// Holding the env mutex across awaits is intentional: auth tests mutate
// process environment and must not interleave.
#![allow(clippy::unwrap_used, clippy::panic, clippy::await_holding_lock)]

use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum_test::TestServer;
use serde_json::json;
use std::sync::Mutex;
use vaxtrax::api::{
    API_KEY_ENV_VAR, AppState, BatchListResponse, BatchResponse, ExportResponse, HealthResponse,
    HistoryResponse, ScanResponse, create_router,
};
use vaxtrax_core::{
    Action, CustodyDesk, Recommendation, Role, Stage, Status, StorageBackend, import_batch,
};

/// Mutex to serialize tests since auth tests modify env vars.
static AUTH_TEST_MUTEX: Mutex<()> = Mutex::new(());

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Holds the env mutex and clears the API key on drop.
struct TestGuard {
    _guard: std::sync::MutexGuard<'static, ()>,
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        // SAFETY: Tests run sequentially under AUTH_TEST_MUTEX, so no concurrent env access.
        unsafe { std::env::remove_var(API_KEY_ENV_VAR) };
    }
}

fn build_server(api_key: Option<&str>) -> (TestServer, TestGuard) {
    let guard = AUTH_TEST_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    // SAFETY: Tests run sequentially under AUTH_TEST_MUTEX, so no concurrent env access.
    unsafe {
        match api_key {
            Some(key) => std::env::set_var(API_KEY_ENV_VAR, key),
            None => std::env::remove_var(API_KEY_ENV_VAR),
        }
    }
    let router = create_router(AppState::new(CustodyDesk::new(StorageBackend::default())));
    (
        TestServer::new(router).unwrap(),
        TestGuard { _guard: guard },
    )
}

/// Test server over a fresh in-memory desk, auth disabled.
fn create_test_server() -> (TestServer, TestGuard) {
    build_server(None)
}

fn operator_header() -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-operator"),
        HeaderValue::from_static("Operator 1"),
    )
}

/// Register a batch with limits -25..-15 and return its id.
async fn create_limited_batch(server: &TestServer) -> String {
    let response = server
        .post("/batches")
        .json(&json!({
            "location": "51.5074° N, 0.1278° W",
            "temp_min": -25.0,
            "temp_max": -15.0
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let created: BatchResponse = response.json();
    created.batch.unwrap().id
}

async fn scan(server: &TestServer, id: &str, body: serde_json::Value) -> axum_test::TestResponse {
    let (name, value) = operator_header();
    server
        .post(&format!("/batches/{id}/scans"))
        .add_header(name, value)
        .json(&body)
        .await
}

// =============================================================================
// HEALTH ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (server, _guard) = create_test_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

// =============================================================================
// BATCH REGISTRATION TESTS
// =============================================================================

#[tokio::test]
async fn test_create_batch_defaults() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/batches")
        .json(&json!({ "location": "Berlin" }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let created: BatchResponse = response.json();
    assert!(created.success);
    let batch = created.batch.unwrap();
    assert!(batch.id.starts_with("VAX-"));
    assert!(batch.id.ends_with("-001"));
    assert_eq!(batch.stage, Stage::Factory);
    assert_eq!(batch.status, Status::Safe);
    assert!(batch.temperature.is_none());
    assert!(batch.temp_limits.is_none());
    assert!(batch.history.is_empty());
}

#[tokio::test]
async fn test_create_batch_ids_are_sequential() {
    let (server, _guard) = create_test_server();

    let first = create_limited_batch(&server).await;
    let second = create_limited_batch(&server).await;

    assert!(first.ends_with("-001"));
    assert!(second.ends_with("-002"));
}

#[tokio::test]
async fn test_create_batch_fills_missing_limit() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/batches")
        .json(&json!({ "location": "Berlin", "temp_min": -30.0 }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let limits = response.json::<BatchResponse>().batch.unwrap().temp_limits.unwrap();
    assert_eq!(limits.min, -30.0);
    assert_eq!(limits.max, -15.0);
}

#[tokio::test]
async fn test_create_batch_inverted_limits_rejected() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/batches")
        .json(&json!({ "location": "Berlin", "temp_min": -10.0, "temp_max": -20.0 }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: BatchResponse = response.json();
    assert!(!body.success);
    assert_eq!(body.error_kind.as_deref(), Some("validation"));

    let list: BatchListResponse = server.get("/batches").await.json();
    assert!(list.batches.is_empty());
}

#[tokio::test]
async fn test_create_batch_empty_location_rejected() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/batches")
        .json(&json!({ "location": "   " }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_batch_unknown_stage_rejected() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/batches")
        .json(&json!({ "location": "Berlin", "stage": "Warehouse" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

// =============================================================================
// SCAN AND GATE TESTS
// =============================================================================

#[tokio::test]
async fn test_safe_scan_then_proceed() {
    let (server, _guard) = create_test_server();
    let id = create_limited_batch(&server).await;

    let response = scan(&server, &id, json!({ "temperature": -18.5, "stage": "Factory" })).await;
    response.assert_status_ok();
    let outcome: ScanResponse = response.json();
    assert_eq!(outcome.recommendation, Some(Recommendation::Proceed));
    let batch = outcome.batch.unwrap();
    assert_eq!(batch.status, Status::Safe);
    assert_eq!(batch.temperature, Some(-18.5));

    let response = server.post(&format!("/batches/{id}/proceed")).await;
    response.assert_status_ok();
    let batch = response.json::<BatchResponse>().batch.unwrap();
    assert_eq!(batch.history.len(), 2);
    assert_eq!(batch.history[0].action, Some(Action::Proceed));
    assert!(batch.recommendation.is_none());
}

#[tokio::test]
async fn test_unsafe_scan_blocks_proceed() {
    let (server, _guard) = create_test_server();
    let id = create_limited_batch(&server).await;

    let response = scan(&server, &id, json!({ "temperature": -12.1, "stage": "Hospital" })).await;
    let outcome: ScanResponse = response.json();
    assert_eq!(outcome.recommendation, Some(Recommendation::Halt));
    assert_eq!(outcome.batch.unwrap().status, Status::Unsafe);

    let response = server.post(&format!("/batches/{id}/proceed")).await;
    response.assert_status(StatusCode::CONFLICT);
    let body: BatchResponse = response.json();
    assert_eq!(body.error_kind.as_deref(), Some("gate_violation"));

    let history: HistoryResponse = server.get(&format!("/batches/{id}/history")).await.json();
    assert_eq!(history.history.len(), 1);

    let response = server.post(&format!("/batches/{id}/halt")).await;
    response.assert_status_ok();
    let batch = response.json::<BatchResponse>().batch.unwrap();
    assert_eq!(batch.history[0].action, Some(Action::Halt));
    assert_eq!(batch.history[0].stage, Stage::Hospital);
}

#[tokio::test]
async fn test_proceed_without_scan_rejected() {
    let (server, _guard) = create_test_server();
    let id = create_limited_batch(&server).await;

    let response = server.post(&format!("/batches/{id}/proceed")).await;
    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_scan_records_operator_and_device() {
    let (server, _guard) = create_test_server();
    let id = create_limited_batch(&server).await;

    scan(&server, &id, json!({ "temperature": -19.0 })).await.assert_status_ok();

    let history: HistoryResponse = server.get(&format!("/batches/{id}/history")).await.json();
    let latest = &history.history[0];
    assert_eq!(latest.scanned_by.as_deref(), Some("Operator 1"));
    assert_eq!(latest.device.as_deref(), Some("Web Interface"));
}

#[tokio::test]
async fn test_scan_from_nfc_payload() {
    let (server, _guard) = create_test_server();
    let id = create_limited_batch(&server).await;

    let response = scan(&server, &id, json!({ "payload": "VAX;-16.2°C;OK" })).await;
    response.assert_status_ok();
    let batch = response.json::<ScanResponse>().batch.unwrap();
    assert_eq!(batch.temperature, Some(-16.2));
    assert_eq!(batch.status, Status::AtRisk);
}

#[tokio::test]
async fn test_scan_without_reading_rejected() {
    let (server, _guard) = create_test_server();
    let id = create_limited_batch(&server).await;

    let response = scan(&server, &id, json!({ "payload": "no reading here" })).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: ScanResponse = response.json();
    assert!(body.error.unwrap().contains("manual temperature entry required"));
}

#[tokio::test]
async fn test_reader_failure_is_bad_gateway() {
    let (server, _guard) = create_test_server();
    let id = create_limited_batch(&server).await;

    let response = scan(&server, &id, json!({ "reader_error": "tag lost" })).await;
    response.assert_status(StatusCode::BAD_GATEWAY);
    assert_eq!(
        response.json::<ScanResponse>().error_kind.as_deref(),
        Some("transport")
    );

    let history: HistoryResponse = server.get(&format!("/batches/{id}/history")).await.json();
    assert!(history.history.is_empty());
}

#[tokio::test]
async fn test_stage_regression_rejected() {
    let (server, _guard) = create_test_server();
    let id = create_limited_batch(&server).await;

    scan(&server, &id, json!({ "temperature": -19.0, "stage": "Storage" }))
        .await
        .assert_status_ok();
    let response = scan(&server, &id, json!({ "temperature": -19.0, "stage": "Hub" })).await;

    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(
        response.json::<ScanResponse>().error_kind.as_deref(),
        Some("stage_regression")
    );
}

#[tokio::test]
async fn test_stale_scan_rejected() {
    let (server, _guard) = create_test_server();
    let id = create_limited_batch(&server).await;
    scan(&server, &id, json!({ "temperature": -19.0 })).await.assert_status_ok();

    let response = scan(
        &server,
        &id,
        json!({ "temperature": -19.0, "timestamp": "2000-01-01T00:00:00Z" }),
    )
    .await;

    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(
        response.json::<ScanResponse>().error_kind.as_deref(),
        Some("temporal_ordering")
    );
}

#[tokio::test]
async fn test_future_dated_scan_rejected_and_halt_succeeds() {
    let (server, _guard) = create_test_server();
    let id = create_limited_batch(&server).await;

    let response = scan(
        &server,
        &id,
        json!({ "temperature": -19.0, "timestamp": "2999-01-01T00:00:00Z" }),
    )
    .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<ScanResponse>().error_kind.as_deref(),
        Some("validation")
    );

    let history: HistoryResponse = server
        .get(&format!("/batches/{id}/history"))
        .await
        .json();
    assert!(history.history.is_empty());

    server
        .post(&format!("/batches/{id}/halt"))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_scan_unknown_batch_not_found() {
    let (server, _guard) = create_test_server();

    let response = scan(&server, "VAX-1999-999", json!({ "temperature": -19.0 })).await;
    response.assert_status_not_found();
}

// =============================================================================
// OVERRIDE TESTS
// =============================================================================

#[tokio::test]
async fn test_status_override_is_logged() {
    let (server, _guard) = create_test_server();
    let id = create_limited_batch(&server).await;
    scan(&server, &id, json!({ "temperature": -20.0 })).await.assert_status_ok();

    let response = server
        .post(&format!("/batches/{id}/override"))
        .json(&json!({ "status": "Unsafe" }))
        .await;

    response.assert_status_ok();
    let batch = response.json::<BatchResponse>().batch.unwrap();
    assert_eq!(batch.status, Status::Unsafe);
    assert_eq!(batch.history[0].action, Some(Action::StatusOverride));
    assert!(batch.recommendation.is_none());
}

#[tokio::test]
async fn test_empty_override_rejected() {
    let (server, _guard) = create_test_server();
    let id = create_limited_batch(&server).await;

    let response = server
        .post(&format!("/batches/{id}/override"))
        .json(&json!({}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

// =============================================================================
// VIEW TESTS
// =============================================================================

#[tokio::test]
async fn test_public_view_hides_identities() {
    let (server, _guard) = create_test_server();
    let id = create_limited_batch(&server).await;
    scan(&server, &id, json!({ "temperature": -19.0, "device": "Reader 7" }))
        .await
        .assert_status_ok();

    let response = server.get(&format!("/batches/{id}?view=public")).await;
    response.assert_status_ok();
    let batch = response.json::<BatchResponse>().batch.unwrap();
    assert_eq!(batch.view, Role::Public);
    assert_eq!(batch.location, "51.5074° N");
    assert!(batch.history.iter().all(|e| e.scanned_by.is_none()));
    assert!(batch.history.iter().all(|e| e.device.is_none()));
}

#[tokio::test]
async fn test_unknown_view_rejected() {
    let (server, _guard) = create_test_server();
    let id = create_limited_batch(&server).await;

    let response = server.get(&format!("/batches/{id}?view=admin")).await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_batches_company_view() {
    let (server, _guard) = create_test_server();
    create_limited_batch(&server).await;
    create_limited_batch(&server).await;

    let response = server.get("/batches?view=company").await;
    response.assert_status_ok();
    let list: BatchListResponse = response.json();
    assert_eq!(list.batches.len(), 2);
    assert!(list.batches.iter().all(|b| b.view == Role::Company));
}

#[tokio::test]
async fn test_get_unknown_batch_not_found() {
    let (server, _guard) = create_test_server();

    let response = server.get("/batches/VAX-2025-404").await;
    response.assert_status_not_found();
    let body: BatchResponse = response.json();
    assert!(!body.success);
    assert_eq!(body.error_kind.as_deref(), Some("not_found"));
}

// =============================================================================
// EXPORT TESTS
// =============================================================================

#[tokio::test]
async fn test_export_round_trips() {
    let (server, _guard) = create_test_server();
    let id = create_limited_batch(&server).await;
    scan(&server, &id, json!({ "temperature": -18.0 })).await.assert_status_ok();

    let response = server.get(&format!("/batches/{id}/export")).await;
    response.assert_status_ok();
    let export: ExportResponse = response.json();
    assert!(export.success);
    assert_eq!(export.blake3.as_ref().unwrap().len(), 64);

    let data = base64::Engine::decode(
        &base64::engine::general_purpose::STANDARD,
        export.data.unwrap(),
    )
    .unwrap();
    let imported = import_batch(&data).unwrap();
    assert_eq!(imported.id().as_str(), id);
    assert_eq!(imported.scan_history().len(), 1);
}

// =============================================================================
// ERROR HANDLING TESTS
// =============================================================================

#[tokio::test]
async fn test_404_on_unknown_endpoint() {
    let (server, _guard) = create_test_server();

    server.get("/unknown").await.assert_status_not_found();
}

#[tokio::test]
async fn test_method_not_allowed() {
    let (server, _guard) = create_test_server();

    let response = server.post("/health").await;
    assert_eq!(response.status_code(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_invalid_json_body() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/batches")
        .text("not valid json")
        .content_type("application/json")
        .await;

    assert!(response.status_code().is_client_error());
}

// =============================================================================
// AUTHENTICATION MIDDLEWARE TESTS
// =============================================================================

#[tokio::test]
async fn test_auth_valid_bearer_token() {
    let api_key = "test-secret-key-12345";
    let (server, _guard) = build_server(Some(api_key));

    let response = server
        .get("/batches")
        .add_header(
            header::AUTHORIZATION,
            format!("Bearer {}", api_key).parse::<HeaderValue>().unwrap(),
        )
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_valid_raw_token() {
    let api_key = "test-raw-key-67890";
    let (server, _guard) = build_server(Some(api_key));

    let response = server
        .get("/batches")
        .add_header(header::AUTHORIZATION, api_key.parse::<HeaderValue>().unwrap())
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_invalid_token_rejected() {
    let (server, _guard) = build_server(Some("correct-key"));

    let response = server
        .post("/batches")
        .add_header(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer wrong-key"),
        )
        .json(&json!({ "location": "Berlin" }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_missing_header_rejected() {
    let (server, _guard) = build_server(Some("required-key"));

    server
        .get("/batches")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_bearer_prefix_only_rejected() {
    let (server, _guard) = build_server(Some("actual-key"));

    let response = server
        .get("/batches")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer "))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_health_endpoint_bypasses_auth() {
    let (server, _guard) = build_server(Some("secret-key-for-bypass-test"));

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
}
