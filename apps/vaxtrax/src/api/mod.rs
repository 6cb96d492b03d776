//! # VaxTrax HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /batches` - List batches (`?view=operator|company|public`)
//! - `POST /batches` - Register a batch
//! - `GET /batches/{id}` - One batch (`?view=`)
//! - `GET /batches/{id}/history` - Ledger, newest first (`?view=`)
//! - `POST /batches/{id}/scans` - Checkpoint scan
//! - `POST /batches/{id}/override` - Manual status/stage change
//! - `POST /batches/{id}/proceed` - Accept a proceed recommendation
//! - `POST /batches/{id}/halt` - Halt the batch
//! - `GET /batches/{id}/export` - Canonical export with checksums
//!
//! Operator identity and device are read from the `X-Operator` and
//! `X-Device` headers.
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `VAXTRAX_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `VAXTRAX_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `VAXTRAX_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{API_KEY_ENV_VAR, get_api_key_from_env};
pub use handlers::{DEFAULT_DEVICE, DEVICE_HEADER, OPERATOR_HEADER, status_for};
pub use middleware::{RATE_LIMIT_ENV_VAR, create_rate_limiter, get_rate_limit_from_env};
pub use types::{
    ApiFailure, BatchListResponse, BatchResponse, CreateBatchRequest, ExportResponse,
    HealthResponse, HistoryResponse, OverrideSubmission, ScanResponse, ScanSubmission, ViewQuery,
};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use vaxtrax_core::{CustodyDesk, StorageBackend, VaxtraxError};

/// Environment variable listing allowed CORS origins.
pub const CORS_ENV_VAR: &str = "VAXTRAX_CORS_ORIGINS";

/// Maximum request body size (2 MB).
const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
///
/// The desk serializes work per batch internally, so no outer lock is held
/// across requests.
#[derive(Clone)]
pub struct AppState {
    pub desk: Arc<CustodyDesk<StorageBackend>>,
}

impl AppState {
    #[must_use]
    pub fn new(desk: CustodyDesk<StorageBackend>) -> Self {
        Self {
            desk: Arc::new(desk),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from `VAXTRAX_CORS_ORIGINS`.
///
/// `*` allows every origin, a comma-separated list allows those origins, and
/// an unset or unusable value falls back to localhost only.
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var(CORS_ENV_VAR).ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins ({}=*). This is insecure for production!",
                CORS_ENV_VAR
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in {}, defaulting to localhost only",
                    CORS_ENV_VAR
                );
                build_localhost_cors()
            } else {
                restrict_cors(CorsLayer::new().allow_origin(allowed_origins))
            }
        }
        None => {
            tracing::info!("CORS: No {} set, defaulting to localhost only", CORS_ENV_VAR);
            build_localhost_cors()
        }
    }
}

/// Restrictive CORS layer for local dashboards.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    restrict_cors(CorsLayer::new().allow_origin(origins))
}

fn restrict_cors(layer: CorsLayer) -> CorsLayer {
    layer
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(OPERATOR_HEADER),
            HeaderName::from_static(DEVICE_HEADER),
        ])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Body limit
/// 4. Rate Limiting (if enabled)
/// 5. Authentication (if configured)
pub fn create_router(state: AppState) -> Router {
    let rate_limit = get_rate_limit_from_env();
    let rate_limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED - all endpoints are publicly accessible! \
             Set {} to enable authentication.",
            API_KEY_ENV_VAR
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route(
            "/batches",
            get(handlers::list_batches_handler).post(handlers::create_batch_handler),
        )
        .route("/batches/{id}", get(handlers::get_batch_handler))
        .route("/batches/{id}/history", get(handlers::history_handler))
        .route("/batches/{id}/scans", post(handlers::scan_handler))
        .route("/batches/{id}/override", post(handlers::override_handler))
        .route("/batches/{id}/proceed", post(handlers::proceed_handler))
        .route("/batches/{id}/halt", post(handlers::halt_handler))
        .route("/batches/{id}/export", get(handlers::export_handler));

    if has_auth {
        router = router.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer())
                .layer(DefaultBodyLimit::max(MAX_BODY_SIZE)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(addr: &str, desk: CustodyDesk<StorageBackend>) -> Result<(), VaxtraxError> {
    let router = create_router(AppState::new(desk));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| VaxtraxError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("VaxTrax HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| VaxtraxError::IoError(format!("Server error: {}", e)))
}
