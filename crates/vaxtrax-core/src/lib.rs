//! # vaxtrax-core
//!
//! The custody ledger for VaxTrax - THE RULES.
//!
//! This crate records every checkpoint a vaccine batch passes through,
//! classifies each temperature reading and decides whether custody may
//! continue.
//!
//! ## Components
//!
//! - `classifier`: temperature → `Status`
//! - `stage`: ordered custody checkpoints, no regressions
//! - `ledger`: append-only scan history, the only mutation path
//! - `gate`: proceed/halt recommendation after each scan
//! - `registry` + `storage`: in-memory and redb batch stores
//! - `session`: `CustodyDesk`, the per-batch serialized entry point
//! - `nfc`, `view`, `export`: payload parsing, role projections, audit export
//!
//! ## Architectural Constraints
//!
//! - No async, no network dependencies (pure Rust)
//! - Every error is returned to the caller; no partial mutation
//! - Request context is explicit; the core holds no session state

// =============================================================================
// MODULES
// =============================================================================

pub mod classifier;
pub mod export;
pub mod formats;
pub mod gate;
pub mod ledger;
pub mod nfc;
pub mod primitives;
pub mod registry;
pub mod session;
pub mod stage;
pub mod storage;
pub mod types;
pub mod view;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Action, Batch, BatchId, GateState, Recommendation, RequestContext, ScanEvent, Status,
    TempLimits, VaxtraxError,
};

// =============================================================================
// RE-EXPORTS: Custody Rules
// =============================================================================

pub use classifier::{ThresholdConfig, Thresholds, classify, thresholds_for};
pub use gate::{GateAction, RecommendationGate};
pub use ledger::ScanLedger;
pub use stage::{Stage, StageTracker};

// =============================================================================
// RE-EXPORTS: Storage & Orchestration
// =============================================================================

pub use registry::{BatchRegistry, MemoryRegistry, NewBatch, format_batch_id, limits_from_bounds};
pub use session::{CustodyDesk, OverrideRequest, ScanOutcome, ScanRequest, StorageBackend};
pub use storage::RedbRegistry;

// =============================================================================
// RE-EXPORTS: Formats, Views, Export
// =============================================================================

pub use export::{
    CanonicalBatch, CanonicalHeader, batch_checksum, export_batch, import_batch, verify_batch,
};
#[cfg(feature = "crypto-hash")]
pub use export::{batch_crypto_hash, compute_blake3_hash};
pub use formats::{PersistenceHeader, batch_from_bytes, batch_to_bytes};
pub use nfc::{NfcReading, parse_payload};
pub use view::{BatchProjection, BatchView, CompanyView, EventProjection, OperatorView, PublicView, Role};
