//! # Primitives
//!
//! Hardcoded runtime constants for the VaxTrax core.
//!
//! Thresholds here are the compiled-in defaults; deployments may override
//! them through `ThresholdConfig`. Format constants and input limits are
//! fixed.

// =============================================================================
// TEMPERATURE DEFAULTS (°C)
// =============================================================================

/// Readings strictly above this are Unsafe when a batch has no limits.
pub const DEFAULT_UNSAFE_ABOVE: f64 = -15.0;

/// Readings strictly above this (and not unsafe) are At Risk.
pub const DEFAULT_AT_RISK_ABOVE: f64 = -17.0;

/// Width of the at-risk band below a batch's own `max`.
///
/// Same width as the gap between the global breakpoints.
pub const DEFAULT_RISK_BAND: f64 = 2.0;

/// Fills the missing side when a batch is created with only one limit.
pub const DEFAULT_TEMP_MIN: f64 = -20.0;
/// Fills the missing side when a batch is created with only one limit.
pub const DEFAULT_TEMP_MAX: f64 = -15.0;

// =============================================================================
// BATCH IDENTIFIERS
// =============================================================================

/// Prefix of registry-allocated batch identifiers.
pub const BATCH_ID_PREFIX: &str = "VAX";

/// Minimum number of digits in the per-year sequence (`VAX-2025-001`).
pub const BATCH_SEQ_WIDTH: usize = 3;

// =============================================================================
// BINARY FORMAT
// =============================================================================

/// Magic bytes for stored batch records.
///
/// - Record = Magic Bytes ("VAXB") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"VAXB";

/// Current serialization format version.
///
/// Increment this when making breaking changes to the stored batch layout.
pub const FORMAT_VERSION: u8 = 1;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for location strings.
pub const MAX_LOCATION_LENGTH: usize = 256;

/// Maximum length for operator identities.
pub const MAX_OPERATOR_LENGTH: usize = 128;

/// Maximum length for device names.
pub const MAX_DEVICE_LENGTH: usize = 128;

/// Maximum length of a raw NFC text record.
pub const MAX_NFC_PAYLOAD_LENGTH: usize = 1024;

/// Maximum number of ledger entries per batch.
///
/// A batch passes five checkpoints; this bound only guards against
/// runaway clients and oversized imports.
pub const MAX_LEDGER_LENGTH: usize = 100_000;

/// How far a client-supplied scan timestamp may run ahead of the request
/// time, in seconds.
///
/// Actions are stamped with the request time, so a scan dated further ahead
/// would block halts until the clock caught up.
pub const MAX_SCAN_CLOCK_SKEW_SECS: i64 = 300;
