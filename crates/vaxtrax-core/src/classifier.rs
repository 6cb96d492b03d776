//! # Status Classifier
//!
//! Maps a temperature reading to a safety `Status`.
//!
//! Both threshold schemes (the global breakpoints and a batch's own
//! `min`/`max` band) resolve to one shape, [`Thresholds`]:
//!
//! - `t > unsafe_above` → Unsafe
//! - `t > at_risk_above` → At Risk
//! - otherwise → Safe
//!
//! Comparisons are strict, so a reading exactly on a threshold falls in the
//! safer band.

use crate::primitives::{DEFAULT_AT_RISK_ABOVE, DEFAULT_RISK_BAND, DEFAULT_UNSAFE_ABOVE};
use crate::{Batch, Status, TempLimits, VaxtraxError};
use serde::{Deserialize, Serialize};

// =============================================================================
// THRESHOLDS
// =============================================================================

/// Resolved breakpoints for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Readings strictly above this are Unsafe.
    pub unsafe_above: f64,
    /// Readings strictly above this (and not unsafe) are At Risk.
    pub at_risk_above: f64,
}

impl Thresholds {
    /// Global default breakpoints (−15 °C / −17 °C).
    pub const DEFAULT: Thresholds = Thresholds {
        unsafe_above: DEFAULT_UNSAFE_ABOVE,
        at_risk_above: DEFAULT_AT_RISK_ABOVE,
    };

    /// Create validated thresholds.
    pub fn new(unsafe_above: f64, at_risk_above: f64) -> Result<Self, VaxtraxError> {
        if !unsafe_above.is_finite() || !at_risk_above.is_finite() {
            return Err(VaxtraxError::Validation(
                "thresholds must be finite".to_string(),
            ));
        }
        if at_risk_above > unsafe_above {
            return Err(VaxtraxError::Validation(format!(
                "at-risk threshold ({at_risk_above}) must not exceed unsafe threshold ({unsafe_above})"
            )));
        }
        Ok(Self {
            unsafe_above,
            at_risk_above,
        })
    }

    /// Derive thresholds from a batch band: unsafe above `max`, at risk
    /// within `risk_band` below it (never below `min`).
    #[must_use]
    pub fn from_limits(limits: &TempLimits, risk_band: f64) -> Self {
        Self {
            unsafe_above: limits.max,
            at_risk_above: (limits.max - risk_band).max(limits.min),
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Deployment-wide threshold configuration.
///
/// Deserializable so it can live in the `[thresholds]` table of the
/// application config file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Global unsafe breakpoint for batches without limits.
    pub unsafe_above: f64,
    /// Global at-risk breakpoint for batches without limits.
    pub at_risk_above: f64,
    /// Width of the at-risk band below a batch's own `max`.
    pub risk_band: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            unsafe_above: DEFAULT_UNSAFE_ABOVE,
            at_risk_above: DEFAULT_AT_RISK_ABOVE,
            risk_band: DEFAULT_RISK_BAND,
        }
    }
}

impl ThresholdConfig {
    /// Check the configuration once at load time.
    pub fn validate(&self) -> Result<(), VaxtraxError> {
        Thresholds::new(self.unsafe_above, self.at_risk_above)?;
        if !self.risk_band.is_finite() || self.risk_band < 0.0 {
            return Err(VaxtraxError::Validation(format!(
                "risk band must be a non-negative number, got {}",
                self.risk_band
            )));
        }
        Ok(())
    }

    /// The global thresholds.
    #[must_use]
    pub fn global(&self) -> Thresholds {
        Thresholds {
            unsafe_above: self.unsafe_above,
            at_risk_above: self.at_risk_above,
        }
    }

    /// Thresholds for a batch band, or the global ones when there is none.
    #[must_use]
    pub fn resolve(&self, limits: Option<&TempLimits>) -> Thresholds {
        match limits {
            Some(limits) => Thresholds::from_limits(limits, self.risk_band),
            None => self.global(),
        }
    }
}

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// Classify a reading. Pure and total; NaN is treated as Unsafe.
#[must_use]
pub fn classify(temperature: f64, thresholds: &Thresholds) -> Status {
    if temperature.is_nan() || temperature > thresholds.unsafe_above {
        Status::Unsafe
    } else if temperature > thresholds.at_risk_above {
        Status::AtRisk
    } else {
        Status::Safe
    }
}

/// Thresholds applicable to `batch` under `config`.
#[must_use]
pub fn thresholds_for(batch: &Batch, config: &ThresholdConfig) -> Thresholds {
    config.resolve(batch.temp_limits.as_ref())
}

// =============================================================================
// TESTS
// =============================================================================
