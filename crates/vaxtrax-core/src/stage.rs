//! # Stage Tracking
//!
//! The custody chain is a fixed, totally ordered sequence of checkpoints:
//!
//! | Index | Stage    |
//! |-------|----------|
//! | 0     | Factory  |
//! | 1     | Hub      |
//! | 2     | Storage  |
//! | 3     | Hospital |
//! | 4     | Patient  |
//!
//! A batch may stay at its stage or move forward (skipping is allowed).
//! Moving backward is a `StageRegression`. Validation has no side effects;
//! the actual change is recorded by the ledger so it is auditable.

use crate::VaxtraxError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// STAGE ENUM
// =============================================================================

/// One checkpoint in the custody sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Factory,
    Hub,
    Storage,
    Hospital,
    Patient,
}

impl Stage {
    /// All stages in custody order.
    pub const ALL: [Stage; 5] = [
        Stage::Factory,
        Stage::Hub,
        Stage::Storage,
        Stage::Hospital,
        Stage::Patient,
    ];

    /// Position of this stage in the custody order.
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Stage::Factory => 0,
            Stage::Hub => 1,
            Stage::Storage => 2,
            Stage::Hospital => 3,
            Stage::Patient => 4,
        }
    }

    /// Stage at the given position, if any.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Stage> {
        Self::ALL.get(index).copied()
    }

    /// Get the stage name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Factory => "Factory",
            Stage::Hub => "Hub",
            Stage::Storage => "Storage",
            Stage::Hospital => "Hospital",
            Stage::Patient => "Patient",
        }
    }

    /// Get the next stage, if any.
    #[must_use]
    pub fn next(&self) -> Option<Stage> {
        Self::from_index(self.index().saturating_add(1))
    }

    /// Get the previous stage, if any.
    #[must_use]
    pub fn previous(&self) -> Option<Stage> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }

    /// Check if this stage is terminal (Patient).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Patient)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = VaxtraxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|stage| stage.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| VaxtraxError::Validation(format!("invalid stage value: {wanted:?}")))
    }
}

// =============================================================================
// STAGE TRACKER
// =============================================================================

/// Ordering queries and transition validation for custody stages.
pub struct StageTracker;

impl StageTracker {
    /// Index of a stage in the custody order.
    #[must_use]
    pub const fn index_of(stage: Stage) -> usize {
        stage.index()
    }

    /// True when `a` comes strictly before `b`.
    #[must_use]
    pub const fn is_before(a: Stage, b: Stage) -> bool {
        a.index() < b.index()
    }

    /// The stage after `stage`, or `None` at the end of the chain.
    #[must_use]
    pub fn next(stage: Stage) -> Option<Stage> {
        stage.next()
    }

    /// Validate a transition from `current` to `new`.
    ///
    /// Returns the new stage when it is the same or later; a backward move
    /// fails with `StageRegression`.
    pub fn advance(current: Stage, new: Stage) -> Result<Stage, VaxtraxError> {
        if Self::is_before(new, current) {
            return Err(VaxtraxError::StageRegression {
                from: current,
                to: new,
            });
        }
        Ok(new)
    }
}

// =============================================================================
// TESTS
// =============================================================================
