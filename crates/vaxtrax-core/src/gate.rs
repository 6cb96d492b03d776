//! # Recommendation Gate
//!
//! Two-state gate per batch deciding whether custody may proceed.
//!
//! ```text
//!                 on_scan (Safe)            ┌────────────────────┐
//!   ┌──────────────┐ ─────────────────────▶ │ Decided(Proceed)   │
//!   │ AwaitingScan │                        └────────────────────┘
//!   └──────────────┘ ─────────────────────▶ ┌────────────────────┐
//!          ▲        on_scan (At Risk/Unsafe)│ Decided(Halt)      │
//!          │                                └────────────────────┘
//!          └──── proceed / halt / override / any other append
//! ```
//!
//! Proceed requires both a pending `Proceed` decision and a Safe status at
//! the time of the call. Halt is always permitted.

use crate::classifier::Thresholds;
use crate::ledger::ScanLedger;
use crate::{Action, Batch, GateState, Recommendation, RequestContext, Status, VaxtraxError};
use serde::{Deserialize, Serialize};

/// Operator decision resolving a pending recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateAction {
    Proceed,
    Halt,
}

impl From<GateAction> for Action {
    fn from(action: GateAction) -> Self {
        match action {
            GateAction::Proceed => Action::Proceed,
            GateAction::Halt => Action::Halt,
        }
    }
}

/// Gate transitions for a batch.
pub struct RecommendationGate;

impl RecommendationGate {
    /// Recommendation for a status: only Safe may proceed.
    #[must_use]
    pub fn recommend(status: Status) -> Recommendation {
        match status {
            Status::Safe => Recommendation::Proceed,
            Status::AtRisk | Status::Unsafe => Recommendation::Halt,
        }
    }

    /// Decide after a scan has been appended.
    ///
    /// The latest ledger entry must be a plain scan; deciding on anything
    /// else would let a stale reading drive custody.
    pub fn on_scan(batch: &mut Batch) -> Result<Recommendation, VaxtraxError> {
        let latest = ScanLedger::latest(batch).ok_or_else(|| {
            VaxtraxError::Validation("no scan recorded for this batch".to_string())
        })?;
        if !latest.is_scan() {
            return Err(VaxtraxError::Validation(
                "latest ledger entry is not a scan".to_string(),
            ));
        }

        let recommendation = Self::recommend(latest.status);
        batch.gate = GateState::Decided(recommendation);
        Ok(recommendation)
    }

    /// Resolve the gate with an operator action.
    ///
    /// Appends a ledger entry tagged with the action (which also resets the
    /// gate) and returns the new snapshot.
    pub fn on_action(
        batch: &Batch,
        action: GateAction,
        ctx: &RequestContext,
        thresholds: &Thresholds,
    ) -> Result<Batch, VaxtraxError> {
        if action == GateAction::Proceed {
            Self::check_proceed(batch)?;
        }
        let event = ScanLedger::action_event(batch, action.into(), ctx);
        ScanLedger::append(batch, event, thresholds)
    }

    /// Proceed is allowed only from `Decided(Proceed)` with a Safe status.
    pub fn check_proceed(batch: &Batch) -> Result<(), VaxtraxError> {
        let cleared = batch.status == Status::Safe
            && batch.gate == GateState::Decided(Recommendation::Proceed);
        if cleared {
            Ok(())
        } else {
            Err(VaxtraxError::GateViolation {
                status: batch.status,
                gate: batch.gate,
            })
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Stage;
    use crate::{BatchId, ScanEvent, TempLimits};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().expect("valid time")
    }

    fn scanned(temp: f64) -> Batch {
        let limits = TempLimits::new(-25.0, -15.0).expect("limits");
        let thresholds = Thresholds::from_limits(&limits, 2.0);
        let batch = Batch::new(
            BatchId::new("VAX-2025-007"),
            "Berlin".to_string(),
            Stage::Factory,
            Some(limits),
            t0(),
        );
        let event = ScanEvent::scan(t0(), "Berlin", temp, Stage::Factory);
        let mut batch = ScanLedger::append(&batch, event, &thresholds).expect("append");
        RecommendationGate::on_scan(&mut batch).expect("decide");
        batch
    }

    #[test]
    fn safe_scan_recommends_proceed() {
        let batch = scanned(-18.5);
        assert_eq!(batch.gate(), GateState::Decided(Recommendation::Proceed));
    }

    #[test]
    fn at_risk_and_unsafe_recommend_halt() {
        assert_eq!(
            scanned(-16.0).gate(),
            GateState::Decided(Recommendation::Halt)
        );
        assert_eq!(
            scanned(-12.1).gate(),
            GateState::Decided(Recommendation::Halt)
        );
    }

    #[test]
    fn proceed_resets_gate_and_logs_action() {
        let batch = scanned(-18.5);
        let ctx = RequestContext::at(t0() + Duration::minutes(1)).with_operator("Operator 3");
        let next = RecommendationGate::on_action(
            &batch,
            GateAction::Proceed,
            &ctx,
            &Thresholds::DEFAULT,
        )
        .expect("proceed");

        assert_eq!(next.gate(), GateState::AwaitingScan);
        assert_eq!(next.scan_history().len(), 2);
        let entry = ScanLedger::latest(&next).expect("entry");
        assert_eq!(entry.action, Some(Action::Proceed));
        assert_eq!(entry.temperature, Some(-18.5));
        assert_eq!(entry.stage, Stage::Factory);
    }

    #[test]
    fn proceed_on_unsafe_is_a_violation() {
        let batch = scanned(-12.1);
        let err = RecommendationGate::on_action(
            &batch,
            GateAction::Proceed,
            &RequestContext::at(t0()),
            &Thresholds::DEFAULT,
        )
        .expect_err("violation");
        assert!(matches!(
            err,
            VaxtraxError::GateViolation {
                status: Status::Unsafe,
                ..
            }
        ));
        assert_eq!(batch.scan_history().len(), 1);
    }

    #[test]
    fn proceed_after_reset_requires_fresh_scan() {
        let batch = scanned(-18.5);
        let ctx = RequestContext::at(t0() + Duration::minutes(1));
        let batch =
            RecommendationGate::on_action(&batch, GateAction::Proceed, &ctx, &Thresholds::DEFAULT)
                .expect("first proceed");

        let err =
            RecommendationGate::on_action(&batch, GateAction::Proceed, &ctx, &Thresholds::DEFAULT)
                .expect_err("second proceed");
        assert!(matches!(
            err,
            VaxtraxError::GateViolation {
                gate: GateState::AwaitingScan,
                ..
            }
        ));
    }

    #[test]
    fn tampered_gate_still_checks_status() {
        let mut batch = scanned(-12.1);
        batch.gate = GateState::Decided(Recommendation::Proceed);
        assert!(RecommendationGate::check_proceed(&batch).is_err());
    }

    #[test]
    fn halt_always_permitted() {
        let batch = scanned(-12.1);
        let next = RecommendationGate::on_action(
            &batch,
            GateAction::Halt,
            &RequestContext::at(t0() + Duration::minutes(2)),
            &Thresholds::DEFAULT,
        )
        .expect("halt");
        assert_eq!(next.gate(), GateState::AwaitingScan);
        assert_eq!(
            ScanLedger::latest(&next).and_then(|e| e.action),
            Some(Action::Halt)
        );
    }

    #[test]
    fn halt_before_any_scan() {
        let batch = Batch::new(
            BatchId::new("VAX-2025-008"),
            "Berlin".to_string(),
            Stage::Factory,
            None,
            t0(),
        );
        let next = RecommendationGate::on_action(
            &batch,
            GateAction::Halt,
            &RequestContext::at(t0()),
            &Thresholds::DEFAULT,
        )
        .expect("halt");
        assert_eq!(next.temperature(), None);
        assert_eq!(next.status(), Status::Safe);
    }

    #[test]
    fn on_scan_refuses_action_entries() {
        let batch = scanned(-18.5);
        let mut halted = RecommendationGate::on_action(
            &batch,
            GateAction::Halt,
            &RequestContext::at(t0()),
            &Thresholds::DEFAULT,
        )
        .expect("halt");
        assert!(RecommendationGate::on_scan(&mut halted).is_err());
        assert_eq!(halted.gate(), GateState::AwaitingScan);
    }
}
