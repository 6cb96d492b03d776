//! # Scan Ledger
//!
//! Per-batch append-only record of checkpoint events.
//!
//! `ScanLedger::append` is the only path that changes a batch snapshot:
//! - the event timestamp must not precede the latest stored entry
//! - the event stage must not move the batch backward
//! - `status` is recomputed from the reading unless the entry is a
//!   `StatusOverride`; a `Halt` entry never lowers the batch's severity
//! - the snapshot (`temperature`, `status`, `stage`, `location`,
//!   `last_updated`) is copied from the new entry
//! - the gate returns to `AwaitingScan`; only `RecommendationGate::on_scan`
//!   moves it to `Decided`
//!
//! Append works on a copy and returns it. On error the caller's batch is
//! untouched.

use crate::classifier::{Thresholds, classify};
use crate::primitives::MAX_LEDGER_LENGTH;
use crate::stage::{Stage, StageTracker};
use crate::{Action, Batch, GateState, RequestContext, ScanEvent, Status, VaxtraxError};

/// Operations on a batch's scan history.
pub struct ScanLedger;

impl ScanLedger {
    /// Append `event` and return the updated snapshot.
    pub fn append(
        batch: &Batch,
        mut event: ScanEvent,
        thresholds: &Thresholds,
    ) -> Result<Batch, VaxtraxError> {
        event.validate()?;

        if batch.scan_history.len() >= MAX_LEDGER_LENGTH {
            return Err(VaxtraxError::Validation(format!(
                "ledger for {} is full ({} entries)",
                batch.id, MAX_LEDGER_LENGTH
            )));
        }

        if let Some(latest) = batch.scan_history.last()
            && event.timestamp < latest.timestamp
        {
            return Err(VaxtraxError::TemporalOrdering {
                latest: latest.timestamp,
                attempted: event.timestamp,
            });
        }

        StageTracker::advance(batch.stage, event.stage)?;

        if event.temperature.is_none() && batch.temperature.is_some() {
            return Err(VaxtraxError::Validation(
                "entry must carry the current reading once the batch has been scanned".to_string(),
            ));
        }

        event.status = match (event.action, event.temperature) {
            (Some(Action::StatusOverride), _) => event.status,
            (Some(Action::Halt), Some(t)) => classify(t, thresholds).max(batch.status),
            (_, Some(t)) => classify(t, thresholds),
            (_, None) => batch.status,
        };

        let mut next = batch.clone();
        next.temperature = event.temperature;
        next.status = event.status;
        next.stage = event.stage;
        next.location.clone_from(&event.location);
        next.last_updated = event.timestamp;
        next.gate = GateState::AwaitingScan;
        next.version = next.version.saturating_add(1);
        next.scan_history.push(event);

        Ok(next)
    }

    /// History for presentation, newest entry first.
    pub fn history(batch: &Batch) -> impl Iterator<Item = &ScanEvent> + '_ {
        batch.scan_history.iter().rev()
    }

    /// The most recently appended entry.
    #[must_use]
    pub fn latest(batch: &Batch) -> Option<&ScanEvent> {
        batch.scan_history.last()
    }

    /// Build an action entry that repeats the batch's current reading,
    /// stage and location.
    #[must_use]
    pub fn action_event(batch: &Batch, action: Action, ctx: &RequestContext) -> ScanEvent {
        ScanEvent {
            timestamp: ctx.now,
            location: batch.location.clone(),
            scanned_by: ctx.operator.clone(),
            device: ctx.device.clone(),
            temperature: batch.temperature,
            status: batch.status,
            stage: batch.stage,
            action: Some(action),
        }
    }

    /// Record a manual status and/or stage change.
    ///
    /// A status change is tagged `StatusOverride` and keeps the given status
    /// for this entry. A stage-only change is tagged `StageOverride` and is
    /// classified like any other entry. At least one of the two is required.
    pub fn record_override(
        batch: &Batch,
        status: Option<Status>,
        stage: Option<Stage>,
        ctx: &RequestContext,
        thresholds: &Thresholds,
    ) -> Result<Batch, VaxtraxError> {
        let action = match (status, stage) {
            (None, None) => {
                return Err(VaxtraxError::Validation(
                    "override requires a status or a stage".to_string(),
                ));
            }
            (Some(_), _) => Action::StatusOverride,
            (None, Some(_)) => Action::StageOverride,
        };

        let mut event = Self::action_event(batch, action, ctx);
        if let Some(status) = status {
            event.status = status;
        }
        if let Some(stage) = stage {
            event.stage = stage;
        }
        Self::append(batch, event, thresholds)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BatchId, Recommendation};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).single().expect("valid time")
    }

    fn fresh_batch() -> Batch {
        Batch::new(
            BatchId::new("VAX-2025-001"),
            "52.5200° N, 13.4050° E".to_string(),
            Stage::Factory,
            None,
            t0(),
        )
    }

    #[test]
    fn append_updates_snapshot_from_event() {
        let batch = fresh_batch();
        let event = ScanEvent::scan(t0() + Duration::hours(1), "Hamburg", -16.0, Stage::Hub)
            .scanned_by(Some("Emma Johnson".to_string()));

        let next = ScanLedger::append(&batch, event, &Thresholds::DEFAULT).expect("append");

        assert_eq!(next.temperature(), Some(-16.0));
        assert_eq!(next.status(), Status::AtRisk);
        assert_eq!(next.stage(), Stage::Hub);
        assert_eq!(next.location(), "Hamburg");
        assert_eq!(next.last_updated(), t0() + Duration::hours(1));
        assert_eq!(next.version(), 1);
        assert_eq!(next.scan_history().len(), 1);
        assert_eq!(next.scan_history()[0].status, Status::AtRisk);
    }

    #[test]
    fn caller_status_is_overwritten() {
        let batch = fresh_batch();
        let mut event = ScanEvent::scan(t0(), "Berlin", -10.0, Stage::Factory);
        event.status = Status::Safe;

        let next = ScanLedger::append(&batch, event, &Thresholds::DEFAULT).expect("append");
        assert_eq!(next.status(), Status::Unsafe);
    }

    #[test]
    fn out_of_order_timestamp_rejected_without_mutation() {
        let batch = fresh_batch();
        let first = ScanEvent::scan(t0() + Duration::hours(2), "Berlin", -18.0, Stage::Factory);
        let batch = ScanLedger::append(&batch, first, &Thresholds::DEFAULT).expect("append");
        let snapshot = batch.clone();

        let late = ScanEvent::scan(t0() + Duration::hours(1), "Berlin", -12.0, Stage::Factory);
        let err = ScanLedger::append(&batch, late, &Thresholds::DEFAULT).expect_err("ordering");

        assert!(matches!(err, VaxtraxError::TemporalOrdering { .. }));
        assert_eq!(batch, snapshot);
    }

    #[test]
    fn equal_timestamps_are_accepted() {
        let batch = fresh_batch();
        let a = ScanEvent::scan(t0(), "Berlin", -18.0, Stage::Factory);
        let b = ScanEvent::scan(t0(), "Berlin", -18.2, Stage::Factory);
        let batch = ScanLedger::append(&batch, a, &Thresholds::DEFAULT).expect("a");
        let batch = ScanLedger::append(&batch, b, &Thresholds::DEFAULT).expect("b");
        assert_eq!(batch.scan_history().len(), 2);
    }

    #[test]
    fn backward_stage_rejected() {
        let batch = fresh_batch();
        let e = ScanEvent::scan(t0(), "Chicago", -18.0, Stage::Storage);
        let batch = ScanLedger::append(&batch, e, &Thresholds::DEFAULT).expect("append");

        let back = ScanEvent::scan(t0() + Duration::hours(1), "Chicago", -18.0, Stage::Hub);
        let err = ScanLedger::append(&batch, back, &Thresholds::DEFAULT).expect_err("regress");
        assert!(matches!(err, VaxtraxError::StageRegression { .. }));
        assert_eq!(batch.stage(), Stage::Storage);
    }

    #[test]
    fn history_is_newest_first() {
        let mut batch = fresh_batch();
        for (i, stage) in Stage::ALL.iter().enumerate() {
            let e = ScanEvent::scan(t0() + Duration::hours(i as i64), "Depot", -18.0, *stage);
            batch = ScanLedger::append(&batch, e, &Thresholds::DEFAULT).expect("append");
        }

        let stages: Vec<Stage> = ScanLedger::history(&batch).map(|e| e.stage).collect();
        assert_eq!(
            stages,
            vec![
                Stage::Patient,
                Stage::Hospital,
                Stage::Storage,
                Stage::Hub,
                Stage::Factory
            ]
        );
        assert_eq!(
            ScanLedger::latest(&batch).map(|e| e.stage),
            Some(Stage::Patient)
        );
    }

    #[test]
    fn status_override_bypasses_classification_once() {
        let batch = fresh_batch();
        let scan = ScanEvent::scan(t0(), "Berlin", -19.0, Stage::Factory);
        let batch = ScanLedger::append(&batch, scan, &Thresholds::DEFAULT).expect("scan");

        let ctx = RequestContext::at(t0() + Duration::minutes(5)).with_operator("Company User");
        let overridden = ScanLedger::record_override(
            &batch,
            Some(Status::Unsafe),
            None,
            &ctx,
            &Thresholds::DEFAULT,
        )
        .expect("override");

        assert_eq!(overridden.status(), Status::Unsafe);
        let entry = ScanLedger::latest(&overridden).expect("entry");
        assert_eq!(entry.action, Some(Action::StatusOverride));
        assert_eq!(entry.temperature, Some(-19.0));
        assert_eq!(entry.scanned_by.as_deref(), Some("Company User"));

        // The next scan is classified again.
        let rescan = ScanEvent::scan(t0() + Duration::minutes(6), "Berlin", -19.0, Stage::Factory);
        let rescanned =
            ScanLedger::append(&overridden, rescan, &Thresholds::DEFAULT).expect("rescan");
        assert_eq!(rescanned.status(), Status::Safe);
    }

    #[test]
    fn halt_keeps_overridden_severity() {
        let batch = fresh_batch();
        let scan = ScanEvent::scan(t0(), "Berlin", -19.0, Stage::Factory);
        let batch = ScanLedger::append(&batch, scan, &Thresholds::DEFAULT).expect("scan");
        let ctx = RequestContext::at(t0() + Duration::minutes(5));
        let flagged = ScanLedger::record_override(
            &batch,
            Some(Status::Unsafe),
            None,
            &ctx,
            &Thresholds::DEFAULT,
        )
        .expect("override");

        let halt_ctx = RequestContext::at(t0() + Duration::minutes(6));
        let halt = ScanLedger::action_event(&flagged, Action::Halt, &halt_ctx);
        let halted = ScanLedger::append(&flagged, halt, &Thresholds::DEFAULT).expect("halt");

        assert_eq!(halted.status(), Status::Unsafe);
        assert_eq!(
            ScanLedger::latest(&halted).map(|e| e.status),
            Some(Status::Unsafe)
        );
    }

    #[test]
    fn halt_raises_to_reading_severity() {
        let batch = fresh_batch();
        let scan = ScanEvent::scan(t0(), "Berlin", -12.0, Stage::Factory);
        let batch = ScanLedger::append(&batch, scan, &Thresholds::DEFAULT).expect("scan");
        let flagged = ScanLedger::record_override(
            &batch,
            Some(Status::Safe),
            None,
            &RequestContext::at(t0() + Duration::minutes(1)),
            &Thresholds::DEFAULT,
        )
        .expect("override");
        assert_eq!(flagged.status(), Status::Safe);

        let halt_ctx = RequestContext::at(t0() + Duration::minutes(2));
        let halt = ScanLedger::action_event(&flagged, Action::Halt, &halt_ctx);
        let halted = ScanLedger::append(&flagged, halt, &Thresholds::DEFAULT).expect("halt");
        assert_eq!(halted.status(), Status::Unsafe);
    }

    #[test]
    fn stage_override_is_logged_and_monotonic() {
        let batch = fresh_batch();
        let ctx = RequestContext::at(t0());

        let moved = ScanLedger::record_override(
            &batch,
            None,
            Some(Stage::Storage),
            &ctx,
            &Thresholds::DEFAULT,
        )
        .expect("override");
        assert_eq!(moved.stage(), Stage::Storage);
        assert_eq!(
            ScanLedger::latest(&moved).and_then(|e| e.action),
            Some(Action::StageOverride)
        );

        let err = ScanLedger::record_override(
            &moved,
            None,
            Some(Stage::Factory),
            &ctx,
            &Thresholds::DEFAULT,
        )
        .expect_err("regress");
        assert!(matches!(err, VaxtraxError::StageRegression { .. }));
    }

    #[test]
    fn empty_override_rejected() {
        let batch = fresh_batch();
        let err = ScanLedger::record_override(
            &batch,
            None,
            None,
            &RequestContext::at(t0()),
            &Thresholds::DEFAULT,
        )
        .expect_err("empty");
        assert!(matches!(err, VaxtraxError::Validation(_)));
    }

    #[test]
    fn any_append_resets_gate() {
        let mut batch = fresh_batch();
        batch.gate = GateState::Decided(Recommendation::Proceed);
        let e = ScanEvent::scan(t0(), "Berlin", -18.0, Stage::Factory);
        let next = ScanLedger::append(&batch, e, &Thresholds::DEFAULT).expect("append");
        assert_eq!(next.gate(), GateState::AwaitingScan);
    }

    #[test]
    fn action_without_reading_after_scan_rejected() {
        let batch = fresh_batch();
        let e = ScanEvent::scan(t0(), "Berlin", -18.0, Stage::Factory);
        let batch = ScanLedger::append(&batch, e, &Thresholds::DEFAULT).expect("append");

        let mut halt = ScanLedger::action_event(&batch, Action::Halt, &RequestContext::at(t0()));
        halt.temperature = None;
        assert!(ScanLedger::append(&batch, halt, &Thresholds::DEFAULT).is_err());
    }
}
