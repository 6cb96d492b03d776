//! # Batch Views
//!
//! Role-based projections of a batch for presentation.
//!
//! | Role     | Sees                                                      |
//! |----------|-----------------------------------------------------------|
//! | operator | everything                                                |
//! | company  | everything                                                |
//! | public   | id, status, stage, reading, coarse location, anonymous history |
//!
//! The public view reduces a location to the text before its first comma
//! and never exposes operator or device identities.

use crate::ledger::ScanLedger;
use crate::stage::Stage;
use crate::{Action, Batch, Recommendation, ScanEvent, Status, TempLimits, VaxtraxError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// ROLE
// =============================================================================

/// Audience a projection is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Operator,
    Company,
    Public,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Operator => "operator",
            Role::Company => "company",
            Role::Public => "public",
        }
    }

    /// Project `batch` with the view for this role.
    #[must_use]
    pub fn project(&self, batch: &Batch) -> BatchProjection {
        match self {
            Role::Operator => OperatorView.project(batch),
            Role::Company => CompanyView.project(batch),
            Role::Public => PublicView.project(batch),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = VaxtraxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "operator" => Ok(Role::Operator),
            "company" => Ok(Role::Company),
            "public" => Ok(Role::Public),
            other => Err(VaxtraxError::Validation(format!(
                "invalid view: {other:?} (expected operator, company or public)"
            ))),
        }
    }
}

// =============================================================================
// PROJECTIONS
// =============================================================================

/// One ledger entry as shown to a role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventProjection {
    pub timestamp: DateTime<Utc>,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scanned_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub temperature: Option<f64>,
    pub status: Status,
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
}

/// A batch as shown to a role. History is newest-first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchProjection {
    pub view: Role,
    pub id: String,
    pub status: Status,
    pub stage: Stage,
    pub temperature: Option<f64>,
    pub location: String,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_limits: Option<TempLimits>,
    /// Pending recommendation from the latest scan, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<Recommendation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    pub history: Vec<EventProjection>,
}

/// Builds the projection of a batch for one audience.
pub trait BatchView {
    fn project(&self, batch: &Batch) -> BatchProjection;
}

fn full_event(event: &ScanEvent) -> EventProjection {
    EventProjection {
        timestamp: event.timestamp,
        location: event.location.clone(),
        scanned_by: event.scanned_by.clone(),
        device: event.device.clone(),
        temperature: event.temperature,
        status: event.status,
        stage: event.stage,
        action: event.action,
    }
}

fn full_projection(view: Role, batch: &Batch) -> BatchProjection {
    BatchProjection {
        view,
        id: batch.id().to_string(),
        status: batch.status(),
        stage: batch.stage(),
        temperature: batch.temperature(),
        location: batch.location().to_string(),
        last_updated: batch.last_updated(),
        created_at: Some(batch.created_at()),
        temp_limits: batch.temp_limits(),
        recommendation: batch.gate().recommendation(),
        version: Some(batch.version()),
        history: ScanLedger::history(batch).map(full_event).collect(),
    }
}

/// Text before the first comma: `"52.5200° N, 13.4050° E"` → `"52.5200° N"`.
#[must_use]
pub fn coarse_location(location: &str) -> &str {
    location.split(',').next().unwrap_or(location).trim()
}

/// Checkpoint operator view.
pub struct OperatorView;

impl BatchView for OperatorView {
    fn project(&self, batch: &Batch) -> BatchProjection {
        full_projection(Role::Operator, batch)
    }
}

/// Owning company view.
pub struct CompanyView;

impl BatchView for CompanyView {
    fn project(&self, batch: &Batch) -> BatchProjection {
        full_projection(Role::Company, batch)
    }
}

/// Public tracking view.
pub struct PublicView;

impl BatchView for PublicView {
    fn project(&self, batch: &Batch) -> BatchProjection {
        BatchProjection {
            view: Role::Public,
            id: batch.id().to_string(),
            status: batch.status(),
            stage: batch.stage(),
            temperature: batch.temperature(),
            location: coarse_location(batch.location()).to_string(),
            last_updated: batch.last_updated(),
            created_at: None,
            temp_limits: None,
            recommendation: None,
            version: None,
            history: ScanLedger::history(batch)
                .map(|e| EventProjection {
                    timestamp: e.timestamp,
                    location: coarse_location(&e.location).to_string(),
                    scanned_by: None,
                    device: None,
                    temperature: e.temperature,
                    status: e.status,
                    stage: e.stage,
                    action: e.action,
                })
                .collect(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BatchId;
    use crate::classifier::Thresholds;
    use chrono::{Duration, TimeZone};

    fn batch() -> Batch {
        let t0 = Utc
            .with_ymd_and_hms(2025, 5, 3, 6, 0, 0)
            .single()
            .expect("valid time");
        let batch = Batch::new(
            BatchId::new("VAX-2025-001"),
            "51.5074° N, 0.1278° W".to_string(),
            Stage::Factory,
            None,
            t0,
        );
        let first = ScanEvent::scan(t0, "52.5200° N, 13.4050° E", -20.5, Stage::Factory)
            .scanned_by(Some("John Smith".to_string()))
            .device(Some("NFC Scanner #12".to_string()));
        let second = ScanEvent::scan(
            t0 + Duration::hours(3),
            "51.5074° N, 0.1278° W",
            -18.0,
            Stage::Hub,
        )
        .scanned_by(Some("Sarah Johnson".to_string()))
        .device(Some("NFC Scanner #08".to_string()));
        let batch = ScanLedger::append(&batch, first, &Thresholds::DEFAULT).expect("first");
        ScanLedger::append(&batch, second, &Thresholds::DEFAULT).expect("second")
    }

    #[test]
    fn operator_view_is_complete() {
        let p = OperatorView.project(&batch());
        assert_eq!(p.view, Role::Operator);
        assert_eq!(p.location, "51.5074° N, 0.1278° W");
        assert_eq!(p.version, Some(2));
        assert_eq!(p.history.len(), 2);
        assert_eq!(p.history[0].scanned_by.as_deref(), Some("Sarah Johnson"));
        assert_eq!(p.history[1].stage, Stage::Factory);
    }

    #[test]
    fn public_view_hides_identities() {
        let p = PublicView.project(&batch());
        assert_eq!(p.location, "51.5074° N");
        assert!(p.created_at.is_none());
        assert!(
            p.history
                .iter()
                .all(|e| e.scanned_by.is_none() && e.device.is_none())
        );
        assert_eq!(p.history[1].location, "52.5200° N");

        let rendered = format!("{p:?}");
        assert!(!rendered.contains("Sarah"));
        assert!(!rendered.contains("Scanner"));
    }

    #[test]
    fn role_dispatch_and_parsing() {
        let b = batch();
        assert_eq!("public".parse::<Role>().expect("role"), Role::Public);
        assert_eq!(" Company ".parse::<Role>().expect("role"), Role::Company);
        assert!("admin".parse::<Role>().is_err());
        assert_eq!(Role::Company.project(&b), CompanyView.project(&b));
        assert_eq!(Role::default(), Role::Operator);
    }

    #[test]
    fn coarse_location_without_comma() {
        assert_eq!(coarse_location("Berlin"), "Berlin");
        assert_eq!(coarse_location("Berlin, DE"), "Berlin");
    }
}
