//! Safety events and the records detectors persist alongside them

use crate::geo::GeoPoint;
use crate::types::sample::LocationSample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of safety event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyEventKind {
    HarshBraking,
    HarshAcceleration,
    Speeding,
    GeofenceEntry,
    GeofenceExit,
    RouteDeviation,
    SuddenStop,
    LongIdle,
}

impl SafetyEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyEventKind::HarshBraking => "HARSH_BRAKING",
            SafetyEventKind::HarshAcceleration => "HARSH_ACCELERATION",
            SafetyEventKind::Speeding => "SPEEDING",
            SafetyEventKind::GeofenceEntry => "GEOFENCE_ENTRY",
            SafetyEventKind::GeofenceExit => "GEOFENCE_EXIT",
            SafetyEventKind::RouteDeviation => "ROUTE_DEVIATION",
            SafetyEventKind::SuddenStop => "SUDDEN_STOP",
            SafetyEventKind::LongIdle => "LONG_IDLE",
        }
    }
}

impl fmt::Display for SafetyEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected safety/compliance event. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyEvent {
    pub id: Uuid,
    pub vehicle_id: String,
    pub driver_id: Option<String>,
    pub trip_id: Option<String>,
    pub kind: SafetyEventKind,
    pub severity: Severity,

    /// Measured value that crossed the threshold
    pub value: f64,

    /// The threshold that was crossed
    pub threshold: f64,

    pub unit: String,
    pub location: GeoPoint,
    pub timestamp: DateTime<Utc>,

    /// Free-form context (geofence id, trip id ...)
    #[serde(default)]
    pub details: Option<String>,
}

impl SafetyEvent {
    /// Build an event located at `sample`
    pub fn from_sample(
        sample: &LocationSample,
        kind: SafetyEventKind,
        severity: Severity,
        value: f64,
        threshold: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            vehicle_id: sample.vehicle_id.clone(),
            driver_id: sample.driver_id.clone(),
            trip_id: sample.trip_id.clone(),
            kind,
            severity,
            value,
            threshold,
            unit: unit.into(),
            location: sample.point(),
            timestamp: sample.captured_at,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// One-line human readable description
    pub fn describe(&self) -> String {
        let mut text = format!(
            "{} ({}) for vehicle {}: {:.1} {} vs threshold {:.1}",
            self.kind, self.severity, self.vehicle_id, self.value, self.unit, self.threshold
        );
        if let Some(details) = &self.details {
            text.push_str(" - ");
            text.push_str(details);
        }
        text
    }
}

/// Geofence transition recorded with a geofence event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeofenceTransition {
    Entry,
    Exit,
    /// Presence inside a time-restricted zone outside its allowed hours
    Violation,
}

/// Persisted record of a geofence event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceAlert {
    pub id: Uuid,
    pub vehicle_id: String,
    pub geofence_id: String,
    pub geofence_name: String,
    pub transition: GeofenceTransition,
    pub location: GeoPoint,
    pub timestamp: DateTime<Utc>,
}

/// Persisted record of a route deviation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDeviation {
    pub id: Uuid,
    pub vehicle_id: String,
    pub trip_id: String,
    pub distance_m: f64,
    pub threshold_m: f64,
    pub location: GeoPoint,
    pub timestamp: DateTime<Utc>,
}

/// Planned route of an active trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripPlan {
    pub trip_id: String,
    pub vehicle_id: String,
    pub destination: GeoPoint,

    /// Ordered planned path; may be empty when only the destination is known
    #[serde(default)]
    pub path: Vec<GeoPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(
            [Severity::High, Severity::Low, Severity::Critical].iter().max(),
            Some(&Severity::Critical)
        );
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&SafetyEventKind::HarshBraking).unwrap();
        assert_eq!(json, "\"HARSH_BRAKING\"");
        assert_eq!(SafetyEventKind::LongIdle.to_string(), "LONG_IDLE");
    }

    #[test]
    fn test_from_sample_copies_refs() {
        let sample = LocationSample::new("v9", 1.0, 2.0, 90.0)
            .with_driver("d1")
            .with_trip("t1");
        let event = SafetyEvent::from_sample(&sample, SafetyEventKind::Speeding, Severity::Medium, 90.0, 80.0, "km/h")
            .with_details("limit 80");

        assert_eq!(event.vehicle_id, "v9");
        assert_eq!(event.driver_id.as_deref(), Some("d1"));
        assert_eq!(event.trip_id.as_deref(), Some("t1"));
        assert_eq!(event.location, GeoPoint::new(1.0, 2.0));
        assert!(event.describe().contains("SPEEDING"));
        assert!(event.describe().contains("limit 80"));
    }
}
