//! Structured alert messages published back onto the transport

use crate::types::event::{SafetyEvent, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Alert consumed by dashboards, push notifiers and partner adapters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMessage {
    pub id: Uuid,

    /// e.g. `HARSH_BRAKING`, `FRAUD_DETECTED`
    pub alert_type: String,

    pub severity: Severity,

    #[serde(default)]
    pub vehicle_id: Option<String>,

    #[serde(default)]
    pub driver_id: Option<String>,

    #[serde(default)]
    pub trip_id: Option<String>,

    /// Other referenced entity (fuel event id, geofence id ...)
    #[serde(default)]
    pub entity_ref: Option<String>,

    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub requires_action: bool,

    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl AlertMessage {
    pub fn new(alert_type: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_type: alert_type.into(),
            severity,
            vehicle_id: None,
            driver_id: None,
            trip_id: None,
            entity_ref: None,
            message: message.into(),
            timestamp: Utc::now(),
            requires_action: severity >= Severity::High,
            data: None,
        }
    }

    pub fn for_vehicle(mut self, vehicle_id: impl Into<String>) -> Self {
        self.vehicle_id = Some(vehicle_id.into());
        self
    }

    pub fn with_driver(mut self, driver_id: Option<String>) -> Self {
        self.driver_id = driver_id;
        self
    }

    pub fn with_entity_ref(mut self, entity_ref: impl Into<String>) -> Self {
        self.entity_ref = Some(entity_ref.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn requires_action(mut self, requires_action: bool) -> Self {
        self.requires_action = requires_action;
        self
    }
}

impl From<&SafetyEvent> for AlertMessage {
    fn from(event: &SafetyEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_type: event.kind.as_str().to_string(),
            severity: event.severity,
            vehicle_id: Some(event.vehicle_id.clone()),
            driver_id: event.driver_id.clone(),
            trip_id: event.trip_id.clone(),
            entity_ref: Some(event.id.to_string()),
            message: event.describe(),
            timestamp: event.timestamp,
            requires_action: event.severity >= Severity::High,
            data: serde_json::to_value(event).ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::event::SafetyEventKind;
    use crate::types::sample::LocationSample;

    #[test]
    fn test_requires_action_follows_severity() {
        assert!(!AlertMessage::new("X", Severity::Medium, "m").requires_action);
        assert!(AlertMessage::new("X", Severity::High, "m").requires_action);
    }

    #[test]
    fn test_from_safety_event() {
        let sample = LocationSample::new("v3", 0.0, 0.0, 0.0).with_driver("d3");
        let event = SafetyEvent::from_sample(&sample, SafetyEventKind::SuddenStop, Severity::High, 0.0, 1.0, "km/h");
        let alert = AlertMessage::from(&event);

        assert_eq!(alert.alert_type, "SUDDEN_STOP");
        assert_eq!(alert.vehicle_id.as_deref(), Some("v3"));
        assert_eq!(alert.driver_id.as_deref(), Some("d3"));
        assert_eq!(alert.entity_ref, Some(event.id.to_string()));
        assert!(alert.requires_action);
        assert!(alert.data.is_some());
    }
}
