//! Geofence entry, exit and time-window violations

use super::{Detection, DetectionContext, DetectionRecord, Detector};
use crate::error::Result;
use async_trait::async_trait;
use fleet_core::{
    Geofence, GeofenceAlert, GeofenceTransition, LocationSample, SafetyEvent, SafetyEventKind, Severity,
    ZoneKind,
};
use uuid::Uuid;

/// Evaluates both samples against every fence in the captured snapshot.
///
/// | zone            | fires on                                      |
/// |-----------------|-----------------------------------------------|
/// | monitor         | entry and exit (MEDIUM)                       |
/// | inclusion       | exit (HIGH)                                   |
/// | exclusion       | entry (HIGH)                                  |
/// | time restricted | start of presence in disallowed hours (HIGH)  |
#[derive(Debug, Default)]
pub struct GeofenceDetector;

impl GeofenceDetector {
    pub fn new() -> Self {
        Self
    }

    fn evaluate(&self, fence: &Geofence, prior: &LocationSample, current: &LocationSample) -> Option<Detection> {
        let was_inside = fence.contains(prior.point());
        let is_inside = fence.contains(current.point());
        let entered = !was_inside && is_inside;
        let exited = was_inside && !is_inside;

        let (kind, severity, transition) = match fence.zone {
            ZoneKind::Monitor if entered => (SafetyEventKind::GeofenceEntry, Severity::Medium, GeofenceTransition::Entry),
            ZoneKind::Monitor if exited => (SafetyEventKind::GeofenceExit, Severity::Medium, GeofenceTransition::Exit),
            ZoneKind::Inclusion if exited => (SafetyEventKind::GeofenceExit, Severity::High, GeofenceTransition::Exit),
            ZoneKind::Exclusion if entered => (SafetyEventKind::GeofenceEntry, Severity::High, GeofenceTransition::Entry),
            ZoneKind::TimeRestricted => {
                let violating_before = was_inside && fence.presence_disallowed(prior.captured_at);
                let violating_now = is_inside && fence.presence_disallowed(current.captured_at);
                if violating_now && !violating_before {
                    (SafetyEventKind::GeofenceEntry, Severity::High, GeofenceTransition::Violation)
                } else {
                    return None;
                }
            }
            _ => return None,
        };

        let verb = match transition {
            GeofenceTransition::Entry => "entered",
            GeofenceTransition::Exit => "left",
            GeofenceTransition::Violation => "inside outside allowed hours",
        };

        // Crossing events measure the boundary crossing itself
        let event = SafetyEvent::from_sample(current, kind, severity, 1.0, 0.0, "crossing")
            .with_details(format!("{} geofence {} ({})", verb, fence.name, fence.id));

        let alert = GeofenceAlert {
            id: Uuid::new_v4(),
            vehicle_id: current.vehicle_id.clone(),
            geofence_id: fence.id.clone(),
            geofence_name: fence.name.clone(),
            transition,
            location: current.point(),
            timestamp: current.captured_at,
        };

        Some(Detection::with_record(event, DetectionRecord::Geofence(alert)))
    }
}

#[async_trait]
impl Detector for GeofenceDetector {
    fn name(&self) -> &'static str {
        "geofence"
    }

    async fn detect(&self, ctx: &DetectionContext) -> Result<Vec<Detection>> {
        let vehicle_id = &ctx.current.vehicle_id;
        Ok(ctx
            .geofences
            .iter()
            .filter(|fence| fence.active && fence.applies_to(vehicle_id))
            .filter_map(|fence| self.evaluate(fence, &ctx.prior, &ctx.current))
            .collect())
    }
}
