//! Trip route deviation

use super::{Detection, DetectionContext, DetectionRecord, Detector};
use crate::error::Result;
use async_trait::async_trait;
use fleet_core::geo::distance_to_path_m;
use fleet_core::{GeoPoint, RouteDeviation, SafetyEvent, SafetyEventKind, Severity, TripPlan};
use uuid::Uuid;

/// Flags a vehicle on an active trip that is further than `threshold_m`
/// from its planned path, or from the destination when no path is known
pub struct RouteDeviationDetector {
    threshold_m: f64,
}

impl RouteDeviationDetector {
    pub fn new(threshold_m: f64) -> Self {
        Self { threshold_m }
    }

    pub fn distance_from_plan(plan: &TripPlan, point: GeoPoint) -> f64 {
        distance_to_path_m(&plan.path, point).unwrap_or_else(|| plan.destination.distance_to(&point))
    }
}

#[async_trait]
impl Detector for RouteDeviationDetector {
    fn name(&self) -> &'static str {
        "route_deviation"
    }

    async fn detect(&self, ctx: &DetectionContext) -> Result<Vec<Detection>> {
        let current = &ctx.current;
        let Some(plan) = ctx.store.active_trip_plan(&current.vehicle_id).await? else {
            return Ok(Vec::new());
        };

        let distance = Self::distance_from_plan(&plan, current.point());
        if distance <= self.threshold_m {
            return Ok(Vec::new());
        }

        let mut event = SafetyEvent::from_sample(
            current,
            SafetyEventKind::RouteDeviation,
            Severity::Medium,
            distance,
            self.threshold_m,
            "m",
        )
        .with_details(format!("{:.0} m off planned route of trip {}", distance, plan.trip_id));
        event.trip_id = Some(plan.trip_id.clone());

        let record = RouteDeviation {
            id: Uuid::new_v4(),
            vehicle_id: current.vehicle_id.clone(),
            trip_id: plan.trip_id.clone(),
            distance_m: distance,
            threshold_m: self.threshold_m,
            location: current.point(),
            timestamp: current.captured_at,
        };

        Ok(vec![Detection::with_record(event, DetectionRecord::Route(record))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::test_support::context;
    use crate::storage::InMemoryStore;
    use chrono::Utc;
    use fleet_core::LocationSample;
    use std::sync::Arc;

    fn plan(path: Vec<GeoPoint>) -> TripPlan {
        TripPlan {
            trip_id: "t1".to_string(),
            vehicle_id: "v1".to_string(),
            destination: GeoPoint::new(0.0, 1.0),
            path,
        }
    }

    async fn run(store: Arc<InMemoryStore>, lat: f64, lon: f64) -> Vec<Detection> {
        let now = Utc::now();
        let prior = LocationSample::new("v1", lat, lon, 40.0).at(now - chrono::Duration::seconds(1));
        let current = LocationSample::new("v1", lat, lon, 40.0).at(now);
        RouteDeviationDetector::new(1_000.0)
            .detect(&context(prior, current, store))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_no_active_trip() {
        assert!(run(Arc::new(InMemoryStore::new()), 5.0, 5.0).await.is_empty());
    }

    #[tokio::test]
    async fn test_on_path_does_not_fire() {
        let store = Arc::new(InMemoryStore::new());
        store.set_trip_plan(plan(vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 1.0)]));
        // ~550 m north of the path midpoint
        assert!(run(store, 0.005, 0.5).await.is_empty());
    }

    #[tokio::test]
    async fn test_off_path_fires_with_record() {
        let store = Arc::new(InMemoryStore::new());
        store.set_trip_plan(plan(vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 1.0)]));
        // ~2.2 km north of the path
        let detections = run(store, 0.02, 0.5).await;

        assert_eq!(detections.len(), 1);
        let event = &detections[0].event;
        assert_eq!(event.kind, SafetyEventKind::RouteDeviation);
        assert_eq!(event.trip_id.as_deref(), Some("t1"));
        assert!(event.value > 2_000.0 && event.value < 2_400.0);
        assert!(matches!(detections[0].record, Some(DetectionRecord::Route(_))));
    }

    #[tokio::test]
    async fn test_destination_fallback_without_path() {
        let store = Arc::new(InMemoryStore::new());
        store.set_trip_plan(plan(Vec::new()));
        // Halfway to the destination, far from it
        assert_eq!(run(store.clone(), 0.0, 0.5).await.len(), 1);
        assert!(run(store, 0.0, 0.995).await.is_empty());
    }
}
