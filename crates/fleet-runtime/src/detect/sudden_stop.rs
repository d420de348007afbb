//! Sudden stop

use super::{merge_history, Detection, DetectionContext, Detector};
use crate::error::Result;
use crate::storage::TimeRange;
use async_trait::async_trait;
use chrono::Duration;
use fleet_core::{SafetyEvent, SafetyEventKind, Severity};

/// Vehicle just came to a stop and was moving within the lookback window.
///
/// Fires once per stop: the prior sample must still be above `stop_speed`.
pub struct SuddenStopDetector {
    stop_speed: f64,
    moving_speed: f64,
    lookback: Duration,
    history_limit: usize,
}

impl SuddenStopDetector {
    pub fn new(stop_speed: f64, moving_speed: f64, lookback: Duration, history_limit: usize) -> Self {
        Self {
            stop_speed,
            moving_speed,
            lookback,
            history_limit,
        }
    }
}

#[async_trait]
impl Detector for SuddenStopDetector {
    fn name(&self) -> &'static str {
        "sudden_stop"
    }

    async fn detect(&self, ctx: &DetectionContext) -> Result<Vec<Detection>> {
        let current = &ctx.current;
        if current.speed > self.stop_speed || ctx.prior.speed <= self.stop_speed {
            return Ok(Vec::new());
        }

        let range = TimeRange::trailing(current.captured_at, self.lookback);
        let history = ctx
            .store
            .recent_locations(&current.vehicle_id, range, self.history_limit)
            .await?;

        // Batched persistence lags behind, so the prior sample counts too
        let peak = merge_history(history, &ctx.prior)
            .into_iter()
            .filter(|s| range.contains(s.captured_at))
            .map(|s| s.speed)
            .fold(f64::NEG_INFINITY, f64::max);

        if peak <= self.moving_speed {
            return Ok(Vec::new());
        }

        let event = SafetyEvent::from_sample(
            current,
            SafetyEventKind::SuddenStop,
            Severity::High,
            peak,
            self.moving_speed,
            "km/h",
        )
        .with_details(format!(
            "stopped within {}s of moving at {:.1} km/h",
            self.lookback.num_seconds(),
            peak
        ));

        Ok(vec![Detection::event(event)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::test_support::{context, sample};
    use crate::storage::InMemoryStore;
    use chrono::Utc;
    use std::sync::Arc;

    fn detector() -> SuddenStopDetector {
        SuddenStopDetector::new(1.0, 10.0, Duration::seconds(120), 1_000)
    }

    #[tokio::test]
    async fn test_stop_after_moving_in_history() {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        store.add_location(sample(50.0, now - Duration::seconds(90)));

        let prior = sample(5.0, now - Duration::seconds(30));
        let current = sample(0.0, now);
        let detections = detector().detect(&context(prior, current, store)).await.unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].event.kind, SafetyEventKind::SuddenStop);
        assert_eq!(detections[0].event.value, 50.0);
    }

    #[tokio::test]
    async fn test_prior_sample_counts_as_history() {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        let prior = sample(40.0, now - Duration::seconds(10));
        let detections = detector().detect(&context(prior, sample(0.5, now), store)).await.unwrap();
        assert_eq!(detections.len(), 1);
    }

    #[tokio::test]
    async fn test_movement_outside_lookback_ignored() {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        store.add_location(sample(80.0, now - Duration::seconds(300)));

        let prior = sample(5.0, now - Duration::seconds(30));
        assert!(detector().detect(&context(prior, sample(0.0, now), store)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_already_stopped_does_not_repeat() {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        store.add_location(sample(60.0, now - Duration::seconds(60)));

        let prior = sample(0.0, now - Duration::seconds(5));
        assert!(detector().detect(&context(prior, sample(0.0, now), store)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_still_moving() {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        let prior = sample(60.0, now - Duration::seconds(5));
        assert!(detector().detect(&context(prior, sample(20.0, now), store)).await.unwrap().is_empty());
    }
}
