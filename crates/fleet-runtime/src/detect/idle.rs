//! Long idle

use super::{Detection, DetectionContext, Detector};
use crate::error::Result;
use crate::storage::TimeRange;
use async_trait::async_trait;
use chrono::Duration;
use fleet_core::{SafetyEvent, SafetyEventKind, Severity};

/// Vehicle has stayed at or below `idle_speed` for at least `window`.
///
/// Fires once per idle run, on the sample that crosses the window. The run
/// start comes from the store, so the sampling rate does not matter.
pub struct LongIdleDetector {
    idle_speed: f64,
    window: Duration,
}

impl LongIdleDetector {
    pub fn new(idle_speed: f64, window: Duration) -> Self {
        Self { idle_speed, window }
    }
}

#[async_trait]
impl Detector for LongIdleDetector {
    fn name(&self) -> &'static str {
        "long_idle"
    }

    async fn detect(&self, ctx: &DetectionContext) -> Result<Vec<Detection>> {
        let current = &ctx.current;
        if current.speed > self.idle_speed || ctx.prior.speed > self.idle_speed {
            return Ok(Vec::new());
        }

        // Two windows back, up to and including the prior sample. A run longer
        // than that reports its start at the range edge, which is already past
        // the window.
        let range = TimeRange::new(
            current.captured_at - self.window * 2,
            ctx.prior.captured_at + Duration::microseconds(1),
        );
        let started = ctx
            .store
            .slow_run_start(&current.vehicle_id, self.idle_speed, range)
            .await?
            .map_or(ctx.prior.captured_at, |at| at.min(ctx.prior.captured_at));

        let idle_now = current.captured_at - started;
        let idle_before = ctx.prior.captured_at - started;
        if idle_now < self.window || idle_before >= self.window {
            return Ok(Vec::new());
        }

        let event = SafetyEvent::from_sample(
            current,
            SafetyEventKind::LongIdle,
            Severity::Medium,
            idle_now.num_seconds() as f64 / 60.0,
            self.window.num_minutes() as f64,
            "min",
        )
        .with_details(format!("idle since {}", started.to_rfc3339()));

        Ok(vec![Detection::event(event)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::test_support::{context, sample};
    use crate::storage::InMemoryStore;
    use chrono::{DateTime, Utc};
    use std::sync::Arc;

    fn detector() -> LongIdleDetector {
        LongIdleDetector::new(1.0, Duration::minutes(30))
    }

    fn idle_store(now: DateTime<Utc>, idle_for_mins: i64) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.add_location(sample(40.0, now - Duration::minutes(idle_for_mins + 1)));
        for m in (1..=idle_for_mins).rev() {
            store.add_location(sample(0.0, now - Duration::minutes(m)));
        }
        store
    }

    #[tokio::test]
    async fn test_fires_when_run_crosses_window() {
        let now = Utc::now();
        let store = idle_store(now, 30);
        // Run started 30 min ago; prior at 29 min 30 s of idling
        let prior = sample(0.0, now - Duration::seconds(30));
        let detections = detector().detect(&context(prior, sample(0.0, now), store)).await.unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].event.kind, SafetyEventKind::LongIdle);
        assert!(detections[0].event.value >= 30.0);
    }

    #[tokio::test]
    async fn test_short_idle_does_not_fire() {
        let now = Utc::now();
        let store = idle_store(now, 10);
        let prior = sample(0.0, now - Duration::seconds(30));
        assert!(detector().detect(&context(prior, sample(0.0, now), store)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fires_only_once_per_run() {
        let now = Utc::now();
        let store = idle_store(now, 45);
        let prior = sample(0.0, now - Duration::seconds(30));
        assert!(detector().detect(&context(prior, sample(0.0, now), store)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fires_once_on_one_hertz_stream() {
        let t0 = Utc::now() - Duration::hours(1);
        let store = Arc::new(InMemoryStore::new());
        store.add_location(sample(35.0, t0));
        for i in 1..=2_400 {
            store.add_location(sample(0.0, t0 + Duration::seconds(i)));
        }

        let detector = detector();
        let mut fired_at = Vec::new();
        for i in 2..=2_400 {
            let prior = sample(0.0, t0 + Duration::seconds(i - 1));
            let current = sample(0.0, t0 + Duration::seconds(i));
            let detections = detector.detect(&context(prior, current, store.clone())).await.unwrap();
            if !detections.is_empty() {
                fired_at.push(i);
            }
        }

        // Run starts at t0 + 1 s and crosses 30 minutes at t0 + 1801 s
        assert_eq!(fired_at, vec![1_801]);
    }

    #[tokio::test]
    async fn test_moving_vehicle_is_not_idle() {
        let now = Utc::now();
        let store = idle_store(now, 40);
        let prior = sample(0.0, now - Duration::seconds(30));
        assert!(detector().detect(&context(prior, sample(15.0, now), store)).await.unwrap().is_empty());
    }
}
