//! Absolute speeding

use super::{Detection, DetectionContext, Detector};
use crate::error::Result;
use async_trait::async_trait;
use fleet_core::{LocationSample, SafetyEvent, SafetyEventKind, Severity};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Source of the speed limit applying to a sample
pub trait SpeedLimitPolicy: Send + Sync {
    /// Limit at the sample's position, `None` when unknown
    fn limit_for(&self, sample: &LocationSample) -> Option<f64>;
}

/// Same limit everywhere
#[derive(Debug, Clone, Copy)]
pub struct FixedSpeedLimit {
    limit: f64,
}

impl FixedSpeedLimit {
    pub fn new(limit: f64) -> Self {
        Self { limit }
    }
}

impl SpeedLimitPolicy for FixedSpeedLimit {
    fn limit_for(&self, _sample: &LocationSample) -> Option<f64> {
        Some(self.limit)
    }
}

/// Excess over the limit at which severity escalates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedingTiers {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for SpeedingTiers {
    fn default() -> Self {
        Self {
            medium: 5.0,
            high: 10.0,
            critical: 20.0,
        }
    }
}

impl SpeedingTiers {
    pub fn severity(&self, excess: f64) -> Severity {
        if excess > self.critical {
            Severity::Critical
        } else if excess > self.high {
            Severity::High
        } else if excess > self.medium {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

pub struct SpeedingDetector {
    limits: Arc<dyn SpeedLimitPolicy>,
    tiers: SpeedingTiers,
}

impl SpeedingDetector {
    pub fn new(limits: Arc<dyn SpeedLimitPolicy>, tiers: SpeedingTiers) -> Self {
        Self { limits, tiers }
    }
}

#[async_trait]
impl Detector for SpeedingDetector {
    fn name(&self) -> &'static str {
        "speeding"
    }

    async fn detect(&self, ctx: &DetectionContext) -> Result<Vec<Detection>> {
        let Some(limit) = self.limits.limit_for(&ctx.current) else {
            return Ok(Vec::new());
        };

        let excess = ctx.current.speed - limit;
        if excess <= 0.0 {
            return Ok(Vec::new());
        }

        let event = SafetyEvent::from_sample(
            &ctx.current,
            SafetyEventKind::Speeding,
            self.tiers.severity(excess),
            ctx.current.speed,
            limit,
            "km/h",
        )
        .with_details(format!("{:.1} km/h over the limit", excess));

        Ok(vec![Detection::event(event)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::test_support::{context, pair};
    use crate::storage::InMemoryStore;

    async fn severity_at(speed: f64) -> Option<Severity> {
        let (prior, current) = pair(speed, speed, 1_000);
        let detector = SpeedingDetector::new(Arc::new(FixedSpeedLimit::new(80.0)), SpeedingTiers::default());
        let detections = detector
            .detect(&context(prior, current, Arc::new(InMemoryStore::new())))
            .await
            .unwrap();
        detections.first().map(|d| d.event.severity)
    }

    #[tokio::test]
    async fn test_severity_tiers() {
        assert_eq!(severity_at(80.0).await, None);
        assert_eq!(severity_at(83.0).await, Some(Severity::Low));
        assert_eq!(severity_at(85.0).await, Some(Severity::Low));
        assert_eq!(severity_at(86.0).await, Some(Severity::Medium));
        assert_eq!(severity_at(91.0).await, Some(Severity::High));
        assert_eq!(severity_at(101.0).await, Some(Severity::Critical));
    }

    struct UnknownLimit;

    impl SpeedLimitPolicy for UnknownLimit {
        fn limit_for(&self, _sample: &LocationSample) -> Option<f64> {
            None
        }
    }

    #[tokio::test]
    async fn test_unknown_limit_never_fires() {
        let (prior, current) = pair(200.0, 200.0, 1_000);
        let detector = SpeedingDetector::new(Arc::new(UnknownLimit), SpeedingTiers::default());
        let ctx = context(prior, current, Arc::new(InMemoryStore::new()));
        assert!(detector.detect(&ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_event_references_limit() {
        let (prior, current) = pair(95.0, 95.0, 1_000);
        let detector = SpeedingDetector::new(Arc::new(FixedSpeedLimit::new(80.0)), SpeedingTiers::default());
        let detections = detector
            .detect(&context(prior, current, Arc::new(InMemoryStore::new())))
            .await
            .unwrap();
        assert_eq!(detections[0].event.threshold, 80.0);
        assert!(detections[0].event.value > detections[0].event.threshold);
    }
}
