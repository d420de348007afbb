//! Harsh braking and acceleration

use super::{Detection, DetectionContext, Detector};
use crate::error::Result;
use async_trait::async_trait;
use fleet_core::{SafetyEvent, SafetyEventKind, Severity};

/// Flags speed changes of at least `threshold` units per second between two
/// samples at most `max_gap_secs` apart
pub struct HarshDrivingDetector {
    threshold: f64,
    max_gap_secs: f64,
}

impl HarshDrivingDetector {
    pub fn new(threshold: f64, max_gap_secs: f64) -> Self {
        Self {
            threshold: threshold.abs(),
            max_gap_secs,
        }
    }

    /// Acceleration in units per second, or `None` for non-comparable pairs
    pub fn acceleration(&self, ctx: &DetectionContext) -> Option<f64> {
        let dt = ctx.elapsed_secs();
        if dt <= 0.0 || dt > self.max_gap_secs {
            return None;
        }
        Some((ctx.current.speed - ctx.prior.speed) / dt)
    }
}

#[async_trait]
impl Detector for HarshDrivingDetector {
    fn name(&self) -> &'static str {
        "harsh_driving"
    }

    async fn detect(&self, ctx: &DetectionContext) -> Result<Vec<Detection>> {
        let Some(accel) = self.acceleration(ctx) else {
            return Ok(Vec::new());
        };

        let event = if accel <= -self.threshold {
            SafetyEvent::from_sample(
                &ctx.current,
                SafetyEventKind::HarshBraking,
                Severity::High,
                accel,
                -self.threshold,
                "km/h/s",
            )
        } else if accel >= self.threshold {
            SafetyEvent::from_sample(
                &ctx.current,
                SafetyEventKind::HarshAcceleration,
                Severity::High,
                accel,
                self.threshold,
                "km/h/s",
            )
        } else {
            return Ok(Vec::new());
        };

        Ok(vec![Detection::event(event)])
    }
}
