//! Detector set
//!
//! Each detector compares a vehicle's current sample with its prior one and
//! emits zero or more [`Detection`]s. Detectors hold no per-vehicle state;
//! the ones needing history read it from the store.

mod geofence;
mod harsh;
mod idle;
mod route;
mod runner;
mod speeding;
mod sudden_stop;

pub use geofence::GeofenceDetector;
pub use harsh::HarshDrivingDetector;
pub use idle::LongIdleDetector;
pub use route::RouteDeviationDetector;
pub use runner::{DetectionSink, DetectorRunner};
pub use speeding::{FixedSpeedLimit, SpeedLimitPolicy, SpeedingDetector, SpeedingTiers};
pub use sudden_stop::SuddenStopDetector;

use crate::error::Result;
use crate::storage::TelemetryStore;
use async_trait::async_trait;
use fleet_core::{Geofence, GeofenceAlert, LocationSample, RouteDeviation, SafetyEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Input of one detector invocation, captured when the sample arrived
pub struct DetectionContext {
    pub current: LocationSample,
    pub prior: LocationSample,
    pub geofences: Arc<Vec<Geofence>>,
    pub store: Arc<dyn TelemetryStore>,
}

impl DetectionContext {
    pub fn new(
        current: LocationSample,
        prior: LocationSample,
        geofences: Arc<Vec<Geofence>>,
        store: Arc<dyn TelemetryStore>,
    ) -> Self {
        Self {
            current,
            prior,
            geofences,
            store,
        }
    }

    /// Seconds between prior and current
    pub fn elapsed_secs(&self) -> f64 {
        self.current.seconds_since(&self.prior)
    }
}

/// Detail record persisted next to some safety events
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionRecord {
    Geofence(GeofenceAlert),
    Route(RouteDeviation),
}

/// A safety event plus its optional detail record
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub event: SafetyEvent,
    pub record: Option<DetectionRecord>,
}

impl Detection {
    pub fn event(event: SafetyEvent) -> Self {
        Self { event, record: None }
    }

    pub fn with_record(event: SafetyEvent, record: DetectionRecord) -> Self {
        Self {
            event,
            record: Some(record),
        }
    }
}

/// A safety/compliance policy
#[async_trait]
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    async fn detect(&self, ctx: &DetectionContext) -> Result<Vec<Detection>>;
}

/// Detector thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Harsh braking/acceleration threshold in speed units per second
    pub harsh_threshold: f64,

    /// Sample pairs further apart than this are not compared
    pub max_comparable_gap_secs: f64,

    /// Limit used by the default fixed speed-limit policy
    pub speed_limit: f64,

    pub speeding_tiers: SpeedingTiers,

    /// At or below this speed the vehicle counts as stopped
    pub sudden_stop_speed: f64,

    /// Above this speed the vehicle counts as moving
    pub sudden_stop_moving_speed: f64,

    pub sudden_stop_lookback_secs: i64,

    /// At or below this speed the vehicle counts as idle
    pub idle_speed: f64,

    pub idle_window_mins: i64,

    /// Trip-level route deviation threshold
    pub route_deviation_threshold_m: f64,

    pub geofence_refresh_secs: u64,

    /// Pending detection jobs; further jobs are dropped
    pub job_queue_capacity: usize,

    /// Detector tasks allowed to run at once
    pub max_concurrent_tasks: usize,

    /// Upper bound on samples read per sudden-stop history query
    pub history_limit: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            harsh_threshold: 12.0,
            max_comparable_gap_secs: 5.0,
            speed_limit: 80.0,
            speeding_tiers: SpeedingTiers::default(),
            sudden_stop_speed: 1.0,
            sudden_stop_moving_speed: 10.0,
            sudden_stop_lookback_secs: 120,
            idle_speed: 1.0,
            idle_window_mins: 30,
            route_deviation_threshold_m: 1_000.0,
            geofence_refresh_secs: 60,
            job_queue_capacity: 1_024,
            max_concurrent_tasks: 64,
            history_limit: 1_000,
        }
    }
}

/// The six standard detectors configured from `config`
pub fn standard_detectors(config: &DetectorConfig, speed_limits: Arc<dyn SpeedLimitPolicy>) -> Vec<Arc<dyn Detector>> {
    vec![
        Arc::new(HarshDrivingDetector::new(config.harsh_threshold, config.max_comparable_gap_secs)),
        Arc::new(SpeedingDetector::new(speed_limits, config.speeding_tiers.clone())),
        Arc::new(GeofenceDetector::new()),
        Arc::new(RouteDeviationDetector::new(config.route_deviation_threshold_m)),
        Arc::new(SuddenStopDetector::new(
            config.sudden_stop_speed,
            config.sudden_stop_moving_speed,
            chrono::Duration::seconds(config.sudden_stop_lookback_secs),
            config.history_limit,
        )),
        Arc::new(LongIdleDetector::new(
            config.idle_speed,
            chrono::Duration::minutes(config.idle_window_mins),
        )),
    ]
}

/// Prior plus stored history, newest first, one sample per timestamp
pub(crate) fn merge_history(mut history: Vec<LocationSample>, prior: &LocationSample) -> Vec<LocationSample> {
    history.push(prior.clone());
    history.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
    history.dedup_by(|a, b| a.captured_at == b.captured_at);
    history
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_merge_history_dedups_and_orders() {
        let t0 = Utc::now();
        let prior = LocationSample::new("v1", 0.0, 0.0, 3.0).at(t0);
        let history = vec![
            LocationSample::new("v1", 0.0, 0.0, 1.0).at(t0 - Duration::seconds(20)),
            prior.clone(),
            LocationSample::new("v1", 0.0, 0.0, 2.0).at(t0 - Duration::seconds(10)),
        ];

        let merged = merge_history(history, &prior);
        let speeds: Vec<f64> = merged.iter().map(|s| s.speed).collect();
        assert_eq!(speeds, vec![3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_standard_detectors() {
        let detectors = standard_detectors(&DetectorConfig::default(), Arc::new(FixedSpeedLimit::new(80.0)));
        let names: Vec<&str> = detectors.iter().map(|d| d.name()).collect();
        assert_eq!(
            names,
            vec!["harsh_driving", "speeding", "geofence", "route_deviation", "sudden_stop", "long_idle"]
        );
    }
}
