//! Fuel fraud scoring
//!
//! A fill is scored by five independent analyses whose weighted sum is the
//! composite risk in `[0, 1]`:
//!
//! | component       | weight |
//! |-----------------|--------|
//! | consumption     | 0.25   |
//! | geographic      | 0.20   |
//! | timing          | 0.15   |
//! | quantity        | 0.20   |
//! | vehicle state   | 0.20   |

pub mod analysis;
mod engine;
mod station;

pub use analysis::{ComponentScore, FraudComponent};
pub use engine::{FraudAssessment, FraudEngine};
pub use station::{FuelStation, InMemoryStationRegistry, StationRegistry};

use chrono::Weekday;
use fleet_core::FuelStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Weight of each component in the composite score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudWeights {
    pub consumption: f64,
    pub geographic: f64,
    pub timing: f64,
    pub quantity: f64,
    pub vehicle_state: f64,
}

impl Default for FraudWeights {
    fn default() -> Self {
        Self {
            consumption: 0.25,
            geographic: 0.20,
            timing: 0.15,
            quantity: 0.20,
            vehicle_state: 0.20,
        }
    }
}

impl FraudWeights {
    pub fn for_component(&self, component: FraudComponent) -> f64 {
        match component {
            FraudComponent::Consumption => self.consumption,
            FraudComponent::Geographic => self.geographic,
            FraudComponent::Timing => self.timing,
            FraudComponent::Quantity => self.quantity,
            FraudComponent::VehicleState => self.vehicle_state,
        }
    }

    pub fn total(&self) -> f64 {
        self.consumption + self.geographic + self.timing + self.quantity + self.vehicle_state
    }

    /// Weighted sum of component scores before clamping
    pub fn weighted_sum(&self, components: &[ComponentScore]) -> f64 {
        components
            .iter()
            .map(|c| self.for_component(c.component) * c.score)
            .sum()
    }
}

/// Relative deviation tiers of the consumption analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumptionTiers {
    /// Deviation above which the fill is extreme (1.5 = 150%)
    pub extreme: f64,
    pub extreme_score: f64,
    pub high: f64,
    pub high_score: f64,
    pub moderate: f64,
    pub moderate_score: f64,
}

impl Default for ConsumptionTiers {
    fn default() -> Self {
        Self {
            extreme: 1.5,
            extreme_score: 0.9,
            high: 1.0,
            high_score: 0.7,
            moderate: 0.5,
            moderate_score: 0.4,
        }
    }
}

/// Score cut-offs of the disposition policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispositionThresholds {
    /// Below: auto-approve
    pub review: f64,
    /// At or above: raise a fraud alert
    pub alert: f64,
    /// At or above: auto-reject
    pub reject: f64,
}

impl Default for DispositionThresholds {
    fn default() -> Self {
        Self {
            review: 0.3,
            alert: 0.6,
            reject: 0.8,
        }
    }
}

/// Fraud engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudConfig {
    pub weights: FraudWeights,

    /// Trailing window of the consumption baseline
    pub history_days: i64,

    /// Fewer prior fills than this yields `insufficient_data_score`
    pub min_history_events: usize,
    pub insufficient_data_score: f64,

    pub consumption_tiers: ConsumptionTiers,

    pub missing_location_score: f64,
    pub invalid_location_score: f64,
    pub unknown_station_score: f64,
    pub remote_area_score: f64,

    /// Nearest known station further than this marks a remote area
    pub remote_area_km: f64,

    /// Local hours `[start, end)` counted as night
    pub night_start_hour: u32,
    pub night_end_hour: u32,
    pub night_score: f64,

    pub weekend_days: Vec<Weekday>,
    pub weekend_score: f64,

    pub repeat_window_mins: i64,
    pub repeat_fill_score: f64,

    /// Offset of the fleet's local time from UTC
    pub utc_offset_minutes: i32,

    pub over_capacity_score: f64,
    /// Fraction of tank capacity above which a fill is suspicious
    pub near_capacity_ratio: f64,
    pub near_capacity_score: f64,

    pub min_quantity_liters: f64,
    pub min_quantity_score: f64,

    /// Plausible price per liter `[min, max]`
    pub min_price_per_liter: f64,
    pub max_price_per_liter: f64,
    pub low_price_score: f64,
    pub high_price_score: f64,

    pub odometer_rollback_score: f64,
    /// Distance since the previous fill above this is implausible
    pub max_distance_between_fills_km: f64,
    pub excess_distance_score: f64,
    pub no_driver_score: f64,

    /// Components scoring at least this have their triggers named in the reason
    pub significance_threshold: f64,

    pub disposition: DispositionThresholds,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            weights: FraudWeights::default(),
            history_days: 30,
            min_history_events: 3,
            insufficient_data_score: 0.1,
            consumption_tiers: ConsumptionTiers::default(),
            missing_location_score: 0.3,
            invalid_location_score: 0.6,
            unknown_station_score: 0.4,
            remote_area_score: 0.3,
            remote_area_km: 50.0,
            night_start_hour: 0,
            night_end_hour: 4,
            night_score: 0.4,
            weekend_days: vec![Weekday::Sat, Weekday::Sun],
            weekend_score: 0.2,
            repeat_window_mins: 60,
            repeat_fill_score: 0.6,
            utc_offset_minutes: 0,
            over_capacity_score: 0.9,
            near_capacity_ratio: 0.9,
            near_capacity_score: 0.4,
            min_quantity_liters: 5.0,
            min_quantity_score: 0.3,
            min_price_per_liter: 0.5,
            max_price_per_liter: 3.0,
            low_price_score: 0.7,
            high_price_score: 0.4,
            odometer_rollback_score: 0.8,
            max_distance_between_fills_km: 1_500.0,
            excess_distance_score: 0.5,
            no_driver_score: 0.4,
            significance_threshold: 0.3,
            disposition: DispositionThresholds::default(),
        }
    }
}

/// Risk band label used as the reason prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskBand {
    Low,
    Medium,
    High,
}

impl RiskBand {
    pub fn from_score(score: f64, thresholds: &DispositionThresholds) -> Self {
        if score >= thresholds.alert {
            RiskBand::High
        } else if score >= thresholds.review {
            RiskBand::Medium
        } else {
            RiskBand::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskBand::Low => "LOW RISK",
            RiskBand::Medium => "MEDIUM RISK",
            RiskBand::High => "HIGH RISK",
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the caller does with a scored fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudDisposition {
    AutoApprove,
    /// Pending human review
    Review,
    AutoReject,
}

impl FraudDisposition {
    pub fn from_score(score: f64, thresholds: &DispositionThresholds) -> Self {
        if score >= thresholds.reject {
            FraudDisposition::AutoReject
        } else if score >= thresholds.review {
            FraudDisposition::Review
        } else {
            FraudDisposition::AutoApprove
        }
    }

    pub fn status(&self) -> FuelStatus {
        match self {
            FraudDisposition::AutoApprove => FuelStatus::Approved,
            FraudDisposition::Review => FuelStatus::Pending,
            FraudDisposition::AutoReject => FuelStatus::Rejected,
        }
    }
}
