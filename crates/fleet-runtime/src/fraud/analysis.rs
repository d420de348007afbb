//! The five fraud sub-analyses
//!
//! Each is a pure function of the fill and the context the engine gathered.
//! Component scores are additive over their triggers and capped at 1.0.

use super::{FraudConfig, StationRegistry};
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use fleet_core::geo::valid_coordinates;
use fleet_core::FuelEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudComponent {
    Consumption,
    Geographic,
    Timing,
    Quantity,
    VehicleState,
}

impl FraudComponent {
    pub const ALL: [FraudComponent; 5] = [
        FraudComponent::Consumption,
        FraudComponent::Geographic,
        FraudComponent::Timing,
        FraudComponent::Quantity,
        FraudComponent::VehicleState,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FraudComponent::Consumption => "consumption",
            FraudComponent::Geographic => "geographic",
            FraudComponent::Timing => "timing",
            FraudComponent::Quantity => "quantity",
            FraudComponent::VehicleState => "vehicle_state",
        }
    }
}

impl fmt::Display for FraudComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one sub-analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentScore {
    pub component: FraudComponent,
    pub score: f64,
    pub warnings: Vec<String>,
}

impl ComponentScore {
    fn new(component: FraudComponent) -> Self {
        Self {
            component,
            score: 0.0,
            warnings: Vec::new(),
        }
    }

    fn trigger(&mut self, score: f64, warning: impl Into<String>) {
        self.score = (self.score + score).min(1.0);
        self.warnings.push(warning.into());
    }

    pub fn has_warning(&self, needle: &str) -> bool {
        self.warnings.iter().any(|w| w.contains(needle))
    }
}

fn local_time(at: DateTime<Utc>, config: &FraudConfig) -> DateTime<Utc> {
    at + Duration::minutes(config.utc_offset_minutes as i64)
}

/// Liters of this fill against the average fill over the trailing window.
///
/// `prior_fills` are the vehicle's earlier fills inside the window.
pub fn consumption(event: &FuelEvent, prior_fills: &[FuelEvent], config: &FraudConfig) -> ComponentScore {
    let mut result = ComponentScore::new(FraudComponent::Consumption);

    let volumes: Vec<f64> = prior_fills
        .iter()
        .map(|e| e.liters)
        .filter(|l| l.is_finite() && *l > 0.0)
        .collect();

    if volumes.len() < config.min_history_events {
        result.trigger(
            config.insufficient_data_score,
            format!("insufficient history ({} prior fills)", volumes.len()),
        );
        return result;
    }

    let average = volumes.iter().sum::<f64>() / volumes.len() as f64;
    let deviation = (event.liters - average) / average;
    let tiers = &config.consumption_tiers;

    let tier = if deviation > tiers.extreme {
        Some(tiers.extreme_score)
    } else if deviation > tiers.high {
        Some(tiers.high_score)
    } else if deviation > tiers.moderate {
        Some(tiers.moderate_score)
    } else {
        None
    };

    if let Some(score) = tier {
        result.trigger(
            score,
            format!(
                "consumption {:.0}% above 30-day average of {:.1} L",
                deviation * 100.0,
                average
            ),
        );
    }
    result
}

/// Plausibility of where the fill happened
pub fn geographic(event: &FuelEvent, stations: &dyn StationRegistry, config: &FraudConfig) -> ComponentScore {
    let mut result = ComponentScore::new(FraudComponent::Geographic);

    let (lat, lon) = match (event.latitude, event.longitude) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ => {
            result.trigger(config.missing_location_score, "missing fill location");
            return result;
        }
    };
    if !valid_coordinates(lat, lon) {
        result.trigger(
            config.invalid_location_score,
            format!("invalid fill coordinates ({}, {})", lat, lon),
        );
        return result;
    }

    // Without a registry there is nothing to compare against
    if stations.is_empty() {
        return result;
    }

    let point = fleet_core::GeoPoint::new(lat, lon);
    let nearest = stations.nearest(point);

    let at_known_station = match &event.station_id {
        Some(id) => stations
            .get(id)
            .map(|s| s.location.distance_to(&point) <= s.radius_m)
            .unwrap_or(false),
        None => nearest
            .as_ref()
            .map(|(s, distance)| *distance <= s.radius_m)
            .unwrap_or(false),
    };
    if !at_known_station {
        result.trigger(config.unknown_station_score, "fill at unregistered station");
    }

    if let Some((_, distance)) = nearest {
        if distance > config.remote_area_km * 1_000.0 {
            result.trigger(
                config.remote_area_score,
                format!("remote location, {:.0} km from nearest station", distance / 1_000.0),
            );
        }
    }
    result
}

/// When the fill happened.
///
/// Only fills in the trailing repeat window count as repeats. Later fills in
/// `other_fills` and the fill itself are ignored.
pub fn timing(event: &FuelEvent, other_fills: &[FuelEvent], config: &FraudConfig) -> ComponentScore {
    let mut result = ComponentScore::new(FraudComponent::Timing);
    let local = local_time(event.captured_at, config);

    let hour = local.hour();
    let at_night = if config.night_start_hour <= config.night_end_hour {
        hour >= config.night_start_hour && hour < config.night_end_hour
    } else {
        hour >= config.night_start_hour || hour < config.night_end_hour
    };
    if at_night {
        result.trigger(config.night_score, format!("fill at night ({:02}:{:02})", hour, local.minute()));
    }

    if config.weekend_days.contains(&local.weekday()) {
        result.trigger(config.weekend_score, format!("weekend fill ({})", local.weekday()));
    }

    let window = Duration::minutes(config.repeat_window_mins);
    let nearby = other_fills
        .iter()
        .filter(|e| e.id != event.id)
        .filter(|e| e.captured_at <= event.captured_at && event.captured_at - e.captured_at < window)
        .count();
    if nearby > 0 {
        result.trigger(
            config.repeat_fill_score,
            format!(
                "multiple fuel events within {} ({} other)",
                window_label(config.repeat_window_mins),
                nearby
            ),
        );
    }
    result
}

fn window_label(mins: i64) -> String {
    match mins {
        60 => "1 hour".to_string(),
        m if m > 0 && m % 60 == 0 => format!("{} hours", m / 60),
        m => format!("{} min", m),
    }
}

/// Volume and price plausibility
pub fn quantity(event: &FuelEvent, tank_capacity: Option<f64>, config: &FraudConfig) -> ComponentScore {
    let mut result = ComponentScore::new(FraudComponent::Quantity);
    let liters = event.liters;

    if let Some(capacity) = tank_capacity.filter(|c| c.is_finite() && *c > 0.0) {
        if liters > capacity {
            result.trigger(
                config.over_capacity_score,
                format!("exceeds tank capacity ({:.1} L > {:.1} L)", liters, capacity),
            );
        } else if liters > capacity * config.near_capacity_ratio {
            result.trigger(
                config.near_capacity_score,
                format!(
                    "over {:.0}% of tank capacity ({:.1} L of {:.1} L)",
                    config.near_capacity_ratio * 100.0,
                    liters,
                    capacity
                ),
            );
        }
    }

    if !liters.is_finite() || liters < config.min_quantity_liters {
        result.trigger(config.min_quantity_score, format!("quantity below minimum ({:.1} L)", liters));
    }

    if let Some(price) = event.price_per_liter().filter(|p| p.is_finite()) {
        if price < config.min_price_per_liter {
            result.trigger(config.low_price_score, format!("price per liter too low ({:.2})", price));
        } else if price > config.max_price_per_liter {
            result.trigger(config.high_price_score, format!("price per liter too high ({:.2})", price));
        }
    }
    result
}

/// Consistency with the vehicle's recorded state
pub fn vehicle_state(event: &FuelEvent, last_odometer: Option<f64>, config: &FraudConfig) -> ComponentScore {
    let mut result = ComponentScore::new(FraudComponent::VehicleState);

    if let (Some(current), Some(previous)) = (event.odometer, last_odometer) {
        let delta = current - previous;
        if delta < 0.0 {
            result.trigger(
                config.odometer_rollback_score,
                format!("odometer went backwards by {:.0} km (possible tampering)", -delta),
            );
        } else if delta > config.max_distance_between_fills_km {
            result.trigger(
                config.excess_distance_score,
                format!("{:.0} km since last fill is implausible", delta),
            );
        }
    }

    if event.driver_id.as_deref().map_or(true, |d| d.trim().is_empty()) {
        result.trigger(config.no_driver_score, "no driver assigned");
    }
    result
}
