//! Composite fraud scoring

use super::analysis::{self, ComponentScore};
use super::{FraudConfig, FraudDisposition, RiskBand, StationRegistry};
use crate::observability::{names, Metrics, MetricsCollector};
use crate::storage::{TelemetryStore, TimeRange};
use chrono::Duration;
use fleet_core::FuelEvent;
use serde::Serialize;
use std::sync::Arc;

const SCORE_EPSILON: f64 = 1e-9;

/// Outcome of scoring one fill
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FraudAssessment {
    /// Composite score, always within `[0, 1]`
    pub score: f64,
    pub band: RiskBand,
    pub disposition: FraudDisposition,

    /// Whether a fraud alert must be raised
    pub alert: bool,

    /// Risk band label followed by the significant triggers
    pub reason: String,

    pub warnings: Vec<String>,
    pub components: Vec<ComponentScore>,
}

/// Scores fuel fills against the vehicle's history.
///
/// Reads from the store only. Store failures degrade the affected analysis
/// instead of failing the score.
pub struct FraudEngine {
    store: Arc<dyn TelemetryStore>,
    stations: Arc<dyn StationRegistry>,
    config: FraudConfig,
    metrics: Arc<MetricsCollector>,
}

impl FraudEngine {
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        stations: Arc<dyn StationRegistry>,
        config: FraudConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            store,
            stations,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &FraudConfig {
        &self.config
    }

    pub async fn score(&self, event: &FuelEvent) -> FraudAssessment {
        let mut notes = Vec::new();
        let history_start = event.captured_at - Duration::days(self.config.history_days);
        // Prior fills only, including any at the same instant
        let range = TimeRange::new(history_start, event.captured_at + Duration::microseconds(1));

        let others: Vec<FuelEvent> = match self.store.fuel_events(&event.vehicle_id, range).await {
            Ok(events) => events.into_iter().filter(|e| e.id != event.id).collect(),
            Err(e) => {
                tracing::warn!("Fuel history unavailable for vehicle {}: {}", event.vehicle_id, e);
                notes.push("fuel history unavailable".to_string());
                Vec::new()
            }
        };
        let prior_fills: Vec<FuelEvent> = others
            .iter()
            .filter(|e| e.captured_at < event.captured_at && e.captured_at >= history_start)
            .cloned()
            .collect();

        let tank_capacity = match self.store.tank_capacity(&event.vehicle_id).await {
            Ok(capacity) => capacity,
            Err(e) => {
                tracing::warn!("Tank capacity unavailable for vehicle {}: {}", event.vehicle_id, e);
                notes.push("tank capacity unavailable".to_string());
                None
            }
        };

        let last_odometer = match self.store.last_odometer(&event.vehicle_id, event.captured_at).await {
            Ok(odometer) => odometer,
            Err(e) => {
                tracing::warn!("Last odometer unavailable for vehicle {}: {}", event.vehicle_id, e);
                notes.push("last odometer unavailable".to_string());
                None
            }
        };

        let components = vec![
            analysis::consumption(event, &prior_fills, &self.config),
            analysis::geographic(event, self.stations.as_ref(), &self.config),
            analysis::timing(event, &others, &self.config),
            analysis::quantity(event, tank_capacity, &self.config),
            analysis::vehicle_state(event, last_odometer, &self.config),
        ];

        let mut assessment = self.combine(components);
        assessment.warnings.extend(notes);

        tracing::info!(
            "Fuel event {} for vehicle {} scored {:.2} ({:?})",
            event.id,
            event.vehicle_id,
            assessment.score,
            assessment.disposition
        );
        assessment
    }

    /// Weighted, clamped composite of already computed components
    pub fn combine(&self, components: Vec<ComponentScore>) -> FraudAssessment {
        let raw = self.config.weights.weighted_sum(&components);
        let score = if raw.is_nan() {
            self.metrics.incr(names::FRAUD_ANOMALIES);
            tracing::warn!("Fraud score is NaN, treating as 0");
            0.0
        } else if raw < -SCORE_EPSILON || raw > 1.0 + SCORE_EPSILON {
            self.metrics.incr(names::FRAUD_ANOMALIES);
            tracing::warn!("Fraud score {} outside [0, 1], clamping", raw);
            raw.clamp(0.0, 1.0)
        } else {
            // Rounding noise of the weighted sum
            raw.clamp(0.0, 1.0)
        };
        self.metrics.incr(names::FRAUD_SCORED);

        let thresholds = &self.config.disposition;
        let band = RiskBand::from_score(score, thresholds);

        let triggers: Vec<&str> = components
            .iter()
            .filter(|c| c.score >= self.config.significance_threshold)
            .flat_map(|c| c.warnings.iter().map(String::as_str))
            .collect();
        let reason = if triggers.is_empty() {
            format!("{}: no significant indicators", band)
        } else {
            format!("{}: {}", band, triggers.join("; "))
        };

        let warnings = components.iter().flat_map(|c| c.warnings.iter().cloned()).collect();

        FraudAssessment {
            score,
            band,
            disposition: FraudDisposition::from_score(score, thresholds),
            alert: score >= thresholds.alert,
            reason,
            warnings,
            components,
        }
    }
}
