//! Configuration types for FleetEngine

use crate::error::{Result, SdkError};
use fleet_runtime::adapter::AdapterConfig;
use fleet_runtime::detect::DetectorConfig;
use fleet_runtime::fraud::FraudConfig;
use fleet_runtime::ingestion::IngestionConfig;
use fleet_runtime::transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Main engine configuration
///
/// Every section has documented defaults, so an empty document is a valid
/// configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Broker connection
    pub transport: TransportConfig,

    /// Location sample batching
    pub ingestion: IngestionConfig,

    /// Detector thresholds and task pool
    pub detectors: DetectorConfig,

    /// Fraud scoring weights and heuristics
    pub fraud: FraudConfig,

    /// Partner fan-out
    pub adapter: AdapterConfig,
}

impl FleetConfig {
    /// Create a configuration with every default
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| SdkError::ConfigError(format!("invalid fleet config: {}", e)))
    }

    /// Load a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_ingestion(mut self, ingestion: IngestionConfig) -> Self {
        self.ingestion = ingestion;
        self
    }

    pub fn with_detectors(mut self, detectors: DetectorConfig) -> Self {
        self.detectors = detectors;
        self
    }

    pub fn with_fraud(mut self, fraud: FraudConfig) -> Self {
        self.fraud = fraud;
        self
    }

    pub fn with_adapter(mut self, adapter: AdapterConfig) -> Self {
        self.adapter = adapter;
        self
    }

    /// Reject values no component can run with
    pub fn validate(&self) -> Result<()> {
        let ingestion = &self.ingestion;
        require(ingestion.queue_capacity > 0, "ingestion.queue_capacity must be positive")?;
        require(ingestion.batch_size > 0, "ingestion.batch_size must be positive")?;
        require(ingestion.flush_interval_ms > 0, "ingestion.flush_interval_ms must be positive")?;

        let detectors = &self.detectors;
        require(
            detectors.harsh_threshold.is_finite() && detectors.harsh_threshold > 0.0,
            "detectors.harsh_threshold must be positive",
        )?;
        require(
            detectors.max_comparable_gap_secs > 0.0,
            "detectors.max_comparable_gap_secs must be positive",
        )?;
        require(detectors.speed_limit > 0.0, "detectors.speed_limit must be positive")?;
        require(
            detectors.sudden_stop_moving_speed > detectors.sudden_stop_speed,
            "detectors.sudden_stop_moving_speed must exceed sudden_stop_speed",
        )?;
        require(detectors.idle_window_mins > 0, "detectors.idle_window_mins must be positive")?;
        require(
            detectors.route_deviation_threshold_m > 0.0,
            "detectors.route_deviation_threshold_m must be positive",
        )?;
        require(detectors.job_queue_capacity > 0, "detectors.job_queue_capacity must be positive")?;
        require(detectors.max_concurrent_tasks > 0, "detectors.max_concurrent_tasks must be positive")?;

        let fraud = &self.fraud;
        let weights = &fraud.weights;
        require(
            [
                weights.consumption,
                weights.geographic,
                weights.timing,
                weights.quantity,
                weights.vehicle_state,
            ]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0),
            "fraud.weights must be non-negative numbers",
        )?;
        if (weights.total() - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(SdkError::ConfigError(format!(
                "fraud.weights must sum to 1.0, got {:.4}",
                weights.total()
            )));
        }
        require(
            fraud.min_price_per_liter < fraud.max_price_per_liter,
            "fraud.min_price_per_liter must be below max_price_per_liter",
        )?;
        require(fraud.history_days > 0, "fraud.history_days must be positive")?;
        require(fraud.night_start_hour < 24 && fraud.night_end_hour <= 24, "fraud night hours must be within 0-24")?;
        let disposition = &fraud.disposition;
        require(
            0.0 <= disposition.review
                && disposition.review <= disposition.alert
                && disposition.alert <= disposition.reject
                && disposition.reject <= 1.0,
            "fraud.disposition thresholds must satisfy 0 <= review <= alert <= reject <= 1",
        )?;

        require(self.adapter.buffer_capacity > 0, "adapter.buffer_capacity must be positive")?;
        require(self.adapter.partner_timeout_ms > 0, "adapter.partner_timeout_ms must be positive")?;

        require(
            self.transport.reconnect_initial_ms > 0,
            "transport.reconnect_initial_ms must be positive",
        )?;
        require(
            self.transport.reconnect_max_secs * 1000 >= self.transport.reconnect_initial_ms,
            "transport.reconnect_max_secs must not be below reconnect_initial_ms",
        )?;

        Ok(())
    }
}

fn require(condition: bool, message: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(SdkError::ConfigError(message.to_string()))
    }
}
