//! Builder pattern for FleetEngine

use crate::config::FleetConfig;
use crate::engine::{FleetEngine, IngestPath};
use crate::error::{Result, SdkError};
use fleet_core::PartnerSubscriber;
use fleet_runtime::adapter::{DispatcherSet, EventAdapter};
use fleet_runtime::alerts::AlertPublisher;
use fleet_runtime::detect::{standard_detectors, DetectionSink, Detector, DetectorRunner, FixedSpeedLimit, SpeedLimitPolicy};
use fleet_runtime::fraud::{FraudEngine, InMemoryStationRegistry, StationRegistry};
use fleet_runtime::ingestion::IngestionBuffer;
use fleet_runtime::observability::MetricsCollector;
use fleet_runtime::state::{GeofenceSnapshot, VehicleStateCache};
use fleet_runtime::storage::{InMemoryStore, TelemetryStore};
use fleet_runtime::transport::{InMemoryBroker, Transport, TransportConfig};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Builder for FleetEngine
///
/// Every collaborator is optional. Without a store the engine persists in
/// memory; without a transport it connects to `transport.broker_url`, or runs
/// an in-process broker when that is empty.
///
/// # Example
///
/// ```rust,ignore
/// use fleet_sdk::{FleetConfig, FleetEngineBuilder};
///
/// let engine = FleetEngineBuilder::new()
///     .with_config(FleetConfig::from_yaml_file("config/fleet.yaml")?)
///     .with_store(store)
///     .with_partners_file("config/partners.yaml")
///     .build()
///     .await?;
/// engine.start().await?;
/// ```
pub struct FleetEngineBuilder {
    config: FleetConfig,
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<dyn TelemetryStore>>,
    stations: Option<Arc<dyn StationRegistry>>,
    speed_limits: Option<Arc<dyn SpeedLimitPolicy>>,
    dispatchers: Option<DispatcherSet>,
    extra_detectors: Vec<Arc<dyn Detector>>,
    partners: Vec<PartnerSubscriber>,
    partners_file: Option<PathBuf>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl FleetEngineBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            config: FleetConfig::default(),
            transport: None,
            store: None,
            stations: None,
            speed_limits: None,
            dispatchers: None,
            extra_detectors: Vec::new(),
            partners: Vec::new(),
            partners_file: None,
            metrics: None,
        }
    }

    pub fn with_config(mut self, config: FleetConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing transport. The engine will not disconnect it.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn TelemetryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Known fuel stations; without one the station checks are skipped
    pub fn with_stations(mut self, stations: Arc<dyn StationRegistry>) -> Self {
        self.stations = Some(stations);
        self
    }

    /// Replace the fixed speed limit from the detector config
    pub fn with_speed_limits(mut self, policy: Arc<dyn SpeedLimitPolicy>) -> Self {
        self.speed_limits = Some(policy);
        self
    }

    pub fn with_dispatchers(mut self, dispatchers: DispatcherSet) -> Self {
        self.dispatchers = Some(dispatchers);
        self
    }

    /// Run an additional detector next to the standard six
    pub fn add_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.extra_detectors.push(detector);
        self
    }

    pub fn add_partner(mut self, partner: PartnerSubscriber) -> Self {
        self.partners.push(partner);
        self
    }

    /// Register the partners listed in a YAML file at build time
    pub fn with_partners_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.partners_file = Some(path.into());
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate the configuration and wire every component.
    ///
    /// Background tasks are spawned here, so this must run inside a Tokio
    /// runtime.
    pub async fn build(self) -> Result<FleetEngine> {
        self.config.validate()?;
        let config = self.config;
        let metrics = self.metrics.unwrap_or_else(|| Arc::new(MetricsCollector::new()));

        let (transport, owns_transport) = match self.transport {
            Some(transport) => (transport, false),
            None => (connect_transport(&config.transport).await?, true),
        };

        let store: Arc<dyn TelemetryStore> = match self.store {
            Some(store) => store,
            None => {
                tracing::info!("No store configured, persisting in memory");
                Arc::new(InMemoryStore::new())
            }
        };

        let stations = self
            .stations
            .unwrap_or_else(|| Arc::new(InMemoryStationRegistry::default()));
        let speed_limits = self
            .speed_limits
            .unwrap_or_else(|| Arc::new(FixedSpeedLimit::new(config.detectors.speed_limit)));

        let alerts = AlertPublisher::new(transport.clone(), metrics.clone());
        let geofences = Arc::new(GeofenceSnapshot::new());

        let mut detectors = standard_detectors(&config.detectors, speed_limits);
        detectors.extend(self.extra_detectors);
        let detector_names: Vec<&str> = detectors.iter().map(|d| d.name()).collect();
        tracing::info!("Detectors: {}", detector_names.join(", "));

        let runner = DetectorRunner::start(
            detectors,
            geofences.clone(),
            store.clone(),
            DetectionSink::new(store.clone(), alerts.clone(), metrics.clone()),
            &config.detectors,
            metrics.clone(),
        );

        let ingestion = IngestionBuffer::start(config.ingestion.clone(), store.clone(), metrics.clone());

        let fraud = FraudEngine::new(store.clone(), stations, config.fraud.clone(), metrics.clone());

        let adapter = EventAdapter::new(
            config.adapter.clone(),
            self.dispatchers.unwrap_or_default(),
            metrics.clone(),
        );
        if let Some(path) = &self.partners_file {
            let count = adapter.load_partners_yaml(path)?;
            tracing::info!("Loaded {} partners from {}", count, path.display());
        }
        for partner in self.partners {
            adapter.register_partner(partner);
        }

        let ingest_path = Arc::new(IngestPath {
            ingestion,
            state: VehicleStateCache::new(),
            detectors: runner,
            metrics: metrics.clone(),
            stopped: AtomicBool::new(false),
        });

        Ok(FleetEngine {
            config,
            transport,
            owns_transport,
            store,
            metrics,
            ingest_path,
            geofences,
            fraud,
            alerts,
            adapter,
            refresher: Mutex::new(None),
            started: AtomicBool::new(false),
        })
    }
}

impl Default for FleetEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "mqtt")]
async fn connect_transport(config: &TransportConfig) -> Result<Arc<dyn Transport>> {
    if config.broker_url.is_empty() {
        tracing::info!("No broker configured, using the in-process broker");
        return Ok(Arc::new(InMemoryBroker::new()));
    }
    let transport = fleet_runtime::transport::MqttTransport::connect(config).await?;
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "mqtt"))]
async fn connect_transport(config: &TransportConfig) -> Result<Arc<dyn Transport>> {
    if config.broker_url.is_empty() {
        tracing::info!("No broker configured, using the in-process broker");
        return Ok(Arc::new(InMemoryBroker::new()));
    }
    Err(SdkError::ConfigError(format!(
        "broker_url '{}' requires the mqtt feature",
        config.broker_url
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_with_defaults() {
        let engine = FleetEngineBuilder::new().build().await.unwrap();
        assert!(!engine.is_started());
        assert_eq!(engine.transport().name(), "in_memory");
        engine.shutdown().await;
        assert!(engine.is_stopped());
    }

    #[tokio::test]
    async fn test_invalid_config_fails_build() {
        let mut config = FleetConfig::default();
        config.adapter.buffer_capacity = 0;

        let result = FleetEngineBuilder::new().with_config(config).build().await;
        assert!(matches!(result, Err(SdkError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_missing_partners_file_fails_build() {
        let result = FleetEngineBuilder::new()
            .with_partners_file("/nonexistent/partners.yaml")
            .build()
            .await;
        assert!(matches!(result, Err(SdkError::RuntimeError(_))));
    }
}
