//! Fleet Runtime - streaming core of the fleet telemetry platform
//!
//! This crate provides the moving parts between the transport and the
//! persistence layer:
//! - Publish/subscribe transport (in-process broker, MQTT behind `mqtt`)
//! - Ingestion buffer batching location samples into the store
//! - Vehicle state cache, geofence snapshot and the safety detectors
//! - Fuel fraud scoring
//! - Event adapter fanning events out to external partners

pub mod adapter;
pub mod alerts;
pub mod detect;
pub mod error;
pub mod fraud;
pub mod ingestion;
pub mod observability;
pub mod state;
pub mod storage;
pub mod transport;

// Re-export main types
pub use adapter::{AdapterConfig, DispatcherSet, EventAdapter, PartnerDispatcher};
pub use alerts::{AlertPublisher, FRAUD_DETECTED};
pub use detect::{
    standard_detectors, Detection, DetectionContext, DetectionSink, Detector, DetectorConfig,
    DetectorRunner, FixedSpeedLimit, SpeedLimitPolicy,
};
pub use error::{Result, RuntimeError};
pub use fraud::{
    FraudAssessment, FraudConfig, FraudDisposition, FraudEngine, FuelStation, InMemoryStationRegistry,
    RiskBand, StationRegistry,
};
pub use ingestion::{EnqueueOutcome, IngestionBuffer, IngestionConfig};
pub use observability::{Metrics, MetricsCollector, MetricsSnapshot};
pub use state::{GeofenceRefresher, GeofenceSnapshot, StateUpdate, VehicleStateCache};
pub use storage::{InMemoryStore, TelemetryStore, TimeRange};
#[cfg(feature = "sqlx")]
pub use storage::PostgresStore;
pub use transport::{InMemoryBroker, QoS, Transport, TransportConfig, TransportMessage};
#[cfg(feature = "mqtt")]
pub use transport::MqttTransport;
