//! Fleet Telemetry SDK
//!
//! High-level API for wiring and running the fleet telemetry core.

pub mod builder;
pub mod config;
pub mod engine;
pub mod error;

// Re-export main types
pub use builder::FleetEngineBuilder;
pub use config::FleetConfig;
pub use engine::{FleetEngine, FuelScore, IngestOutcome};
pub use error::{Result, SdkError};

// Re-export commonly used types from dependencies
pub use fleet_core::{FuelEvent, Geofence, LocationSample, PartnerProtocol, PartnerSubscriber, Topic};
pub use fleet_runtime::{
    DispatcherSet, EnqueueOutcome, FraudDisposition, InMemoryBroker, InMemoryStore, MetricsCollector,
    MetricsSnapshot, TelemetryStore, Transport,
};
