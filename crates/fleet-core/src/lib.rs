//! Fleet Core - shared types for the fleet telemetry core
//!
//! This crate provides the fundamental types used across the fleet crates:
//! - Telemetry data model (location samples, geofences, safety/fuel events)
//! - Adapter envelopes and partner subscriptions
//! - Geometry (haversine distance, point-in-shape tests)
//! - Topic grammar for the publish/subscribe transport
//! - Error types

pub mod error;
pub mod geo;
pub mod topic;
pub mod types;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use geo::{haversine_distance_m, GeoPoint};
pub use topic::{topic_matches, EntityKind, Topic, TopicId};
pub use types::{
    AdapterEvent, AlertMessage, EntityFilter, FuelAlert, FuelEvent, FuelStatus, Geofence,
    GeofenceAlert, GeofenceShape, GeofenceTransition, LocationSample, PartnerProtocol,
    PartnerSubscriber, Priority, RouteDeviation, SafetyEvent, SafetyEventKind, Severity,
    TimeWindow, TripPlan, ZoneKind,
};
