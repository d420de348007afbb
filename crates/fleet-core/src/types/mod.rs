//! Telemetry data model

pub mod adapter;
pub mod alert;
pub mod event;
pub mod fuel;
pub mod geofence;
pub mod sample;

pub use adapter::{AdapterEvent, EntityFilter, PartnerProtocol, PartnerSubscriber, Priority};
pub use alert::AlertMessage;
pub use event::{
    GeofenceAlert, GeofenceTransition, RouteDeviation, SafetyEvent, SafetyEventKind, Severity,
    TripPlan,
};
pub use fuel::{FuelAlert, FuelEvent, FuelStatus};
pub use geofence::{Geofence, GeofenceShape, TimeWindow, ZoneKind};
pub use sample::LocationSample;
