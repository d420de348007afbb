//! Persistence collaborator
//!
//! The core never owns business entities. It needs exactly the operations of
//! [`TelemetryStore`] from whatever persistence layer surrounds it.

mod memory;
#[cfg(feature = "sqlx")]
mod postgres;

pub use memory::InMemoryStore;
#[cfg(feature = "sqlx")]
pub use postgres::PostgresStore;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleet_core::{
    FuelAlert, FuelEvent, Geofence, GeofenceAlert, LocationSample, RouteDeviation, SafetyEvent,
    TripPlan,
};

/// Half-open time range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The `window` immediately preceding `end`
    pub fn trailing(end: DateTime<Utc>, window: chrono::Duration) -> Self {
        Self { start: end - window, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Operations the core requires from the persistence layer
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Bulk insert of location samples
    async fn insert_locations(&self, samples: &[LocationSample]) -> Result<()>;

    /// Most recent `limit` samples for a vehicle within `range`, newest first
    async fn recent_locations(
        &self,
        vehicle_id: &str,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<LocationSample>>;

    /// Capture time of the first sample of the run at or below `max_speed`
    /// that ends with the vehicle's newest sample in `range`.
    ///
    /// `None` when `range` holds no sample or the newest one is faster.
    async fn slow_run_start(
        &self,
        vehicle_id: &str,
        max_speed: f64,
        range: TimeRange,
    ) -> Result<Option<DateTime<Utc>>>;

    /// Fuel events for a vehicle within `range`, oldest first
    async fn fuel_events(&self, vehicle_id: &str, range: TimeRange) -> Result<Vec<FuelEvent>>;

    async fn insert_safety_event(&self, event: &SafetyEvent) -> Result<()>;

    async fn insert_fuel_alert(&self, alert: &FuelAlert) -> Result<()>;

    async fn insert_geofence_alert(&self, alert: &GeofenceAlert) -> Result<()>;

    async fn insert_route_deviation(&self, deviation: &RouteDeviation) -> Result<()>;

    /// All geofences flagged active
    async fn active_geofences(&self) -> Result<Vec<Geofence>>;

    /// Fuel tank capacity in liters
    async fn tank_capacity(&self, vehicle_id: &str) -> Result<Option<f64>>;

    /// Odometer of the latest fuel event strictly before `before`
    async fn last_odometer(&self, vehicle_id: &str, before: DateTime<Utc>) -> Result<Option<f64>>;

    /// Planned route of the vehicle's active trip, if any
    async fn active_trip_plan(&self, vehicle_id: &str) -> Result<Option<TripPlan>>;
}
