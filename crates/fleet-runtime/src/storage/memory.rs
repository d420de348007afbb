//! In-memory persistence for tests and broker-less deployments

use super::{TelemetryStore, TimeRange};
use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleet_core::{
    FuelAlert, FuelEvent, Geofence, GeofenceAlert, LocationSample, RouteDeviation, SafetyEvent,
    TripPlan,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Tables {
    locations: Vec<LocationSample>,
    location_batches: Vec<usize>,
    fuel_events: Vec<FuelEvent>,
    safety_events: Vec<SafetyEvent>,
    fuel_alerts: Vec<FuelAlert>,
    geofence_alerts: Vec<GeofenceAlert>,
    route_deviations: Vec<RouteDeviation>,
    geofences: Vec<Geofence>,
    tank_capacities: HashMap<String, f64>,
    trip_plans: HashMap<String, TripPlan>,
}

/// Thread-safe in-memory [`TelemetryStore`]
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(RuntimeError::Storage("store is rejecting writes".to_string()))
        } else {
            Ok(())
        }
    }

    /// Make every insert fail until turned off again
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn add_geofence(&self, geofence: Geofence) {
        self.write().geofences.push(geofence);
    }

    pub fn set_geofences(&self, geofences: Vec<Geofence>) {
        self.write().geofences = geofences;
    }

    pub fn add_fuel_event(&self, event: FuelEvent) {
        self.write().fuel_events.push(event);
    }

    pub fn add_location(&self, sample: LocationSample) {
        self.write().locations.push(sample);
    }

    pub fn set_tank_capacity(&self, vehicle_id: &str, liters: f64) {
        self.write().tank_capacities.insert(vehicle_id.to_string(), liters);
    }

    pub fn set_trip_plan(&self, plan: TripPlan) {
        self.write().trip_plans.insert(plan.vehicle_id.clone(), plan);
    }

    pub fn clear_trip_plan(&self, vehicle_id: &str) {
        self.write().trip_plans.remove(vehicle_id);
    }

    /// All persisted samples in insertion order
    pub fn locations(&self) -> Vec<LocationSample> {
        self.read().locations.clone()
    }

    /// Size of every bulk insert that succeeded, in order
    pub fn location_batches(&self) -> Vec<usize> {
        self.read().location_batches.clone()
    }

    pub fn safety_events(&self) -> Vec<SafetyEvent> {
        self.read().safety_events.clone()
    }

    pub fn fuel_alerts(&self) -> Vec<FuelAlert> {
        self.read().fuel_alerts.clone()
    }

    pub fn geofence_alerts(&self) -> Vec<GeofenceAlert> {
        self.read().geofence_alerts.clone()
    }

    pub fn route_deviations(&self) -> Vec<RouteDeviation> {
        self.read().route_deviations.clone()
    }
}

#[async_trait]
impl TelemetryStore for InMemoryStore {
    async fn insert_locations(&self, samples: &[LocationSample]) -> Result<()> {
        self.check_writable()?;
        let mut tables = self.write();
        tables.locations.extend_from_slice(samples);
        tables.location_batches.push(samples.len());
        Ok(())
    }

    async fn recent_locations(
        &self,
        vehicle_id: &str,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<LocationSample>> {
        let mut matching: Vec<LocationSample> = self
            .read()
            .locations
            .iter()
            .filter(|s| s.vehicle_id == vehicle_id && range.contains(s.captured_at))
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn slow_run_start(
        &self,
        vehicle_id: &str,
        max_speed: f64,
        range: TimeRange,
    ) -> Result<Option<DateTime<Utc>>> {
        let tables = self.read();
        let in_range: Vec<&LocationSample> = tables
            .locations
            .iter()
            .filter(|s| s.vehicle_id == vehicle_id && range.contains(s.captured_at))
            .collect();

        let last_fast = in_range
            .iter()
            .filter(|s| s.speed > max_speed)
            .map(|s| s.captured_at)
            .max();

        Ok(in_range
            .iter()
            .map(|s| s.captured_at)
            .filter(|at| last_fast.map_or(true, |fast| *at > fast))
            .min())
    }

    async fn fuel_events(&self, vehicle_id: &str, range: TimeRange) -> Result<Vec<FuelEvent>> {
        let mut matching: Vec<FuelEvent> = self
            .read()
            .fuel_events
            .iter()
            .filter(|e| e.vehicle_id == vehicle_id && range.contains(e.captured_at))
            .cloned()
            .collect();

        matching.sort_by(|a, b| a.captured_at.cmp(&b.captured_at));
        Ok(matching)
    }

    async fn insert_safety_event(&self, event: &SafetyEvent) -> Result<()> {
        self.check_writable()?;
        self.write().safety_events.push(event.clone());
        Ok(())
    }

    async fn insert_fuel_alert(&self, alert: &FuelAlert) -> Result<()> {
        self.check_writable()?;
        self.write().fuel_alerts.push(alert.clone());
        Ok(())
    }

    async fn insert_geofence_alert(&self, alert: &GeofenceAlert) -> Result<()> {
        self.check_writable()?;
        self.write().geofence_alerts.push(alert.clone());
        Ok(())
    }

    async fn insert_route_deviation(&self, deviation: &RouteDeviation) -> Result<()> {
        self.check_writable()?;
        self.write().route_deviations.push(deviation.clone());
        Ok(())
    }

    async fn active_geofences(&self) -> Result<Vec<Geofence>> {
        Ok(self.read().geofences.iter().filter(|g| g.active).cloned().collect())
    }

    async fn tank_capacity(&self, vehicle_id: &str) -> Result<Option<f64>> {
        Ok(self.read().tank_capacities.get(vehicle_id).copied())
    }

    async fn last_odometer(&self, vehicle_id: &str, before: DateTime<Utc>) -> Result<Option<f64>> {
        Ok(self
            .read()
            .fuel_events
            .iter()
            .filter(|e| e.vehicle_id == vehicle_id && e.captured_at < before && e.odometer.is_some())
            .max_by_key(|e| e.captured_at)
            .and_then(|e| e.odometer))
    }

    async fn active_trip_plan(&self, vehicle_id: &str) -> Result<Option<TripPlan>> {
        Ok(self.read().trip_plans.get(vehicle_id).cloned())
    }
}
