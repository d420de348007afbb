//! Fuel fill events and fraud alerts

use crate::geo::{valid_coordinates, GeoPoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Review disposition of a fuel event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FuelStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Verified,
}

/// A fuel fill submitted for a vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelEvent {
    pub id: String,
    pub vehicle_id: String,

    #[serde(default)]
    pub driver_id: Option<String>,

    pub liters: f64,

    /// Total amount paid
    pub amount: f64,

    /// Odometer reading in km at fill time
    #[serde(default)]
    pub odometer: Option<f64>,

    #[serde(default)]
    pub latitude: Option<f64>,

    #[serde(default)]
    pub longitude: Option<f64>,

    #[serde(default)]
    pub station_id: Option<String>,

    pub captured_at: DateTime<Utc>,

    /// Composite fraud score in [0, 1]
    #[serde(default)]
    pub fraud_score: f64,

    #[serde(default)]
    pub fraud_reason: Option<String>,

    #[serde(default)]
    pub status: FuelStatus,
}

impl FuelEvent {
    pub fn new(vehicle_id: impl Into<String>, liters: f64, amount: f64, captured_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            vehicle_id: vehicle_id.into(),
            driver_id: None,
            liters,
            amount,
            odometer: None,
            latitude: None,
            longitude: None,
            station_id: None,
            captured_at,
            fraud_score: 0.0,
            fraud_reason: None,
            status: FuelStatus::Pending,
        }
    }

    pub fn with_driver(mut self, driver_id: impl Into<String>) -> Self {
        self.driver_id = Some(driver_id.into());
        self
    }

    pub fn with_odometer(mut self, odometer: f64) -> Self {
        self.odometer = Some(odometer);
        self
    }

    pub fn with_location(mut self, lat: f64, lon: f64) -> Self {
        self.latitude = Some(lat);
        self.longitude = Some(lon);
        self
    }

    /// Location when both coordinates are present and in range
    pub fn location(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if valid_coordinates(lat, lon) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        }
    }

    /// Price per liter, if liters is positive
    pub fn price_per_liter(&self) -> Option<f64> {
        if self.liters > 0.0 {
            Some(self.amount / self.liters)
        } else {
            None
        }
    }
}

/// Persisted record raised for a high-risk fuel event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelAlert {
    pub id: Uuid,
    pub fuel_event_id: String,
    pub vehicle_id: String,
    pub driver_id: Option<String>,
    pub score: f64,
    pub reason: String,
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
}
