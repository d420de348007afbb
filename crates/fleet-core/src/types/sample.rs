//! Location samples published by field devices

use crate::error::{CoreError, Result};
use crate::geo::{valid_coordinates, GeoPoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_source() -> String {
    "device".to_string()
}

/// A single position report. Immutable once created; later samples supersede it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub vehicle_id: String,

    #[serde(default)]
    pub driver_id: Option<String>,

    #[serde(default)]
    pub trip_id: Option<String>,

    pub latitude: f64,
    pub longitude: f64,

    /// Speed in km/h
    #[serde(default)]
    pub speed: f64,

    /// Heading in degrees from north
    #[serde(default)]
    pub heading: f64,

    /// Reported accuracy radius in meters
    #[serde(default)]
    pub accuracy: f64,

    /// When the device captured the fix
    pub captured_at: DateTime<Utc>,

    /// When the core received it
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,

    /// Origin tag (device, gateway, replay ...)
    #[serde(default = "default_source")]
    pub source: String,
}

impl LocationSample {
    /// Create a sample captured and received now
    pub fn new(vehicle_id: impl Into<String>, latitude: f64, longitude: f64, speed: f64) -> Self {
        let now = Utc::now();
        Self {
            vehicle_id: vehicle_id.into(),
            driver_id: None,
            trip_id: None,
            latitude,
            longitude,
            speed,
            heading: 0.0,
            accuracy: 0.0,
            captured_at: now,
            received_at: now,
            source: default_source(),
        }
    }

    /// Set capture time
    pub fn at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = captured_at;
        self
    }

    /// Set driver
    pub fn with_driver(mut self, driver_id: impl Into<String>) -> Self {
        self.driver_id = Some(driver_id.into());
        self
    }

    /// Set trip
    pub fn with_trip(mut self, trip_id: impl Into<String>) -> Self {
        self.trip_id = Some(trip_id.into());
        self
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    /// Reject samples that must never reach persistence
    pub fn validate(&self) -> Result<()> {
        if self.vehicle_id.trim().is_empty() {
            return Err(CoreError::InvalidValue("vehicle_id is empty".to_string()));
        }
        if !valid_coordinates(self.latitude, self.longitude) {
            return Err(CoreError::InvalidCoordinates {
                lat: self.latitude,
                lon: self.longitude,
            });
        }
        if !self.speed.is_finite() || self.speed < 0.0 {
            return Err(CoreError::InvalidValue(format!(
                "speed must be a non-negative number, got {}",
                self.speed
            )));
        }
        Ok(())
    }

    /// Seconds elapsed from `earlier` to this sample (negative if out of order)
    pub fn seconds_since(&self, earlier: &LocationSample) -> f64 {
        (self.captured_at - earlier.captured_at).num_milliseconds() as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_validate_accepts_valid_sample() {
        let sample = LocationSample::new("v1", 12.97, 77.59, 40.0);
        assert!(sample.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_coordinates() {
        for (lat, lon) in [(91.0, 0.0), (-90.5, 0.0), (0.0, 180.1), (0.0, -181.0), (f64::NAN, 0.0)] {
            let sample = LocationSample::new("v1", lat, lon, 0.0);
            assert!(
                matches!(sample.validate(), Err(CoreError::InvalidCoordinates { .. })),
                "({}, {}) should be rejected",
                lat,
                lon
            );
        }
    }

    #[test]
    fn test_validate_rejects_empty_vehicle_and_negative_speed() {
        assert!(LocationSample::new(" ", 0.0, 0.0, 0.0).validate().is_err());
        assert!(LocationSample::new("v1", 0.0, 0.0, -1.0).validate().is_err());
    }

    #[test]
    fn test_seconds_since() {
        let t0 = Utc::now();
        let a = LocationSample::new("v1", 0.0, 0.0, 0.0).at(t0);
        let b = LocationSample::new("v1", 0.0, 0.0, 0.0).at(t0 + Duration::milliseconds(2500));
        assert_eq!(b.seconds_since(&a), 2.5);
        assert_eq!(a.seconds_since(&b), -2.5);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{
            "vehicle_id": "42",
            "latitude": 10.0,
            "longitude": 20.0,
            "speed": 55.5,
            "captured_at": "2024-05-01T10:00:00Z"
        }"#;
        let sample: LocationSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.vehicle_id, "42");
        assert_eq!(sample.source, "device");
        assert!(sample.driver_id.is_none());
    }
}
