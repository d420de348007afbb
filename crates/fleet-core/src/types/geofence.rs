//! Geofence definitions

use crate::error::{CoreError, Result};
use crate::geo::{point_in_circle, point_in_polygon, point_in_rectangle, GeoPoint};
use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// How `coordinates` are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeofenceShape {
    /// `[center_lat, center_lon, radius_m]`
    Circle,
    /// Flattened `[lat, lon, lat, lon, ...]`, closed implicitly
    Polygon,
    /// `[min_lat, min_lon, max_lat, max_lon]`
    Rectangle,
}

/// Which transitions of a zone raise events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZoneKind {
    /// Report both entry and exit
    #[default]
    Monitor,
    /// Vehicle must stay inside: alert on exit
    Inclusion,
    /// Vehicle must stay outside: alert on entry
    Exclusion,
    /// Presence allowed only inside the zone's time window
    TimeRestricted,
}

/// Allowed presence window for time-restricted zones
///
/// Minutes are local minutes of day in `[0, 1440)`. A window whose end is
/// before its start wraps past midnight. An empty `days` list allows every day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_minute: u16,
    pub end_minute: u16,

    #[serde(default)]
    pub days: Vec<Weekday>,

    /// Offset of the zone's local time from UTC
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl TimeWindow {
    pub fn new(start_minute: u16, end_minute: u16) -> Self {
        Self {
            start_minute,
            end_minute,
            days: Vec::new(),
            utc_offset_minutes: 0,
        }
    }

    /// Whether presence at `at` is allowed
    pub fn allows(&self, at: DateTime<Utc>) -> bool {
        let local = at + Duration::minutes(self.utc_offset_minutes as i64);
        let minute = (local.hour() * 60 + local.minute()) as u16;

        let in_hours = if self.start_minute <= self.end_minute {
            minute >= self.start_minute && minute < self.end_minute
        } else {
            minute >= self.start_minute || minute < self.end_minute
        };

        if !in_hours {
            return false;
        }
        if self.days.is_empty() {
            return true;
        }

        // A wrapped window belongs to the day it started on
        let day = if self.start_minute > self.end_minute && minute < self.end_minute {
            local.weekday().pred()
        } else {
            local.weekday()
        };
        self.days.contains(&day)
    }

    fn validate(&self, id: &str) -> Result<()> {
        if self.start_minute >= 1440 || self.end_minute >= 1440 {
            return Err(CoreError::InvalidGeometry {
                id: id.to_string(),
                reason: "time window minutes must be below 1440".to_string(),
            });
        }
        Ok(())
    }
}

/// A named geographic region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub id: String,
    pub name: String,
    pub shape: GeofenceShape,
    pub coordinates: Vec<f64>,

    #[serde(default)]
    pub zone: ZoneKind,

    #[serde(default = "default_active")]
    pub active: bool,

    /// Restrict the fence to these vehicles; `None` applies to all
    #[serde(default)]
    pub vehicle_ids: Option<Vec<String>>,

    #[serde(default)]
    pub time_window: Option<TimeWindow>,
}

fn default_active() -> bool {
    true
}

impl Geofence {
    /// Circle centred on `center` with radius in meters
    pub fn circle(id: impl Into<String>, name: impl Into<String>, center: GeoPoint, radius_m: f64) -> Self {
        Self::with_shape(id, name, GeofenceShape::Circle, vec![center.lat, center.lon, radius_m])
    }

    /// Axis-aligned rectangle from its south-west and north-east corners
    pub fn rectangle(id: impl Into<String>, name: impl Into<String>, min: GeoPoint, max: GeoPoint) -> Self {
        Self::with_shape(
            id,
            name,
            GeofenceShape::Rectangle,
            vec![min.lat, min.lon, max.lat, max.lon],
        )
    }

    /// Polygon from an ordered vertex ring
    pub fn polygon(id: impl Into<String>, name: impl Into<String>, vertices: &[GeoPoint]) -> Self {
        let coordinates = vertices.iter().flat_map(|v| [v.lat, v.lon]).collect();
        Self::with_shape(id, name, GeofenceShape::Polygon, coordinates)
    }

    fn with_shape(id: impl Into<String>, name: impl Into<String>, shape: GeofenceShape, coordinates: Vec<f64>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            shape,
            coordinates,
            zone: ZoneKind::Monitor,
            active: true,
            vehicle_ids: None,
            time_window: None,
        }
    }

    pub fn with_zone(mut self, zone: ZoneKind) -> Self {
        self.zone = zone;
        self
    }

    pub fn with_time_window(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }

    pub fn for_vehicles(mut self, vehicle_ids: Vec<String>) -> Self {
        self.vehicle_ids = Some(vehicle_ids);
        self
    }

    /// Whether this fence is scoped to (or open to) the vehicle
    pub fn applies_to(&self, vehicle_id: &str) -> bool {
        match &self.vehicle_ids {
            Some(ids) => ids.iter().any(|id| id == vehicle_id),
            None => true,
        }
    }

    /// Check that coordinates describe a usable shape
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| CoreError::InvalidGeometry {
            id: self.id.clone(),
            reason,
        };

        if self.coordinates.iter().any(|c| !c.is_finite()) {
            return Err(invalid("coordinates must be finite".to_string()));
        }

        match self.shape {
            GeofenceShape::Circle => {
                if self.coordinates.len() != 3 {
                    return Err(invalid(format!(
                        "circle needs [lat, lon, radius], got {} values",
                        self.coordinates.len()
                    )));
                }
                GeoPoint::new(self.coordinates[0], self.coordinates[1]).validate()?;
                if self.coordinates[2] <= 0.0 {
                    return Err(invalid("circle radius must be positive".to_string()));
                }
            }
            GeofenceShape::Rectangle => {
                if self.coordinates.len() != 4 {
                    return Err(invalid(format!(
                        "rectangle needs [min_lat, min_lon, max_lat, max_lon], got {} values",
                        self.coordinates.len()
                    )));
                }
                let (min, max) = self.bounds();
                min.validate()?;
                max.validate()?;
                if min.lat > max.lat || min.lon > max.lon {
                    return Err(invalid("rectangle min corner exceeds max corner".to_string()));
                }
            }
            GeofenceShape::Polygon => {
                if self.coordinates.len() % 2 != 0 {
                    return Err(invalid("polygon coordinates must be lat/lon pairs".to_string()));
                }
                if self.coordinates.len() < 6 {
                    return Err(invalid(format!(
                        "polygon needs at least 3 vertices, got {}",
                        self.coordinates.len() / 2
                    )));
                }
                for vertex in self.vertices() {
                    vertex.validate()?;
                }
            }
        }

        if let Some(window) = &self.time_window {
            window.validate(&self.id)?;
        }

        Ok(())
    }

    /// Point-in-shape test. Malformed geometry never contains anything.
    pub fn contains(&self, point: GeoPoint) -> bool {
        match self.shape {
            GeofenceShape::Circle if self.coordinates.len() == 3 => point_in_circle(
                GeoPoint::new(self.coordinates[0], self.coordinates[1]),
                self.coordinates[2],
                point,
            ),
            GeofenceShape::Rectangle if self.coordinates.len() == 4 => {
                let (min, max) = self.bounds();
                point_in_rectangle(min, max, point)
            }
            GeofenceShape::Polygon => point_in_polygon(&self.vertices(), point),
            _ => false,
        }
    }

    /// Whether presence at `at` violates the time window
    pub fn presence_disallowed(&self, at: DateTime<Utc>) -> bool {
        match (&self.zone, &self.time_window) {
            (ZoneKind::TimeRestricted, Some(window)) => !window.allows(at),
            _ => false,
        }
    }

    fn bounds(&self) -> (GeoPoint, GeoPoint) {
        (
            GeoPoint::new(self.coordinates[0], self.coordinates[1]),
            GeoPoint::new(self.coordinates[2], self.coordinates[3]),
        )
    }

    fn vertices(&self) -> Vec<GeoPoint> {
        self.coordinates
            .chunks_exact(2)
            .map(|pair| GeoPoint::new(pair[0], pair[1]))
            .collect()
    }
}
