//! Known fuel stations

use fleet_core::GeoPoint;
use serde::{Deserialize, Serialize};

fn default_radius_m() -> f64 {
    150.0
}

/// A registered fuel station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelStation {
    pub id: String,
    pub name: String,
    pub location: GeoPoint,

    /// A fill within this distance counts as at the station
    #[serde(default = "default_radius_m")]
    pub radius_m: f64,
}

impl FuelStation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, location: GeoPoint) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location,
            radius_m: default_radius_m(),
        }
    }
}

/// Station lookups used by the geographic analysis
pub trait StationRegistry: Send + Sync {
    fn get(&self, station_id: &str) -> Option<FuelStation>;

    /// Closest station and its distance in meters
    fn nearest(&self, point: GeoPoint) -> Option<(FuelStation, f64)>;

    fn is_empty(&self) -> bool;
}

/// Registry over a fixed station list
#[derive(Debug, Clone, Default)]
pub struct InMemoryStationRegistry {
    stations: Vec<FuelStation>,
}

impl InMemoryStationRegistry {
    pub fn new(stations: Vec<FuelStation>) -> Self {
        Self { stations }
    }

    pub fn add(&mut self, station: FuelStation) {
        self.stations.push(station);
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }
}

impl StationRegistry for InMemoryStationRegistry {
    fn get(&self, station_id: &str) -> Option<FuelStation> {
        self.stations.iter().find(|s| s.id == station_id).cloned()
    }

    fn nearest(&self, point: GeoPoint) -> Option<(FuelStation, f64)> {
        self.stations
            .iter()
            .map(|s| (s, s.location.distance_to(&point)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(s, d)| (s.clone(), d))
    }

    fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}
