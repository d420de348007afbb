//! Per-vehicle last known sample

use chrono::{DateTime, Utc};
use fleet_core::LocationSample;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;

const DEFAULT_SHARDS: usize = 16;

/// Outcome of recording a sample
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    /// Sample became the vehicle's current state
    Fresh { prior: Option<LocationSample> },

    /// Sample is older than the cached one and was not applied
    Stale { cached_at: DateTime<Utc> },
}

impl StateUpdate {
    /// Prior sample to compare against, if detectors should run
    pub fn comparable_prior(&self) -> Option<&LocationSample> {
        match self {
            StateUpdate::Fresh { prior } => prior.as_ref(),
            StateUpdate::Stale { .. } => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, StateUpdate::Stale { .. })
    }
}

/// Last-seen sample per vehicle.
///
/// Sharded by vehicle id so updates for unrelated vehicles do not contend.
/// Reads of one shard never block each other; writes are serialized per
/// shard, which serializes all updates of a given vehicle.
pub struct VehicleStateCache {
    shards: Vec<RwLock<HashMap<String, LocationSample>>>,
}

impl VehicleStateCache {
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    pub fn with_shards(count: usize) -> Self {
        let shards = (0..count.max(1)).map(|_| RwLock::new(HashMap::new())).collect();
        Self { shards }
    }

    fn shard(&self, vehicle_id: &str) -> &RwLock<HashMap<String, LocationSample>> {
        let mut hasher = DefaultHasher::new();
        vehicle_id.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    pub fn get_last(&self, vehicle_id: &str) -> Option<LocationSample> {
        self.shard(vehicle_id)
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(vehicle_id)
            .cloned()
    }

    /// Unconditionally store `sample` as the vehicle's current state
    pub fn set_last(&self, vehicle_id: &str, sample: LocationSample) {
        self.shard(vehicle_id)
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(vehicle_id.to_string(), sample);
    }

    /// Swap in `sample` and return the previous state in one step.
    ///
    /// A sample captured before the cached one leaves the cache untouched so
    /// the cached timestamp never moves backwards.
    pub fn record(&self, sample: &LocationSample) -> StateUpdate {
        let mut shard = self.shard(&sample.vehicle_id).write().unwrap_or_else(|e| e.into_inner());

        if let Some(cached) = shard.get(&sample.vehicle_id) {
            if sample.captured_at < cached.captured_at {
                return StateUpdate::Stale {
                    cached_at: cached.captured_at,
                };
            }
        }

        let prior = shard.insert(sample.vehicle_id.clone(), sample.clone());
        StateUpdate::Fresh { prior }
    }

    pub fn remove(&self, vehicle_id: &str) -> Option<LocationSample> {
        self.shard(vehicle_id)
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(vehicle_id)
    }

    /// Number of vehicles with known state
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().unwrap_or_else(|e| e.into_inner()).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for VehicleStateCache {
    fn default() -> Self {
        Self::new()
    }
}
