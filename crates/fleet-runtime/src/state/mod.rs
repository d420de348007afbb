//! Vehicle state cache and geofence snapshot
//!
//! These are the only shared mutable structures on the hot path.

mod cache;
mod geofences;

pub use cache::{StateUpdate, VehicleStateCache};
pub use geofences::{GeofenceRefresher, GeofenceSnapshot};
