//! Active geofence snapshot

use crate::error::Result;
use crate::observability::{names, Metrics, MetricsCollector};
use crate::storage::TelemetryStore;
use fleet_core::Geofence;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Immutable set of active geofences, swapped as a whole on refresh.
///
/// Readers clone the inner `Arc` and release the lock immediately.
#[derive(Default)]
pub struct GeofenceSnapshot {
    current: RwLock<Arc<Vec<Geofence>>>,
}

impl GeofenceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Arc<Vec<Geofence>> {
        self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.current().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the snapshot, skipping inactive geofences and those with
    /// malformed geometry. Returns how many were kept.
    pub fn replace(&self, geofences: Vec<Geofence>) -> usize {
        let valid: Vec<Geofence> = geofences
            .into_iter()
            .filter(|g| g.active)
            .filter(|g| match g.validate() {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Skipping geofence {}: {}", g.id, e);
                    false
                }
            })
            .collect();

        let count = valid.len();
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(valid);
        count
    }

    /// Reload from the store. On failure the previous snapshot stays in place.
    pub async fn refresh(&self, store: &dyn TelemetryStore) -> Result<usize> {
        let geofences = store.active_geofences().await?;
        let count = self.replace(geofences);
        tracing::debug!("Geofence snapshot refreshed ({} active)", count);
        Ok(count)
    }

    /// Spawn a task reloading the snapshot every `interval`
    pub fn spawn_refresher(
        self: &Arc<Self>,
        store: Arc<dyn TelemetryStore>,
        interval: Duration,
        metrics: Arc<MetricsCollector>,
    ) -> GeofenceRefresher {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let snapshot = self.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = snapshot.refresh(store.as_ref()).await {
                            metrics.incr(names::GEOFENCE_REFRESH_FAILURES);
                            tracing::warn!("Geofence refresh failed, keeping previous snapshot: {}", e);
                        }
                    }
                }
            }
            tracing::debug!("Geofence refresher stopped");
        });

        GeofenceRefresher {
            shutdown_tx,
            handle: Some(handle),
        }
    }
}

/// Handle to the periodic geofence reload task
pub struct GeofenceRefresher {
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl GeofenceRefresher {
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
