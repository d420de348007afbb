//! Ingestion buffer
//!
//! Position samples are queued without blocking and persisted in batches by a
//! single drain task. A full queue drops the sample; a failed batch is logged
//! and discarded.

use crate::error::Result;
use crate::observability::{names, Metrics, MetricsCollector};
use crate::storage::TelemetryStore;
use fleet_core::LocationSample;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Ingestion buffer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Bounded queue capacity; samples beyond it are dropped
    pub queue_capacity: usize,

    /// Flush as soon as a batch holds this many samples
    pub batch_size: usize,

    /// Flush a partial batch after this long
    pub flush_interval_ms: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            batch_size: 100,
            flush_interval_ms: 1_000,
        }
    }
}

impl IngestionConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }
}

/// Result of a non-blocking enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Queue full or buffer shut down; the sample was discarded
    Dropped,
}

/// Bounded queue plus the drain task that persists it
pub struct IngestionBuffer {
    sender: RwLock<Option<mpsc::Sender<LocationSample>>>,
    drain_task: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<MetricsCollector>,
}

impl IngestionBuffer {
    /// Create the buffer and spawn its drain task
    pub fn start(config: IngestionConfig, store: Arc<dyn TelemetryStore>, metrics: Arc<MetricsCollector>) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let drain = tokio::spawn(drain_loop(rx, store, config, metrics.clone()));

        Self {
            sender: RwLock::new(Some(tx)),
            drain_task: Mutex::new(Some(drain)),
            metrics,
        }
    }

    /// Queue a sample for persistence. Never blocks.
    ///
    /// Invalid samples are rejected with an error; a full queue drops the
    /// sample and reports [`EnqueueOutcome::Dropped`].
    pub fn enqueue(&self, sample: LocationSample) -> Result<EnqueueOutcome> {
        if let Err(e) = sample.validate() {
            self.metrics.incr(names::INGESTION_REJECTED);
            return Err(e.into());
        }

        let guard = self.sender.read().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = guard.as_ref() else {
            self.metrics.incr(names::INGESTION_DROPPED);
            tracing::warn!("Ingestion buffer closed, dropping sample for vehicle {}", sample.vehicle_id);
            return Ok(EnqueueOutcome::Dropped);
        };

        match sender.try_send(sample) {
            Ok(()) => {
                self.metrics.incr(names::INGESTION_ENQUEUED);
                Ok(EnqueueOutcome::Queued)
            }
            Err(TrySendError::Full(sample)) => {
                self.metrics.incr(names::INGESTION_DROPPED);
                tracing::warn!("Ingestion queue full, dropping sample for vehicle {}", sample.vehicle_id);
                Ok(EnqueueOutcome::Dropped)
            }
            Err(TrySendError::Closed(sample)) => {
                self.metrics.incr(names::INGESTION_DROPPED);
                tracing::warn!("Ingestion drain stopped, dropping sample for vehicle {}", sample.vehicle_id);
                Ok(EnqueueOutcome::Dropped)
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().unwrap_or_else(|e| e.into_inner()).is_none()
    }

    /// Two-phase shutdown: close the enqueue side, then wait for the drain
    /// task to flush what is left.
    pub async fn shutdown(&self) {
        let sender = self.sender.write().unwrap_or_else(|e| e.into_inner()).take();
        drop(sender);

        if let Some(task) = self.drain_task.lock().await.take() {
            if let Err(e) = task.await {
                tracing::error!("Ingestion drain task failed: {}", e);
            }
        }
    }
}

async fn drain_loop(
    mut rx: mpsc::Receiver<LocationSample>,
    store: Arc<dyn TelemetryStore>,
    config: IngestionConfig,
    metrics: Arc<MetricsCollector>,
) {
    let batch_size = config.batch_size.max(1);
    let mut batch: Vec<LocationSample> = Vec::with_capacity(batch_size);
    let mut ticker = tokio::time::interval(config.flush_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    tracing::info!(
        "Ingestion drain started (batch_size={}, flush_interval={}ms)",
        batch_size,
        config.flush_interval_ms
    );

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(sample) => {
                    batch.push(sample);
                    if batch.len() >= batch_size {
                        flush(&mut batch, store.as_ref(), &metrics).await;
                        ticker.reset();
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                if !batch.is_empty() {
                    flush(&mut batch, store.as_ref(), &metrics).await;
                }
            }
        }
    }

    if !batch.is_empty() {
        flush(&mut batch, store.as_ref(), &metrics).await;
    }
    tracing::info!("Ingestion drain stopped");
}

async fn flush(batch: &mut Vec<LocationSample>, store: &dyn TelemetryStore, metrics: &MetricsCollector) {
    let size = batch.len();
    let start = Instant::now();

    match store.insert_locations(batch).await {
        Ok(()) => {
            metrics.incr(names::INGESTION_BATCHES_FLUSHED);
            metrics.counter(names::INGESTION_SAMPLES_FLUSHED).add(size as u64);
            tracing::debug!("Flushed {} location samples", size);
        }
        Err(e) => {
            metrics.incr(names::INGESTION_BATCH_FAILURES);
            tracing::error!("Failed to persist batch of {} location samples, discarding: {}", size, e);
        }
    }

    metrics.record_duration(names::INGESTION_FLUSH, start.elapsed());
    batch.clear();
}
