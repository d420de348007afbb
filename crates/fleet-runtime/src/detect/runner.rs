//! Detector runner
//!
//! Samples with a comparable prior are queued as jobs. A dispatcher task
//! spawns one task per detector per job, bounded by a semaphore, so a slow,
//! failing or panicking detector never affects the others or the ingest path.

use super::{Detection, DetectionContext, DetectionRecord, Detector, DetectorConfig};
use crate::alerts::AlertPublisher;
use crate::observability::{names, Metrics, MetricsCollector};
use crate::state::GeofenceSnapshot;
use crate::storage::TelemetryStore;
use fleet_core::LocationSample;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

/// Where detections go: persisted first, then published as alerts
#[derive(Clone)]
pub struct DetectionSink {
    store: Arc<dyn TelemetryStore>,
    alerts: AlertPublisher,
    metrics: Arc<MetricsCollector>,
}

impl DetectionSink {
    pub fn new(store: Arc<dyn TelemetryStore>, alerts: AlertPublisher, metrics: Arc<MetricsCollector>) -> Self {
        Self { store, alerts, metrics }
    }

    pub async fn emit(&self, detection: Detection) {
        let Detection { event, record } = detection;
        self.metrics.incr(names::DETECTOR_EVENTS);
        tracing::info!("{}", event.describe());

        if let Err(e) = self.store.insert_safety_event(&event).await {
            self.metrics.incr(names::DETECTOR_SINK_FAILURES);
            tracing::error!("Failed to persist {} event {}: {}", event.kind, event.id, e);
        }

        let persisted = match &record {
            Some(DetectionRecord::Geofence(alert)) => self.store.insert_geofence_alert(alert).await,
            Some(DetectionRecord::Route(deviation)) => self.store.insert_route_deviation(deviation).await,
            None => Ok(()),
        };
        if let Err(e) = persisted {
            self.metrics.incr(names::DETECTOR_SINK_FAILURES);
            tracing::error!("Failed to persist detail record for event {}: {}", event.id, e);
        }

        if let Err(e) = self.alerts.publish_safety_event(&event).await {
            self.metrics.incr(names::DETECTOR_SINK_FAILURES);
            tracing::warn!("Alert for event {} not published: {}", event.id, e);
        }
    }
}

struct DetectionJob {
    current: LocationSample,
    prior: LocationSample,
}

struct Dispatcher {
    detectors: Vec<Arc<dyn Detector>>,
    geofences: Arc<GeofenceSnapshot>,
    store: Arc<dyn TelemetryStore>,
    sink: DetectionSink,
    semaphore: Arc<Semaphore>,
    metrics: Arc<MetricsCollector>,
}

/// Bounded job queue plus the task pool running detectors
pub struct DetectorRunner {
    sender: RwLock<Option<mpsc::Sender<DetectionJob>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<MetricsCollector>,
}

impl DetectorRunner {
    pub fn start(
        detectors: Vec<Arc<dyn Detector>>,
        geofences: Arc<GeofenceSnapshot>,
        store: Arc<dyn TelemetryStore>,
        sink: DetectionSink,
        config: &DetectorConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.job_queue_capacity.max(1));
        let dispatcher = Dispatcher {
            detectors,
            geofences,
            store,
            sink,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1))),
            metrics: metrics.clone(),
        };
        let handle = tokio::spawn(dispatcher.run(rx));

        Self {
            sender: RwLock::new(Some(tx)),
            dispatcher: Mutex::new(Some(handle)),
            metrics,
        }
    }

    /// Queue detection for a sample pair. Never blocks; returns false when
    /// the job was dropped.
    pub fn submit(&self, current: LocationSample, prior: LocationSample) -> bool {
        let guard = self.sender.read().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = guard.as_ref() else {
            self.metrics.incr(names::DETECTOR_JOBS_DROPPED);
            return false;
        };

        match sender.try_send(DetectionJob { current, prior }) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) | Err(TrySendError::Closed(job)) => {
                self.metrics.incr(names::DETECTOR_JOBS_DROPPED);
                tracing::warn!("Detector queue unavailable, dropping job for vehicle {}", job.current.vehicle_id);
                false
            }
        }
    }

    /// Stop accepting jobs and wait until every queued and running detector
    /// has finished
    pub async fn shutdown(&self) {
        let sender = self.sender.write().unwrap_or_else(|e| e.into_inner()).take();
        drop(sender);

        if let Some(handle) = self.dispatcher.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::error!("Detector dispatcher failed: {}", e);
            }
        }
    }
}

impl Dispatcher {
    async fn run(self, mut rx: mpsc::Receiver<DetectionJob>) {
        let mut tasks: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                job = rx.recv() => match job {
                    Some(job) => self.dispatch(job, &mut tasks).await,
                    None => break,
                },
                Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                    self.reap(finished);
                }
            }
        }

        while let Some(finished) = tasks.join_next().await {
            self.reap(finished);
        }
        tracing::info!("Detector runner stopped");
    }

    async fn dispatch(&self, job: DetectionJob, tasks: &mut JoinSet<()>) {
        let ctx = Arc::new(DetectionContext::new(
            job.current,
            job.prior,
            self.geofences.current(),
            self.store.clone(),
        ));

        for detector in &self.detectors {
            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let detector = detector.clone();
            let ctx = ctx.clone();
            let sink = self.sink.clone();
            let metrics = self.metrics.clone();

            tasks.spawn(async move {
                let _permit = permit;
                let start = Instant::now();
                let outcome = detector.detect(&ctx).await;
                metrics.record_duration(names::DETECTOR_RUN, start.elapsed());

                match outcome {
                    Ok(detections) => {
                        for detection in detections {
                            sink.emit(detection).await;
                        }
                    }
                    Err(e) => {
                        metrics.incr(names::DETECTOR_FAILURES);
                        tracing::warn!(
                            "Detector {} failed for vehicle {}: {}",
                            detector.name(),
                            ctx.current.vehicle_id,
                            e
                        );
                    }
                }
            });
        }
    }

    fn reap(&self, finished: std::result::Result<(), tokio::task::JoinError>) {
        if let Err(e) = finished {
            self.metrics.incr(names::DETECTOR_FAILURES);
            if e.is_panic() {
                tracing::error!("Detector task panicked: {}", e);
            } else {
                tracing::error!("Detector task aborted: {}", e);
            }
        }
    }
}
