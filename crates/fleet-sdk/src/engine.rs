//! FleetEngine - the wired telemetry core
//!
//! Owns every runtime component and exposes the two entry points of the core:
//! [`FleetEngine::ingest`] for position samples and [`FleetEngine::score_fuel`]
//! for fuel fills.

use crate::config::FleetConfig;
use crate::error::{Result, SdkError};
use chrono::Utc;
use fleet_core::{AlertMessage, FuelAlert, FuelEvent, LocationSample, PartnerSubscriber, Severity, Topic};
use fleet_runtime::adapter::EventAdapter;
use fleet_runtime::alerts::{AlertPublisher, FRAUD_DETECTED};
use fleet_runtime::detect::DetectorRunner;
use fleet_runtime::fraud::{FraudAssessment, FraudDisposition, FraudEngine};
use fleet_runtime::ingestion::{EnqueueOutcome, IngestionBuffer};
use fleet_runtime::observability::{names, Metrics, MetricsCollector, MetricsSnapshot};
use fleet_runtime::state::{GeofenceRefresher, GeofenceSnapshot, StateUpdate, VehicleStateCache};
use fleet_runtime::storage::TelemetryStore;
use fleet_runtime::transport::{QoS, Transport, TransportMessage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// What happened to one ingested sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Queued for persistence or dropped on overflow
    pub persistence: EnqueueOutcome,

    /// Older than the vehicle's cached state; state and detectors untouched
    pub stale: bool,

    /// A detection job was queued
    pub detection_queued: bool,
}

/// A scored fuel fill
#[derive(Debug, Clone)]
pub struct FuelScore {
    /// The fill with score, reason and status applied
    pub event: FuelEvent,
    pub assessment: FraudAssessment,

    /// Alert record, present when the score reached the alert threshold
    pub alert: Option<FuelAlert>,

    /// Set when the alert record was stored but its fraud topic publish failed
    pub publish_error: Option<String>,
}

impl FuelScore {
    /// An alert was raised and reached the transport
    pub fn alert_published(&self) -> bool {
        self.alert.is_some() && self.publish_error.is_none()
    }
}

/// The ingest path shared with the transport subscription
pub(crate) struct IngestPath {
    pub(crate) ingestion: IngestionBuffer,
    pub(crate) state: VehicleStateCache,
    pub(crate) detectors: DetectorRunner,
    pub(crate) metrics: Arc<MetricsCollector>,
    pub(crate) stopped: AtomicBool,
}

impl IngestPath {
    fn ingest(&self, sample: LocationSample) -> Result<IngestOutcome> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SdkError::ShutDown);
        }

        let persistence = self.ingestion.enqueue(sample.clone())?;

        let update = self.state.record(&sample);
        if let StateUpdate::Stale { cached_at } = update {
            self.metrics.incr(names::STATE_STALE_SAMPLES);
            tracing::debug!(
                "Out-of-order sample for vehicle {} ({} < {}), state unchanged",
                sample.vehicle_id,
                sample.captured_at,
                cached_at
            );
            return Ok(IngestOutcome {
                persistence,
                stale: true,
                detection_queued: false,
            });
        }

        let detection_queued = match update.comparable_prior() {
            Some(prior) => {
                let prior = prior.clone();
                self.detectors.submit(sample, prior)
            }
            None => false,
        };

        Ok(IngestOutcome {
            persistence,
            stale: false,
            detection_queued,
        })
    }

    fn on_location_message(&self, message: TransportMessage) {
        let sample: LocationSample = match message.json() {
            Ok(sample) => sample,
            Err(e) => {
                self.metrics.incr(names::INGESTION_REJECTED);
                tracing::warn!("Undecodable location on {}: {}", message.topic, e);
                return;
            }
        };

        let topic_vehicle = Topic::parse(&message.topic)
            .ok()
            .and_then(|t| t.entity_id().map(str::to_string));
        if topic_vehicle.as_deref() != Some(sample.vehicle_id.as_str()) {
            self.metrics.incr(names::INGESTION_REJECTED);
            tracing::warn!(
                "Location on {} claims vehicle {}, rejecting",
                message.topic,
                sample.vehicle_id
            );
            return;
        }

        if let Err(e) = self.ingest(sample) {
            tracing::warn!("Location on {} not ingested: {}", message.topic, e);
        }
    }
}

/// The fleet telemetry core
pub struct FleetEngine {
    pub(crate) config: FleetConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) owns_transport: bool,
    pub(crate) store: Arc<dyn TelemetryStore>,
    pub(crate) metrics: Arc<MetricsCollector>,
    pub(crate) ingest_path: Arc<IngestPath>,
    pub(crate) geofences: Arc<GeofenceSnapshot>,
    pub(crate) fraud: FraudEngine,
    pub(crate) alerts: AlertPublisher,
    pub(crate) adapter: EventAdapter,
    pub(crate) refresher: Mutex<Option<GeofenceRefresher>>,
    pub(crate) started: AtomicBool,
}

impl FleetEngine {
    /// Subscribe to device locations, start partner fan-out and the periodic
    /// geofence reload. Calling it again is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self.ingest_path.stopped.load(Ordering::SeqCst) {
            return Err(SdkError::ShutDown);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        match self.geofences.refresh(self.store.as_ref()).await {
            Ok(count) => tracing::info!("Loaded {} active geofences", count),
            Err(e) => {
                self.metrics.incr(names::GEOFENCE_REFRESH_FAILURES);
                tracing::warn!("Initial geofence load failed, starting with none: {}", e);
            }
        }

        let path = self.ingest_path.clone();
        self.transport
            .subscribe(
                &Topic::all_vehicle_locations().to_string(),
                QoS::AtLeastOnce,
                Arc::new(move |message: TransportMessage| path.on_location_message(message)),
            )
            .await?;

        self.adapter.start(self.transport.as_ref()).await?;

        let refresher = self.geofences.spawn_refresher(
            self.store.clone(),
            Duration::from_secs(self.config.detectors.geofence_refresh_secs.max(1)),
            self.metrics.clone(),
        );
        *self.refresher.lock().await = Some(refresher);

        tracing::info!("Fleet engine started on transport {}", self.transport.name());
        Ok(())
    }

    /// Accept one position sample.
    ///
    /// The sample is queued for batched persistence and, when the vehicle has
    /// an earlier sample, compared against it by every detector in the
    /// background. Never blocks on storage or detectors.
    pub fn ingest(&self, sample: LocationSample) -> Result<IngestOutcome> {
        self.ingest_path.ingest(sample)
    }

    /// Score a fuel fill and apply the disposition policy.
    ///
    /// Scores at or above the alert threshold persist a [`FuelAlert`] and
    /// publish a `FRAUD_DETECTED` alert. Persisting the fill itself is left to
    /// the caller.
    pub async fn score_fuel(&self, mut event: FuelEvent) -> Result<FuelScore> {
        if self.ingest_path.stopped.load(Ordering::SeqCst) {
            return Err(SdkError::ShutDown);
        }

        let assessment = self.fraud.score(&event).await;
        event.fraud_score = assessment.score;
        event.fraud_reason = Some(assessment.reason.clone());
        event.status = assessment.disposition.status();

        match assessment.disposition {
            FraudDisposition::AutoApprove => {}
            FraudDisposition::Review => tracing::warn!(
                "Fuel event {} for vehicle {} needs review: {}",
                event.id,
                event.vehicle_id,
                assessment.reason
            ),
            FraudDisposition::AutoReject => tracing::warn!(
                "Fuel event {} for vehicle {} rejected: {}",
                event.id,
                event.vehicle_id,
                assessment.reason
            ),
        }

        let (alert, publish_error) = if assessment.alert {
            let (record, published) = self.raise_fraud_alert(&event, &assessment).await;
            (Some(record), published.err().map(|e| e.to_string()))
        } else {
            (None, None)
        };

        Ok(FuelScore {
            event,
            assessment,
            alert,
            publish_error,
        })
    }

    async fn raise_fraud_alert(
        &self,
        event: &FuelEvent,
        assessment: &FraudAssessment,
    ) -> (FuelAlert, fleet_runtime::Result<()>) {
        self.metrics.incr(names::FRAUD_ALERTS);
        let record = FuelAlert {
            id: Uuid::new_v4(),
            fuel_event_id: event.id.clone(),
            vehicle_id: event.vehicle_id.clone(),
            driver_id: event.driver_id.clone(),
            score: assessment.score,
            reason: assessment.reason.clone(),
            warnings: assessment.warnings.clone(),
            created_at: Utc::now(),
        };

        if let Err(e) = self.store.insert_fuel_alert(&record).await {
            tracing::error!("Failed to persist fraud alert for fuel event {}: {}", event.id, e);
        }

        let severity = if assessment.disposition == FraudDisposition::AutoReject {
            Severity::Critical
        } else {
            Severity::High
        };
        let mut message = AlertMessage::new(
            FRAUD_DETECTED,
            severity,
            format!("Fuel event {} scored {:.2}: {}", event.id, assessment.score, assessment.reason),
        )
        .for_vehicle(event.vehicle_id.clone())
        .with_driver(event.driver_id.clone())
        .with_entity_ref(event.id.clone())
        .requires_action(true);
        if let Ok(data) = serde_json::to_value(assessment) {
            message = message.with_data(data);
        }

        // Counted and logged by the publisher, reported back on the score
        let published = self.alerts.publish_fraud_alert(&event.vehicle_id, &message).await;
        (record, published)
    }

    /// Two-phase shutdown: stop taking work, then drain ingestion, detectors
    /// and partner fan-out in that order.
    pub async fn shutdown(&self) {
        if self.ingest_path.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Fleet engine shutting down");

        if let Some(refresher) = self.refresher.lock().await.take() {
            refresher.stop().await;
        }
        self.ingest_path.ingestion.shutdown().await;
        self.ingest_path.detectors.shutdown().await;
        self.adapter.shutdown().await;

        if self.owns_transport {
            if let Err(e) = self.transport.disconnect().await {
                tracing::warn!("Transport disconnect failed: {}", e);
            }
        }
        tracing::info!("Fleet engine stopped");
    }

    pub fn register_partner(&self, partner: PartnerSubscriber) {
        self.adapter.register_partner(partner);
    }

    /// Last accepted sample of a vehicle
    pub fn last_known(&self, vehicle_id: &str) -> Option<LocationSample> {
        self.ingest_path.state.get_last(vehicle_id)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.ingest_path.stopped.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    pub fn store(&self) -> Arc<dyn TelemetryStore> {
        self.store.clone()
    }

    pub fn geofences(&self) -> Arc<GeofenceSnapshot> {
        self.geofences.clone()
    }

    pub fn adapter(&self) -> &EventAdapter {
        &self.adapter
    }

    pub fn alerts(&self) -> &AlertPublisher {
        &self.alerts
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
