//! Cross-component tests for fleet-runtime
//!
//! Exercises the ingestion buffer, detectors, fraud engine and event adapter
//! through their public API with the in-memory collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use fleet_core::{AdapterEvent, EntityKind, FuelEvent, LocationSample, PartnerProtocol, PartnerSubscriber, Priority, SafetyEventKind};
use fleet_runtime::adapter::{AdapterConfig, DispatcherSet, EventAdapter, PartnerDispatcher};
use fleet_runtime::detect::{DetectionContext, Detector, HarshDrivingDetector};
use fleet_runtime::fraud::{FraudComponent, FraudConfig, FraudEngine, InMemoryStationRegistry};
use fleet_runtime::ingestion::{EnqueueOutcome, IngestionBuffer, IngestionConfig};
use fleet_runtime::observability::{names, MetricsCollector};
use fleet_runtime::storage::InMemoryStore;
use fleet_runtime::transport::{InMemoryBroker, QoS, Transport};
use fleet_runtime::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// Tuesday, mid-day
fn weekday_noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap()
}

fn sample(vehicle: &str, speed: f64) -> LocationSample {
    LocationSample::new(vehicle, 52.52, 13.405, speed)
}

// ========== Ingestion Tests ==========

#[tokio::test(start_paused = true)]
async fn test_size_flush_then_timer_flush() {
    let store = Arc::new(InMemoryStore::new());
    let metrics = Arc::new(MetricsCollector::new());
    let config = IngestionConfig {
        queue_capacity: 100,
        batch_size: 3,
        flush_interval_ms: 1_000,
    };
    let buffer = IngestionBuffer::start(config, store.clone(), metrics.clone());

    for _ in 0..3 {
        buffer.enqueue(sample("v1", 10.0)).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(store.location_batches(), vec![3]);

    buffer.enqueue(sample("v1", 10.0)).unwrap();
    buffer.enqueue(sample("v1", 10.0)).unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    // Below batch size and before the interval: still buffered
    assert_eq!(store.location_batches(), vec![3]);

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(store.location_batches(), vec![3, 2]);

    buffer.shutdown().await;
    assert_eq!(metrics.counter_value(names::INGESTION_BATCHES_FLUSHED), 2);
    assert_eq!(metrics.counter_value(names::INGESTION_SAMPLES_FLUSHED), 5);
}

#[tokio::test]
async fn test_overflow_drops_without_blocking() {
    let store = Arc::new(InMemoryStore::new());
    let metrics = Arc::new(MetricsCollector::new());
    let config = IngestionConfig {
        queue_capacity: 2,
        batch_size: 100,
        flush_interval_ms: 60_000,
    };
    let buffer = IngestionBuffer::start(config, store.clone(), metrics.clone());

    // The drain task cannot run between these calls on the test runtime
    let outcomes: Vec<EnqueueOutcome> = (0..5).map(|_| buffer.enqueue(sample("v1", 0.0)).unwrap()).collect();

    assert_eq!(outcomes.iter().filter(|o| **o == EnqueueOutcome::Queued).count(), 2);
    assert_eq!(outcomes.iter().filter(|o| **o == EnqueueOutcome::Dropped).count(), 3);
    assert_eq!(metrics.counter_value(names::INGESTION_DROPPED), 3);

    buffer.shutdown().await;
    assert_eq!(store.locations().len(), 2);
}

#[tokio::test]
async fn test_shutdown_flushes_partial_batch() {
    let store = Arc::new(InMemoryStore::new());
    let buffer = IngestionBuffer::start(IngestionConfig::default(), store.clone(), Arc::new(MetricsCollector::new()));

    for i in 0..7 {
        buffer.enqueue(sample(&format!("v{}", i), 5.0)).unwrap();
    }
    buffer.shutdown().await;

    assert_eq!(store.location_batches(), vec![7]);
}

// ========== Detector Tests ==========

fn harsh_context(prior_speed: f64, current_speed: f64, gap: ChronoDuration) -> DetectionContext {
    let t0 = weekday_noon();
    let prior = sample("v1", prior_speed).at(t0);
    let current = sample("v1", current_speed).at(t0 + gap);
    DetectionContext::new(current, prior, Arc::new(Vec::new()), Arc::new(InMemoryStore::new()))
}

#[tokio::test]
async fn test_harsh_braking_within_comparable_gap() {
    let detector = HarshDrivingDetector::new(12.0, 5.0);
    let detections = detector
        .detect(&harsh_context(80.0, 20.0, ChronoDuration::seconds(4)))
        .await
        .unwrap();

    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].event.kind, SafetyEventKind::HarshBraking);
    assert!(detections[0].event.value <= -12.0);
}

#[tokio::test]
async fn test_harsh_ignores_sparse_and_reordered_pairs() {
    let detector = HarshDrivingDetector::new(12.0, 5.0);

    // Same delta over 6 seconds is not comparable
    let sparse = detector
        .detect(&harsh_context(80.0, 0.0, ChronoDuration::seconds(6)))
        .await
        .unwrap();
    assert!(sparse.is_empty());

    let zero_gap = detector
        .detect(&harsh_context(0.0, 100.0, ChronoDuration::zero()))
        .await
        .unwrap();
    assert!(zero_gap.is_empty());

    let backwards = detector
        .detect(&harsh_context(0.0, 100.0, ChronoDuration::seconds(-2)))
        .await
        .unwrap();
    assert!(backwards.is_empty());
}

// ========== Fraud Tests ==========

fn fraud_engine(store: Arc<InMemoryStore>) -> (FraudEngine, Arc<MetricsCollector>) {
    let metrics = Arc::new(MetricsCollector::new());
    let engine = FraudEngine::new(
        store,
        Arc::new(InMemoryStationRegistry::new(Vec::new())),
        FraudConfig::default(),
        metrics.clone(),
    );
    (engine, metrics)
}

#[tokio::test]
async fn test_fill_over_tank_capacity() {
    let store = Arc::new(InMemoryStore::new());
    store.set_tank_capacity("v1", 100.0);
    let (engine, _) = fraud_engine(store);

    let event = FuelEvent::new("v1", 200.0, 300.0, weekday_noon())
        .with_driver("d1")
        .with_location(52.52, 13.405);
    let assessment = engine.score(&event).await;

    let quantity = assessment
        .components
        .iter()
        .find(|c| c.component == FraudComponent::Quantity)
        .unwrap();
    assert!(quantity.score >= 0.9);
    assert!(quantity.has_warning("exceeds tank capacity"));
    assert!(assessment.warnings.iter().any(|w| w.contains("exceeds tank capacity")));
}

#[tokio::test]
async fn test_two_fills_ten_minutes_apart() {
    let store = Arc::new(InMemoryStore::new());
    store.set_tank_capacity("v1", 400.0);
    let first = FuelEvent::new("v1", 40.0, 60.0, weekday_noon()).with_driver("d1");
    store.add_fuel_event(first);
    let (engine, _) = fraud_engine(store);

    let second = FuelEvent::new("v1", 40.0, 60.0, weekday_noon() + ChronoDuration::minutes(10)).with_driver("d1");
    let assessment = engine.score(&second).await;

    let timing = assessment
        .components
        .iter()
        .find(|c| c.component == FraudComponent::Timing)
        .unwrap();
    assert!(timing.has_warning("multiple fuel events"));
    assert!(timing.score > 0.0);
}

#[tokio::test]
async fn test_later_fill_does_not_mark_earlier_one() {
    let store = Arc::new(InMemoryStore::new());
    store.set_tank_capacity("v1", 400.0);
    store.add_fuel_event(FuelEvent::new("v1", 40.0, 60.0, weekday_noon() + ChronoDuration::minutes(10)));
    let (engine, _) = fraud_engine(store);

    let earlier = FuelEvent::new("v1", 40.0, 60.0, weekday_noon()).with_driver("d1");
    let assessment = engine.score(&earlier).await;

    let timing = assessment
        .components
        .iter()
        .find(|c| c.component == FraudComponent::Timing)
        .unwrap();
    assert!(!timing.has_warning("multiple fuel events"));
}

#[tokio::test]
async fn test_score_always_within_unit_interval() {
    let store = Arc::new(InMemoryStore::new());
    store.set_tank_capacity("v1", 50.0);
    let saturday_night = Utc.with_ymd_and_hms(2024, 3, 9, 2, 0, 0).unwrap();
    for i in 0..5 {
        store.add_fuel_event(
            FuelEvent::new("v1", 10.0, 15.0, saturday_night - ChronoDuration::days(i + 1)).with_odometer(90_000.0),
        );
    }
    store.add_fuel_event(FuelEvent::new("v1", 10.0, 15.0, saturday_night - ChronoDuration::minutes(5)));
    let (engine, metrics) = fraud_engine(store);

    let events = vec![
        FuelEvent::new("v1", 500.0, 0.01, saturday_night).with_odometer(1.0),
        FuelEvent::new("v1", 0.5, 900.0, saturday_night).with_location(95.0, 200.0),
        FuelEvent::new("v1", f64::NAN, f64::NAN, saturday_night),
        FuelEvent::new("v1", 30.0, 45.0, weekday_noon()).with_driver("d1"),
    ];

    for event in &events {
        let assessment = engine.score(event).await;
        assert!(
            (0.0..=1.0).contains(&assessment.score),
            "score {} out of range for {:?}",
            assessment.score,
            event
        );
        assert!(!assessment.reason.is_empty());
    }
    assert_eq!(metrics.counter_value(names::FRAUD_SCORED), events.len() as u64);
}

// ========== Adapter Tests ==========

#[derive(Default)]
struct CountingDispatcher {
    calls: AtomicUsize,
}

#[async_trait]
impl PartnerDispatcher for CountingDispatcher {
    async fn dispatch(&self, _partner: &PartnerSubscriber, _event: &AdapterEvent) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn partner(id: &str, protocol: PartnerProtocol, endpoint: String, types: &[&str]) -> PartnerSubscriber {
    PartnerSubscriber::new(id, protocol, endpoint, types.iter().map(|t| t.to_string()).collect())
}

fn adapter_event(event_type: &str) -> AdapterEvent {
    AdapterEvent {
        id: Uuid::new_v4(),
        event_type: event_type.to_string(),
        entity_type: EntityKind::Vehicle,
        entity_id: "v1".to_string(),
        action: "raised".to_string(),
        payload: serde_json::json!({}),
        timestamp: Utc::now(),
        priority: Priority::High,
        source: "test".to_string(),
    }
}

#[tokio::test]
async fn test_partner_never_receives_other_event_types() {
    let counting = Arc::new(CountingDispatcher::default());
    let metrics = Arc::new(MetricsCollector::new());
    let adapter = EventAdapter::new(
        AdapterConfig::default(),
        DispatcherSet::empty().with(PartnerProtocol::Rest, counting.clone()),
        metrics.clone(),
    );
    let broker = InMemoryBroker::new();
    adapter.register_partner(partner("p1", PartnerProtocol::Rest, "http://unused".to_string(), &["fuel.theft"]));
    adapter.start(&broker).await.unwrap();

    broker.publish("fleet/vehicle/v1/alert", QoS::AtLeastOnce, b"{}".to_vec()).await.unwrap();
    broker.publish("fleet/fuel/v1/fraud", QoS::ExactlyOnce, b"{}".to_vec()).await.unwrap();
    assert!(adapter.offer(adapter_event("vehicle.alert")));
    adapter.shutdown().await;

    assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
    assert_eq!(metrics.counter_value(names::ADAPTER_DELIVERED), 0);
}

#[tokio::test]
async fn test_failing_partner_does_not_affect_others() {
    let mut server = mockito::Server::new_async().await;
    let healthy = server
        .mock("POST", "/healthy")
        .with_status(200)
        .expect(2)
        .create_async()
        .await;
    let broken = server
        .mock("POST", "/broken")
        .with_status(500)
        .expect(2)
        .create_async()
        .await;

    let metrics = Arc::new(MetricsCollector::new());
    let adapter = EventAdapter::new(AdapterConfig::default(), DispatcherSet::standard(), metrics.clone());
    adapter.register_partner(partner(
        "healthy",
        PartnerProtocol::Rest,
        format!("{}/healthy", server.url()),
        &["fuel.*"],
    ));
    adapter.register_partner(partner(
        "broken",
        PartnerProtocol::Webhook,
        format!("{}/broken", server.url()),
        &["*"],
    ));

    let broker = InMemoryBroker::new();
    adapter.start(&broker).await.unwrap();
    broker.publish("fleet/fuel/v1/theft", QoS::ExactlyOnce, br#"{"liters":80}"#.to_vec()).await.unwrap();
    broker.publish("fleet/fuel/v2/fraud", QoS::ExactlyOnce, br#"{"score":0.9}"#.to_vec()).await.unwrap();
    adapter.shutdown().await;

    healthy.assert_async().await;
    broken.assert_async().await;
    assert_eq!(metrics.counter_value(names::ADAPTER_DELIVERED), 2);
    assert_eq!(metrics.counter_value(names::ADAPTER_DELIVERY_FAILURES), 2);
}

struct StalledDispatcher;

#[async_trait]
impl PartnerDispatcher for StalledDispatcher {
    async fn dispatch(&self, _partner: &PartnerSubscriber, _event: &AdapterEvent) -> Result<()> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_partner_timeout_does_not_block_others() {
    let counting = Arc::new(CountingDispatcher::default());
    let metrics = Arc::new(MetricsCollector::new());
    let adapter = EventAdapter::new(
        AdapterConfig {
            partner_timeout_ms: 200,
            ..AdapterConfig::default()
        },
        DispatcherSet::empty()
            .with(PartnerProtocol::Grpc, Arc::new(StalledDispatcher))
            .with(PartnerProtocol::Rest, counting.clone()),
        metrics.clone(),
    );
    adapter.register_partner(partner("slow", PartnerProtocol::Grpc, "http://unused".to_string(), &["*"]));
    adapter.register_partner(partner("fast", PartnerProtocol::Rest, "http://unused".to_string(), &["*"]));

    let broker = InMemoryBroker::new();
    adapter.start(&broker).await.unwrap();
    let started = tokio::time::Instant::now();
    assert!(adapter.offer(adapter_event("vehicle.alert")));
    adapter.shutdown().await;

    assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    assert_eq!(metrics.counter_value(names::ADAPTER_DELIVERED), 1);
    assert_eq!(metrics.counter_value(names::ADAPTER_DELIVERY_FAILURES), 1);
    // Stalled call was cut at the partner deadline
    assert!(started.elapsed() < Duration::from_secs(60));
}

#[tokio::test]
async fn test_rate_limited_partner_is_isolated() {
    let counting = Arc::new(CountingDispatcher::default());
    let metrics = Arc::new(MetricsCollector::new());
    let adapter = EventAdapter::new(
        AdapterConfig::default(),
        DispatcherSet::empty().with(PartnerProtocol::Rest, counting.clone()),
        metrics.clone(),
    );
    adapter.register_partner(
        partner("limited", PartnerProtocol::Rest, "http://unused".to_string(), &["*"]).with_rate_limit(1),
    );
    adapter.register_partner(partner("open", PartnerProtocol::Rest, "http://unused".to_string(), &["*"]));

    let broker = InMemoryBroker::new();
    adapter.start(&broker).await.unwrap();
    for i in 0..3 {
        broker
            .publish(&format!("fleet/vehicle/v{}/emergency", i), QoS::ExactlyOnce, b"{}".to_vec())
            .await
            .unwrap();
    }
    adapter.shutdown().await;

    // 3 for the open partner, 1 for the limited one
    assert_eq!(counting.calls.load(Ordering::SeqCst), 4);
    assert_eq!(metrics.counter_value(names::ADAPTER_RATE_LIMITED), 2);
}

#[tokio::test]
async fn test_load_partners_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partners.yaml");
    std::fs::write(
        &path,
        "partners:\n  - id: acme\n    name: Acme\n    protocol: rest\n    endpoint: http://acme.local/events\n    event_types: [\"trip.*\"]\n",
    )
    .unwrap();

    let adapter = EventAdapter::new(
        AdapterConfig::default(),
        DispatcherSet::standard(),
        Arc::new(MetricsCollector::new()),
    );
    assert_eq!(adapter.load_partners_yaml(&path).unwrap(), 1);
    assert!(adapter.partners()[0].subscribes_to("trip.deviation"));
}
