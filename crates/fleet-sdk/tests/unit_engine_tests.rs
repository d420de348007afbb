//! End-to-end tests for FleetEngine wired with in-memory collaborators

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use fleet_core::{FuelStatus, SafetyEventKind};
use fleet_runtime::fraud::DispositionThresholds;
use fleet_runtime::observability::names;
use fleet_runtime::transport::QoS;
use fleet_sdk::{
    EnqueueOutcome, FleetConfig, FleetEngine, FleetEngineBuilder, FraudDisposition, FuelEvent, InMemoryBroker,
    InMemoryStore, LocationSample, SdkError, Transport,
};
use std::sync::Arc;
use std::time::Duration;

fn weekday_noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap()
}

async fn engine_with(config: FleetConfig) -> (FleetEngine, Arc<InMemoryBroker>, Arc<InMemoryStore>) {
    let broker = Arc::new(InMemoryBroker::new());
    let store = Arc::new(InMemoryStore::new());
    let engine = FleetEngineBuilder::new()
        .with_config(config)
        .with_transport(broker.clone())
        .with_store(store.clone())
        .build()
        .await
        .unwrap();
    (engine, broker, store)
}

async fn wait_until(condition: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

// ========== Ingest Tests ==========

#[tokio::test]
async fn test_harsh_braking_reaches_store_and_alert_topic() {
    let (engine, broker, store) = engine_with(FleetConfig::default()).await;
    let t0 = weekday_noon();

    let first = engine
        .ingest(LocationSample::new("v1", 52.52, 13.405, 60.0).at(t0))
        .unwrap();
    assert_eq!(first.persistence, EnqueueOutcome::Queued);
    assert!(!first.detection_queued);

    let second = engine
        .ingest(LocationSample::new("v1", 52.5201, 13.405, 10.0).at(t0 + ChronoDuration::seconds(4)))
        .unwrap();
    assert!(second.detection_queued);

    let found = wait_until(|| {
        store
            .safety_events()
            .iter()
            .any(|e| e.kind == SafetyEventKind::HarshBraking)
    })
    .await;
    assert!(found, "no harsh braking event persisted");
    assert!(wait_until(|| !broker.published_to("fleet/vehicle/v1/alert").is_empty()).await);

    engine.shutdown().await;
    assert_eq!(store.locations().len(), 2);
}

#[tokio::test]
async fn test_stale_sample_is_persisted_but_not_applied() {
    let (engine, _broker, store) = engine_with(FleetConfig::default()).await;
    let t0 = weekday_noon();

    engine
        .ingest(LocationSample::new("v1", 52.52, 13.405, 30.0).at(t0))
        .unwrap();
    let outcome = engine
        .ingest(LocationSample::new("v1", 52.53, 13.405, 90.0).at(t0 - ChronoDuration::seconds(30)))
        .unwrap();

    assert!(outcome.stale);
    assert!(!outcome.detection_queued);
    assert_eq!(engine.last_known("v1").unwrap().captured_at, t0);
    assert_eq!(engine.metrics().counter_value(names::STATE_STALE_SAMPLES), 1);

    engine.shutdown().await;
    assert_eq!(store.locations().len(), 2);
}

#[tokio::test]
async fn test_invalid_sample_rejected() {
    let (engine, _broker, _store) = engine_with(FleetConfig::default()).await;

    let result = engine.ingest(LocationSample::new("v1", 120.0, 0.0, 10.0));
    assert!(result.is_err());
    assert!(engine.last_known("v1").is_none());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_location_messages_from_transport() {
    let (engine, broker, _store) = engine_with(FleetConfig::default()).await;
    engine.start().await.unwrap();
    assert!(engine.is_started());

    let sample = LocationSample::new("v9", 48.85, 2.35, 42.0);
    let body = serde_json::to_vec(&sample).unwrap();
    broker
        .publish("fleet/vehicle/v9/location", QoS::AtLeastOnce, body.clone())
        .await
        .unwrap();
    assert_eq!(engine.last_known("v9").unwrap().speed, 42.0);

    // Payload claims a different vehicle than the topic
    broker
        .publish("fleet/vehicle/v10/location", QoS::AtLeastOnce, body)
        .await
        .unwrap();
    broker
        .publish("fleet/vehicle/v11/location", QoS::AtLeastOnce, b"not json".to_vec())
        .await
        .unwrap();
    assert!(engine.last_known("v10").is_none());
    assert!(engine.last_known("v11").is_none());
    assert_eq!(engine.metrics().counter_value(names::INGESTION_REJECTED), 2);

    engine.shutdown().await;
}

// ========== Fuel Tests ==========

#[tokio::test]
async fn test_high_risk_fill_raises_fraud_alert() {
    let mut config = FleetConfig::default();
    config.fraud.disposition = DispositionThresholds {
        review: 0.0,
        alert: 0.01,
        reject: 1.0,
    };
    let (engine, broker, store) = engine_with(config).await;
    store.set_tank_capacity("v1", 100.0);

    let event = FuelEvent::new("v1", 200.0, 300.0, weekday_noon())
        .with_driver("d1")
        .with_location(52.52, 13.405);
    let scored = engine.score_fuel(event).await.unwrap();

    assert!(scored.assessment.score > 0.0);
    assert_eq!(scored.assessment.disposition, FraudDisposition::Review);
    assert_eq!(scored.event.status, FuelStatus::Pending);
    assert_eq!(scored.event.fraud_score, scored.assessment.score);
    assert!(scored.event.fraud_reason.is_some());

    assert!(scored.alert_published());
    assert!(scored.publish_error.is_none());
    let alert = scored.alert.expect("alert raised");
    assert_eq!(alert.fuel_event_id, scored.event.id);
    assert_eq!(alert.driver_id.as_deref(), Some("d1"));
    assert_eq!(store.fuel_alerts().len(), 1);

    let published = broker.published_to("fleet/fuel/v1/fraud");
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].qos, QoS::ExactlyOnce);
    let body = published[0].json().unwrap();
    assert_eq!(body["alert_type"], "FRAUD_DETECTED");
    assert_eq!(engine.metrics().counter_value(names::FRAUD_ALERTS), 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_fraud_alert_publish_failure_is_reported() {
    let mut config = FleetConfig::default();
    config.fraud.disposition = DispositionThresholds {
        review: 0.0,
        alert: 0.01,
        reject: 1.0,
    };
    let (engine, broker, store) = engine_with(config).await;
    store.set_tank_capacity("v1", 100.0);
    broker.set_fail_publish(true);

    let event = FuelEvent::new("v1", 200.0, 300.0, weekday_noon()).with_driver("d1");
    let scored = engine.score_fuel(event).await.unwrap();

    assert!(scored.alert.is_some());
    assert!(!scored.alert_published());
    assert!(scored.publish_error.is_some());
    // Alert record survives the failed publish
    assert_eq!(store.fuel_alerts().len(), 1);
    assert!(broker.published_to("fleet/fuel/v1/fraud").is_empty());
    assert_eq!(engine.metrics().counter_value(names::TRANSPORT_PUBLISH_FAILURES), 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_ordinary_fill_is_quiet() {
    let (engine, broker, store) = engine_with(FleetConfig::default()).await;
    store.set_tank_capacity("v1", 400.0);

    let scored = engine
        .score_fuel(FuelEvent::new("v1", 40.0, 60.0, weekday_noon()).with_driver("d1"))
        .await
        .unwrap();

    assert!(scored.alert.is_none());
    assert!(store.fuel_alerts().is_empty());
    assert!(broker.published_to("fleet/fuel/+/fraud").is_empty());

    engine.shutdown().await;
}

// ========== Lifecycle Tests ==========

#[tokio::test]
async fn test_shutdown_rejects_new_work() {
    let (engine, broker, store) = engine_with(FleetConfig::default()).await;
    engine.start().await.unwrap();
    engine
        .ingest(LocationSample::new("v1", 52.52, 13.405, 30.0))
        .unwrap();

    engine.shutdown().await;
    assert!(engine.is_stopped());
    assert_eq!(store.locations().len(), 1);

    assert!(matches!(
        engine.ingest(LocationSample::new("v1", 52.52, 13.405, 30.0)),
        Err(SdkError::ShutDown)
    ));
    assert!(matches!(
        engine
            .score_fuel(FuelEvent::new("v1", 10.0, 15.0, weekday_noon()))
            .await,
        Err(SdkError::ShutDown)
    ));
    assert!(matches!(engine.start().await, Err(SdkError::ShutDown)));

    // A transport handed to the builder stays connected
    assert!(broker.is_connected());
    engine.shutdown().await;
}

#[tokio::test]
async fn test_invalid_config_rejected_by_builder() {
    let mut config = FleetConfig::default();
    config.fraud.weights.consumption = 0.9;

    let result = FleetEngineBuilder::new().with_config(config).build().await;
    match result {
        Err(SdkError::ConfigError(message)) => assert!(message.contains("sum to 1.0")),
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("invalid weights accepted"),
    }
}
