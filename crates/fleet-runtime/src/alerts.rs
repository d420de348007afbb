//! Outbound alert channel
//!
//! Alerts are the only surface the core offers to downstream consumers.
//! Explicit alert publication reports failure to the caller; broadcasts are
//! best-effort.

use crate::error::Result;
use crate::observability::{names, Metrics, MetricsCollector};
use crate::transport::{QoS, Transport};
use fleet_core::{AlertMessage, SafetyEvent, Severity, Topic};
use std::sync::Arc;

/// Alert type raised for fuel events scoring at or above the alert threshold
pub const FRAUD_DETECTED: &str = "FRAUD_DETECTED";

/// Publishes structured alerts onto the transport
#[derive(Clone)]
pub struct AlertPublisher {
    transport: Arc<dyn Transport>,
    metrics: Arc<MetricsCollector>,
}

impl AlertPublisher {
    pub fn new(transport: Arc<dyn Transport>, metrics: Arc<MetricsCollector>) -> Self {
        Self { transport, metrics }
    }

    /// Publish `alert` on `topic`, surfacing any transport error
    pub async fn publish_alert(&self, topic: &Topic, alert: &AlertMessage) -> Result<()> {
        let qos = if alert.severity == Severity::Critical {
            QoS::ExactlyOnce
        } else {
            QoS::for_topic(topic)
        };
        let body = serde_json::to_vec(alert)?;
        let topic = topic.to_string();

        match self.transport.publish(&topic, qos, body).await {
            Ok(()) => {
                tracing::debug!("Published {} alert to {}", alert.alert_type, topic);
                Ok(())
            }
            Err(e) => {
                self.metrics.incr(names::TRANSPORT_PUBLISH_FAILURES);
                tracing::error!("Failed to publish {} alert to {}: {}", alert.alert_type, topic, e);
                Err(e)
            }
        }
    }

    /// `fleet/vehicle/<id>/alert`
    pub async fn publish_safety_event(&self, event: &SafetyEvent) -> Result<()> {
        let alert = AlertMessage::from(event);
        self.publish_alert(&Topic::vehicle_alert(&event.vehicle_id), &alert).await
    }

    /// `fleet/fuel/<vehicleId>/fraud`, always exactly-once
    pub async fn publish_fraud_alert(&self, vehicle_id: &str, alert: &AlertMessage) -> Result<()> {
        let topic = Topic::fuel_fraud(vehicle_id).to_string();
        let body = serde_json::to_vec(alert)?;
        self.transport
            .publish(&topic, QoS::ExactlyOnce, body)
            .await
            .inspect_err(|e| {
                self.metrics.incr(names::TRANSPORT_PUBLISH_FAILURES);
                tracing::error!("Failed to publish fraud alert to {}: {}", topic, e);
            })
    }

    /// Fleet-wide broadcast. Failures are logged and swallowed.
    pub async fn broadcast(&self, fleet_id: &str, alert: &AlertMessage) {
        let topic = Topic::fleet_broadcast(fleet_id);
        let body = match serde_json::to_vec(alert) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Dropping broadcast {}: {}", alert.alert_type, e);
                return;
            }
        };
        if let Err(e) = self.transport.publish(&topic.to_string(), QoS::AtLeastOnce, body).await {
            self.metrics.incr(names::TRANSPORT_PUBLISH_FAILURES);
            tracing::warn!("Broadcast to {} failed: {}", topic, e);
        }
    }
}
