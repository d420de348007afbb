//! Publish/subscribe transport
//!
//! Every component talks to the broker through the [`Transport`] trait.
//! Topics follow `fleet/<entity>/<id>/<facet>` (see [`fleet_core::Topic`]).

mod backoff;
mod memory;
#[cfg(feature = "mqtt")]
mod mqtt;

pub use backoff::ReconnectBackoff;
pub use memory::{InMemoryBroker, PublishedMessage};
#[cfg(feature = "mqtt")]
pub use mqtt::MqttTransport;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleet_core::topic::facet;
use fleet_core::Topic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Delivery guarantee requested from the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl QoS {
    /// Delivery level for a topic facet.
    ///
    /// Emergency and critical channels get exactly-once; location, status and
    /// everything else at-least-once.
    pub fn for_facet(name: &str) -> Self {
        match name {
            facet::EMERGENCY | facet::CRITICAL => QoS::ExactlyOnce,
            _ => QoS::AtLeastOnce,
        }
    }

    pub fn for_topic(topic: &Topic) -> Self {
        topic.facet_name().map(Self::for_facet).unwrap_or(QoS::AtLeastOnce)
    }

    pub fn level(&self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

/// Message delivered to a subscription handler
#[derive(Debug, Clone, PartialEq)]
pub struct TransportMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub received_at: DateTime<Utc>,
}

impl TransportMessage {
    pub fn new(topic: impl Into<String>, qos: QoS, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            qos,
            received_at: Utc::now(),
        }
    }

    /// Decode the payload as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Payload as JSON value, falling back to a string for non-JSON bodies
    pub fn payload_value(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&self.payload).into_owned())
        })
    }
}

/// Callback invoked for every message matching a subscription.
///
/// Handlers run on the transport's delivery path and must not block.
pub trait MessageHandler: Send + Sync + 'static {
    fn handle(&self, message: TransportMessage);
}

impl<F> MessageHandler for F
where
    F: Fn(TransportMessage) + Send + Sync + 'static,
{
    fn handle(&self, message: TransportMessage) {
        self(message)
    }
}

/// Broker connection
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish a payload. Errors mean the broker did not accept the message.
    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<()>;

    /// Register `handler` for every topic matching `pattern` (MQTT wildcards)
    async fn subscribe(&self, pattern: &str, qos: QoS, handler: Arc<dyn MessageHandler>) -> Result<()>;

    /// Close the connection
    async fn disconnect(&self) -> Result<()>;

    /// Transport name for logging
    fn name(&self) -> &str;
}

/// Serialize `payload` as JSON and publish it with the facet's QoS
pub async fn publish_json<T: Serialize + ?Sized>(
    transport: &dyn Transport,
    topic: &Topic,
    payload: &T,
) -> Result<()> {
    let body = serde_json::to_vec(payload)?;
    transport.publish(&topic.to_string(), QoS::for_topic(topic), body).await
}

fn default_client_id() -> String {
    format!("fleet-core-{}", uuid::Uuid::new_v4().simple())
}

/// Broker connection settings
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// `mqtt://host:port`; empty selects the in-process broker
    pub broker_url: String,

    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,

    pub keep_alive_secs: u64,

    /// Deadline for the first ConnAck at startup
    pub connect_timeout_ms: u64,

    /// First reconnect delay
    pub reconnect_initial_ms: u64,

    /// Reconnect delay cap
    pub reconnect_max_secs: u64,

    /// Outgoing request queue of the client
    pub channel_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            broker_url: String::new(),
            client_id: default_client_id(),
            username: None,
            password: None,
            keep_alive_secs: 60,
            connect_timeout_ms: 10_000,
            reconnect_initial_ms: 1_000,
            reconnect_max_secs: 300,
            channel_capacity: 1024,
        }
    }
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("broker_url", &self.broker_url)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("keep_alive_secs", &self.keep_alive_secs)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("reconnect_initial_ms", &self.reconnect_initial_ms)
            .field("reconnect_max_secs", &self.reconnect_max_secs)
            .field("channel_capacity", &self.channel_capacity)
            .finish()
    }
}

impl TransportConfig {
    pub fn backoff(&self) -> ReconnectBackoff {
        ReconnectBackoff::new(
            std::time::Duration::from_millis(self.reconnect_initial_ms),
            std::time::Duration::from_secs(self.reconnect_max_secs),
        )
    }
}
