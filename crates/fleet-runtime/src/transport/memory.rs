//! In-process broker

use super::{MessageHandler, QoS, Transport, TransportMessage};
use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleet_core::topic_matches;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Published message record
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub qos: QoS,
    pub payload: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

impl PublishedMessage {
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.payload).ok()
    }
}

struct Subscription {
    pattern: String,
    handler: Arc<dyn MessageHandler>,
}

/// Broker living inside the process.
///
/// Delivers every publish synchronously to matching subscribers and keeps a
/// record of what was published. Used when no broker URL is configured and
/// as the transport in tests.
pub struct InMemoryBroker {
    name: String,
    subscriptions: RwLock<Vec<Subscription>>,
    published: Mutex<Vec<PublishedMessage>>,
    fail_publish: AtomicBool,
    connected: AtomicBool,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_name("in_memory")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscriptions: RwLock::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            fail_publish: AtomicBool::new(false),
            connected: AtomicBool::new(true),
        }
    }

    /// Make every publish fail until turned off again
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// All published messages (for verification in tests)
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Published messages whose topic matches `pattern`
    pub fn published_to(&self, pattern: &str) -> Vec<PublishedMessage> {
        self.published()
            .into_iter()
            .filter(|m| topic_matches(pattern, &m.topic))
            .collect()
    }

    pub fn clear_published(&self) {
        self.published.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryBroker {
    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<()> {
        if !self.is_connected() {
            return Err(RuntimeError::Publish {
                topic: topic.to_string(),
                reason: "broker disconnected".to_string(),
            });
        }
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(RuntimeError::Publish {
                topic: topic.to_string(),
                reason: "simulated publish failure".to_string(),
            });
        }

        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(PublishedMessage {
                topic: topic.to_string(),
                qos,
                payload: payload.clone(),
                timestamp: Utc::now(),
            });

        // Collect handlers first so none runs under the lock
        let handlers: Vec<Arc<dyn MessageHandler>> = self
            .subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| topic_matches(&s.pattern, topic))
            .map(|s| s.handler.clone())
            .collect();

        for handler in handlers {
            handler.handle(TransportMessage::new(topic, qos, payload.clone()));
        }
        Ok(())
    }

    async fn subscribe(&self, pattern: &str, _qos: QoS, handler: Arc<dyn MessageHandler>) -> Result<()> {
        tracing::debug!("{}: subscribed to {}", self.name, pattern);
        self.subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Subscription {
                pattern: pattern.to_string(),
                handler,
            });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.subscriptions.write().unwrap_or_else(|e| e.into_inner()).clear();
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
