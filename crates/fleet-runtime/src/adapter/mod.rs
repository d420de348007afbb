//! Event adapter
//!
//! Bridges transport messages to registered partners. Messages are classified
//! by topic, dropped early when no partner wants the type, and otherwise
//! queued on a bounded buffer. A single consumer fans each event out to every
//! accepting partner in its own task, under the partner's rate limit and a
//! per-call timeout.

pub mod classify;
pub mod dispatch;
pub mod rate_limit;

pub use classify::{adapter_subscriptions, classify, classify_raw, to_adapter_event, EventClass};
pub use dispatch::{
    DispatcherSet, GrpcDispatcher, GrpcEventClient, PartnerDispatcher, RestDispatcher,
    UnconfiguredGrpcClient, WebhookDispatcher,
};
pub use rate_limit::RateLimiter;

use crate::error::{Result, RuntimeError};
use crate::observability::{names, Metrics, MetricsCollector};
use crate::transport::{QoS, Transport, TransportMessage};
use fleet_core::{AdapterEvent, PartnerSubscriber};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};

/// Event adapter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Events buffered between classification and fan-out
    pub buffer_capacity: usize,

    /// Deadline for a single partner call
    pub partner_timeout_ms: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 1000,
            partner_timeout_ms: 5000,
        }
    }
}

/// Layout of a partner registration file
#[derive(Debug, Clone, Default, Deserialize)]
struct PartnersFile {
    #[serde(default)]
    partners: Vec<PartnerSubscriber>,
}

struct Registration {
    partner: PartnerSubscriber,
    limiter: RateLimiter,
}

#[derive(Default)]
struct Registry {
    partners: RwLock<Vec<Arc<Registration>>>,
}

impl Registry {
    fn upsert(&self, partner: PartnerSubscriber) {
        let registration = Arc::new(Registration {
            limiter: RateLimiter::per_minute(partner.rate_limit_per_minute),
            partner,
        });
        let mut partners = self.partners.write().unwrap_or_else(|e| e.into_inner());
        partners.retain(|r| r.partner.id != registration.partner.id);
        partners.push(registration);
    }

    fn remove(&self, partner_id: &str) -> bool {
        let mut partners = self.partners.write().unwrap_or_else(|e| e.into_inner());
        let before = partners.len();
        partners.retain(|r| r.partner.id != partner_id);
        partners.len() != before
    }

    fn any_subscribed(&self, event_type: &str) -> bool {
        self.partners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|r| r.partner.active && r.partner.subscribes_to(event_type))
    }

    fn accepting(&self, event: &AdapterEvent) -> Vec<Arc<Registration>> {
        self.partners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.partner.accepts(event))
            .cloned()
            .collect()
    }

    fn snapshot(&self) -> Vec<PartnerSubscriber> {
        self.partners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|r| r.partner.clone())
            .collect()
    }
}

/// State shared between the adapter handle and its transport handlers
struct Shared {
    registry: Registry,
    sender: RwLock<Option<mpsc::Sender<AdapterEvent>>>,
    metrics: Arc<MetricsCollector>,
}

impl Shared {
    fn on_message(&self, message: TransportMessage) {
        let Some((topic, class)) = classify_raw(&message.topic) else {
            self.metrics.incr(names::ADAPTER_UNCLASSIFIED);
            tracing::debug!("Adapter ignoring unclassified topic {}", message.topic);
            return;
        };

        if !self.registry.any_subscribed(class.event_type) {
            return;
        }

        self.offer(to_adapter_event(&topic, class, &message));
    }

    fn offer(&self, event: AdapterEvent) -> bool {
        let guard = self.sender.read().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = guard.as_ref() else {
            self.metrics.incr(names::ADAPTER_DROPPED);
            tracing::warn!("Adapter not running, dropping {} event {}", event.event_type, event.id);
            return false;
        };

        match sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) | Err(TrySendError::Closed(event)) => {
                self.metrics.incr(names::ADAPTER_DROPPED);
                tracing::warn!(
                    "Adapter buffer unavailable, dropping {} event for {}",
                    event.event_type,
                    event.entity_id
                );
                false
            }
        }
    }
}

/// Fan-out of transport events to registered partners
pub struct EventAdapter {
    shared: Arc<Shared>,
    dispatchers: DispatcherSet,
    config: AdapterConfig,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl EventAdapter {
    pub fn new(config: AdapterConfig, dispatchers: DispatcherSet, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Registry::default(),
                sender: RwLock::new(None),
                metrics,
            }),
            dispatchers,
            config,
            consumer: Mutex::new(None),
        }
    }

    /// Register a partner, replacing any registration with the same id
    pub fn register_partner(&self, partner: PartnerSubscriber) {
        tracing::info!(
            "Registered partner {} ({}) for {:?}",
            partner.id,
            partner.protocol,
            partner.event_types
        );
        self.shared.registry.upsert(partner);
    }

    pub fn unregister_partner(&self, partner_id: &str) -> bool {
        self.shared.registry.remove(partner_id)
    }

    pub fn partners(&self) -> Vec<PartnerSubscriber> {
        self.shared.registry.snapshot()
    }

    /// Register every partner listed in a YAML file of the form
    /// `partners: [ ... ]`. Returns the number registered.
    pub fn load_partners_yaml(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RuntimeError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        self.load_partners_str(&content)
    }

    pub fn load_partners_str(&self, yaml: &str) -> Result<usize> {
        let file: PartnersFile =
            serde_yaml::from_str(yaml).map_err(|e| RuntimeError::Config(format!("invalid partners file: {}", e)))?;
        let count = file.partners.len();
        for partner in file.partners {
            self.register_partner(partner);
        }
        Ok(count)
    }

    pub fn is_running(&self) -> bool {
        self.shared.sender.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Start the consumer and subscribe to every adapter topic
    pub async fn start(&self, transport: &dyn Transport) -> Result<()> {
        {
            let mut consumer = self.consumer.lock().await;
            if consumer.is_some() {
                return Ok(());
            }
            let (tx, rx) = mpsc::channel(self.config.buffer_capacity.max(1));
            *self.shared.sender.write().unwrap_or_else(|e| e.into_inner()) = Some(tx);

            let fanout = Fanout {
                shared: self.shared.clone(),
                dispatchers: self.dispatchers.clone(),
                timeout: Duration::from_millis(self.config.partner_timeout_ms.max(1)),
            };
            *consumer = Some(tokio::spawn(fanout.run(rx)));
        }

        for pattern in adapter_subscriptions() {
            let shared = self.shared.clone();
            transport
                .subscribe(
                    &pattern.to_string(),
                    QoS::AtLeastOnce,
                    Arc::new(move |message: TransportMessage| shared.on_message(message)),
                )
                .await?;
        }
        tracing::info!("Event adapter started on {}", transport.name());
        Ok(())
    }

    /// Classify and enqueue a raw transport message
    pub fn handle_message(&self, message: TransportMessage) {
        self.shared.on_message(message);
    }

    /// Enqueue an already built event. Returns false when it was dropped.
    pub fn offer(&self, event: AdapterEvent) -> bool {
        self.shared.offer(event)
    }

    /// Stop accepting events and wait for queued and in-flight deliveries
    pub async fn shutdown(&self) {
        let sender = self.shared.sender.write().unwrap_or_else(|e| e.into_inner()).take();
        drop(sender);
        if let Some(handle) = self.consumer.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::error!("Event adapter consumer failed: {}", e);
            }
        }
    }
}

struct Fanout {
    shared: Arc<Shared>,
    dispatchers: DispatcherSet,
    timeout: Duration,
}

impl Fanout {
    async fn run(self, mut rx: mpsc::Receiver<AdapterEvent>) {
        let mut deliveries: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => self.fan_out(Arc::new(event), &mut deliveries),
                    None => break,
                },
                Some(finished) = deliveries.join_next(), if !deliveries.is_empty() => {
                    self.reap(finished);
                }
            }
        }

        while let Some(finished) = deliveries.join_next().await {
            self.reap(finished);
        }
        tracing::info!("Event adapter stopped");
    }

    fn fan_out(&self, event: Arc<AdapterEvent>, deliveries: &mut JoinSet<()>) {
        for registration in self.shared.registry.accepting(&event) {
            let event = event.clone();
            let dispatcher = self.dispatchers.get(registration.partner.protocol);
            let metrics = self.shared.metrics.clone();
            let timeout = self.timeout;

            deliveries.spawn(async move {
                let partner = &registration.partner;
                if !registration.limiter.try_acquire() {
                    metrics.incr(names::ADAPTER_RATE_LIMITED);
                    tracing::warn!("{}", RuntimeError::RateLimited(partner.id.clone()));
                    return;
                }

                let outcome = match dispatcher {
                    Some(dispatcher) => {
                        match tokio::time::timeout(timeout, dispatcher.dispatch(partner, &event)).await {
                            Ok(result) => result,
                            Err(_) => Err(RuntimeError::Timeout(timeout.as_millis() as u64)),
                        }
                    }
                    None => Err(RuntimeError::Dispatch {
                        partner: partner.id.clone(),
                        reason: format!("no dispatcher for protocol {}", partner.protocol),
                    }),
                };

                match outcome {
                    Ok(()) => {
                        metrics.incr(names::ADAPTER_DELIVERED);
                        tracing::debug!("Delivered {} event {} to {}", event.event_type, event.id, partner.id);
                    }
                    Err(e) => {
                        metrics.incr(names::ADAPTER_DELIVERY_FAILURES);
                        tracing::warn!(
                            "Delivery of {} event {} to partner {} failed: {}",
                            event.event_type,
                            event.id,
                            partner.id,
                            e
                        );
                    }
                }
            });
        }
    }

    fn reap(&self, finished: std::result::Result<(), tokio::task::JoinError>) {
        if let Err(e) = finished {
            self.shared.metrics.incr(names::ADAPTER_DELIVERY_FAILURES);
            tracing::error!("Partner delivery task failed: {}", e);
        }
    }
}
