//! MQTT transport over `rumqttc`

use super::{MessageHandler, QoS, ReconnectBackoff, Transport, TransportConfig, TransportMessage};
use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use fleet_core::topic_matches;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;

const DEFAULT_PORT: u16 = 1883;

impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
            QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

impl From<rumqttc::QoS> for QoS {
    fn from(qos: rumqttc::QoS) -> Self {
        match qos {
            rumqttc::QoS::AtMostOnce => QoS::AtMostOnce,
            rumqttc::QoS::AtLeastOnce => QoS::AtLeastOnce,
            rumqttc::QoS::ExactlyOnce => QoS::ExactlyOnce,
        }
    }
}

/// Split `mqtt://host:port` (or `tcp://`, or bare `host:port`) into host and port
fn parse_broker_url(url: &str) -> Result<(String, u16)> {
    let rest = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);
    let rest = rest.trim_end_matches('/');

    match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| RuntimeError::Connect(format!("invalid port in broker url '{}'", url)))?;
            Ok((host.to_string(), port))
        }
        None if !rest.is_empty() => Ok((rest.to_string(), DEFAULT_PORT)),
        None => Err(RuntimeError::Connect("empty broker url".to_string())),
    }
}

#[derive(Clone)]
struct Subscription {
    pattern: String,
    qos: QoS,
    handler: Arc<dyn MessageHandler>,
}

type Subscriptions = Arc<RwLock<Vec<Subscription>>>;

/// Transport backed by an MQTT broker.
///
/// Uses clean sessions: nothing queued while disconnected is replayed. Every
/// ConnAck re-registers all subscriptions.
pub struct MqttTransport {
    name: String,
    client: AsyncClient,
    subscriptions: Subscriptions,
    shutdown_tx: watch::Sender<bool>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl MqttTransport {
    /// Connect and wait for the first ConnAck.
    ///
    /// Failing to connect within `connect_timeout_ms` is fatal; later
    /// disconnects are retried with bounded exponential backoff.
    pub async fn connect(config: &TransportConfig) -> Result<Self> {
        let (host, port) = parse_broker_url(&config.broker_url)?;

        let mut options = MqttOptions::new(config.client_id.clone(), host.clone(), port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
        options.set_clean_session(true);
        if let Some(username) = &config.username {
            options.set_credentials(username.clone(), config.password.clone().unwrap_or_default());
        }

        let (client, eventloop) = AsyncClient::new(options, config.channel_capacity.max(1));
        let subscriptions: Subscriptions = Arc::new(RwLock::new(Vec::new()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (connected_tx, connected_rx) = oneshot::channel();

        let event_task = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            subscriptions.clone(),
            config.backoff(),
            connected_tx,
            shutdown_rx,
        ));

        let timeout = Duration::from_millis(config.connect_timeout_ms);
        match tokio::time::timeout(timeout, connected_rx).await {
            Ok(Ok(())) => {
                tracing::info!("Connected to MQTT broker {}:{} as {}", host, port, config.client_id);
            }
            _ => {
                let _ = shutdown_tx.send(true);
                event_task.abort();
                return Err(RuntimeError::Connect(format!(
                    "no ConnAck from {}:{} within {} ms",
                    host, port, config.connect_timeout_ms
                )));
            }
        }

        Ok(Self {
            name: format!("mqtt://{}:{}", host, port),
            client,
            subscriptions,
            shutdown_tx,
            event_task: Mutex::new(Some(event_task)),
        })
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    subscriptions: Subscriptions,
    mut backoff: ReconnectBackoff,
    connected_tx: oneshot::Sender<()>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut connected_tx = Some(connected_tx);

    loop {
        let event = tokio::select! {
            _ = shutdown_rx.changed() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                backoff.reset();
                if let Some(tx) = connected_tx.take() {
                    let _ = tx.send(());
                } else {
                    tracing::info!("Reconnected to MQTT broker");
                }
                resubscribe(&client, &subscriptions);
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = TransportMessage::new(publish.topic.clone(), publish.qos.into(), publish.payload.to_vec());
                let handlers: Vec<Arc<dyn MessageHandler>> = subscriptions
                    .read()
                    .unwrap_or_else(|e| e.into_inner())
                    .iter()
                    .filter(|s| topic_matches(&s.pattern, &publish.topic))
                    .map(|s| s.handler.clone())
                    .collect();
                for handler in handlers {
                    handler.handle(message.clone());
                }
            }
            Ok(_) => {}
            Err(e) => {
                let delay = backoff.next_delay();
                tracing::warn!(
                    "MQTT connection error (attempt {}): {}; retrying in {:?}",
                    backoff.attempt(),
                    e,
                    delay
                );
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    tracing::debug!("MQTT event loop stopped");
}

fn resubscribe(client: &AsyncClient, subscriptions: &Subscriptions) {
    let subscriptions: Vec<Subscription> = subscriptions.read().unwrap_or_else(|e| e.into_inner()).clone();
    for sub in subscriptions {
        // The event loop drives the request channel, so never await here
        if let Err(e) = client.try_subscribe(sub.pattern.clone(), sub.qos.into()) {
            tracing::error!("Failed to re-subscribe to {}: {}", sub.pattern, e);
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(topic, qos.into(), false, payload)
            .await
            .map_err(|e| RuntimeError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn subscribe(&self, pattern: &str, qos: QoS, handler: Arc<dyn MessageHandler>) -> Result<()> {
        self.subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Subscription {
                pattern: pattern.to_string(),
                qos,
                handler,
            });

        self.client
            .subscribe(pattern, qos.into())
            .await
            .map_err(|e| RuntimeError::Subscribe {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!("Subscribed to {} (qos {})", pattern, qos.level());
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Err(e) = self.client.disconnect().await {
            tracing::debug!("MQTT disconnect request failed: {}", e);
        }
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.event_task.lock().await.take() {
            let _ = task.await;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_broker_url() {
        assert_eq!(parse_broker_url("mqtt://broker:1884").unwrap(), ("broker".to_string(), 1884));
        assert_eq!(parse_broker_url("tcp://10.0.0.1:1883/").unwrap(), ("10.0.0.1".to_string(), 1883));
        assert_eq!(parse_broker_url("localhost").unwrap(), ("localhost".to_string(), DEFAULT_PORT));
        assert!(parse_broker_url("mqtt://broker:notaport").is_err());
        assert!(parse_broker_url("").is_err());
    }

    #[test]
    fn test_qos_conversion() {
        assert_eq!(rumqttc::QoS::from(QoS::ExactlyOnce), rumqttc::QoS::ExactlyOnce);
        assert_eq!(QoS::from(rumqttc::QoS::AtLeastOnce), QoS::AtLeastOnce);
    }

    #[tokio::test]
    async fn test_connect_times_out_without_broker() {
        let config = TransportConfig {
            broker_url: "mqtt://127.0.0.1:1".to_string(),
            connect_timeout_ms: 200,
            reconnect_initial_ms: 50,
            ..TransportConfig::default()
        };
        let result = MqttTransport::connect(&config).await;
        assert!(matches!(result, Err(RuntimeError::Connect(_))));
    }
}
