//! Partner dispatch
//!
//! One dispatcher per wire protocol. Dispatchers fire a single call and report
//! the outcome; retries and timeouts belong to the caller.

use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use fleet_core::{AdapterEvent, PartnerProtocol, PartnerSubscriber};
use std::collections::HashMap;
use std::sync::Arc;

/// Header carrying the dotted event type on webhook calls
pub const EVENT_TYPE_HEADER: &str = "X-Fleet-Event-Type";

/// Header carrying the partner id on webhook calls
pub const PARTNER_HEADER: &str = "X-Fleet-Partner";

/// Delivers one event to one partner
#[async_trait]
pub trait PartnerDispatcher: Send + Sync {
    async fn dispatch(&self, partner: &PartnerSubscriber, event: &AdapterEvent) -> Result<()>;
}

fn dispatch_error(partner: &PartnerSubscriber, reason: impl Into<String>) -> RuntimeError {
    RuntimeError::Dispatch {
        partner: partner.id.clone(),
        reason: reason.into(),
    }
}

async fn send_checked(partner: &PartnerSubscriber, request: reqwest::RequestBuilder) -> Result<()> {
    let request = match &partner.api_key {
        Some(key) => request.bearer_auth(key),
        None => request,
    };

    let response = request
        .send()
        .await
        .map_err(|e| dispatch_error(partner, format!("HTTP request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(dispatch_error(partner, format!("HTTP status {}", response.status())));
    }
    Ok(())
}

/// JSON POST of the envelope to the partner endpoint
#[derive(Clone, Default)]
pub struct RestDispatcher {
    client: reqwest::Client,
}

impl RestDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PartnerDispatcher for RestDispatcher {
    async fn dispatch(&self, partner: &PartnerSubscriber, event: &AdapterEvent) -> Result<()> {
        let request = self.client.post(&partner.endpoint).json(event);
        send_checked(partner, request).await
    }
}

/// POST of the envelope with routing headers, for generic webhook receivers
#[derive(Clone, Default)]
pub struct WebhookDispatcher {
    client: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PartnerDispatcher for WebhookDispatcher {
    async fn dispatch(&self, partner: &PartnerSubscriber, event: &AdapterEvent) -> Result<()> {
        let request = self
            .client
            .post(&partner.endpoint)
            .header(EVENT_TYPE_HEADER, event.event_type.as_str())
            .header(PARTNER_HEADER, partner.id.as_str())
            .json(event);
        send_checked(partner, request).await
    }
}

/// Client for partners reached over gRPC
///
/// The wire contract is partner-specific; deployments inject a generated
/// client behind this trait.
#[async_trait]
pub trait GrpcEventClient: Send + Sync {
    async fn send_event(&self, endpoint: &str, event: &AdapterEvent) -> Result<()>;
}

/// Client used when no gRPC integration has been wired in
#[derive(Debug, Default)]
pub struct UnconfiguredGrpcClient;

#[async_trait]
impl GrpcEventClient for UnconfiguredGrpcClient {
    async fn send_event(&self, endpoint: &str, _event: &AdapterEvent) -> Result<()> {
        Err(RuntimeError::Dispatch {
            partner: endpoint.to_string(),
            reason: "no gRPC client configured".to_string(),
        })
    }
}

pub struct GrpcDispatcher {
    client: Arc<dyn GrpcEventClient>,
}

impl GrpcDispatcher {
    pub fn new(client: Arc<dyn GrpcEventClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PartnerDispatcher for GrpcDispatcher {
    async fn dispatch(&self, partner: &PartnerSubscriber, event: &AdapterEvent) -> Result<()> {
        self.client
            .send_event(&partner.endpoint, event)
            .await
            .map_err(|e| match e {
                RuntimeError::Dispatch { reason, .. } => dispatch_error(partner, reason),
                other => other,
            })
    }
}

/// Dispatchers keyed by protocol
#[derive(Clone)]
pub struct DispatcherSet {
    dispatchers: HashMap<PartnerProtocol, Arc<dyn PartnerDispatcher>>,
}

impl DispatcherSet {
    /// An empty set; every partner fails until a dispatcher is registered
    pub fn empty() -> Self {
        Self {
            dispatchers: HashMap::new(),
        }
    }

    /// REST and webhook over one shared HTTP client, gRPC unconfigured
    pub fn standard() -> Self {
        let client = reqwest::Client::new();
        Self::empty()
            .with(PartnerProtocol::Rest, Arc::new(RestDispatcher::with_client(client.clone())))
            .with(PartnerProtocol::Webhook, Arc::new(WebhookDispatcher::with_client(client)))
            .with(
                PartnerProtocol::Grpc,
                Arc::new(GrpcDispatcher::new(Arc::new(UnconfiguredGrpcClient))),
            )
    }

    pub fn with(mut self, protocol: PartnerProtocol, dispatcher: Arc<dyn PartnerDispatcher>) -> Self {
        self.dispatchers.insert(protocol, dispatcher);
        self
    }

    pub fn get(&self, protocol: PartnerProtocol) -> Option<Arc<dyn PartnerDispatcher>> {
        self.dispatchers.get(&protocol).cloned()
    }
}

impl Default for DispatcherSet {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fleet_core::{EntityKind, Priority};
    use uuid::Uuid;

    fn event() -> AdapterEvent {
        AdapterEvent {
            id: Uuid::new_v4(),
            event_type: "fuel.theft".to_string(),
            entity_type: EntityKind::Fuel,
            entity_id: "v1".to_string(),
            action: "detected".to_string(),
            payload: serde_json::json!({"liters": 80}),
            timestamp: Utc::now(),
            priority: Priority::Critical,
            source: "fleet/fuel/v1/theft".to_string(),
        }
    }

    fn partner(protocol: PartnerProtocol, endpoint: String) -> PartnerSubscriber {
        PartnerSubscriber::new("acme", protocol, endpoint, vec!["*".to_string()])
    }

    #[tokio::test]
    async fn test_rest_posts_json_with_bearer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/events")
            .match_header("authorization", "Bearer secret")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({"type": "fuel.theft"})))
            .with_status(202)
            .create_async()
            .await;

        let mut subscriber = partner(PartnerProtocol::Rest, format!("{}/events", server.url()));
        subscriber.api_key = Some("secret".to_string());

        RestDispatcher::new().dispatch(&subscriber, &event()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_webhook_sets_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_header(EVENT_TYPE_HEADER, "fuel.theft")
            .match_header(PARTNER_HEADER, "acme")
            .with_status(200)
            .create_async()
            .await;

        let subscriber = partner(PartnerProtocol::Webhook, format!("{}/hook", server.url()));
        WebhookDispatcher::new().dispatch(&subscriber, &event()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("POST", "/events").with_status(503).create_async().await;

        let subscriber = partner(PartnerProtocol::Rest, format!("{}/events", server.url()));
        let err = RestDispatcher::new().dispatch(&subscriber, &event()).await.unwrap_err();

        match err {
            RuntimeError::Dispatch { partner, reason } => {
                assert_eq!(partner, "acme");
                assert!(reason.contains("503"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unconfigured_grpc_fails_with_partner_id() {
        let subscriber = partner(PartnerProtocol::Grpc, "grpc://acme:50051".to_string());
        let dispatcher = DispatcherSet::standard().get(PartnerProtocol::Grpc).unwrap();
        let err = dispatcher.dispatch(&subscriber, &event()).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Dispatch { ref partner, .. } if partner == "acme"));
    }

    #[test]
    fn test_empty_set_has_no_dispatchers() {
        assert!(DispatcherSet::empty().get(PartnerProtocol::Rest).is_none());
        assert!(DispatcherSet::standard().get(PartnerProtocol::Webhook).is_some());
    }
}
