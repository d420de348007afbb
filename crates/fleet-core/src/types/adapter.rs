//! Canonical adapter envelope and partner registrations

use crate::topic::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Delivery priority, 1 (low) to 4 (critical)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    pub fn level(&self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Normal => 2,
            Priority::High => 3,
            Priority::Critical => 4,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level())
    }
}

/// Envelope handed to partner dispatchers. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterEvent {
    pub id: Uuid,

    /// Dotted event type, e.g. `vehicle.location`, `fuel.theft`
    #[serde(rename = "type")]
    pub event_type: String,

    pub entity_type: EntityKind,
    pub entity_id: String,

    /// Verb describing what happened (`updated`, `detected`, `raised` ...)
    pub action: String,

    /// Original message body; JSON when the message parsed as JSON
    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,
    pub priority: Priority,

    /// Topic the event was converted from
    pub source: String,
}

/// Wire protocol used to reach a partner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartnerProtocol {
    Grpc,
    Rest,
    Webhook,
}

impl fmt::Display for PartnerProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PartnerProtocol::Grpc => "grpc",
            PartnerProtocol::Rest => "rest",
            PartnerProtocol::Webhook => "webhook",
        };
        f.write_str(name)
    }
}

/// Entity predicate a partner applies on top of event types.
///
/// Empty lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityFilter {
    #[serde(default)]
    pub entity_types: Vec<EntityKind>,

    #[serde(default)]
    pub entity_ids: Vec<String>,

    #[serde(default)]
    pub min_priority: Option<Priority>,
}

impl EntityFilter {
    pub fn matches(&self, event: &AdapterEvent) -> bool {
        if !self.entity_types.is_empty() && !self.entity_types.contains(&event.entity_type) {
            return false;
        }
        if !self.entity_ids.is_empty() && !self.entity_ids.iter().any(|id| id == &event.entity_id) {
            return false;
        }
        match self.min_priority {
            Some(min) => event.priority >= min,
            None => true,
        }
    }
}

fn default_active() -> bool {
    true
}

/// An external partner registered for event fan-out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerSubscriber {
    pub id: String,
    pub name: String,
    pub protocol: PartnerProtocol,
    pub endpoint: String,

    /// Exact types, `*`, or a `prefix.*` family such as `fuel.*`
    pub event_types: Vec<String>,

    #[serde(default)]
    pub filter: EntityFilter,

    /// Maximum deliveries per minute; 0 disables limiting
    #[serde(default)]
    pub rate_limit_per_minute: u32,

    #[serde(default = "default_active")]
    pub active: bool,

    /// Sent as a bearer token by HTTP dispatchers
    #[serde(default)]
    pub api_key: Option<String>,
}

impl PartnerSubscriber {
    pub fn new(
        id: impl Into<String>,
        protocol: PartnerProtocol,
        endpoint: impl Into<String>,
        event_types: Vec<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            protocol,
            endpoint: endpoint.into(),
            event_types,
            filter: EntityFilter::default(),
            rate_limit_per_minute: 0,
            active: true,
            api_key: None,
        }
    }

    pub fn with_filter(mut self, filter: EntityFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_rate_limit(mut self, per_minute: u32) -> Self {
        self.rate_limit_per_minute = per_minute;
        self
    }

    /// Whether the partner asked for this event type
    pub fn subscribes_to(&self, event_type: &str) -> bool {
        self.event_types.iter().any(|pattern| {
            if pattern == "*" || pattern == event_type {
                return true;
            }
            match pattern.strip_suffix(".*") {
                Some(prefix) => event_type
                    .strip_prefix(prefix)
                    .map_or(false, |rest| rest.starts_with('.')),
                None => false,
            }
        })
    }

    /// Active, subscribed to the type and passing the entity filter
    pub fn accepts(&self, event: &AdapterEvent) -> bool {
        self.active && self.subscribes_to(&event.event_type) && self.filter.matches(event)
    }
}
