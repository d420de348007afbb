//! Topic to event classification
//!
//! A message is classified from its parsed topic through a fixed lookup
//! table. Topics missing from the table are not forwarded.

use crate::transport::TransportMessage;
use chrono::Utc;
use fleet_core::topic::facet;
use fleet_core::{AdapterEvent, EntityKind, Priority, Topic};
use uuid::Uuid;

/// Classification of one (entity, facet) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventClass {
    pub event_type: &'static str,
    pub action: &'static str,
    pub priority: Priority,
}

const fn class(event_type: &'static str, action: &'static str, priority: Priority) -> EventClass {
    EventClass {
        event_type,
        action,
        priority,
    }
}

const RULES: &[(EntityKind, &str, EventClass)] = &[
    (EntityKind::Vehicle, facet::LOCATION, class("vehicle.location", "updated", Priority::Low)),
    (EntityKind::Vehicle, facet::STATUS, class("vehicle.status", "updated", Priority::Normal)),
    (EntityKind::Vehicle, facet::ALERT, class("vehicle.alert", "raised", Priority::High)),
    (EntityKind::Vehicle, facet::EMERGENCY, class("vehicle.emergency", "raised", Priority::Critical)),
    (EntityKind::Driver, facet::STATUS, class("driver.status", "updated", Priority::Normal)),
    (EntityKind::Driver, facet::ALERT, class("driver.alert", "raised", Priority::High)),
    (EntityKind::Trip, facet::LOCATION, class("trip.location", "updated", Priority::Low)),
    (EntityKind::Trip, facet::STARTED, class("trip.started", "started", Priority::Normal)),
    (EntityKind::Trip, facet::COMPLETED, class("trip.completed", "completed", Priority::Normal)),
    (EntityKind::Trip, facet::DEVIATION, class("trip.deviation", "detected", Priority::High)),
    (EntityKind::Fuel, facet::FILL, class("fuel.fill", "recorded", Priority::Normal)),
    (EntityKind::Fuel, facet::FRAUD, class("fuel.fraud", "detected", Priority::High)),
    (EntityKind::Fuel, facet::THEFT, class("fuel.theft", "detected", Priority::Critical)),
    (EntityKind::Fleet, facet::ALERT, class("fleet.alert", "raised", Priority::High)),
    (EntityKind::Fleet, facet::EMERGENCY, class("fleet.emergency", "raised", Priority::Critical)),
    (EntityKind::Fleet, facet::CRITICAL, class("fleet.critical", "raised", Priority::Critical)),
    (EntityKind::Fleet, facet::BROADCAST, class("fleet.broadcast", "broadcast", Priority::Normal)),
];

/// Patterns the adapter subscribes to
pub fn adapter_subscriptions() -> Vec<Topic> {
    [
        EntityKind::Vehicle,
        EntityKind::Driver,
        EntityKind::Trip,
        EntityKind::Fuel,
        EntityKind::Fleet,
    ]
    .into_iter()
    .map(Topic::everything)
    .collect()
}

/// Look up the class of a concrete topic
pub fn classify(topic: &Topic) -> Option<EventClass> {
    let facet_name = topic.facet_name()?;
    RULES
        .iter()
        .find(|(entity, name, _)| *entity == topic.entity && *name == facet_name)
        .map(|(_, _, class)| *class)
}

/// Parse and classify a raw topic string
pub fn classify_raw(raw: &str) -> Option<(Topic, EventClass)> {
    let topic = Topic::parse(raw).ok()?;
    if topic.is_pattern() {
        return None;
    }
    let class = classify(&topic)?;
    Some((topic, class))
}

/// Build the canonical envelope for a classified message
pub fn to_adapter_event(topic: &Topic, class: EventClass, message: &TransportMessage) -> AdapterEvent {
    AdapterEvent {
        id: Uuid::new_v4(),
        event_type: class.event_type.to_string(),
        entity_type: topic.entity,
        entity_id: topic.entity_id().unwrap_or_default().to_string(),
        action: class.action.to_string(),
        payload: message.payload_value(),
        timestamp: Utc::now(),
        priority: class.priority,
        source: message.topic.clone(),
    }
}
