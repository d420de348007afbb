//! Topic grammar
//!
//! Topics follow `fleet/<entity>/<id>/<facet>`. Subscription patterns may use
//! `+` for the id or facet segment and `#` as the final segment.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Root segment of every topic
pub const TOPIC_ROOT: &str = "fleet";

/// Well-known facet names
pub mod facet {
    pub const LOCATION: &str = "location";
    pub const STATUS: &str = "status";
    pub const ALERT: &str = "alert";
    pub const EMERGENCY: &str = "emergency";
    pub const CRITICAL: &str = "critical";
    pub const FILL: &str = "fill";
    pub const THEFT: &str = "theft";
    pub const FRAUD: &str = "fraud";
    pub const DEVIATION: &str = "deviation";
    pub const STARTED: &str = "started";
    pub const COMPLETED: &str = "completed";
    pub const BROADCAST: &str = "broadcast";
}

/// Entity segment of a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Vehicle,
    Driver,
    Trip,
    Fuel,
    Fleet,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Vehicle => "vehicle",
            EntityKind::Driver => "driver",
            EntityKind::Trip => "trip",
            EntityKind::Fuel => "fuel",
            EntityKind::Fleet => "fleet",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "vehicle" => Ok(EntityKind::Vehicle),
            "driver" => Ok(EntityKind::Driver),
            "trip" => Ok(EntityKind::Trip),
            "fuel" => Ok(EntityKind::Fuel),
            "fleet" => Ok(EntityKind::Fleet),
            other => Err(CoreError::InvalidValue(format!("unknown entity '{}'", other))),
        }
    }
}

/// Id segment: a concrete id or the single-level wildcard
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TopicId {
    Id(String),
    Any,
}

/// Facet segment: a name, the single-level wildcard, or the trailing multi-level wildcard
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TopicFacet {
    Name(String),
    Any,
    Rest,
}

/// A parsed topic or subscription pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    pub entity: EntityKind,
    pub id: TopicId,
    pub facet: TopicFacet,
}

impl Topic {
    /// Concrete topic for an entity id and facet
    pub fn new(entity: EntityKind, id: impl Into<String>, facet: impl Into<String>) -> Self {
        Self {
            entity,
            id: TopicId::Id(id.into()),
            facet: TopicFacet::Name(facet.into()),
        }
    }

    /// Pattern matching one facet across every id of an entity kind
    pub fn all(entity: EntityKind, facet: impl Into<String>) -> Self {
        Self {
            entity,
            id: TopicId::Any,
            facet: TopicFacet::Name(facet.into()),
        }
    }

    /// Pattern matching everything under an entity kind
    pub fn everything(entity: EntityKind) -> Self {
        Self {
            entity,
            id: TopicId::Any,
            facet: TopicFacet::Rest,
        }
    }

    pub fn vehicle_location(vehicle_id: &str) -> Self {
        Self::new(EntityKind::Vehicle, vehicle_id, facet::LOCATION)
    }

    pub fn vehicle_status(vehicle_id: &str) -> Self {
        Self::new(EntityKind::Vehicle, vehicle_id, facet::STATUS)
    }

    pub fn vehicle_alert(vehicle_id: &str) -> Self {
        Self::new(EntityKind::Vehicle, vehicle_id, facet::ALERT)
    }

    pub fn fuel_fraud(vehicle_id: &str) -> Self {
        Self::new(EntityKind::Fuel, vehicle_id, facet::FRAUD)
    }

    pub fn fleet_alert(fleet_id: &str) -> Self {
        Self::new(EntityKind::Fleet, fleet_id, facet::ALERT)
    }

    pub fn fleet_emergency(fleet_id: &str) -> Self {
        Self::new(EntityKind::Fleet, fleet_id, facet::EMERGENCY)
    }

    pub fn fleet_broadcast(fleet_id: &str) -> Self {
        Self::new(EntityKind::Fleet, fleet_id, facet::BROADCAST)
    }

    /// `fleet/vehicle/+/location`
    pub fn all_vehicle_locations() -> Self {
        Self::all(EntityKind::Vehicle, facet::LOCATION)
    }

    /// Whether the topic contains wildcard segments
    pub fn is_pattern(&self) -> bool {
        matches!(self.id, TopicId::Any) || !matches!(self.facet, TopicFacet::Name(_))
    }

    /// Concrete id, if any
    pub fn entity_id(&self) -> Option<&str> {
        match &self.id {
            TopicId::Id(id) => Some(id),
            TopicId::Any => None,
        }
    }

    /// Concrete facet name, if any
    pub fn facet_name(&self) -> Option<&str> {
        match &self.facet {
            TopicFacet::Name(name) => Some(name),
            _ => None,
        }
    }

    /// Parse a topic or pattern string
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| CoreError::InvalidTopic {
            topic: raw.to_string(),
            reason: reason.to_string(),
        };

        let segments: Vec<&str> = raw.split('/').collect();
        if segments.len() != 4 {
            return Err(invalid("expected fleet/<entity>/<id>/<facet>"));
        }
        if segments[0] != TOPIC_ROOT {
            return Err(invalid("topic must start with 'fleet'"));
        }

        let entity = segments[1]
            .parse::<EntityKind>()
            .map_err(|_| invalid("unknown entity segment"))?;

        let id = match segments[2] {
            "" => return Err(invalid("empty id segment")),
            "+" => TopicId::Any,
            "#" => return Err(invalid("'#' is only allowed as the last segment")),
            id => TopicId::Id(id.to_string()),
        };

        let facet = match segments[3] {
            "" => return Err(invalid("empty facet segment")),
            "+" => TopicFacet::Any,
            "#" => TopicFacet::Rest,
            name => TopicFacet::Name(name.to_string()),
        };

        Ok(Self { entity, id, facet })
    }

    /// Whether this pattern matches the given concrete topic
    pub fn matches(&self, topic: &Topic) -> bool {
        if self.entity != topic.entity {
            return false;
        }
        let id_ok = match (&self.id, &topic.id) {
            (TopicId::Any, _) => true,
            (TopicId::Id(a), TopicId::Id(b)) => a == b,
            (TopicId::Id(_), TopicId::Any) => false,
        };
        let facet_ok = match (&self.facet, &topic.facet) {
            (TopicFacet::Any, _) | (TopicFacet::Rest, _) => true,
            (TopicFacet::Name(a), TopicFacet::Name(b)) => a == b,
            _ => false,
        };
        id_ok && facet_ok
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = match &self.id {
            TopicId::Id(id) => id.as_str(),
            TopicId::Any => "+",
        };
        let facet = match &self.facet {
            TopicFacet::Name(name) => name.as_str(),
            TopicFacet::Any => "+",
            TopicFacet::Rest => "#",
        };
        write!(f, "{}/{}/{}/{}", TOPIC_ROOT, self.entity, id, facet)
    }
}

impl FromStr for Topic {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Topic::parse(s)
    }
}

/// MQTT-style match of a raw pattern against a raw topic string.
///
/// Works on any slash-separated topic, not only the fleet grammar, so that
/// transports can route messages they cannot classify.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let mut pattern_parts = pattern.split('/');
    let mut topic_parts = topic.split('/');

    loop {
        match (pattern_parts.next(), topic_parts.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(p), Some(t)) if p == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_concrete_topic() {
        let topic = Topic::parse("fleet/vehicle/42/location").unwrap();
        assert_eq!(topic.entity, EntityKind::Vehicle);
        assert_eq!(topic.entity_id(), Some("42"));
        assert_eq!(topic.facet_name(), Some("location"));
        assert!(!topic.is_pattern());
    }

    #[test]
    fn test_parse_wildcards() {
        let topic = Topic::parse("fleet/vehicle/+/location").unwrap();
        assert_eq!(topic.id, TopicId::Any);
        assert!(topic.is_pattern());

        let rest = Topic::parse("fleet/fuel/+/#").unwrap();
        assert_eq!(rest.facet, TopicFacet::Rest);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Topic::parse("vehicle/42/location").is_err());
        assert!(Topic::parse("fleet/vehicle/42").is_err());
        assert!(Topic::parse("fleet/spaceship/42/location").is_err());
        assert!(Topic::parse("fleet/vehicle//location").is_err());
        assert!(Topic::parse("fleet/vehicle/#/location").is_err());
        assert!(Topic::parse("fleet/vehicle/42/location/extra").is_err());
        assert!(Topic::parse("other/vehicle/42/location").is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for raw in ["fleet/vehicle/42/location", "fleet/trip/+/#", "fleet/fleet/acme/emergency"] {
            assert_eq!(Topic::parse(raw).unwrap().to_string(), raw);
        }
    }

    #[test]
    fn test_builders() {
        assert_eq!(Topic::vehicle_location("7").to_string(), "fleet/vehicle/7/location");
        assert_eq!(Topic::all_vehicle_locations().to_string(), "fleet/vehicle/+/location");
        assert_eq!(Topic::fuel_fraud("7").to_string(), "fleet/fuel/7/fraud");
        assert_eq!(Topic::everything(EntityKind::Trip).to_string(), "fleet/trip/+/#");
    }

    #[test]
    fn test_structured_matching() {
        let pattern = Topic::all_vehicle_locations();
        assert!(pattern.matches(&Topic::vehicle_location("1")));
        assert!(!pattern.matches(&Topic::vehicle_status("1")));
        assert!(!pattern.matches(&Topic::new(EntityKind::Driver, "1", "location")));
        assert!(Topic::everything(EntityKind::Fuel).matches(&Topic::fuel_fraud("9")));
    }

    #[test]
    fn test_raw_matching() {
        assert!(topic_matches("fleet/vehicle/+/location", "fleet/vehicle/42/location"));
        assert!(!topic_matches("fleet/vehicle/+/location", "fleet/vehicle/42/status"));
        assert!(topic_matches("fleet/#", "fleet/vehicle/42/status"));
        assert!(topic_matches("fleet/vehicle/42/location", "fleet/vehicle/42/location"));
        assert!(!topic_matches("fleet/vehicle/+", "fleet/vehicle/42/location"));
        assert!(!topic_matches("fleet/vehicle/+/location/x", "fleet/vehicle/42/location"));
    }
}
