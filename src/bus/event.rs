//! Event types carried by the bus and streamed to subscribers

use crate::domain::AlertInstance;
use crate::error::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Event topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A new alert instance was created
    #[serde(rename = "alert:triggered")]
    AlertTriggered,
    /// An open alert was acknowledged
    #[serde(rename = "alert:acknowledged")]
    AlertAcknowledged,
    /// An alert recovered
    #[serde(rename = "alert:recovered")]
    AlertRecovered,
    /// A notification dispatch finished on all channels
    #[serde(rename = "notification:dispatched")]
    NotificationDispatched,
}

impl EventType {
    /// All event types
    pub const ALL: [EventType; 4] = [
        EventType::AlertTriggered,
        EventType::AlertAcknowledged,
        EventType::AlertRecovered,
        EventType::NotificationDispatched,
    ];

    /// Topic name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlertTriggered => "alert:triggered",
            Self::AlertAcknowledged => "alert:acknowledged",
            Self::AlertRecovered => "alert:recovered",
            Self::NotificationDispatched => "notification:dispatched",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| DomainError::InvalidValue(format!("unknown event type '{}'", s)))
    }
}

/// A published event: `{type, timestamp, payload}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Topic
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// When the event was published
    pub timestamp: DateTime<Utc>,
    /// Topic-specific body
    pub payload: Value,
}

impl Event {
    /// Create an event stamped with the current time
    pub fn new(event_type: EventType, payload: Value) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Event whose payload is `{"alert": <instance>}`
    pub fn for_alert(event_type: EventType, alert: &AlertInstance) -> Self {
        Self::new(event_type, json!({ "alert": alert }))
    }

    /// Alert instance carried by the payload, if any
    pub fn alert(&self) -> Option<AlertInstance> {
        self.payload
            .get("alert")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Set of topics a subscriber is interested in
///
/// An empty filter matches every topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    types: HashSet<EventType>,
}

impl EventFilter {
    /// Match every event
    pub fn all() -> Self {
        Self::default()
    }

    /// Match only the given topics
    pub fn only<I: IntoIterator<Item = EventType>>(types: I) -> Self {
        Self {
            types: types.into_iter().collect(),
        }
    }

    /// Whether the filter admits a topic
    pub fn matches(&self, event_type: EventType) -> bool {
        self.types.is_empty() || self.types.contains(&event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = Event::new(EventType::AlertRecovered, json!({"x": 1}));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "alert:recovered");
        assert!(json["timestamp"].is_string());
        assert_eq!(json["payload"]["x"], 1);
    }

    #[test]
    fn test_event_type_parse() {
        assert_eq!(
            "alert:triggered".parse::<EventType>().unwrap(),
            EventType::AlertTriggered
        );
        assert!("alert:exploded".parse::<EventType>().is_err());
    }

    #[test]
    fn test_filter_matching() {
        assert!(EventFilter::all().matches(EventType::NotificationDispatched));

        let filter = EventFilter::only([EventType::AlertTriggered]);
        assert!(filter.matches(EventType::AlertTriggered));
        assert!(!filter.matches(EventType::AlertRecovered));
    }
}
