//! Domain events and the per-entity buffer of events pending dispatch.

use chrono::{DateTime, Utc};
use common::EntityId;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + Send + Sync {
    /// Returns the event type name.
    ///
    /// Dispatchers route on this name.
    fn event_type(&self) -> &'static str;
}

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A raised domain event together with its identity and origin.
///
/// The id and occurrence time are fixed when the event is raised; the
/// envelope is never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique identifier for this event.
    pub event_id: EventId,

    /// The type of the event (e.g., "CategoryCreated").
    pub event_type: String,

    /// The type of entity that raised the event (e.g., "Category").
    pub entity_type: String,

    /// The entity that raised the event.
    pub entity_id: EntityId,

    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,

    /// The event payload as JSON.
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Wraps `event` raised by the given entity at `occurred_at`.
    pub fn new<E: DomainEvent>(
        entity_type: &str,
        entity_id: EntityId,
        event: &E,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_id: EventId::new(),
            event_type: event.event_type().to_string(),
            entity_type: entity_type.to_string(),
            entity_id,
            occurred_at,
            payload: serde_json::to_value(event)?,
        })
    }

    /// Deserializes the payload back into a concrete event type.
    pub fn payload_as<E: DeserializeOwned>(&self) -> Result<E, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Append-only buffer of events an entity has raised but nobody has dispatched yet.
///
/// Not serialized with the entity: events travel through the unit of work,
/// never through the row.
#[derive(Debug, Clone, Default)]
pub struct EventBuffer {
    pending: Vec<EventEnvelope>,
}

impl EventBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn push(&mut self, event: EventEnvelope) {
        self.pending.push(event);
    }

    /// Returns all buffered events and leaves the buffer empty.
    pub fn drain(&mut self) -> Vec<EventEnvelope> {
        std::mem::take(&mut self.pending)
    }

    /// Returns the buffered events without removing them.
    pub fn iter(&self) -> impl Iterator<Item = &EventEnvelope> {
        self.pending.iter()
    }

    /// Returns the number of buffered events.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Pinged {
        count: u32,
    }

    impl DomainEvent for Pinged {
        fn event_type(&self) -> &'static str {
            "Pinged"
        }
    }

    fn envelope(count: u32) -> EventEnvelope {
        EventEnvelope::new("Probe", EntityId::new(), &Pinged { count }, Utc::now()).unwrap()
    }

    #[test]
    fn event_id_new_creates_unique_ids() {
        assert_ne!(EventId::new(), EventId::new());
    }

    #[test]
    fn envelope_captures_event_identity() {
        let entity_id = EntityId::new();
        let now = Utc::now();
        let env = EventEnvelope::new("Probe", entity_id, &Pinged { count: 3 }, now).unwrap();

        assert_eq!(env.event_type, "Pinged");
        assert_eq!(env.entity_type, "Probe");
        assert_eq!(env.entity_id, entity_id);
        assert_eq!(env.occurred_at, now);
        assert_eq!(env.payload_as::<Pinged>().unwrap(), Pinged { count: 3 });
    }

    #[test]
    fn drain_returns_events_once() {
        let mut buffer = EventBuffer::new();
        buffer.push(envelope(1));
        buffer.push(envelope(2));

        let drained = buffer.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].payload["count"], 1);
        assert_eq!(drained[1].payload["count"], 2);
        assert!(buffer.drain().is_empty());
    }

    #[test]
    fn events_after_a_drain_are_independent() {
        let mut buffer = EventBuffer::new();
        buffer.push(envelope(1));
        let first = buffer.drain();

        buffer.push(envelope(2));
        let second = buffer.drain();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_ne!(first[0].event_id, second[0].event_id);
        assert_eq!(first[0].payload["count"], 1);
    }
}
