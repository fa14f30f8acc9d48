//! The committed, immutable event record and the `Event` trait domain event
//! payloads implement to be pushed and queried generically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{AggregateId, Creator, InstanceId};
use crate::position::Position;

/// A dotted event-type string, e.g. `user.human.added`.
///
/// The vocabulary is closed for a given deployment's schema revision: new
/// types must ship with reducers in every affected projection and write
/// model.
pub type EventType = String;

/// A dotted aggregate-type string, e.g. `user`, `org`, `device_authorization`.
pub type AggregateType = String;

/// A typed domain event payload.
///
/// Implemented by each concrete event enum (`UserEvent`, `OrgEvent`, …).
/// `event_type()` and `revision()` feed the committed [`EventRecord`]; the
/// mapper pipeline upgrades older revisions read back from the log.
pub trait Event: Sized + Clone + core::fmt::Debug {
    /// The aggregate kind this event belongs to, e.g. `"user"`.
    fn aggregate_type() -> AggregateType;

    /// The dotted event-type string, e.g. `"user.human.added"`.
    fn event_type(&self) -> EventType;

    /// Schema revision of this event type's payload. Defaults to 1.
    fn revision(&self) -> u16 {
        1
    }
}

/// The immutable record of a committed event, as read back from the log.
///
/// Distinguishes `payload` (still opaque JSON at this layer — typed decoding
/// happens when a write model or projection's `reduce` deserializes it into
/// its own concrete event enum) from the envelope fields assigned by the
/// store at commit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    pub instance_id: InstanceId,
    pub aggregate_type: AggregateType,
    pub aggregate_id: AggregateId,
    pub aggregate_version: u64,
    pub event_type: EventType,
    pub revision: u16,
    pub payload: Option<serde_json::Value>,
    pub creator: Creator,
    pub owner: AggregateId,
    pub created_at: DateTime<Utc>,
    pub position: Position,
}

impl EventRecord {
    /// Decode `payload` into a concrete typed event. Used by write models and
    /// projections after the mapper pipeline has run.
    pub fn decode_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        match &self.payload {
            Some(value) => serde_json::from_value(value.clone()),
            None => serde_json::from_value(serde_json::Value::Null),
        }
    }
}

/// Returned by every successful command: the just-committed event's
/// coordinates, for the read-your-writes pattern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectDetails {
    pub sequence: u64,
    pub event_date: DateTime<Utc>,
    pub creation_date: DateTime<Utc>,
    pub resource_owner: AggregateId,
    pub id: AggregateId,
}

impl ObjectDetails {
    pub fn from_event(event: &EventRecord, creation_date: DateTime<Utc>) -> Self {
        Self {
            sequence: event.aggregate_version,
            event_date: event.created_at,
            creation_date,
            resource_owner: event.owner,
            id: event.aggregate_id,
        }
    }
}
