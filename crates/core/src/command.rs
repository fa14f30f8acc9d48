//! The input to the event log: a command is "an event minus the fields the
//! store assigns at commit", plus optional unique-constraint side effects.

use serde::{Deserialize, Serialize};

use crate::event::{AggregateType, Event, EventType};
use crate::id::{AggregateId, Creator, InstanceId};

/// What to do with a unique constraint row as part of the enclosing command's
/// transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniqueConstraintAction {
    /// Claim `(unique_type, unique_field)`. Fails the whole push if already held.
    Add,
    /// Release a previously-claimed `(unique_type, unique_field)`.
    Remove,
    /// Clear every constraint row owned by an instance (used by instance removal).
    InstanceRemove,
}

/// A side effect attached to a command, applied atomically with event
/// insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    pub unique_type: String,
    pub unique_field: String,
    pub action: UniqueConstraintAction,
    /// Instance-scoped (`false`) vs. global across instances (`true`).
    pub is_global: bool,
    /// Message key surfaced when an `Add` conflicts.
    pub error_message: String,
}

impl UniqueConstraint {
    pub fn add(unique_type: impl Into<String>, unique_field: impl Into<String>) -> Self {
        Self {
            unique_type: unique_type.into(),
            unique_field: unique_field.into(),
            action: UniqueConstraintAction::Add,
            is_global: false,
            error_message: "already exists".to_string(),
        }
    }

    pub fn remove(unique_type: impl Into<String>, unique_field: impl Into<String>) -> Self {
        Self {
            unique_type: unique_type.into(),
            unique_field: unique_field.into(),
            action: UniqueConstraintAction::Remove,
            is_global: false,
            error_message: String::new(),
        }
    }

    pub fn instance_remove() -> Self {
        Self {
            unique_type: String::new(),
            unique_field: String::new(),
            action: UniqueConstraintAction::InstanceRemove,
            is_global: false,
            error_message: String::new(),
        }
    }

    pub fn global(mut self) -> Self {
        self.is_global = true;
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }
}

/// An intent to append one event, queued for the event log's `push`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub instance_id: InstanceId,
    pub aggregate_type: AggregateType,
    pub aggregate_id: AggregateId,
    pub event_type: EventType,
    pub revision: u16,
    pub payload: Option<serde_json::Value>,
    pub creator: Creator,
    pub owner: AggregateId,
    pub unique_constraints: Vec<UniqueConstraint>,
}

impl Command {
    /// Build a command from a typed domain event, serializing its payload.
    pub fn from_event<E: Event + Serialize>(
        instance_id: InstanceId,
        aggregate_id: AggregateId,
        owner: AggregateId,
        creator: Creator,
        event: &E,
    ) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_value(event)?;
        let payload = if payload.is_null() { None } else { Some(payload) };
        Ok(Self {
            instance_id,
            aggregate_type: E::aggregate_type(),
            aggregate_id,
            event_type: event.event_type(),
            revision: event.revision(),
            payload,
            creator,
            owner,
            unique_constraints: Vec::new(),
        })
    }

    pub fn with_unique_constraints(mut self, constraints: Vec<UniqueConstraint>) -> Self {
        self.unique_constraints = constraints;
        self
    }
}
