//! Device authorization aggregate: `requested → approved|denied|cancelled|
//! expired`. `expired` is asserted by time vs. `expires_at` and is only ever
//! realized by the background sweeper (see `iam-infra`'s
//! `device_auth_sweeper` worker), never issued by a command handler directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{AggregateType, Event, EventRecord, EventType};
use crate::write_model::{WriteModel, WriteModelFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeviceAuthorizationState {
    #[default]
    Unspecified,
    Requested,
    Approved,
    Denied,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeviceAuthorizationEvent {
    Requested {
        device_code: String,
        user_code: String,
        expires_at: DateTime<Utc>,
    },
    Approved,
    Denied,
    Cancelled,
    /// Only ever pushed by the sweeper, never by a user-facing command.
    Expired,
}

impl Event for DeviceAuthorizationEvent {
    fn aggregate_type() -> AggregateType {
        "device_authorization".to_string()
    }

    fn event_type(&self) -> EventType {
        match self {
            DeviceAuthorizationEvent::Requested { .. } => "device_authorization.requested",
            DeviceAuthorizationEvent::Approved => "device_authorization.approved",
            DeviceAuthorizationEvent::Denied => "device_authorization.denied",
            DeviceAuthorizationEvent::Cancelled => "device_authorization.cancelled",
            DeviceAuthorizationEvent::Expired => "device_authorization.expired",
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeviceAuthorizationWriteModel {
    frame: WriteModelFrame,
    pub state: DeviceAuthorizationState,
    pub device_code: String,
    pub user_code: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl DeviceAuthorizationWriteModel {
    pub fn new(frame: WriteModelFrame) -> Self {
        Self {
            frame,
            ..Default::default()
        }
    }

    /// `true` if this request is still `requested` and past its deadline —
    /// exactly the predicate the sweeper polls for.
    pub fn is_expirable(&self, now: DateTime<Utc>) -> bool {
        matches!(self.state, DeviceAuthorizationState::Requested)
            && self.expires_at.is_some_and(|deadline| now >= deadline)
    }

    fn apply(&mut self, event: &DeviceAuthorizationEvent) {
        if !matches!(self.state, DeviceAuthorizationState::Unspecified | DeviceAuthorizationState::Requested) {
            return;
        }
        match event {
            DeviceAuthorizationEvent::Requested {
                device_code,
                user_code,
                expires_at,
            } => {
                self.state = DeviceAuthorizationState::Requested;
                self.device_code = device_code.clone();
                self.user_code = user_code.clone();
                self.expires_at = Some(*expires_at);
            }
            DeviceAuthorizationEvent::Approved => self.state = DeviceAuthorizationState::Approved,
            DeviceAuthorizationEvent::Denied => self.state = DeviceAuthorizationState::Denied,
            DeviceAuthorizationEvent::Cancelled => self.state = DeviceAuthorizationState::Cancelled,
            DeviceAuthorizationEvent::Expired => self.state = DeviceAuthorizationState::Expired,
        }
    }
}

impl WriteModel for DeviceAuthorizationWriteModel {
    fn aggregate_type() -> AggregateType {
        DeviceAuthorizationEvent::aggregate_type()
    }

    fn reduce(&mut self, event: &EventRecord) {
        if event.aggregate_type != Self::aggregate_type() {
            return;
        }
        if let Ok(payload) = event.decode_payload::<DeviceAuthorizationEvent>() {
            self.apply(&payload);
        }
        self.track(event);
    }

    fn frame(&self) -> &WriteModelFrame {
        &self.frame
    }

    fn frame_mut(&mut self) -> &mut WriteModelFrame {
        &mut self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{AggregateId, Creator, InstanceId};
    use crate::position::Position;
    use chrono::Duration;

    fn record(id: AggregateId, version: u64, event: &DeviceAuthorizationEvent) -> EventRecord {
        EventRecord {
            instance_id: InstanceId::new(),
            aggregate_type: "device_authorization".to_string(),
            aggregate_id: id,
            aggregate_version: version,
            event_type: event.event_type(),
            revision: 1,
            payload: Some(serde_json::to_value(event).unwrap()),
            creator: Creator::System,
            owner: id,
            created_at: Utc::now(),
            position: Position::new(rust_decimal::Decimal::new(version as i64, 0), 0),
        }
    }

    #[test]
    fn is_expirable_only_while_requested_and_past_deadline() {
        let id = AggregateId::new();
        let mut wm = DeviceAuthorizationWriteModel::new(WriteModelFrame::new(InstanceId::new(), id));
        let now = Utc::now();
        wm.reduce(&record(
            id,
            1,
            &DeviceAuthorizationEvent::Requested {
                device_code: "dc".into(),
                user_code: "ABCD-EFGH".into(),
                expires_at: now + Duration::seconds(30),
            },
        ));

        assert!(!wm.is_expirable(now));
        assert!(wm.is_expirable(now + Duration::seconds(31)));
    }

    #[test]
    fn approved_is_not_expirable_even_past_deadline() {
        let id = AggregateId::new();
        let mut wm = DeviceAuthorizationWriteModel::new(WriteModelFrame::new(InstanceId::new(), id));
        let now = Utc::now();
        wm.reduce(&record(
            id,
            1,
            &DeviceAuthorizationEvent::Requested {
                device_code: "dc".into(),
                user_code: "ABCD-EFGH".into(),
                expires_at: now - Duration::seconds(1),
            },
        ));
        wm.reduce(&record(id, 2, &DeviceAuthorizationEvent::Approved));

        assert!(!wm.is_expirable(now + Duration::seconds(60)));
    }
}
