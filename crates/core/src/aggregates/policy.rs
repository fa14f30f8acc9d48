//! The five policy aggregate kinds (label, privacy, mail-template, domain,
//! lockout) share one generic write-model shape: `UNSPECIFIED → ACTIVE →
//! REMOVED`, with idempotent `changed` transitions inside `ACTIVE`.

use core::marker::PhantomData;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::event::{AggregateType, Event, EventRecord, EventType};
use crate::write_model::{WriteModel, WriteModelFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PolicyState {
    #[default]
    Unspecified,
    Active,
    Removed,
}

/// A policy kind supplies its dotted aggregate type and its payload shape.
/// Each `added`/`changed` event carries a full or partial `Payload`.
pub trait PolicyKind: Clone + core::fmt::Debug {
    type Payload: Clone + core::fmt::Debug + PartialEq + Serialize + DeserializeOwned;

    fn aggregate_type_name() -> &'static str;
}

macro_rules! define_policy_kind {
    ($kind:ident, $aggregate_type:literal, $payload:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $kind;

        #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
        pub struct $payload {
            $(pub $field: $ty,)*
        }

        impl PolicyKind for $kind {
            type Payload = $payload;

            fn aggregate_type_name() -> &'static str {
                $aggregate_type
            }
        }
    };
}

define_policy_kind!(LabelPolicyKind, "policy.label", LabelPolicyPayload {
    primary_color: String,
    background_color: String,
    logo_url: Option<String>,
});

define_policy_kind!(PrivacyPolicyKind, "policy.privacy", PrivacyPolicyPayload {
    tos_link: String,
    privacy_link: String,
});

define_policy_kind!(MailTemplatePolicyKind, "policy.mail_template", MailTemplatePolicyPayload {
    template: String,
});

define_policy_kind!(DomainPolicyKind, "policy.domain", DomainPolicyPayload {
    user_login_must_be_domain: bool,
    validate_org_domains: bool,
});

define_policy_kind!(LockoutPolicyKind, "policy.lockout", LockoutPolicyPayload {
    max_password_attempts: u32,
    max_otp_attempts: u32,
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PolicyEvent<P> {
    Added(P),
    Changed(P),
    Removed,
}

impl<K: PolicyKind> Event for PolicyEvent<K::Payload> {
    fn aggregate_type() -> AggregateType {
        K::aggregate_type_name().to_string()
    }

    fn event_type(&self) -> EventType {
        let verb = match self {
            PolicyEvent::Added(_) => "added",
            PolicyEvent::Changed(_) => "changed",
            PolicyEvent::Removed => "removed",
        };
        format!("{}.{}", K::aggregate_type_name(), verb)
    }
}

#[derive(Debug, Clone)]
pub struct PolicyWriteModel<K: PolicyKind> {
    frame: WriteModelFrame,
    pub state: PolicyState,
    pub payload: Option<K::Payload>,
    _kind: PhantomData<K>,
}

impl<K: PolicyKind> Default for PolicyWriteModel<K> {
    fn default() -> Self {
        Self {
            frame: WriteModelFrame::default(),
            state: PolicyState::default(),
            payload: None,
            _kind: PhantomData,
        }
    }
}

impl<K: PolicyKind> PolicyWriteModel<K> {
    pub fn new(frame: WriteModelFrame) -> Self {
        Self {
            frame,
            ..Default::default()
        }
    }

    pub fn has_changed(&self, proposed: &K::Payload) -> bool {
        self.payload.as_ref() != Some(proposed)
    }

    fn apply(&mut self, event: &PolicyEvent<K::Payload>) {
        match event {
            PolicyEvent::Added(payload) => {
                self.state = PolicyState::Active;
                self.payload = Some(payload.clone());
            }
            PolicyEvent::Changed(payload) => self.payload = Some(payload.clone()),
            PolicyEvent::Removed => self.state = PolicyState::Removed,
        }
    }
}

impl<K: PolicyKind + 'static> WriteModel for PolicyWriteModel<K> {
    fn aggregate_type() -> AggregateType {
        K::aggregate_type_name().to_string()
    }

    fn reduce(&mut self, event: &EventRecord) {
        if event.aggregate_type != Self::aggregate_type() {
            return;
        }
        if let Ok(payload) = event.decode_payload::<PolicyEvent<K::Payload>>() {
            self.apply(&payload);
        }
        self.track(event);
    }

    fn is_removed(&self) -> bool {
        matches!(self.state, PolicyState::Removed)
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
    use chrono::Utc;

    fn record<K: PolicyKind>(
        id: AggregateId,
        version: u64,
        event: &PolicyEvent<K::Payload>,
    ) -> EventRecord
    where
        PolicyEvent<K::Payload>: Event,
    {
        EventRecord {
            instance_id: InstanceId::new(),
            aggregate_type: K::aggregate_type_name().to_string(),
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
    fn label_policy_idempotent_change_detection() {
        let id = AggregateId::new();
        let mut wm = PolicyWriteModel::<LabelPolicyKind>::new(WriteModelFrame::new(
            InstanceId::new(),
            id,
        ));
        let initial = LabelPolicyPayload {
            primary_color: "#111".into(),
            background_color: "#fff".into(),
            logo_url: None,
        };
        wm.reduce(&record::<LabelPolicyKind>(id, 1, &PolicyEvent::Added(initial.clone())));
        assert_eq!(wm.state, PolicyState::Active);

        assert!(!wm.has_changed(&initial));
        let changed = LabelPolicyPayload {
            primary_color: "#222".into(),
            ..initial.clone()
        };
        assert!(wm.has_changed(&changed));
    }

    #[test]
    fn lockout_policy_removed() {
        let id = AggregateId::new();
        let mut wm = PolicyWriteModel::<LockoutPolicyKind>::new(WriteModelFrame::new(
            InstanceId::new(),
            id,
        ));
        let payload = LockoutPolicyPayload {
            max_password_attempts: 5,
            max_otp_attempts: 3,
        };
        wm.reduce(&record::<LockoutPolicyKind>(id, 1, &PolicyEvent::Added(payload)));
        wm.reduce(&record::<LockoutPolicyKind>(id, 2, &PolicyEvent::Removed));
        assert_eq!(wm.state, PolicyState::Removed);
    }
}
