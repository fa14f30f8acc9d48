//! User aggregate: `UNSPECIFIED → ACTIVE ↔ INACTIVE; ACTIVE/INACTIVE → LOCKED
//! → ACTIVE; any → DELETED (terminal)`. Carries no org-membership state of
//! its own — that cascade lives on `org_member`/`user_grant`, which each
//! reduce this aggregate's own `user.removed` event instead.

use serde::{Deserialize, Serialize};

use crate::event::{AggregateType, Event, EventRecord, EventType};
use crate::write_model::{WriteModel, WriteModelFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UserState {
    #[default]
    Unspecified,
    Active,
    Inactive,
    Locked,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserEvent {
    HumanAdded {
        username: String,
        email: String,
        first_name: String,
        last_name: String,
    },
    HumanChanged {
        first_name: Option<String>,
        last_name: Option<String>,
    },
    EmailChanged {
        email: String,
    },
    EmailVerified,
    PasswordChanged,
    Deactivated,
    Reactivated,
    Locked,
    Unlocked,
    Removed,
}

impl Event for UserEvent {
    fn aggregate_type() -> AggregateType {
        "user".to_string()
    }

    fn event_type(&self) -> EventType {
        match self {
            UserEvent::HumanAdded { .. } => "user.human.added",
            UserEvent::HumanChanged { .. } => "user.human.changed",
            UserEvent::EmailChanged { .. } => "user.human.email.changed",
            UserEvent::EmailVerified => "user.human.email.verified",
            UserEvent::PasswordChanged => "user.password.changed",
            UserEvent::Deactivated => "user.deactivated",
            UserEvent::Reactivated => "user.reactivated",
            UserEvent::Locked => "user.locked",
            UserEvent::Unlocked => "user.unlocked",
            UserEvent::Removed => "user.removed",
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserWriteModel {
    frame: WriteModelFrame,
    pub state: UserState,
    pub username: String,
    pub email: String,
    pub email_verified: bool,
    pub first_name: String,
    pub last_name: String,
    /// State held before a `Locked` transition, so `Unlocked` restores it.
    state_before_lock: Option<UserState>,
}

impl UserWriteModel {
    pub fn new(frame: WriteModelFrame) -> Self {
        Self {
            frame,
            ..Default::default()
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, UserState::Active)
    }

    pub fn has_email_changed(&self, email: &str) -> bool {
        self.email != email
    }

    fn apply(&mut self, event: &UserEvent) {
        // DELETED is terminal: once removed, no further event may resurrect
        // the aggregate (the command engine's Precondition step is expected
        // to reject commands against a removed user before this is reached;
        // reduce() enforces it too since it must stay total and safe).
        if matches!(self.state, UserState::Deleted) {
            return;
        }
        match event {
            UserEvent::HumanAdded {
                username,
                email,
                first_name,
                last_name,
            } => {
                self.state = UserState::Active;
                self.username = username.clone();
                self.email = email.clone();
                self.email_verified = false;
                self.first_name = first_name.clone();
                self.last_name = last_name.clone();
            }
            UserEvent::HumanChanged {
                first_name,
                last_name,
            } => {
                if let Some(v) = first_name {
                    self.first_name = v.clone();
                }
                if let Some(v) = last_name {
                    self.last_name = v.clone();
                }
            }
            UserEvent::EmailChanged { email } => {
                self.email = email.clone();
                // Verification sub-state: changing the email always resets
                // verification regardless of the old value.
                self.email_verified = false;
            }
            UserEvent::EmailVerified => self.email_verified = true,
            UserEvent::PasswordChanged => {}
            UserEvent::Deactivated => self.state = UserState::Inactive,
            UserEvent::Reactivated => self.state = UserState::Active,
            UserEvent::Locked => {
                self.state_before_lock = Some(self.state);
                self.state = UserState::Locked;
            }
            UserEvent::Unlocked => {
                self.state = self.state_before_lock.take().unwrap_or(UserState::Active);
            }
            UserEvent::Removed => self.state = UserState::Deleted,
        }
    }
}

impl WriteModel for UserWriteModel {
    fn aggregate_type() -> AggregateType {
        UserEvent::aggregate_type()
    }

    fn reduce(&mut self, event: &EventRecord) {
        if event.aggregate_type != Self::aggregate_type() {
            return;
        }
        if let Ok(payload) = event.decode_payload::<UserEvent>() {
            self.apply(&payload);
        }
        self.track(event);
    }

    fn is_removed(&self) -> bool {
        matches!(self.state, UserState::Deleted)
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

    fn record(id: AggregateId, version: u64, event: &UserEvent) -> EventRecord {
        EventRecord {
            instance_id: InstanceId::new(),
            aggregate_type: "user".to_string(),
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

    fn added() -> UserEvent {
        UserEvent::HumanAdded {
            username: "alice".into(),
            email: "alice@example.com".into(),
            first_name: "Alice".into(),
            last_name: "Doe".into(),
        }
    }

    #[test]
    fn lock_unlock_restores_prior_state() {
        let id = AggregateId::new();
        let mut wm = UserWriteModel::new(WriteModelFrame::new(InstanceId::new(), id));
        wm.reduce(&record(id, 1, &added()));
        wm.reduce(&record(id, 2, &UserEvent::Deactivated));
        wm.reduce(&record(id, 3, &UserEvent::Locked));
        assert_eq!(wm.state, UserState::Locked);
        wm.reduce(&record(id, 4, &UserEvent::Unlocked));
        assert_eq!(wm.state, UserState::Inactive);
    }

    #[test]
    fn email_change_resets_verification() {
        let id = AggregateId::new();
        let mut wm = UserWriteModel::new(WriteModelFrame::new(InstanceId::new(), id));
        wm.reduce(&record(id, 1, &added()));
        wm.reduce(&record(id, 2, &UserEvent::EmailVerified));
        assert!(wm.email_verified);

        wm.reduce(&record(
            id,
            3,
            &UserEvent::EmailChanged {
                email: "alice2@example.com".into(),
            },
        ));
        assert!(!wm.email_verified);
    }

    #[test]
    fn removed_is_terminal() {
        let id = AggregateId::new();
        let mut wm = UserWriteModel::new(WriteModelFrame::new(InstanceId::new(), id));
        wm.reduce(&record(id, 1, &added()));
        wm.reduce(&record(id, 2, &UserEvent::Removed));
        assert_eq!(wm.state, UserState::Deleted);
        wm.reduce(&record(id, 3, &UserEvent::Reactivated));
        // Removed is terminal: a stray reactivate after removal must not
        // resurrect the aggregate. The command engine is expected to never
        // emit this, but reduce() must stay total and safe regardless.
        assert_eq!(wm.state, UserState::Deleted);
    }
}
