//! User grant aggregate: a project/role grant independent of org membership.
//! Cascades on `user.removed`.

use serde::{Deserialize, Serialize};

use crate::event::{AggregateType, Event, EventRecord, EventType};
use crate::id::AggregateId;
use crate::write_model::{WriteModel, WriteModelFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UserGrantState {
    #[default]
    Unspecified,
    Active,
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserGrantEvent {
    Added {
        user_id: AggregateId,
        project_id: AggregateId,
        roles: Vec<String>,
    },
    Changed {
        roles: Vec<String>,
    },
    Removed,
}

impl Event for UserGrantEvent {
    fn aggregate_type() -> AggregateType {
        "user_grant".to_string()
    }

    fn event_type(&self) -> EventType {
        match self {
            UserGrantEvent::Added { .. } => "user.grant.added",
            UserGrantEvent::Changed { .. } => "user.grant.changed",
            UserGrantEvent::Removed => "user.grant.removed",
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserGrantWriteModel {
    frame: WriteModelFrame,
    pub state: UserGrantState,
    pub user_id: Option<AggregateId>,
    pub project_id: Option<AggregateId>,
    pub roles: Vec<String>,
}

impl UserGrantWriteModel {
    pub fn new(frame: WriteModelFrame) -> Self {
        Self {
            frame,
            ..Default::default()
        }
    }

    pub fn has_changed(&self, roles: &[String]) -> bool {
        self.roles != roles
    }

    fn apply(&mut self, event: &UserGrantEvent) {
        match event {
            UserGrantEvent::Added {
                user_id,
                project_id,
                roles,
            } => {
                self.state = UserGrantState::Active;
                self.user_id = Some(*user_id);
                self.project_id = Some(*project_id);
                self.roles = roles.clone();
            }
            UserGrantEvent::Changed { roles } => self.roles = roles.clone(),
            UserGrantEvent::Removed => self.state = UserGrantState::Removed,
        }
    }
}

impl WriteModel for UserGrantWriteModel {
    fn aggregate_type() -> AggregateType {
        UserGrantEvent::aggregate_type()
    }

    fn extra_aggregate_types() -> Vec<AggregateType> {
        vec!["user".to_string()]
    }

    /// Absent on a fresh load, before the grant's own `Added` event (which
    /// carries `user_id`) has been reduced.
    fn cascade_sources(&self) -> Vec<(AggregateType, AggregateId)> {
        self.user_id.map(|id| ("user".to_string(), id)).into_iter().collect()
    }

    fn reduce(&mut self, event: &EventRecord) {
        if event.aggregate_type == Self::aggregate_type() {
            if let Ok(payload) = event.decode_payload::<UserGrantEvent>() {
                self.apply(&payload);
            }
            self.track(event);
            return;
        }

        if event.aggregate_type == "user"
            && event.event_type == "user.removed"
            && self.user_id == Some(event.aggregate_id)
        {
            self.state = UserGrantState::Removed;
        }
    }

    fn is_removed(&self) -> bool {
        matches!(self.state, UserGrantState::Removed)
    }

    fn frame(&self) -> &WriteModelFrame {
        &self.frame
    }

    fn frame_mut(&mut self) -> &mut WriteModelFrame {
        &mut self.frame
    }
}
