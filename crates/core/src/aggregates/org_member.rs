//! Org member aggregate: a grant of roles to a `user` within an `org`.
//! Cascades on both `user.removed` and `org.removed`.

use serde::{Deserialize, Serialize};

use crate::event::{AggregateType, Event, EventRecord, EventType};
use crate::id::AggregateId;
use crate::write_model::{WriteModel, WriteModelFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrgMemberState {
    #[default]
    Unspecified,
    Active,
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrgMemberEvent {
    Added { user_id: AggregateId, roles: Vec<String> },
    Changed { roles: Vec<String> },
    Removed,
}

impl Event for OrgMemberEvent {
    fn aggregate_type() -> AggregateType {
        "org_member".to_string()
    }

    fn event_type(&self) -> EventType {
        match self {
            OrgMemberEvent::Added { .. } => "org.member.added",
            OrgMemberEvent::Changed { .. } => "org.member.changed",
            OrgMemberEvent::Removed => "org.member.removed",
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrgMemberWriteModel {
    frame: WriteModelFrame,
    pub state: OrgMemberState,
    pub user_id: Option<AggregateId>,
    pub roles: Vec<String>,
}

impl OrgMemberWriteModel {
    pub fn new(frame: WriteModelFrame) -> Self {
        Self {
            frame,
            ..Default::default()
        }
    }

    pub fn has_changed(&self, roles: &[String]) -> bool {
        self.roles != roles
    }

    fn apply(&mut self, event: &OrgMemberEvent) {
        match event {
            OrgMemberEvent::Added { user_id, roles } => {
                self.state = OrgMemberState::Active;
                self.user_id = Some(*user_id);
                self.roles = roles.clone();
            }
            OrgMemberEvent::Changed { roles } => self.roles = roles.clone(),
            OrgMemberEvent::Removed => self.state = OrgMemberState::Removed,
        }
    }
}

impl WriteModel for OrgMemberWriteModel {
    fn aggregate_type() -> AggregateType {
        OrgMemberEvent::aggregate_type()
    }

    /// Cascades from `user.removed` and `org.removed`.
    fn extra_aggregate_types() -> Vec<AggregateType> {
        vec!["user".to_string(), "org".to_string()]
    }

    /// The owning org is known from the frame as soon as this model is
    /// constructed; the member's user id is only known once its own
    /// `Added` event has been reduced, so it is absent on a fresh load.
    fn cascade_sources(&self) -> Vec<(AggregateType, AggregateId)> {
        let mut sources = vec![("org".to_string(), self.frame.resource_owner)];
        if let Some(user_id) = self.user_id {
            sources.push(("user".to_string(), user_id));
        }
        sources
    }

    fn reduce(&mut self, event: &EventRecord) {
        if event.aggregate_type == Self::aggregate_type() {
            if let Ok(payload) = event.decode_payload::<OrgMemberEvent>() {
                self.apply(&payload);
            }
            self.track(event);
            return;
        }

        if event.aggregate_type == "user"
            && event.event_type == "user.removed"
            && self.user_id == Some(event.aggregate_id)
        {
            self.state = OrgMemberState::Removed;
        }

        if event.aggregate_type == "org"
            && event.event_type == "org.removed"
            && event.aggregate_id == self.frame.resource_owner
        {
            self.state = OrgMemberState::Removed;
        }
    }

    fn is_removed(&self) -> bool {
        matches!(self.state, OrgMemberState::Removed)
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
    use crate::id::{Creator, InstanceId};
    use crate::position::Position;
    use chrono::Utc;

    fn record(
        aggregate_type: &str,
        aggregate_id: AggregateId,
        owner: AggregateId,
        version: u64,
        event_type: &str,
        payload: Option<serde_json::Value>,
    ) -> EventRecord {
        EventRecord {
            instance_id: InstanceId::new(),
            aggregate_type: aggregate_type.to_string(),
            aggregate_id,
            aggregate_version: version,
            event_type: event_type.to_string(),
            revision: 1,
            payload,
            creator: Creator::System,
            owner,
            created_at: Utc::now(),
            position: Position::new(rust_decimal::Decimal::new(version as i64, 0), 0),
        }
    }

    #[test]
    fn cascades_on_user_removed() {
        let member_id = AggregateId::new();
        let org_id = AggregateId::new();
        let user_id = AggregateId::new();
        let mut wm = OrgMemberWriteModel::new(WriteModelFrame::new(InstanceId::new(), member_id));
        wm.frame_mut().resource_owner = org_id;

        let added = OrgMemberEvent::Added {
            user_id,
            roles: vec!["ORG_OWNER".to_string()],
        };
        wm.reduce(&record(
            "org_member",
            member_id,
            org_id,
            1,
            &added.event_type(),
            Some(serde_json::to_value(&added).unwrap()),
        ));
        assert_eq!(wm.state, OrgMemberState::Active);

        wm.reduce(&record("user", user_id, user_id, 1, "user.removed", None));
        assert_eq!(wm.state, OrgMemberState::Removed);
    }

    #[test]
    fn cascades_on_org_removed() {
        let member_id = AggregateId::new();
        let org_id = AggregateId::new();
        let user_id = AggregateId::new();
        let mut wm = OrgMemberWriteModel::new(WriteModelFrame::new(InstanceId::new(), member_id));
        wm.frame_mut().resource_owner = org_id;

        let added = OrgMemberEvent::Added {
            user_id,
            roles: vec!["ORG_OWNER".to_string()],
        };
        wm.reduce(&record(
            "org_member",
            member_id,
            org_id,
            1,
            &added.event_type(),
            Some(serde_json::to_value(&added).unwrap()),
        ));

        wm.reduce(&record("org", org_id, org_id, 1, "org.removed", None));
        assert_eq!(wm.state, OrgMemberState::Removed);
    }
}
