//! Org aggregate: `ACTIVE ↔ INACTIVE → REMOVED (terminal)`, plus verified domains.

use serde::{Deserialize, Serialize};

use crate::event::{AggregateType, Event, EventRecord, EventType};
use crate::write_model::{WriteModel, WriteModelFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrgState {
    #[default]
    Unspecified,
    Active,
    Inactive,
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrgEvent {
    Added { name: String },
    Changed { name: Option<String> },
    Deactivated,
    Reactivated,
    Removed,
    DomainAdded { domain: String },
    DomainVerified { domain: String },
    DomainRemoved { domain: String },
}

impl Event for OrgEvent {
    fn aggregate_type() -> AggregateType {
        "org".to_string()
    }

    fn event_type(&self) -> EventType {
        match self {
            OrgEvent::Added { .. } => "org.added",
            OrgEvent::Changed { .. } => "org.changed",
            OrgEvent::Deactivated => "org.deactivated",
            OrgEvent::Reactivated => "org.reactivated",
            OrgEvent::Removed => "org.removed",
            OrgEvent::DomainAdded { .. } => "org.domain.added",
            OrgEvent::DomainVerified { .. } => "org.domain.verified",
            OrgEvent::DomainRemoved { .. } => "org.domain.removed",
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrgDomain {
    pub domain: String,
    pub verified: bool,
}

/// Write model for a single org aggregate.
#[derive(Debug, Clone, Default)]
pub struct OrgWriteModel {
    frame: WriteModelFrame,
    pub state: OrgState,
    pub name: String,
    pub domains: Vec<OrgDomain>,
}

impl OrgWriteModel {
    pub fn new(frame: WriteModelFrame) -> Self {
        Self {
            frame,
            ..Default::default()
        }
    }

    /// Change detection for the `changed` event: only emit if the proposed
    /// name actually differs from current state.
    pub fn has_changed(&self, name: &str) -> bool {
        self.name != name
    }

    fn apply(&mut self, event: &OrgEvent) {
        match event {
            OrgEvent::Added { name } => {
                self.state = OrgState::Active;
                self.name = name.clone();
            }
            OrgEvent::Changed { name } => {
                if let Some(name) = name {
                    self.name = name.clone();
                }
            }
            OrgEvent::Deactivated => self.state = OrgState::Inactive,
            OrgEvent::Reactivated => self.state = OrgState::Active,
            OrgEvent::Removed => self.state = OrgState::Removed,
            OrgEvent::DomainAdded { domain } => self.domains.push(OrgDomain {
                domain: domain.clone(),
                verified: false,
            }),
            OrgEvent::DomainVerified { domain } => {
                if let Some(d) = self.domains.iter_mut().find(|d| &d.domain == domain) {
                    d.verified = true;
                }
            }
            OrgEvent::DomainRemoved { domain } => self.domains.retain(|d| &d.domain != domain),
        }
    }
}

impl WriteModel for OrgWriteModel {
    fn aggregate_type() -> AggregateType {
        OrgEvent::aggregate_type()
    }

    fn reduce(&mut self, event: &EventRecord) {
        if event.aggregate_type != Self::aggregate_type() {
            return;
        }
        if let Ok(payload) = event.decode_payload::<OrgEvent>() {
            self.apply(&payload);
        }
        self.track(event);
    }

    fn is_removed(&self) -> bool {
        matches!(self.state, OrgState::Removed)
    }

    fn frame(&self) -> &WriteModelFrame {
        &self.frame
    }

    fn frame_mut(&mut self) -> &mut WriteModelFrame {
        &mut self.frame
    }
}
