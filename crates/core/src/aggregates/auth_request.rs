//! Auth request aggregate: `UNSPECIFIED → ADDED → USER_SELECTED →
//! AUTHENTICATED → SUCCEEDED|FAILED`. Factor tracking (password/TOTP/WebAuthn)
//! is orthogonal; any factor `failed` moves the request to `FAILED` terminal.
//! Ephemeral (short TTL) but stored exactly like any other aggregate.

use serde::{Deserialize, Serialize};

use crate::event::{AggregateType, Event, EventRecord, EventType};
use crate::id::AggregateId;
use crate::write_model::{WriteModel, WriteModelFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthRequestState {
    #[default]
    Unspecified,
    Added,
    UserSelected,
    Authenticated,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Factor {
    Password,
    Totp,
    WebAuthn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuthRequestEvent {
    Added { required_factors: Vec<Factor> },
    UserSelected { user_id: AggregateId },
    FactorChecked { factor: Factor },
    FactorFailed { factor: Factor, reason: String },
    Succeeded,
    Failed { reason: String },
}

impl Event for AuthRequestEvent {
    fn aggregate_type() -> AggregateType {
        "auth_request".to_string()
    }

    fn event_type(&self) -> EventType {
        match self {
            AuthRequestEvent::Added { .. } => "auth_request.added",
            AuthRequestEvent::UserSelected { .. } => "auth_request.user.selected",
            AuthRequestEvent::FactorChecked { factor } => match factor {
                Factor::Password => "auth_request.password.checked",
                Factor::Totp | Factor::WebAuthn => "auth_request.mfa.checked",
            },
            AuthRequestEvent::FactorFailed { factor, .. } => match factor {
                Factor::Password => "auth_request.password.failed",
                Factor::Totp | Factor::WebAuthn => "auth_request.mfa.failed",
            },
            AuthRequestEvent::Succeeded => "auth_request.succeeded",
            AuthRequestEvent::Failed { .. } => "auth_request.failed",
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuthRequestWriteModel {
    frame: WriteModelFrame,
    pub state: AuthRequestState,
    pub user_id: Option<AggregateId>,
    pub required_factors: Vec<Factor>,
    pub checked_factors: Vec<Factor>,
    pub failure_reason: Option<String>,
}

impl AuthRequestWriteModel {
    pub fn new(frame: WriteModelFrame) -> Self {
        Self {
            frame,
            ..Default::default()
        }
    }

    fn factors_satisfied(&self) -> bool {
        self.required_factors
            .iter()
            .all(|f| self.checked_factors.contains(f))
    }

    fn apply(&mut self, event: &AuthRequestEvent) {
        if matches!(self.state, AuthRequestState::Succeeded | AuthRequestState::Failed) {
            return;
        }
        match event {
            AuthRequestEvent::Added { required_factors } => {
                self.state = AuthRequestState::Added;
                self.required_factors = required_factors.clone();
            }
            AuthRequestEvent::UserSelected { user_id } => {
                self.user_id = Some(*user_id);
                self.state = AuthRequestState::UserSelected;
            }
            AuthRequestEvent::FactorChecked { factor } => {
                if !self.checked_factors.contains(factor) {
                    self.checked_factors.push(*factor);
                }
                if self.factors_satisfied() {
                    self.state = AuthRequestState::Authenticated;
                }
            }
            AuthRequestEvent::FactorFailed { reason, .. } => {
                self.state = AuthRequestState::Failed;
                self.failure_reason = Some(reason.clone());
            }
            AuthRequestEvent::Succeeded => self.state = AuthRequestState::Succeeded,
            AuthRequestEvent::Failed { reason } => {
                self.state = AuthRequestState::Failed;
                self.failure_reason = Some(reason.clone());
            }
        }
    }
}

impl WriteModel for AuthRequestWriteModel {
    fn aggregate_type() -> AggregateType {
        AuthRequestEvent::aggregate_type()
    }

    fn reduce(&mut self, event: &EventRecord) {
        if event.aggregate_type != Self::aggregate_type() {
            return;
        }
        if let Ok(payload) = event.decode_payload::<AuthRequestEvent>() {
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
