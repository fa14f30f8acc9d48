//! Identity provider aggregate: `UNSPECIFIED → ACTIVE → REMOVED`, with
//! type-specific configs (OIDC/OAuth/LDAP/SAML/JWT/Azure/Google/Apple)
//! carried in the event payload. Cascades on `org.removed`.

use serde::{Deserialize, Serialize};

use crate::event::{AggregateType, Event, EventRecord, EventType};
use crate::id::AggregateId;
use crate::write_model::{WriteModel, WriteModelFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IdpState {
    #[default]
    Unspecified,
    Active,
    Removed,
}

/// Type-specific provider configuration. The projection encodes the variant
/// tag as an enum column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum IdpConfig {
    Oidc {
        issuer: String,
        client_id: String,
    },
    OAuth {
        authorization_endpoint: String,
        token_endpoint: String,
        client_id: String,
    },
    Ldap {
        servers: Vec<String>,
        base_dn: String,
    },
    Saml {
        metadata_url: String,
    },
    Jwt {
        issuer: String,
        jwks_endpoint: String,
    },
    Azure {
        tenant_id: String,
        client_id: String,
    },
    Google {
        client_id: String,
    },
    Apple {
        client_id: String,
        team_id: String,
    },
}

impl IdpConfig {
    pub fn type_name(&self) -> &'static str {
        match self {
            IdpConfig::Oidc { .. } => "oidc",
            IdpConfig::OAuth { .. } => "oauth",
            IdpConfig::Ldap { .. } => "ldap",
            IdpConfig::Saml { .. } => "saml",
            IdpConfig::Jwt { .. } => "jwt",
            IdpConfig::Azure { .. } => "azure",
            IdpConfig::Google { .. } => "google",
            IdpConfig::Apple { .. } => "apple",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IdpEvent {
    Added { name: String, config: IdpConfig },
    Changed { name: Option<String>, config: Option<IdpConfig> },
    Removed,
}

impl Event for IdpEvent {
    fn aggregate_type() -> AggregateType {
        "idp".to_string()
    }

    fn event_type(&self) -> EventType {
        let kind = match self {
            IdpEvent::Added { config, .. } => config.type_name(),
            IdpEvent::Changed { config, .. } => config.as_ref().map(|c| c.type_name()).unwrap_or("generic"),
            IdpEvent::Removed => return "instance.idp.removed".to_string(),
        };
        match self {
            IdpEvent::Added { .. } => format!("instance.idp.{kind}.added"),
            IdpEvent::Changed { .. } => format!("instance.idp.{kind}.changed"),
            IdpEvent::Removed => unreachable!(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IdpWriteModel {
    frame: WriteModelFrame,
    pub state: IdpState,
    pub name: String,
    pub config: Option<IdpConfig>,
}

impl IdpWriteModel {
    pub fn new(frame: WriteModelFrame) -> Self {
        Self {
            frame,
            ..Default::default()
        }
    }

    pub fn has_changed(&self, name: &str, config: &IdpConfig) -> bool {
        self.name != name || self.config.as_ref() != Some(config)
    }

    fn apply(&mut self, event: &IdpEvent) {
        match event {
            IdpEvent::Added { name, config } => {
                self.state = IdpState::Active;
                self.name = name.clone();
                self.config = Some(config.clone());
            }
            IdpEvent::Changed { name, config } => {
                if let Some(name) = name {
                    self.name = name.clone();
                }
                if let Some(config) = config {
                    self.config = Some(config.clone());
                }
            }
            IdpEvent::Removed => self.state = IdpState::Removed,
        }
    }
}

impl WriteModel for IdpWriteModel {
    fn aggregate_type() -> AggregateType {
        IdpEvent::aggregate_type()
    }

    fn extra_aggregate_types() -> Vec<AggregateType> {
        vec!["org".to_string()]
    }

    fn cascade_sources(&self) -> Vec<(AggregateType, AggregateId)> {
        vec![("org".to_string(), self.frame.resource_owner)]
    }

    fn reduce(&mut self, event: &EventRecord) {
        if event.aggregate_type == Self::aggregate_type() {
            if let Ok(payload) = event.decode_payload::<IdpEvent>() {
                self.apply(&payload);
            }
            self.track(event);
            return;
        }

        if event.aggregate_type == "org"
            && event.event_type == "org.removed"
            && event.aggregate_id == self.frame.resource_owner
        {
            self.state = IdpState::Removed;
        }
    }

    fn is_removed(&self) -> bool {
        matches!(self.state, IdpState::Removed)
    }

    fn frame(&self) -> &WriteModelFrame {
        &self.frame
    }

    fn frame_mut(&mut self) -> &mut WriteModelFrame {
        &mut self.frame
    }
}
