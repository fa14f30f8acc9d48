use std::collections::HashSet;

use thiserror::Error;

use crate::{InstanceMembership, Permission, Principal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("instance mismatch")]
    InstanceMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Authorize a principal within its active instance context.
///
/// No IO, no panics. This is the command engine's Authorize step
/// (`Creator::System` events bypass this entirely and never call it).
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_instance_id != principal.membership.instance_id {
        return Err(AuthzError::InstanceMismatch);
    }

    let perms: HashSet<&str> = principal
        .membership
        .permissions
        .iter()
        .map(|p| p.as_str())
        .collect();

    if perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Authorize against any one of several memberships (e.g. a principal with
/// grants in more than one org within the same instance).
pub fn authorize_any(
    memberships: &[InstanceMembership],
    active_instance_id: iam_core::InstanceId,
    required: &Permission,
) -> Result<(), AuthzError> {
    let in_instance: Vec<&InstanceMembership> = memberships
        .iter()
        .filter(|m| m.instance_id == active_instance_id)
        .collect();

    if in_instance.is_empty() {
        return Err(AuthzError::InstanceMismatch);
    }

    let has_it = in_instance
        .iter()
        .any(|m| m.permissions.iter().any(|p| p.as_str() == required.as_str()));

    if has_it {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}
