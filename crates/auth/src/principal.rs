use iam_core::{InstanceId, UserId};

/// A principal's membership in an instance.
///
/// An authorization boundary object: states which instance the principal is
/// acting within and which roles/permissions are granted there.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InstanceMembership {
    pub instance_id: InstanceId,
    pub roles: Vec<crate::Role>,
    pub permissions: Vec<crate::Permission>,
}

/// A fully resolved principal for authorization decisions.
///
/// Construction of this object is intentionally decoupled from storage and
/// transport: the command engine derives memberships from claims and the
/// `org_member`/`user_grant` projections before calling [`crate::authorize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub active_instance_id: InstanceId,
    pub membership: InstanceMembership,
}
