//! Role-to-permission resolution backing the `org_member`/`user_grant`
//! projections' read side, and the command engine's Authorize step.
//!
//! Factored into `iam-auth` rather than `iam-core` or `iam-infra` since both
//! the command engine's authorize step and the projections' read side need
//! the same role→permission mapping and effective-permission computation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use iam_core::{InstanceId, UserId};

use crate::{Permission, Role};

/// The built-in roles this deployment ships with. Org-defined custom roles
/// (if ever added) would extend this table; out of scope for now.
pub fn default_permissions_for(role: &Role) -> &'static [&'static str] {
    match role.as_str() {
        "owner" => &["org.write", "org.read", "user.write", "user.read", "policy.write", "policy.read"],
        "admin" => &["org.read", "user.write", "user.read", "policy.read"],
        "member" => &["org.read", "user.read"],
        _ => &[],
    }
}

/// A user's resolved roles and permissions within one instance, as
/// maintained by the `org_member`/`user_grant` projections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermissions {
    pub user_id: UserId,
    pub instance_id: InstanceId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl EffectivePermissions {
    /// Recompute `permissions` from `roles` using the default mapping.
    /// Called whenever a projection applies a role-granting/revoking event.
    pub fn recompute(user_id: UserId, instance_id: InstanceId, roles: Vec<Role>) -> Self {
        let mut permissions: BTreeSet<String> = BTreeSet::new();
        for role in &roles {
            permissions.extend(default_permissions_for(role).iter().map(|p| p.to_string()));
        }
        Self {
            user_id,
            instance_id,
            roles,
            permissions: permissions.into_iter().map(Permission::new).collect(),
        }
    }

    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions.iter().any(|p| p.as_str() == permission.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_gets_the_union_of_owner_permissions() {
        let eff = EffectivePermissions::recompute(UserId::new(), InstanceId::new(), vec![Role::new("owner")]);
        assert!(eff.has_permission(&Permission::new("org.write")));
        assert!(eff.has_permission(&Permission::new("policy.write")));
    }

    #[test]
    fn unknown_role_grants_nothing() {
        let eff = EffectivePermissions::recompute(UserId::new(), InstanceId::new(), vec![Role::new("guest")]);
        assert!(eff.permissions.is_empty());
    }

    #[test]
    fn multiple_roles_union_their_permissions() {
        let eff = EffectivePermissions::recompute(
            UserId::new(),
            InstanceId::new(),
            vec![Role::new("member"), Role::new("admin")],
        );
        assert!(eff.has_permission(&Permission::new("user.write")));
        assert!(eff.has_permission(&Permission::new("org.read")));
    }
}
