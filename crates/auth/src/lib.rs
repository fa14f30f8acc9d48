//! Authorization primitives: roles, permissions, principals, JWT claims,
//! and the pure authorize() check the command engine's Authorize step calls.
//!
//! No IO, no storage. `iam-infra`'s projections maintain the
//! `EffectivePermissions` rows this crate's types describe; the command
//! engine loads one and calls [`authorize`] before accepting a command.

pub mod authorize;
pub mod claims;
pub mod effective_permissions;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{authorize, authorize_any, AuthzError};
pub use claims::{Hs256JwtValidator, JwtClaims, JwtValidator, TokenValidationError};
pub use effective_permissions::{default_permissions_for, EffectivePermissions};
pub use permissions::Permission;
pub use principal::{InstanceMembership, Principal};
pub use roles::Role;
