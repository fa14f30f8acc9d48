//! Concrete aggregate kinds.

pub mod auth_request;
pub mod device_authorization;
pub mod idp;
pub mod org;
pub mod org_member;
pub mod policy;
pub mod user;
pub mod user_grant;
