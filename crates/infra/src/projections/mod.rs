//! Concrete read-model projections, one per aggregate kind.
//!
//! Nine of the twelve tables mirror one write model's `reduce` logic
//! verbatim (`generic::WriteModelProjection`); `idp`/`org_member`/
//! `user_grant` need `cascading::CascadingWriteModelProjection` because
//! their cascade events (`org.removed`/`user.removed`) name the parent
//! aggregate, not the row itself, so the row to update can't be found by a
//! primary-key lookup on the incoming event.

pub mod cascading;
pub mod generic;
pub mod replay;

use iam_core::aggregates::auth_request::AuthRequestWriteModel;
use iam_core::aggregates::device_authorization::DeviceAuthorizationWriteModel;
use iam_core::aggregates::idp::IdpWriteModel;
use iam_core::aggregates::org::OrgWriteModel;
use iam_core::aggregates::org_member::OrgMemberWriteModel;
use iam_core::aggregates::policy::{
    DomainPolicyKind, LabelPolicyKind, LockoutPolicyKind, MailTemplatePolicyKind, PolicyWriteModel,
    PrivacyPolicyKind,
};
use iam_core::aggregates::user::UserWriteModel;
use iam_core::aggregates::user_grant::UserGrantWriteModel;
use iam_core::AggregateId;

use crate::read_model::InMemoryInstanceStore;
use cascading::CascadingWriteModelProjection;
use generic::WriteModelProjection;

pub type OrgProjection = WriteModelProjection<OrgWriteModel, InMemoryInstanceStore<AggregateId, OrgWriteModel>>;
pub type UserProjection = WriteModelProjection<UserWriteModel, InMemoryInstanceStore<AggregateId, UserWriteModel>>;
pub type IdpProjection =
    CascadingWriteModelProjection<IdpWriteModel, InMemoryInstanceStore<AggregateId, IdpWriteModel>>;
pub type AuthRequestProjection =
    WriteModelProjection<AuthRequestWriteModel, InMemoryInstanceStore<AggregateId, AuthRequestWriteModel>>;
pub type DeviceAuthorizationProjection = WriteModelProjection<
    DeviceAuthorizationWriteModel,
    InMemoryInstanceStore<AggregateId, DeviceAuthorizationWriteModel>,
>;

pub type LabelPolicyProjection = WriteModelProjection<
    PolicyWriteModel<LabelPolicyKind>,
    InMemoryInstanceStore<AggregateId, PolicyWriteModel<LabelPolicyKind>>,
>;
pub type PrivacyPolicyProjection = WriteModelProjection<
    PolicyWriteModel<PrivacyPolicyKind>,
    InMemoryInstanceStore<AggregateId, PolicyWriteModel<PrivacyPolicyKind>>,
>;
pub type MailTemplatePolicyProjection = WriteModelProjection<
    PolicyWriteModel<MailTemplatePolicyKind>,
    InMemoryInstanceStore<AggregateId, PolicyWriteModel<MailTemplatePolicyKind>>,
>;
pub type DomainPolicyProjection = WriteModelProjection<
    PolicyWriteModel<DomainPolicyKind>,
    InMemoryInstanceStore<AggregateId, PolicyWriteModel<DomainPolicyKind>>,
>;
pub type LockoutPolicyProjection = WriteModelProjection<
    PolicyWriteModel<LockoutPolicyKind>,
    InMemoryInstanceStore<AggregateId, PolicyWriteModel<LockoutPolicyKind>>,
>;

pub type OrgMemberProjection =
    CascadingWriteModelProjection<OrgMemberWriteModel, InMemoryInstanceStore<AggregateId, OrgMemberWriteModel>>;
pub type UserGrantProjection =
    CascadingWriteModelProjection<UserGrantWriteModel, InMemoryInstanceStore<AggregateId, UserGrantWriteModel>>;
