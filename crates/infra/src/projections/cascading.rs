//! Cascading variant of [`crate::projections::generic::WriteModelProjection`]
//! for write models whose cascade events carry a *different* aggregate's id
//! than the row being updated (`org_member`/`user_grant`: `org.removed`/
//! `user.removed` name the parent org/user, not the member/grant row
//! itself), so the row to update can't be found by primary-key lookup.
//!
//! Every row in the instance is scanned and re-reduced on a cascade event;
//! each write model's own `reduce()` already no-ops on rows the event
//! doesn't apply to (see `OrgMemberWriteModel::reduce`/
//! `UserGrantWriteModel::reduce`), so the extra scan only costs time, not
//! correctness.

use std::marker::PhantomData;

use iam_core::write_model::WriteModelFrame;
use iam_core::{AggregateId, EventRecord, InstanceId, WriteModel};
use iam_events::Projection;

use crate::read_model::InstanceStore;

pub struct CascadingWriteModelProjection<W, S> {
    name: &'static str,
    instance_id: InstanceId,
    store: S,
    _marker: PhantomData<W>,
}

impl<W, S> CascadingWriteModelProjection<W, S>
where
    W: WriteModel + Clone + Send + Sync + 'static,
    S: InstanceStore<AggregateId, W>,
{
    pub fn new(name: &'static str, instance_id: InstanceId, store: S) -> Self {
        Self { name, instance_id, store, _marker: PhantomData }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, aggregate_id: AggregateId) -> Option<W> {
        self.store.get(self.instance_id, &aggregate_id)
    }

    pub fn list(&self) -> Vec<W> {
        self.store.list(self.instance_id)
    }
}

impl<W, S> Projection for CascadingWriteModelProjection<W, S>
where
    W: WriteModel + Clone + Send + Sync + 'static,
    S: InstanceStore<AggregateId, W>,
{
    fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    fn apply(&mut self, event: &EventRecord) {
        if event.aggregate_type == W::aggregate_type() {
            let mut row = self.store.get(self.instance_id, &event.aggregate_id).unwrap_or_else(|| {
                let mut fresh = W::default();
                *fresh.frame_mut() = WriteModelFrame::new(self.instance_id, event.aggregate_id);
                fresh
            });
            row.reduce(event);
            if row.is_removed() {
                self.store.remove(self.instance_id, &event.aggregate_id);
            } else {
                self.store.upsert(self.instance_id, event.aggregate_id, row);
            }
            return;
        }

        if W::extra_aggregate_types().contains(&event.aggregate_type) {
            for mut row in self.store.list(self.instance_id) {
                let key = row.frame().aggregate_id;
                row.reduce(event);
                if row.is_removed() {
                    self.store.remove(self.instance_id, &key);
                } else {
                    self.store.upsert(self.instance_id, key, row);
                }
            }
        }
    }

    fn reset(&mut self) {
        self.store.clear_instance(self.instance_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_model::InMemoryInstanceStore;
    use chrono::Utc;
    use iam_core::aggregates::org_member::{OrgMemberEvent, OrgMemberWriteModel};
    use iam_core::event::Event;
    use iam_core::id::Creator;
    use iam_core::Position;
    use rust_decimal::Decimal;

    fn event(
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
            position: Position::new(Decimal::from(version), 0),
        }
    }

    #[test]
    fn org_removed_cascades_to_every_member_in_that_org() {
        let instance = InstanceId::new();
        let store: InMemoryInstanceStore<AggregateId, OrgMemberWriteModel> = InMemoryInstanceStore::new();
        let mut projection = CascadingWriteModelProjection::new("org_members", instance, store);

        let org_id = AggregateId::new();
        let member_a = AggregateId::new();
        let member_b = AggregateId::new();
        let user_a = AggregateId::new();
        let user_b = AggregateId::new();

        let added_a = OrgMemberEvent::Added { user_id: user_a, roles: vec!["ORG_OWNER".into()] };
        projection.apply(&event(
            "org_member",
            member_a,
            org_id,
            1,
            &added_a.event_type(),
            Some(serde_json::to_value(&added_a).unwrap()),
        ));
        let added_b = OrgMemberEvent::Added { user_id: user_b, roles: vec!["ORG_VIEWER".into()] };
        projection.apply(&event(
            "org_member",
            member_b,
            org_id,
            1,
            &added_b.event_type(),
            Some(serde_json::to_value(&added_b).unwrap()),
        ));

        projection.apply(&event("org", org_id, org_id, 1, "org.removed", None));

        assert!(projection.list().is_empty());
        assert!(projection.get(member_a).is_none());
        assert!(projection.get(member_b).is_none());
    }
}
