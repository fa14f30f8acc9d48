//! A `Projection` that mirrors one write-model's `reduce` logic verbatim,
//! generic over any `WriteModel` whose rows are keyed by their own
//! `aggregate_id`.
//!
//! This covers every aggregate kind except `idp`/`org_member`/`user_grant`,
//! whose rows must also disappear on a *different* aggregate's removal
//! (cascade by foreign key, not by primary key) — those three get their own
//! projection type in `cascading.rs`.

use std::marker::PhantomData;

use iam_core::write_model::WriteModelFrame;
use iam_core::{AggregateId, EventRecord, InstanceId, WriteModel};
use iam_events::Projection;

use crate::read_model::InstanceStore;

/// Projects every event for one aggregate kind into a `WriteModel`-shaped
/// row, upserted by `aggregate_id`. Scoped to a single instance, matching
/// `iam_events::ProjectionRunner`'s per-instance checkpoint.
pub struct WriteModelProjection<W, S> {
    name: &'static str,
    instance_id: InstanceId,
    store: S,
    _marker: PhantomData<W>,
}

impl<W, S> WriteModelProjection<W, S>
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

impl<W, S> Projection for WriteModelProjection<W, S>
where
    W: WriteModel + Clone + Send + Sync + 'static,
    S: InstanceStore<AggregateId, W>,
{
    fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    fn apply(&mut self, event: &EventRecord) {
        if event.aggregate_type != W::aggregate_type()
            && !W::extra_aggregate_types().contains(&event.aggregate_type)
        {
            return;
        }

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
    }

    fn reset(&mut self) {
        self.store.clear_instance(self.instance_id);
    }
}
