//! Write-model frame and trait shared by every aggregate kind.

use crate::event::{AggregateType, EventRecord};
use crate::id::{AggregateId, InstanceId};
use crate::position::Position;

/// Fields every write model carries regardless of aggregate kind.
#[derive(Debug, Clone, Default)]
pub struct WriteModelFrame {
    pub instance_id: InstanceId,
    pub aggregate_id: AggregateId,
    pub resource_owner: AggregateId,
    pub last_aggregate_version: u64,
    pub last_position: Position,
}

impl WriteModelFrame {
    pub fn new(instance_id: InstanceId, aggregate_id: AggregateId) -> Self {
        Self {
            instance_id,
            aggregate_id,
            resource_owner: aggregate_id,
            last_aggregate_version: 0,
            last_position: Position::ZERO,
        }
    }

    /// `true` if no event has been reduced yet (aggregate does not exist).
    pub fn is_unloaded(&self) -> bool {
        self.last_aggregate_version == 0
    }
}

/// A write model: the ephemeral, per-command reduction of one aggregate's
/// event stream.
///
/// `reduce` must be deterministic and side-effect-free: identical event
/// sequences produce identical state regardless of load chunking or timing.
pub trait WriteModel: Default {
    /// The aggregate kind this write model reduces, e.g. `"user"`.
    fn aggregate_type() -> AggregateType;

    /// Extra aggregate types this write model also subscribes to for cascade
    /// purposes (e.g. the `user` write model also consumes `org.removed`).
    fn extra_aggregate_types() -> Vec<AggregateType> {
        Vec::new()
    }

    /// `(aggregateType, aggregateId)` pairs, among the types named by
    /// `extra_aggregate_types`, whose streams must also be loaded and reduced
    /// to detect this model's cascades. Called after this model's own stream
    /// has already been reduced once, so fields like a resolved parent id are
    /// available. Empty by default (no cascades); override per aggregate kind
    /// once the relevant parent ids are known.
    fn cascade_sources(&self) -> Vec<(AggregateType, AggregateId)> {
        Vec::new()
    }

    /// Apply one committed event to this model's state. Unknown event types
    /// for this aggregate are ignored (total function).
    fn reduce(&mut self, event: &EventRecord);

    /// `true` once this model has reduced a terminal removal for its own row
    /// (a direct `removed` event, or a cascaded parent removal). A read model
    /// keyed by this aggregate's id must delete its row rather than upsert
    /// it once this flips true. Defaults to `false` for aggregates that have
    /// no removal state at all.
    fn is_removed(&self) -> bool {
        false
    }

    fn frame(&self) -> &WriteModelFrame;
    fn frame_mut(&mut self) -> &mut WriteModelFrame;

    /// Advance bookkeeping fields common to every event; concrete `reduce`
    /// implementations call this before or after their own field updates.
    fn track(&mut self, event: &EventRecord) {
        let frame = self.frame_mut();
        frame.last_aggregate_version = event.aggregate_version;
        frame.last_position = event.position;
        frame.resource_owner = event.owner;
    }
}
