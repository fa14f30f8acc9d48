//! Projection runtime: the trait every read-model projection implements,
//! plus a checkpoint-tracking runner.
//!
//! Read models are disposable; events are the source of truth. Idempotence
//! is enforced by position: an event whose `(position, inTxOrder)` is not
//! strictly greater than the projection's checkpoint is skipped rather than
//! re-applied, so catch-up and live delivery can overlap safely.

use iam_core::{EventRecord, InstanceId, Position};

/// A read-model projection. `apply` is expected to be an upsert against
/// whatever storage backs the projection; `reset` drops all projected state
/// so a full rebuild can start from the log again.
pub trait Projection {
    fn instance_id(&self) -> InstanceId;

    fn apply(&mut self, event: &EventRecord);

    fn reset(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionCheckpoint {
    instance_id: InstanceId,
    position: Position,
}

impl ProjectionCheckpoint {
    /// Build a checkpoint to resume from, e.g. one loaded from the
    /// `projection_states` table at process start.
    pub fn new(instance_id: InstanceId, position: Position) -> Self {
        Self { instance_id, position }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn position(&self) -> Position {
        self.position
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionError {
    InstanceMismatch { expected: InstanceId, found: InstanceId },
}

/// Drives a [`Projection`] from a stream of [`EventRecord`]s, tracking a
/// per-instance checkpoint and skipping anything at or before it.
#[derive(Debug)]
pub struct ProjectionRunner<P: Projection> {
    projection: P,
    checkpoint: Option<ProjectionCheckpoint>,
}

impl<P: Projection> ProjectionRunner<P> {
    pub fn new(projection: P) -> Self {
        Self { projection, checkpoint: None }
    }

    /// Resume from a previously persisted checkpoint (e.g. loaded from the
    /// `projection_states` table at process start).
    pub fn resume(projection: P, checkpoint: ProjectionCheckpoint) -> Self {
        Self { projection, checkpoint: Some(checkpoint) }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn projection_mut(&mut self) -> &mut P {
        &mut self.projection
    }

    pub fn into_projection(self) -> P {
        self.projection
    }

    pub fn checkpoint(&self) -> Option<ProjectionCheckpoint> {
        self.checkpoint
    }

    /// Apply one event if it is newer than the checkpoint; otherwise skip it
    /// (idempotent re-delivery, e.g. catch-up racing a live subscription).
    pub fn apply(&mut self, event: &EventRecord) -> Result<(), ProjectionError> {
        match self.checkpoint {
            Some(cp) if cp.instance_id != event.instance_id => {
                return Err(ProjectionError::InstanceMismatch {
                    expected: cp.instance_id,
                    found: event.instance_id,
                });
            }
            Some(cp) if event.position <= cp.position => {
                return Ok(());
            }
            _ => {}
        }

        self.projection.apply(event);
        self.checkpoint = Some(ProjectionCheckpoint {
            instance_id: event.instance_id,
            position: event.position,
        });
        Ok(())
    }

    pub fn run<'a>(&mut self, events: impl IntoIterator<Item = &'a EventRecord>) -> Result<(), ProjectionError> {
        for event in events {
            self.apply(event)?;
        }
        Ok(())
    }

    /// Drop all projected state and the checkpoint, then replay from scratch.
    pub fn rebuild<'a>(
        &mut self,
        events: impl IntoIterator<Item = &'a EventRecord>,
    ) -> Result<(), ProjectionError> {
        self.projection.reset();
        self.checkpoint = None;
        self.run(events)
    }
}
