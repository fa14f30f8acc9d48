//! Projection checkpoint persistence: where a projection's last-applied
//! `(position, inTxOrder)` is recorded so catch-up can resume after a
//! restart instead of replaying from the origin.
//!
//! Keyed on `(projection_name, instance_id) → (position, inTxOrder)`. Each
//! `ProjectionRunner` (`iam-events`) is scoped to a single instance by
//! construction, so a deployment runs one runner per `(projection, instance)`
//! pair and this store's key matches that shape.

use std::collections::HashMap;
use std::sync::RwLock;

use iam_core::{IamResult, InstanceId, Position};
use iam_events::ProjectionCheckpoint;

/// Persists and recovers a projection's `(position, inTxOrder)` checkpoint
/// so the runtime can resume catch-up after a restart instead of replaying
/// from the origin.
pub trait ProjectionCursorStore: Send + Sync {
    fn get_cursor(
        &self,
        projection_name: &str,
        instance_id: InstanceId,
    ) -> IamResult<Option<ProjectionCheckpoint>>;

    fn update_cursor(&self, projection_name: &str, checkpoint: ProjectionCheckpoint) -> IamResult<()>;

    fn clear_cursor(&self, projection_name: &str, instance_id: InstanceId) -> IamResult<()>;
}

#[derive(Default)]
pub struct InMemoryCursorStore {
    cursors: RwLock<HashMap<(String, InstanceId), ProjectionCheckpoint>>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectionCursorStore for InMemoryCursorStore {
    fn get_cursor(
        &self,
        projection_name: &str,
        instance_id: InstanceId,
    ) -> IamResult<Option<ProjectionCheckpoint>> {
        Ok(self
            .cursors
            .read()
            .expect("cursor store poisoned")
            .get(&(projection_name.to_string(), instance_id))
            .copied())
    }

    fn update_cursor(&self, projection_name: &str, checkpoint: ProjectionCheckpoint) -> IamResult<()> {
        self.cursors
            .write()
            .expect("cursor store poisoned")
            .insert((projection_name.to_string(), checkpoint.instance_id()), checkpoint);
        Ok(())
    }

    fn clear_cursor(&self, projection_name: &str, instance_id: InstanceId) -> IamResult<()> {
        self.cursors
            .write()
            .expect("cursor store poisoned")
            .remove(&(projection_name.to_string(), instance_id));
        Ok(())
    }
}

/// `true` if `position` has already been applied according to `checkpoint`:
/// `<=` is a skip, strictly-greater is new.
pub fn already_applied(checkpoint: Option<ProjectionCheckpoint>, position: Position) -> bool {
    match checkpoint {
        Some(cp) => position <= cp.position(),
        None => false,
    }
}
