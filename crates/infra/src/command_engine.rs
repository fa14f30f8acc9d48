//! The command engine: validate → authorize → load write model → decide →
//! persist, the template every concrete command follows.
//!
//! Load rehydrates the write model by streaming its events through
//! `WriteModel::reduce`, decide runs the caller's closure against that
//! state, and persist appends under an optimistic-concurrency guard via
//! `EventLog::push_with_concurrency_check`. Authorization is
//! `iam-auth::authorize`, called here rather than by each command handler so
//! every command goes through it uniformly; `Creator::System` commands (the
//! projection cascades, the device-authorization sweeper) skip it entirely
//! by passing `None`.

use std::sync::Arc;

use chrono::Utc;

use iam_auth::{authorize, AuthzError, Permission, Principal};
use iam_core::write_model::WriteModelFrame;
use iam_core::{AggregateId, Command, EventRecord, IamError, IamResult, InstanceId, ObjectDetails, WriteModel};
use iam_events::MapperRegistry;

use crate::event_log::{EventLog, ExpectedVersion};

/// Orchestrates one command against one aggregate's write model.
pub struct CommandEngine<L> {
    log: L,
    mappers: Option<Arc<MapperRegistry>>,
}

impl<L: EventLog> CommandEngine<L> {
    pub fn new(log: L) -> Self {
        Self { log, mappers: None }
    }

    /// Same as `new`, but every loaded event is run through `mappers` first —
    /// schema-revision upgrades and instance filtering apply on load the
    /// same way they apply on any other read.
    pub fn with_mappers(log: L, mappers: Arc<MapperRegistry>) -> Self {
        Self { log, mappers: Some(mappers) }
    }

    fn apply_mappers(&self, events: Vec<EventRecord>) -> Vec<EventRecord> {
        match &self.mappers {
            Some(registry) => registry.apply_all(events),
            None => events,
        }
    }

    /// Rehydrate `W` from its event stream, run `decide` against it, and
    /// persist whatever commands it returns under an optimistic-concurrency
    /// guard pinned to the version `decide` actually observed.
    ///
    /// `decide` is expected to perform the domain layer's own precondition
    /// and change-detection checks (e.g. `has_changed`) and return an empty
    /// `Vec` for a no-op command; an empty result short-circuits before any
    /// write — a no-op command emits nothing.
    pub fn dispatch<W>(
        &self,
        instance_id: InstanceId,
        aggregate_id: AggregateId,
        authz: Option<(&Principal, &Permission)>,
        decide: impl FnOnce(&W) -> IamResult<Vec<Command>>,
    ) -> IamResult<Vec<EventRecord>>
    where
        W: WriteModel,
    {
        if let Some((principal, required)) = authz {
            authorize(principal, required).map_err(map_authz_error)?;
        }

        let model = self.load::<W>(instance_id, aggregate_id)?;
        let expected_version = model.frame().last_aggregate_version;

        let commands = decide(&model)?;
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        self.log.push_with_concurrency_check(commands, ExpectedVersion { aggregate_id, expected_version })
    }

    /// Rehydrate a write model from its full event stream without dispatching
    /// anything; used by read-side command preconditions (e.g. "does this
    /// org already exist") and by tests.
    ///
    /// Two-pass load: the model's own stream is loaded and reduced first,
    /// then `model.cascade_sources()` (which needs fields only known after
    /// that first pass, e.g. a resolved parent id) names the extra
    /// `(aggregateType, aggregateId)` streams to load and reduce for
    /// cascade detection.
    pub fn load<W: WriteModel>(&self, instance_id: InstanceId, aggregate_id: AggregateId) -> IamResult<W> {
        let history = self.log.load_stream(instance_id, &W::aggregate_type(), aggregate_id)?;
        let history = self.apply_mappers(history);

        let mut model = W::default();
        *model.frame_mut() = WriteModelFrame::new(instance_id, aggregate_id);
        for event in &history {
            model.reduce(event);
        }

        for (aggregate_type, target_id) in model.cascade_sources() {
            let cascade = self.log.load_stream(instance_id, &aggregate_type, target_id)?;
            let cascade = self.apply_mappers(cascade);
            for event in &cascade {
                model.reduce(event);
            }
        }

        Ok(model)
    }
}

fn map_authz_error(err: AuthzError) -> IamError {
    match err {
        AuthzError::InstanceMismatch => IamError::permission_denied("instance mismatch"),
        AuthzError::Forbidden(permission) => {
            IamError::permission_denied(format!("missing permission '{permission}'"))
        }
    }
}

/// Build `ObjectDetails` from the first (or only) committed event, the shape
/// every successful command returns for the read-your-writes pattern.
pub fn object_details(events: &[EventRecord]) -> Option<ObjectDetails> {
    events.first().map(|e| ObjectDetails::from_event(e, Utc::now()))
}
