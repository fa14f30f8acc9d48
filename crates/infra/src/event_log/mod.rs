//! The event log: atomic multi-event commit with per-aggregate version
//! assignment, global `(position, inTxOrder)` ordering, and unique-constraint
//! side effects.
//!
//! Both backends share one `EventStore`-style trait shape: a
//! transaction-scoped version-check-then-insert structure keyed on
//! `(aggregateVersion, position, inTxOrder)` rather than a single sequence
//! column, so concurrent writers racing the same aggregate fail the check
//! instead of silently interleaving.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use rust_decimal::Decimal;

use iam_core::command::UniqueConstraintAction;
use iam_core::{
    AggregateId, AggregateType, Command, EventRecord, IamError, IamResult, InstanceId, Position,
};

pub mod postgres;

pub use postgres::PostgresEventLog;

/// Scope key for a unique-constraint row: `None` for global constraints,
/// `Some(instance_id)` for instance-scoped ones.
type UniqueKey = (Option<InstanceId>, String, String);
type StreamKey = (InstanceId, AggregateType, AggregateId);

/// The optimistic-concurrency precondition for `push_with_concurrency_check`:
/// the aggregate named must be at exactly `expected_version` before the push
/// is applied.
#[derive(Debug, Clone, Copy)]
pub struct ExpectedVersion {
    pub aggregate_id: AggregateId,
    pub expected_version: u64,
}

/// Store-level operations on the append-only log.
pub trait EventLog: Send + Sync {
    /// Atomically insert one or more commands as events. No OCC precondition.
    fn push(&self, commands: Vec<Command>) -> IamResult<Vec<EventRecord>>;

    /// Same as `push`, but fails with `Concurrency` if `expected.aggregate_id`
    /// has advanced past `expected.expected_version` since the caller's
    /// write-model was loaded.
    fn push_with_concurrency_check(
        &self,
        commands: Vec<Command>,
        expected: ExpectedVersion,
    ) -> IamResult<Vec<EventRecord>>;

    /// The full committed history of one aggregate, in version order.
    fn load_stream(
        &self,
        instance_id: InstanceId,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> IamResult<Vec<EventRecord>>;

    fn health(&self) -> IamResult<()>;
}

impl<T: EventLog + ?Sized> EventLog for &T {
    fn push(&self, commands: Vec<Command>) -> IamResult<Vec<EventRecord>> {
        (**self).push(commands)
    }

    fn push_with_concurrency_check(
        &self,
        commands: Vec<Command>,
        expected: ExpectedVersion,
    ) -> IamResult<Vec<EventRecord>> {
        (**self).push_with_concurrency_check(commands, expected)
    }

    fn load_stream(
        &self,
        instance_id: InstanceId,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> IamResult<Vec<EventRecord>> {
        (**self).load_stream(instance_id, aggregate_type, aggregate_id)
    }

    fn health(&self) -> IamResult<()> {
        (**self).health()
    }
}

impl<T: EventLog + ?Sized> EventLog for std::sync::Arc<T> {
    fn push(&self, commands: Vec<Command>) -> IamResult<Vec<EventRecord>> {
        (**self).push(commands)
    }

    fn push_with_concurrency_check(
        &self,
        commands: Vec<Command>,
        expected: ExpectedVersion,
    ) -> IamResult<Vec<EventRecord>> {
        (**self).push_with_concurrency_check(commands, expected)
    }

    fn load_stream(
        &self,
        instance_id: InstanceId,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> IamResult<Vec<EventRecord>> {
        (**self).load_stream(instance_id, aggregate_type, aggregate_id)
    }

    fn health(&self) -> IamResult<()> {
        (**self).health()
    }
}

/// Wraps any `EventLog` and fans out committed events to the subscription
/// bus after the underlying push succeeds — never before, so a subscriber
/// can never observe an event that a concurrent reader of the log cannot
/// also see.
pub struct PublishingEventLog<L> {
    inner: L,
    bus: std::sync::Arc<iam_events::EventBus>,
}

impl<L: EventLog> PublishingEventLog<L> {
    pub fn new(inner: L, bus: std::sync::Arc<iam_events::EventBus>) -> Self {
        Self { inner, bus }
    }
}

impl<L: EventLog> EventLog for PublishingEventLog<L> {
    fn push(&self, commands: Vec<Command>) -> IamResult<Vec<EventRecord>> {
        let events = self.inner.push(commands)?;
        self.bus.notify(&events);
        Ok(events)
    }

    fn push_with_concurrency_check(
        &self,
        commands: Vec<Command>,
        expected: ExpectedVersion,
    ) -> IamResult<Vec<EventRecord>> {
        let events = self.inner.push_with_concurrency_check(commands, expected)?;
        self.bus.notify(&events);
        Ok(events)
    }

    fn load_stream(
        &self,
        instance_id: InstanceId,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> IamResult<Vec<EventRecord>> {
        self.inner.load_stream(instance_id, aggregate_type, aggregate_id)
    }

    fn health(&self) -> IamResult<()> {
        self.inner.health()
    }
}

#[derive(Default)]
struct InMemoryState {
    streams: HashMap<StreamKey, Vec<EventRecord>>,
    unique_constraints: HashSet<UniqueKey>,
}

/// Single-process event log backed by a `Mutex`. Used by tests and by the
/// device-authorization sweeper's own unit tests; not durable.
pub struct InMemoryEventLog {
    state: Mutex<InMemoryState>,
    position_counter: AtomicI64,
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InMemoryState::default()),
            position_counter: AtomicI64::new(1),
        }
    }

    fn push_internal(
        &self,
        commands: Vec<Command>,
        occ: Option<ExpectedVersion>,
    ) -> IamResult<Vec<EventRecord>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        for command in &commands {
            if command.aggregate_type.is_empty() {
                return Err(IamError::validation("aggregateType must not be empty"));
            }
            if command.event_type.is_empty() {
                return Err(IamError::validation("eventType must not be empty"));
            }
        }

        let mut state = self.state.lock().expect("event log mutex poisoned");

        if let Some(expected) = occ {
            let command = commands
                .iter()
                .find(|c| c.aggregate_id == expected.aggregate_id)
                .ok_or_else(|| IamError::validation("expectedVersion aggregate not in batch"))?;
            let key = (command.instance_id, command.aggregate_type.clone(), expected.aggregate_id);
            let actual = state.streams.get(&key).map(|s| s.len() as u64).unwrap_or(0);
            if actual != expected.expected_version {
                return Err(IamError::concurrency(expected.expected_version, actual));
            }
        }

        // Unique constraints are validated (and would be rolled back together
        // with everything else) before any event is written, so a conflicting
        // `Add` leaves the log completely untouched (invariant 4).
        for command in &commands {
            for uc in &command.unique_constraints {
                if uc.action == UniqueConstraintAction::Add {
                    let scope = if uc.is_global { None } else { Some(command.instance_id) };
                    let key = (scope, uc.unique_type.clone(), uc.unique_field.clone());
                    if state.unique_constraints.contains(&key) {
                        return Err(IamError::unique_constraint_violation(uc.error_message.clone()));
                    }
                }
            }
        }

        let position = Decimal::from(self.position_counter.fetch_add(1, Ordering::SeqCst));
        let now = Utc::now();
        let mut offsets: HashMap<StreamKey, u64> = HashMap::new();
        let mut committed = Vec::with_capacity(commands.len());

        for (in_tx_order, command) in commands.iter().enumerate() {
            let key = (command.instance_id, command.aggregate_type.clone(), command.aggregate_id);
            let current_max = state.streams.get(&key).map(|s| s.len() as u64).unwrap_or(0);
            let offset = offsets.entry(key.clone()).or_insert(0);
            let aggregate_version = current_max + 1 + *offset;
            *offset += 1;

            let record = EventRecord {
                instance_id: command.instance_id,
                aggregate_type: command.aggregate_type.clone(),
                aggregate_id: command.aggregate_id,
                aggregate_version,
                event_type: command.event_type.clone(),
                revision: command.revision,
                payload: command.payload.clone(),
                creator: command.creator,
                owner: command.owner,
                created_at: now,
                position: Position::new(position, in_tx_order as i32),
            };
            committed.push((key, record));
        }

        for command in &commands {
            let scope = |uc_global: bool| if uc_global { None } else { Some(command.instance_id) };
            for uc in &command.unique_constraints {
                match uc.action {
                    UniqueConstraintAction::Add => {
                        state.unique_constraints.insert((
                            scope(uc.is_global),
                            uc.unique_type.clone(),
                            uc.unique_field.clone(),
                        ));
                    }
                    UniqueConstraintAction::Remove => {
                        state.unique_constraints.remove(&(
                            scope(uc.is_global),
                            uc.unique_type.clone(),
                            uc.unique_field.clone(),
                        ));
                    }
                    UniqueConstraintAction::InstanceRemove => {
                        state
                            .unique_constraints
                            .retain(|(scope, _, _)| *scope != Some(command.instance_id));
                    }
                }
            }
        }

        let mut events = Vec::with_capacity(committed.len());
        for (key, record) in committed {
            state.streams.entry(key).or_default().push(record.clone());
            events.push(record);
        }

        Ok(events)
    }
}

impl InMemoryEventLog {
    /// Every event ever committed to this log, unsorted. Used by the
    /// in-memory `EventQuery` implementation (`query.rs`); a real store
    /// would run this as a SQL scan instead of holding it all in one `Vec`.
    pub fn snapshot_all(&self) -> Vec<EventRecord> {
        let state = self.state.lock().expect("event log mutex poisoned");
        state.streams.values().flatten().cloned().collect()
    }
}

impl EventLog for InMemoryEventLog {
    fn push(&self, commands: Vec<Command>) -> IamResult<Vec<EventRecord>> {
        self.push_internal(commands, None)
    }

    fn push_with_concurrency_check(
        &self,
        commands: Vec<Command>,
        expected: ExpectedVersion,
    ) -> IamResult<Vec<EventRecord>> {
        self.push_internal(commands, Some(expected))
    }

    fn load_stream(
        &self,
        instance_id: InstanceId,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> IamResult<Vec<EventRecord>> {
        let state = self.state.lock().expect("event log mutex poisoned");
        let key = (instance_id, aggregate_type.to_string(), aggregate_id);
        Ok(state.streams.get(&key).cloned().unwrap_or_default())
    }

    fn health(&self) -> IamResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iam_core::id::Creator;
    use iam_core::UniqueConstraint;

    fn command(instance_id: InstanceId, aggregate_id: AggregateId, event_type: &str) -> Command {
        Command {
            instance_id,
            aggregate_type: "user".to_string(),
            aggregate_id,
            event_type: event_type.to_string(),
            revision: 1,
            payload: None,
            creator: Creator::System,
            owner: aggregate_id,
            unique_constraints: Vec::new(),
        }
    }

    #[test]
    fn versions_are_contiguous_across_two_pushes() {
        let log = InMemoryEventLog::new();
        let instance = InstanceId::new();
        let aggregate = AggregateId::new();

        let first = log.push(vec![command(instance, aggregate, "user.human.added")]).unwrap();
        assert_eq!(first[0].aggregate_version, 1);

        let second = log.push(vec![command(instance, aggregate, "user.locked")]).unwrap();
        assert_eq!(second[0].aggregate_version, 2);
    }

    #[test]
    fn batch_in_one_push_assigns_increasing_versions_and_shared_position() {
        let log = InMemoryEventLog::new();
        let instance = InstanceId::new();
        let aggregate = AggregateId::new();

        let events = log
            .push(vec![
                command(instance, aggregate, "user.human.added"),
                command(instance, aggregate, "user.locked"),
            ])
            .unwrap();

        assert_eq!(events[0].aggregate_version, 1);
        assert_eq!(events[1].aggregate_version, 2);
        assert_eq!(events[0].position.position, events[1].position.position);
        assert!(events[0].position.in_tx_order < events[1].position.in_tx_order);
    }

    #[test]
    fn concurrency_check_rejects_stale_expected_version() {
        let log = InMemoryEventLog::new();
        let instance = InstanceId::new();
        let aggregate = AggregateId::new();
        log.push(vec![command(instance, aggregate, "user.human.added")]).unwrap();

        let err = log
            .push_with_concurrency_check(
                vec![command(instance, aggregate, "user.locked")],
                ExpectedVersion { aggregate_id: aggregate, expected_version: 0 },
            )
            .unwrap_err();

        assert!(matches!(err, IamError::Concurrency { expected: 0, actual: 1, .. }));
    }

    #[test]
    fn conflicting_unique_add_rolls_back_the_whole_push() {
        let log = InMemoryEventLog::new();
        let instance = InstanceId::new();
        let user_a = AggregateId::new();
        let user_b = AggregateId::new();

        let mut add_alice = command(instance, user_a, "user.human.added");
        add_alice.unique_constraints = vec![UniqueConstraint::add("username", "alice")];
        log.push(vec![add_alice]).unwrap();

        let mut add_alice_again = command(instance, user_b, "user.human.added");
        add_alice_again.unique_constraints = vec![UniqueConstraint::add("username", "alice")];
        let err = log.push(vec![add_alice_again]).unwrap_err();
        assert!(matches!(err, IamError::UniqueConstraintViolation { .. }));

        let stream = log.load_stream(instance, "user", user_b).unwrap();
        assert!(stream.is_empty());
    }

    #[test]
    fn removing_a_unique_constraint_frees_it_for_reuse() {
        let log = InMemoryEventLog::new();
        let instance = InstanceId::new();
        let user_a = AggregateId::new();
        let user_b = AggregateId::new();

        let mut add_alice = command(instance, user_a, "user.human.added");
        add_alice.unique_constraints = vec![UniqueConstraint::add("username", "alice")];
        log.push(vec![add_alice]).unwrap();

        let mut remove_alice = command(instance, user_a, "user.removed");
        remove_alice.unique_constraints = vec![UniqueConstraint::remove("username", "alice")];
        log.push(vec![remove_alice]).unwrap();

        let mut add_alice_again = command(instance, user_b, "user.human.added");
        add_alice_again.unique_constraints = vec![UniqueConstraint::add("username", "alice")];
        assert!(log.push(vec![add_alice_again]).is_ok());
    }
}
