//! Device-authorization sweeper: a background worker that expires
//! `device_authorization` requests past their `expires_at` deadline —
//! `expired` is only ever realized here, never by a user-facing command
//! handler.
//!
//! A named thread polling on `recv_timeout`, ticking on its own clock
//! rather than waiting on bus-subscription delivery, since there is no
//! event to wait on here — the sweeper drives itself off the clock, not
//! the log.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use iam_core::aggregates::device_authorization::{DeviceAuthorizationEvent, DeviceAuthorizationWriteModel};
use iam_core::id::Creator;
use iam_core::{Command, IamError, IamResult};

use crate::command_engine::CommandEngine;
use crate::event_log::EventLog;
use crate::query::{EventFilter, EventQuery};

#[derive(Debug, Clone, Copy)]
pub struct SweeperConfig {
    pub poll_interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(10) }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SweepStats {
    pub scanned: u64,
    pub expired: u64,
}

/// Handle to control and join the sweeper's background thread.
pub struct SweeperHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl SweeperHandle {
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Spawn the sweeper loop. `log`/`query` are typically two views of the same
/// underlying store (the query side scans for candidates, the log side
/// commits `Expired`).
pub fn spawn<L, Q>(log: Arc<L>, query: Arc<Q>, config: SweeperConfig) -> SweeperHandle
where
    L: EventLog + 'static,
    Q: EventQuery + 'static,
{
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let join = thread::Builder::new()
        .name("device-auth-sweeper".to_string())
        .spawn(move || sweeper_loop(log, query, config, shutdown_rx))
        .expect("failed to spawn device-auth-sweeper thread");

    SweeperHandle { shutdown: shutdown_tx, join: Some(join) }
}

fn sweeper_loop<L, Q>(log: Arc<L>, query: Arc<Q>, config: SweeperConfig, shutdown_rx: mpsc::Receiver<()>)
where
    L: EventLog,
    Q: EventQuery,
{
    loop {
        match shutdown_rx.recv_timeout(config.poll_interval) {
            Ok(()) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                match sweep_once(&*log, &*query, Utc::now()) {
                    Ok(stats) if stats.expired > 0 => {
                        debug!(scanned = stats.scanned, expired = stats.expired, "device auth sweep");
                    }
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "device auth sweep failed"),
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Run one sweep pass: find every `device_authorization.requested` event
/// across every instance (a privileged, cross-instance query — see
/// `query.rs`'s `EventQuery` doc comment), rehydrate each aggregate's
/// current state, and expire it if it is still `requested` and past its
/// deadline. `Concurrency` conflicts (someone else just approved/denied/
/// expired it) are swallowed, not surfaced, since they mean the sweep is
/// simply racing a legitimate state change.
pub fn sweep_once<L, Q>(log: &L, query: &Q, now: chrono::DateTime<Utc>) -> IamResult<SweepStats>
where
    L: EventLog,
    Q: EventQuery,
{
    let engine = CommandEngine::new(log);
    let filter = EventFilter {
        aggregate_types: vec!["device_authorization".to_string()],
        event_types: vec!["device_authorization.requested".to_string()],
        ..EventFilter::default()
    };

    let mut stats = SweepStats::default();
    for candidate in query.query_events(&filter, crate::query::Pagination::new(1000, 0))?.events {
        stats.scanned += 1;
        let model: DeviceAuthorizationWriteModel = engine.load(candidate.instance_id, candidate.aggregate_id)?;
        if !model.is_expirable(now) {
            continue;
        }

        // decide() re-checks expirability against a freshly loaded model,
        // since the outer check above may be racing a concurrent approval.
        let result = engine.dispatch::<DeviceAuthorizationWriteModel>(
            candidate.instance_id,
            candidate.aggregate_id,
            None,
            |model| {
                if !model.is_expirable(now) {
                    return Ok(Vec::new());
                }
                Ok(vec![Command::from_event(
                    candidate.instance_id,
                    candidate.aggregate_id,
                    candidate.aggregate_id,
                    Creator::System,
                    &DeviceAuthorizationEvent::Expired,
                )
                .unwrap()])
            },
        );

        match result {
            Ok(events) if !events.is_empty() => stats.expired += 1,
            Ok(_) => {}
            Err(IamError::Concurrency { .. }) => {}
            Err(err) => return Err(err),
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::InMemoryEventLog;
    use chrono::Duration as ChronoDuration;
    use iam_core::id::InstanceId;
    use iam_core::AggregateId;

    fn requested_command(
        instance_id: InstanceId,
        device_id: AggregateId,
        expires_at: chrono::DateTime<Utc>,
    ) -> Command {
        Command::from_event(
            instance_id,
            device_id,
            device_id,
            Creator::System,
            &DeviceAuthorizationEvent::Requested {
                device_code: "dc".to_string(),
                user_code: "ABCD-EFGH".to_string(),
                expires_at,
            },
        )
        .unwrap()
    }

    #[test]
    fn sweep_expires_only_past_deadline_requests() {
        let log = InMemoryEventLog::new();
        let instance = InstanceId::new();
        let now = Utc::now();

        let expired_device = AggregateId::new();
        log.push(vec![requested_command(instance, expired_device, now - ChronoDuration::seconds(1))]).unwrap();

        let live_device = AggregateId::new();
        log.push(vec![requested_command(instance, live_device, now + ChronoDuration::minutes(5))]).unwrap();

        let stats = sweep_once(&log, &log, now).unwrap();
        assert_eq!(stats.scanned, 2);
        assert_eq!(stats.expired, 1);

        let engine = CommandEngine::new(&log);
        let expired_model: DeviceAuthorizationWriteModel = engine.load(instance, expired_device).unwrap();
        assert_eq!(expired_model.state, iam_core::aggregates::device_authorization::DeviceAuthorizationState::Expired);

        let live_model: DeviceAuthorizationWriteModel = engine.load(instance, live_device).unwrap();
        assert_eq!(live_model.state, iam_core::aggregates::device_authorization::DeviceAuthorizationState::Requested);
    }

    #[test]
    fn sweeping_twice_is_a_no_op_the_second_time() {
        let log = InMemoryEventLog::new();
        let instance = InstanceId::new();
        let now = Utc::now();
        let device_id = AggregateId::new();
        log.push(vec![requested_command(instance, device_id, now - ChronoDuration::seconds(1))]).unwrap();

        let first = sweep_once(&log, &log, now).unwrap();
        assert_eq!(first.expired, 1);

        let second = sweep_once(&log, &log, now).unwrap();
        assert_eq!(second.expired, 0);
    }
}
