//! In-process, single-writer fan-out of committed events.
//!
//! The bus is invoked exactly once per commit, by the event log, after the
//! transaction succeeds. It is not durable and does not replay: the
//! projection runtime's catch-up path (querying the log directly) is the
//! only source of history.

use std::collections::HashMap;
use std::sync::{mpsc, Mutex};

use iam_core::event::{AggregateType, EventType};
use iam_core::EventRecord;

use crate::subscription::Subscription;

/// `aggregateType → eventTypes`. An empty/absent `eventTypes` list means
/// "all event types for that aggregate type".
pub type AggregateTypeFilter = HashMap<AggregateType, Vec<EventType>>;

struct Subscriber {
    filter: AggregateTypeFilter,
    sender: mpsc::Sender<EventRecord>,
}

impl Subscriber {
    fn matches(&self, event: &EventRecord) -> bool {
        match self.filter.get(&event.aggregate_type) {
            None => false,
            Some(event_types) => event_types.is_empty() || event_types.contains(&event.event_type),
        }
    }
}

/// In-process event bus. `notify` is called by the event log's commit path;
/// `subscribe` is called by projections and other in-process observers.
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscription scoped to the given aggregate-type filter.
    pub fn subscribe(&self, filter: AggregateTypeFilter) -> Subscription {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(Subscriber { filter, sender: tx });
        }
        Subscription::new(rx)
    }

    /// Fan out committed events to every matching subscription. Dead
    /// subscribers (the receiving end was dropped, i.e. `unsubscribe`) are
    /// pruned opportunistically.
    pub fn notify(&self, events: &[EventRecord]) {
        let Ok(mut subs) = self.subscribers.lock() else {
            return;
        };
        subs.retain(|sub| {
            let mut alive = true;
            for event in events {
                if sub.matches(event) && sub.sender.send(event.clone()).is_err() {
                    alive = false;
                    break;
                }
            }
            alive
        });
    }

    /// Number of live subscribers, mostly useful for tests/diagnostics.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use iam_core::{AggregateId, Creator, InstanceId, Position};

    fn event(aggregate_type: &str, event_type: &str) -> EventRecord {
        EventRecord {
            instance_id: InstanceId::new(),
            aggregate_type: aggregate_type.to_string(),
            aggregate_id: AggregateId::new(),
            aggregate_version: 1,
            event_type: event_type.to_string(),
            revision: 1,
            payload: None,
            creator: Creator::System,
            owner: AggregateId::new(),
            created_at: Utc::now(),
            position: Position::ZERO,
        }
    }

    #[test]
    fn filters_by_aggregate_and_event_type() {
        let bus = EventBus::new();
        let mut filter = AggregateTypeFilter::new();
        filter.insert("user".to_string(), vec!["user.human.added".to_string()]);
        let sub = bus.subscribe(filter);

        bus.notify(&[event("org", "org.added")]);
        assert!(sub.try_recv().is_none());

        bus.notify(&[event("user", "user.locked")]);
        assert!(sub.try_recv().is_none());

        bus.notify(&[event("user", "user.human.added")]);
        assert!(sub.try_recv().is_some());
    }

    #[test]
    fn empty_event_type_list_means_all_types() {
        let bus = EventBus::new();
        let mut filter = AggregateTypeFilter::new();
        filter.insert("user".to_string(), Vec::new());
        let sub = bus.subscribe(filter);

        bus.notify(&[event("user", "user.locked")]);
        assert!(sub.try_recv().is_some());
    }

    #[test]
    fn unsubscribe_stops_delivery_and_is_pruned() {
        let bus = EventBus::new();
        let mut filter = AggregateTypeFilter::new();
        filter.insert("user".to_string(), Vec::new());
        let sub = bus.subscribe(filter);
        sub.unsubscribe();

        bus.notify(&[event("user", "user.locked")]);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
