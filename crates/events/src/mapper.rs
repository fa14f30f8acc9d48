//! The read-side mapper/interceptor pipeline.
//!
//! Three strata, applied in order per event: interceptors (may drop),
//! global mappers (unconditional transforms), then aggregate-type and
//! event-type mappers (targeted transforms keyed by type). Registration
//! order is execution order within each stratum. Mappers run on every event
//! returned from the log; pushing is unaffected.

use iam_core::event::{AggregateType, EventType};
use iam_core::EventRecord;

type Interceptor = Box<dyn Fn(EventRecord) -> Option<EventRecord> + Send + Sync>;
type Transform = Box<dyn Fn(EventRecord) -> EventRecord + Send + Sync>;

/// Process-wide registry of read-side transforms. Populated at startup
/// before the log serves queries; mutation afterwards is permitted but
/// non-atomic.
#[derive(Default)]
pub struct MapperRegistry {
    interceptors: Vec<Interceptor>,
    global_mappers: Vec<Transform>,
    aggregate_type_mappers: Vec<(AggregateType, Transform)>,
    event_type_mappers: Vec<(EventType, Transform)>,
}

impl MapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_interceptor<F>(&mut self, interceptor: F)
    where
        F: Fn(EventRecord) -> Option<EventRecord> + Send + Sync + 'static,
    {
        self.interceptors.push(Box::new(interceptor));
    }

    pub fn register_global_mapper<F>(&mut self, mapper: F)
    where
        F: Fn(EventRecord) -> EventRecord + Send + Sync + 'static,
    {
        self.global_mappers.push(Box::new(mapper));
    }

    pub fn register_aggregate_type_mapper<F>(&mut self, aggregate_type: impl Into<AggregateType>, mapper: F)
    where
        F: Fn(EventRecord) -> EventRecord + Send + Sync + 'static,
    {
        self.aggregate_type_mappers
            .push((aggregate_type.into(), Box::new(mapper)));
    }

    pub fn register_event_type_mapper<F>(&mut self, event_type: impl Into<EventType>, mapper: F)
    where
        F: Fn(EventRecord) -> EventRecord + Send + Sync + 'static,
    {
        self.event_type_mappers
            .push((event_type.into(), Box::new(mapper)));
    }

    /// Convenience registration for a schema-revision upgrader: only applies
    /// when both the event type and the observed revision match, and its
    /// body is expected to set the new revision on the returned record.
    pub fn register_revision_upgrader<F>(
        &mut self,
        event_type: impl Into<EventType>,
        from_revision: u16,
        upgrader: F,
    ) where
        F: Fn(EventRecord) -> EventRecord + Send + Sync + 'static,
    {
        self.register_event_type_mapper(event_type, move |event| {
            if event.revision == from_revision {
                upgrader(event)
            } else {
                event
            }
        });
    }

    /// Run one event through every stratum in order. Returns `None` if an
    /// interceptor dropped it.
    pub fn apply(&self, event: EventRecord) -> Option<EventRecord> {
        let mut event = event;
        for interceptor in &self.interceptors {
            match interceptor(event) {
                Some(next) => event = next,
                None => return None,
            }
        }

        for mapper in &self.global_mappers {
            event = mapper(event);
        }

        for (aggregate_type, mapper) in &self.aggregate_type_mappers {
            if &event.aggregate_type == aggregate_type {
                event = mapper(event);
            }
        }

        for (event_type, mapper) in &self.event_type_mappers {
            if &event.event_type == event_type {
                event = mapper(event);
            }
        }

        Some(event)
    }

    /// Run a batch through the pipeline, dropping whatever interceptors drop.
    pub fn apply_all(&self, events: Vec<EventRecord>) -> Vec<EventRecord> {
        events.into_iter().filter_map(|e| self.apply(e)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use iam_core::{AggregateId, Creator, InstanceId, Position};

    fn event() -> EventRecord {
        EventRecord {
            instance_id: InstanceId::new(),
            aggregate_type: "user".to_string(),
            aggregate_id: AggregateId::new(),
            aggregate_version: 1,
            event_type: "user.human.added".to_string(),
            revision: 1,
            payload: Some(serde_json::json!({"eventData": {"username": "alice"}})),
            creator: Creator::System,
            owner: AggregateId::new(),
            created_at: Utc::now(),
            position: Position::ZERO,
        }
    }

    #[test]
    fn interceptor_can_drop_event() {
        let mut registry = MapperRegistry::new();
        registry.register_interceptor(|e| {
            if e.aggregate_type == "user" {
                None
            } else {
                Some(e)
            }
        });
        assert!(registry.apply(event()).is_none());
    }

    #[test]
    fn global_mapper_renames_legacy_field() {
        let mut registry = MapperRegistry::new();
        registry.register_global_mapper(|mut e| {
            if let Some(payload) = e.payload.take() {
                if let Some(obj) = payload.as_object() {
                    if let Some(data) = obj.get("eventData") {
                        e.payload = Some(serde_json::json!({ "payload": data }));
                        return e;
                    }
                }
                e.payload = Some(payload);
            }
            e
        });

        let mapped = registry.apply(event()).unwrap();
        assert!(mapped.payload.unwrap().get("payload").is_some());
    }

    #[test]
    fn strata_run_in_order_interceptor_then_global_then_targeted() {
        let mut registry = MapperRegistry::new();
        let mut order = Vec::new();
        // We can't capture `order` mutably across boxed closures directly;
        // use revision as an order-tracking counter instead.
        registry.register_global_mapper(|mut e| {
            e.revision = 2;
            e
        });
        registry.register_aggregate_type_mapper("user", |mut e| {
            assert_eq!(e.revision, 2, "global mapper must run before aggregate-type mapper");
            e.revision = 3;
            e
        });
        registry.register_event_type_mapper("user.human.added", |mut e| {
            assert_eq!(e.revision, 3, "aggregate-type mapper must run before event-type mapper");
            e.revision = 4;
            e
        });
        let mapped = registry.apply(event()).unwrap();
        assert_eq!(mapped.revision, 4);
        order.push(mapped.revision);
        assert_eq!(order, vec![4]);
    }

    #[test]
    fn revision_upgrader_only_fires_on_matching_revision() {
        let mut registry = MapperRegistry::new();
        registry.register_revision_upgrader("user.human.added", 1, |mut e| {
            e.revision = 2;
            e
        });

        let mapped = registry.apply(event()).unwrap();
        assert_eq!(mapped.revision, 2);

        let already_current = EventRecord { revision: 2, ..event() };
        let mapped_again = registry.apply(already_current).unwrap();
        assert_eq!(mapped_again.revision, 2);
    }
}
