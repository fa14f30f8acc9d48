//! Query engine: filtered reads over the committed log.
//!
//! `EventFilter`/`Pagination`/`EventQuery` key reads on this domain's
//! `instance_id` + `(position, inTxOrder)` ordering. `search` (the
//! disjunctive counterpart to the conjunctive `query_events`) is a default
//! method built entirely on top of `query_events`, so no store-specific
//! override is needed.

use chrono::{DateTime, Utc};

use iam_core::event::{AggregateType, EventType};
use iam_core::{AggregateId, Creator, EventRecord, IamResult, InstanceId, Position};

use crate::event_log::InMemoryEventLog;

/// Bounds how many rows a single `query_events` call returns.
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { limit: 50, offset: 0 }
    }
}

impl Pagination {
    const MAX_LIMIT: u32 = 1000;

    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit: limit.min(Self::MAX_LIMIT).max(1), offset }
    }
}

/// A conjunctive filter: every `Some`/non-empty field narrows the result.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub instance_id: Option<InstanceId>,
    pub aggregate_types: Vec<AggregateType>,
    pub aggregate_ids: Vec<AggregateId>,
    pub event_types: Vec<EventType>,
    pub owner: Option<AggregateId>,
    pub creator: Option<Creator>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    /// Exclusive lower bound on `(position, inTxOrder)`. `Position::ZERO`
    /// means "from the beginning".
    pub position_after: Option<Position>,
    pub descending: bool,
}

impl EventFilter {
    pub fn for_instance(instance_id: InstanceId) -> Self {
        Self { instance_id: Some(instance_id), ..Default::default() }
    }

    pub fn with_aggregate_type(mut self, aggregate_type: impl Into<AggregateType>) -> Self {
        self.aggregate_types.push(aggregate_type.into());
        self
    }

    pub fn with_aggregate_id(mut self, aggregate_id: AggregateId) -> Self {
        self.aggregate_ids.push(aggregate_id);
        self
    }

    pub fn with_position_after(mut self, position: Position) -> Self {
        self.position_after = Some(position);
        self
    }

    fn matches(&self, event: &EventRecord) -> bool {
        if let Some(instance_id) = self.instance_id {
            if event.instance_id != instance_id {
                return false;
            }
        }
        if !self.aggregate_types.is_empty() && !self.aggregate_types.contains(&event.aggregate_type) {
            return false;
        }
        if !self.aggregate_ids.is_empty() && !self.aggregate_ids.contains(&event.aggregate_id) {
            return false;
        }
        if !self.event_types.is_empty() && !self.event_types.contains(&event.event_type) {
            return false;
        }
        if let Some(owner) = self.owner {
            if event.owner != owner {
                return false;
            }
        }
        if let Some(creator) = self.creator {
            if event.creator != creator {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if event.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if event.created_at > before {
                return false;
            }
        }
        if let Some(position_after) = self.position_after {
            if event.position <= position_after {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct EventQueryResult {
    pub events: Vec<EventRecord>,
    pub total: usize,
    pub pagination: Pagination,
    pub has_more: bool,
}

/// Read-side operations over the log. A query across instances
/// (`filter.instance_id == None`) is permitted but treated by callers as a
/// privileged operation.
pub trait EventQuery: Send + Sync {
    fn query_events(&self, filter: &EventFilter, pagination: Pagination) -> IamResult<EventQueryResult>;

    fn get_aggregate_events(
        &self,
        instance_id: InstanceId,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> IamResult<Vec<EventRecord>> {
        let filter = EventFilter::for_instance(instance_id)
            .with_aggregate_type(aggregate_type)
            .with_aggregate_id(aggregate_id);
        Ok(self
            .query_events(&filter, Pagination::new(Pagination::MAX_LIMIT, 0))?
            .events)
    }

    fn latest_event(
        &self,
        instance_id: InstanceId,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> IamResult<Option<EventRecord>> {
        let mut filter = EventFilter::for_instance(instance_id)
            .with_aggregate_type(aggregate_type)
            .with_aggregate_id(aggregate_id);
        filter.descending = true;
        Ok(self.query_events(&filter, Pagination::new(1, 0))?.events.into_iter().next())
    }

    fn count(&self, filter: &EventFilter) -> IamResult<usize> {
        Ok(self.query_events(filter, Pagination::new(Pagination::MAX_LIMIT, 0))?.total)
    }

    /// The highest `(position, inTxOrder)` visible to `filter`, or
    /// `Position::ZERO` if nothing matches — the sentinel meaning "from the
    /// beginning" doubles as "nothing committed yet".
    fn latest_position(&self, filter: Option<&EventFilter>) -> IamResult<Position> {
        let empty = EventFilter::default();
        let filter = filter.unwrap_or(&empty);
        let mut filter = filter.clone();
        filter.descending = true;
        Ok(self
            .query_events(&filter, Pagination::new(1, 0))?
            .events
            .first()
            .map(|e| e.position)
            .unwrap_or(Position::ZERO))
    }

    /// Union every clause's matches, drop anything the exclude filter also
    /// matches, then sort and truncate to `query.limit`. Built entirely on
    /// `query_events`; no store-specific override needed.
    fn search(&self, query: &EventSearchQuery) -> IamResult<Vec<EventRecord>> {
        let page_limit = Pagination::MAX_LIMIT;
        let mut seen = std::collections::HashSet::new();
        let mut matched = Vec::new();

        let empty = EventFilter::default();
        let clauses: &[EventFilter] = if query.clauses.is_empty() { std::slice::from_ref(&empty) } else { &query.clauses };

        for clause in clauses {
            let mut offset = 0u32;
            loop {
                let page = self.query_events(clause, Pagination::new(page_limit, offset))?;
                let returned = page.events.len() as u32;
                for event in page.events {
                    if let Some(exclude) = &query.exclude {
                        if exclude.matches(&event) {
                            continue;
                        }
                    }
                    let key = (event.instance_id, event.aggregate_type.clone(), event.aggregate_id, event.aggregate_version);
                    if seen.insert(key) {
                        matched.push(event);
                    }
                }
                if returned < page_limit || !page.has_more {
                    break;
                }
                offset += page_limit;
            }
        }

        if query.descending {
            matched.sort_by(|a, b| b.position.cmp(&a.position));
        } else {
            matched.sort_by(|a, b| a.position.cmp(&b.position));
        }
        let limit = if query.limit == 0 { matched.len() } else { query.limit as usize };
        matched.truncate(limit);
        Ok(matched)
    }
}

/// A disjunction of filter clauses (`OR`), minus anything matched by
/// `exclude` (`AND NOT`). An empty `clauses` list means "all events" rather
/// than "no events" — the same "no predicate narrows it" convention
/// `EventFilter` itself uses.
#[derive(Debug, Clone, Default)]
pub struct EventSearchQuery {
    pub clauses: Vec<EventFilter>,
    pub exclude: Option<EventFilter>,
    pub limit: u32,
    pub descending: bool,
}

impl EventSearchQuery {
    pub fn new() -> Self {
        Self { limit: Pagination::MAX_LIMIT, ..Default::default() }
    }

    pub fn with_clause(mut self, clause: EventFilter) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn with_exclude(mut self, exclude: EventFilter) -> Self {
        self.exclude = Some(exclude);
        self
    }
}

/// Streaming variant of `query_events`: never materializes the full result,
/// calling `reducer` once per `batch_size`-sized page in position order.
pub fn filter_to_reducer<Q: EventQuery + ?Sized>(
    source: &Q,
    filter: &EventFilter,
    batch_size: u32,
    mut reducer: impl FnMut(&[EventRecord]),
) -> IamResult<()> {
    let mut offset = 0u32;
    loop {
        let page = source.query_events(filter, Pagination::new(batch_size, offset))?;
        let returned = page.events.len() as u32;
        reducer(&page.events);
        if returned < batch_size || !page.has_more {
            break;
        }
        offset += batch_size;
    }
    Ok(())
}

impl EventQuery for InMemoryEventLog {
    fn query_events(&self, filter: &EventFilter, pagination: Pagination) -> IamResult<EventQueryResult> {
        let mut matching: Vec<EventRecord> =
            self.snapshot_all().into_iter().filter(|e| filter.matches(e)).collect();

        if filter.descending {
            matching.sort_by(|a, b| b.position.cmp(&a.position));
        } else {
            matching.sort_by(|a, b| a.position.cmp(&b.position));
        }

        let total = matching.len();
        let start = pagination.offset as usize;
        let end = (start + pagination.limit as usize).min(total);
        let events = if start < total { matching[start..end].to_vec() } else { Vec::new() };
        let has_more = end < total;

        Ok(EventQueryResult { events, total, pagination, has_more })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::EventLog;
    use iam_core::id::Creator;
    use iam_core::Command;

    fn log_with_events(n: u64) -> (InMemoryEventLog, InstanceId, AggregateId) {
        let log = InMemoryEventLog::new();
        let instance = InstanceId::new();
        let aggregate = AggregateId::new();
        for i in 0..n {
            log.push(vec![Command {
                instance_id: instance,
                aggregate_type: "user".to_string(),
                aggregate_id: aggregate,
                event_type: format!("user.event.{i}"),
                revision: 1,
                payload: None,
                creator: Creator::System,
                owner: aggregate,
                unique_constraints: Vec::new(),
            }])
            .unwrap();
        }
        (log, instance, aggregate)
    }

    #[test]
    fn query_returns_events_in_position_order() {
        let (log, instance, aggregate) = log_with_events(3);
        let filter = EventFilter::for_instance(instance).with_aggregate_id(aggregate);
        let result = log.query_events(&filter, Pagination::default()).unwrap();
        assert_eq!(result.events.len(), 3);
        assert_eq!(result.events[0].aggregate_version, 1);
        assert_eq!(result.events[2].aggregate_version, 3);
        assert!(!result.has_more);
    }

    #[test]
    fn position_after_excludes_already_seen_events() {
        let (log, instance, aggregate) = log_with_events(3);
        let filter = EventFilter::for_instance(instance).with_aggregate_id(aggregate);
        let first_page = log.query_events(&filter, Pagination::default()).unwrap();
        let checkpoint = first_page.events[0].position;

        let filter = filter.with_position_after(checkpoint);
        let rest = log.query_events(&filter, Pagination::default()).unwrap();
        assert_eq!(rest.events.len(), 2);
    }

    #[test]
    fn pagination_reports_has_more() {
        let (log, instance, aggregate) = log_with_events(5);
        let filter = EventFilter::for_instance(instance).with_aggregate_id(aggregate);
        let page = log.query_events(&filter, Pagination::new(2, 0)).unwrap();
        assert_eq!(page.events.len(), 2);
        assert!(page.has_more);
        assert_eq!(page.total, 5);
    }

    #[test]
    fn search_unions_clauses_and_drops_excluded_matches() {
        let log = InMemoryEventLog::new();
        let instance = InstanceId::new();
        let alice = AggregateId::new();
        let bob = AggregateId::new();

        for (id, event_type) in [(alice, "user.human.added"), (bob, "user.human.added"), (alice, "user.locked")] {
            log.push(vec![Command {
                instance_id: instance,
                aggregate_type: "user".to_string(),
                aggregate_id: id,
                event_type: event_type.to_string(),
                revision: 1,
                payload: None,
                creator: Creator::System,
                owner: id,
                unique_constraints: Vec::new(),
            }])
            .unwrap();
        }

        let query = EventSearchQuery::new()
            .with_clause(EventFilter::for_instance(instance).with_aggregate_id(alice))
            .with_clause(EventFilter::for_instance(instance).with_aggregate_id(bob))
            .with_exclude(EventFilter { event_types: vec!["user.locked".to_string()], ..Default::default() });

        let events = log.search(&query).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.event_type != "user.locked"));
    }

    #[test]
    fn search_with_no_clauses_means_every_event() {
        let (log, _instance, _aggregate) = log_with_events(3);
        let events = log.search(&EventSearchQuery::new()).unwrap();
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn filter_to_reducer_visits_every_event_exactly_once() {
        let (log, instance, aggregate) = log_with_events(5);
        let filter = EventFilter::for_instance(instance).with_aggregate_id(aggregate);
        let mut seen = Vec::new();
        filter_to_reducer(&log, &filter, 2, |batch| {
            seen.extend(batch.iter().map(|e| e.aggregate_version));
        })
        .unwrap();
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }
}
