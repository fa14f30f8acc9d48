//! Postgres-backed `EventLog`, the durable counterpart to `InMemoryEventLog`.
//!
//! Same check-version-then-insert-inside-a-transaction shape as the
//! in-memory log, with a primary-key unique violation as the backstop
//! against a race the version pre-check missed. Uses runtime `sqlx::query`
//! with manual row mapping rather than the `sqlx::query!` macros, since
//! those need a live database connection at compile time to verify
//! themselves against.
//!
//! This crate's [`EventLog`]/[`EventQuery`] traits are synchronous — every
//! other layer (`CommandEngine`, the projection runners, the
//! device-authorization sweeper) calls them from plain threads, not async
//! tasks. `sqlx`'s Postgres driver is async-only, so `PostgresEventLog` owns
//! a private multi-threaded Tokio runtime and blocks the calling thread for
//! the duration of each call via `Runtime::block_on`. Callers never see
//! `.await`; the async boundary is entirely internal to this adapter.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::instrument;
use uuid::Uuid;

use iam_core::command::UniqueConstraintAction;
use iam_core::id::Creator;
use iam_core::{
    AggregateId, AggregateType, Command, EventRecord, EventType, IamError, IamResult, InstanceId,
    Position, UserId,
};

use crate::pg_error::{is_unique_violation_on, map_sqlx_error};
use crate::query::{EventFilter, EventQuery, EventQueryResult, Pagination};

use super::{EventLog, ExpectedVersion};

/// `Uuid::nil()` stands in for "no instance" in the `unique_constraints`
/// table's scope column, since Postgres cannot carry a `NULL` inside a
/// primary key. `command.rs`'s `is_global` flag is the source of truth;
/// this sentinel only exists to give that flag a storable key.
const GLOBAL_SCOPE: Uuid = Uuid::nil();

/// DDL for the two tables this adapter owns. Applied with `sqlx::raw_sql`
/// (not `sqlx::migrate!`, which wants a `migrations/` directory resolved at
/// compile time — this exercise has no live database to generate one
/// against) so it is safe to call from a fresh database or a restart alike.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    instance_id UUID NOT NULL,
    aggregate_type TEXT NOT NULL,
    aggregate_id UUID NOT NULL,
    aggregate_version BIGINT NOT NULL,
    event_type TEXT NOT NULL,
    revision SMALLINT NOT NULL,
    payload JSONB,
    creator_kind TEXT NOT NULL,
    creator_user_id UUID,
    owner_id UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    position_value NUMERIC NOT NULL,
    in_tx_order INT NOT NULL,
    PRIMARY KEY (instance_id, aggregate_type, aggregate_id, aggregate_version)
);

CREATE INDEX IF NOT EXISTS events_position_idx ON events (position_value, in_tx_order);
CREATE INDEX IF NOT EXISTS events_instance_type_idx ON events (instance_id, aggregate_type, event_type);

CREATE SEQUENCE IF NOT EXISTS event_position_seq;

CREATE TABLE IF NOT EXISTS unique_constraints (
    scope_instance_id UUID NOT NULL,
    unique_type TEXT NOT NULL,
    unique_field TEXT NOT NULL,
    PRIMARY KEY (scope_instance_id, unique_type, unique_field)
);
"#;

/// Postgres-backed append-only event log.
pub struct PostgresEventLog {
    pool: PgPool,
    runtime: tokio::runtime::Runtime,
}

impl PostgresEventLog {
    /// Connect to `database_url`, run the schema, and return a ready log.
    pub fn connect(database_url: &str) -> IamResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| IamError::Store(format!("failed to start Tokio runtime: {e}")))?;

        let pool = runtime
            .block_on(PgPoolOptions::new().max_connections(10).connect(database_url))
            .map_err(map_sqlx_error)?;

        runtime.block_on(sqlx::raw_sql(SCHEMA).execute(&pool)).map_err(map_sqlx_error)?;

        Ok(Self { pool, runtime })
    }

    #[instrument(skip(self, commands), fields(event_count = commands.len()), err)]
    fn push_internal(&self, commands: Vec<Command>, occ: Option<ExpectedVersion>) -> IamResult<Vec<EventRecord>> {
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

        self.runtime.block_on(self.push_async(commands, occ))
    }

    async fn push_async(&self, commands: Vec<Command>, occ: Option<ExpectedVersion>) -> IamResult<Vec<EventRecord>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // Per-stream current version, fetched once per distinct
        // (instance, aggregate_type, aggregate_id) in this batch.
        let mut current_versions: HashMap<(InstanceId, AggregateType, AggregateId), u64> = HashMap::new();
        for command in &commands {
            let key = (command.instance_id, command.aggregate_type.clone(), command.aggregate_id);
            if current_versions.contains_key(&key) {
                continue;
            }
            let row = sqlx::query(
                "SELECT COALESCE(MAX(aggregate_version), 0) AS max_version FROM events \
                 WHERE instance_id = $1 AND aggregate_type = $2 AND aggregate_id = $3",
            )
            .bind(command.instance_id.as_uuid())
            .bind(&command.aggregate_type)
            .bind(command.aggregate_id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
            let max_version: i64 = row.try_get("max_version").map_err(map_sqlx_error)?;
            current_versions.insert(key, max_version as u64);
        }

        if let Some(expected) = occ {
            let command = commands
                .iter()
                .find(|c| c.aggregate_id == expected.aggregate_id)
                .ok_or_else(|| IamError::validation("expectedVersion aggregate not in batch"))?;
            let key = (command.instance_id, command.aggregate_type.clone(), expected.aggregate_id);
            let actual = *current_versions.get(&key).unwrap_or(&0);
            if actual != expected.expected_version {
                return Err(IamError::concurrency(expected.expected_version, actual));
            }
        }

        // Unique-constraint side effects are applied before any event is
        // inserted; an `Add` that conflicts rolls the whole transaction back
        // by returning early (the `tx` drop aborts it), leaving no partial
        // state (invariant 4).
        for command in &commands {
            for uc in &command.unique_constraints {
                let scope = if uc.is_global { GLOBAL_SCOPE } else { *command.instance_id.as_uuid() };
                match uc.action {
                    UniqueConstraintAction::Add => {
                        let result = sqlx::query(
                            "INSERT INTO unique_constraints (scope_instance_id, unique_type, unique_field) \
                             VALUES ($1, $2, $3)",
                        )
                        .bind(scope)
                        .bind(&uc.unique_type)
                        .bind(&uc.unique_field)
                        .execute(&mut *tx)
                        .await;
                        if let Err(err) = result {
                            if is_unique_violation_on(&err, "unique_constraints_pkey") {
                                return Err(IamError::unique_constraint_violation(uc.error_message.clone()));
                            }
                            return Err(map_sqlx_error(err));
                        }
                    }
                    UniqueConstraintAction::Remove => {
                        sqlx::query(
                            "DELETE FROM unique_constraints \
                             WHERE scope_instance_id = $1 AND unique_type = $2 AND unique_field = $3",
                        )
                        .bind(scope)
                        .bind(&uc.unique_type)
                        .bind(&uc.unique_field)
                        .execute(&mut *tx)
                        .await
                        .map_err(map_sqlx_error)?;
                    }
                    UniqueConstraintAction::InstanceRemove => {
                        sqlx::query("DELETE FROM unique_constraints WHERE scope_instance_id = $1")
                            .bind(*command.instance_id.as_uuid())
                            .execute(&mut *tx)
                            .await
                            .map_err(map_sqlx_error)?;
                    }
                }
            }
        }

        let position_row = sqlx::query("SELECT nextval('event_position_seq') AS next_position")
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        let position_value: i64 = position_row.try_get("next_position").map_err(map_sqlx_error)?;
        let position_value = Decimal::from(position_value);
        let now = Utc::now();

        let mut offsets: HashMap<(InstanceId, AggregateType, AggregateId), u64> = HashMap::new();
        let mut events = Vec::with_capacity(commands.len());

        for (in_tx_order, command) in commands.into_iter().enumerate() {
            let key = (command.instance_id, command.aggregate_type.clone(), command.aggregate_id);
            let base = *current_versions.get(&key).unwrap_or(&0);
            let offset = offsets.entry(key.clone()).or_insert(0);
            let aggregate_version = base + 1 + *offset;
            *offset += 1;

            let (creator_kind, creator_user_id): (&str, Option<Uuid>) = match command.creator {
                Creator::User(user_id) => ("user", Some(*user_id.as_uuid())),
                Creator::System => ("system", None),
            };

            let result = sqlx::query(
                "INSERT INTO events (\
                    instance_id, aggregate_type, aggregate_id, aggregate_version, event_type, \
                    revision, payload, creator_kind, creator_user_id, owner_id, created_at, \
                    position_value, in_tx_order\
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            )
            .bind(command.instance_id.as_uuid())
            .bind(&command.aggregate_type)
            .bind(command.aggregate_id.as_uuid())
            .bind(aggregate_version as i64)
            .bind(&command.event_type)
            .bind(command.revision as i16)
            .bind(&command.payload)
            .bind(creator_kind)
            .bind(creator_user_id)
            .bind(command.owner.as_uuid())
            .bind(now)
            .bind(position_value)
            .bind(in_tx_order as i32)
            .execute(&mut *tx)
            .await;

            if let Err(err) = result {
                if is_unique_violation_on(&err, "events_pkey") {
                    return Err(IamError::concurrency(base, base));
                }
                return Err(map_sqlx_error(err));
            }

            events.push(EventRecord {
                instance_id: command.instance_id,
                aggregate_type: command.aggregate_type,
                aggregate_id: command.aggregate_id,
                aggregate_version,
                event_type: command.event_type,
                revision: command.revision,
                payload: command.payload,
                creator: command.creator,
                owner: command.owner,
                created_at: now,
                position: Position::new(position_value, in_tx_order as i32),
            });
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(events)
    }
}

impl EventLog for PostgresEventLog {
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

    #[instrument(
        skip(self),
        fields(instance_id = %instance_id.as_uuid(), aggregate_type, aggregate_id = %aggregate_id.as_uuid()),
        err
    )]
    fn load_stream(
        &self,
        instance_id: InstanceId,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> IamResult<Vec<EventRecord>> {
        self.runtime.block_on(async {
            let rows = sqlx::query(
                "SELECT instance_id, aggregate_type, aggregate_id, aggregate_version, event_type, \
                        revision, payload, creator_kind, creator_user_id, owner_id, created_at, \
                        position_value, in_tx_order \
                 FROM events \
                 WHERE instance_id = $1 AND aggregate_type = $2 AND aggregate_id = $3 \
                 ORDER BY aggregate_version ASC",
            )
            .bind(instance_id.as_uuid())
            .bind(aggregate_type)
            .bind(aggregate_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            rows.iter().map(row_to_event).collect()
        })
    }

    fn health(&self) -> IamResult<()> {
        self.runtime.block_on(async {
            sqlx::query("SELECT 1").fetch_one(&self.pool).await.map_err(map_sqlx_error)?;
            Ok(())
        })
    }
}

impl EventQuery for PostgresEventLog {
    #[instrument(skip(self, filter), fields(limit = pagination.limit, offset = pagination.offset), err)]
    fn query_events(&self, filter: &EventFilter, pagination: Pagination) -> IamResult<EventQueryResult> {
        self.runtime.block_on(async {
            let mut count_qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) AS total FROM events");
            push_where(&mut count_qb, filter);
            let total: i64 = count_qb
                .build()
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?
                .try_get("total")
                .map_err(map_sqlx_error)?;

            let mut select_qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "SELECT instance_id, aggregate_type, aggregate_id, aggregate_version, event_type, \
                        revision, payload, creator_kind, creator_user_id, owner_id, created_at, \
                        position_value, in_tx_order FROM events",
            );
            push_where(&mut select_qb, filter);
            if filter.descending {
                select_qb.push(" ORDER BY position_value DESC, in_tx_order DESC");
            } else {
                select_qb.push(" ORDER BY position_value ASC, in_tx_order ASC");
            }
            select_qb.push(" LIMIT ").push_bind(pagination.limit as i64);
            select_qb.push(" OFFSET ").push_bind(pagination.offset as i64);

            let rows = select_qb.build().fetch_all(&self.pool).await.map_err(map_sqlx_error)?;
            let events: Vec<EventRecord> = rows.iter().map(row_to_event).collect::<IamResult<_>>()?;

            let has_more = (pagination.offset as i64) + (events.len() as i64) < total;
            Ok(EventQueryResult { events, total: total as usize, pagination, has_more })
        })
    }
}

/// Append `WHERE` clauses for every narrowing field `filter` sets. Shared
/// between the `COUNT(*)` and the paginated `SELECT` so the two queries
/// always agree on which rows match.
fn push_where(qb: &mut QueryBuilder<'_, Postgres>, filter: &EventFilter) {
    let mut first = true;
    let mut clause = |qb: &mut QueryBuilder<'_, Postgres>| {
        qb.push(if first { " WHERE " } else { " AND " });
        first = false;
    };

    if let Some(instance_id) = filter.instance_id {
        clause(qb);
        qb.push("instance_id = ").push_bind(*instance_id.as_uuid());
    }
    if !filter.aggregate_types.is_empty() {
        clause(qb);
        qb.push("aggregate_type = ANY(").push_bind(filter.aggregate_types.clone()).push(")");
    }
    if !filter.aggregate_ids.is_empty() {
        clause(qb);
        let ids: Vec<Uuid> = filter.aggregate_ids.iter().map(|id| *id.as_uuid()).collect();
        qb.push("aggregate_id = ANY(").push_bind(ids).push(")");
    }
    if !filter.event_types.is_empty() {
        clause(qb);
        let types: Vec<EventType> = filter.event_types.clone();
        qb.push("event_type = ANY(").push_bind(types).push(")");
    }
    if let Some(owner) = filter.owner {
        clause(qb);
        qb.push("owner_id = ").push_bind(*owner.as_uuid());
    }
    if let Some(creator) = filter.creator {
        clause(qb);
        match creator {
            Creator::System => {
                qb.push("creator_kind = 'system'");
            }
            Creator::User(user_id) => {
                qb.push("creator_kind = 'user' AND creator_user_id = ").push_bind(*user_id.as_uuid());
            }
        }
    }
    if let Some(after) = filter.created_after {
        clause(qb);
        qb.push("created_at >= ").push_bind(after);
    }
    if let Some(before) = filter.created_before {
        clause(qb);
        qb.push("created_at <= ").push_bind(before);
    }
    if let Some(position_after) = filter.position_after {
        clause(qb);
        qb.push("(position_value, in_tx_order) > (")
            .push_bind(position_after.position)
            .push(", ")
            .push_bind(position_after.in_tx_order)
            .push(")");
    }
}

fn row_to_event(row: &sqlx::postgres::PgRow) -> IamResult<EventRecord> {
    let instance_id: Uuid = row.try_get("instance_id").map_err(map_sqlx_error)?;
    let aggregate_id: Uuid = row.try_get("aggregate_id").map_err(map_sqlx_error)?;
    let owner_id: Uuid = row.try_get("owner_id").map_err(map_sqlx_error)?;
    let aggregate_version: i64 = row.try_get("aggregate_version").map_err(map_sqlx_error)?;
    let revision: i16 = row.try_get("revision").map_err(map_sqlx_error)?;
    let creator_kind: String = row.try_get("creator_kind").map_err(map_sqlx_error)?;
    let creator_user_id: Option<Uuid> = row.try_get("creator_user_id").map_err(map_sqlx_error)?;
    let position_value: Decimal = row.try_get("position_value").map_err(map_sqlx_error)?;
    let in_tx_order: i32 = row.try_get("in_tx_order").map_err(map_sqlx_error)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(map_sqlx_error)?;

    let creator = match creator_kind.as_str() {
        "system" => Creator::System,
        _ => Creator::User(UserId::from_uuid(
            creator_user_id.ok_or_else(|| IamError::Store("creator_kind='user' with no creator_user_id".to_string()))?,
        )),
    };

    Ok(EventRecord {
        instance_id: InstanceId::from_uuid(instance_id),
        aggregate_type: row.try_get("aggregate_type").map_err(map_sqlx_error)?,
        aggregate_id: AggregateId::from_uuid(aggregate_id),
        aggregate_version: aggregate_version as u64,
        event_type: row.try_get("event_type").map_err(map_sqlx_error)?,
        revision: revision as u16,
        payload: row.try_get("payload").map_err(map_sqlx_error)?,
        creator,
        owner: AggregateId::from_uuid(owner_id),
        created_at,
        position: Position::new(position_value, in_tx_order),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_where_emits_no_clause_for_an_empty_filter() {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT 1 FROM events");
        push_where(&mut qb, &EventFilter::default());
        assert_eq!(qb.sql(), "SELECT 1 FROM events");
    }

    #[test]
    fn push_where_joins_multiple_narrowing_fields_with_and() {
        let instance = InstanceId::new();
        let filter = EventFilter::for_instance(instance).with_aggregate_type("user");

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT 1 FROM events");
        push_where(&mut qb, &filter);
        let sql = qb.sql();

        assert!(sql.contains(" WHERE instance_id = "));
        assert!(sql.contains(" AND aggregate_type = ANY("));
    }
}
