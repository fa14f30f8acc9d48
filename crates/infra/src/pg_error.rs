//! Maps `sqlx::Error` into the domain `IamError` taxonomy at the Postgres
//! adapter boundary.

use iam_core::IamError;

/// `23505` is Postgres's unique-violation code. The event log's per-event
/// insert has a `PRIMARY KEY (instance_id, aggregate_type, aggregate_id,
/// aggregate_version)`, so a unique violation there means a concurrent
/// writer won the version race; the caller reloads and retries.
const UNIQUE_VIOLATION: &str = "23505";
/// `23503`/`23514` are FK and check-constraint violations: malformed input
/// reaching the store layer, not a concurrency race.
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

pub fn map_sqlx_error(err: sqlx::Error) -> IamError {
    match err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some(UNIQUE_VIOLATION) => IamError::concurrency(0, 0),
            Some(FOREIGN_KEY_VIOLATION) | Some(CHECK_VIOLATION) => {
                IamError::validation(db_err.message().to_string())
            }
            _ => IamError::Store(db_err.message().to_string()),
        },
        sqlx::Error::RowNotFound => IamError::not_found("row not found"),
        other => IamError::Store(other.to_string()),
    }
}

/// `true` if `err` is specifically a unique-constraint violation on `constraint_name`.
/// Used by the event log to distinguish "version race" from "unique side-effect
/// conflict" when both are enforced in the same transaction via different
/// constraints.
pub fn is_unique_violation_on(err: &sqlx::Error, constraint_name: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
                && db_err.constraint() == Some(constraint_name)
        }
        _ => false,
    }
}
