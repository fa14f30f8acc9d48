//! Process-wide tracing/logging setup shared by every `iam-*` crate that
//! performs I/O: event log pushes, write-model loads, command dispatch, and
//! projection application all open spans carrying
//! `instance_id`/`aggregate_type`/`aggregate_id`.

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, layers).
pub mod tracing;

/// Logging configuration.
pub mod logging {}

/// Metrics setup and exporters.
pub mod metrics {}


