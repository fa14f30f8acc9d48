//! Infrastructure layer: the event log, query engine, projection runtime,
//! and command engine adapters that give `iam-core`'s domain types
//! somewhere to live.

pub mod command_engine;
pub mod config;
pub mod cursor_store;
pub mod device_auth_sweeper;
pub mod event_log;
pub mod pg_error;
pub mod projections;
pub mod query;
pub mod read_model;
