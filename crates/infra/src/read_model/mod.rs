//! Instance-isolated read model storage abstractions.

pub mod instance_store;

pub use instance_store::{InMemoryInstanceStore, InstanceStore};

