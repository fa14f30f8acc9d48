//! Instance-isolated key/value storage abstraction backing every concrete
//! projection in `crate::projections`.
//!
//! The real read models are plain SQL tables under `projections.*`;
//! `InMemoryInstanceStore` is the in-process stand-in used by tests and by
//! the projection runtime before a Postgres-backed store is wired in.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use iam_core::InstanceId;

/// Instance-isolated key/value store. `K` is a read model's primary id
/// (beyond the instance), `V` its row type.
pub trait InstanceStore<K, V>: Send + Sync {
    fn get(&self, instance_id: InstanceId, key: &K) -> Option<V>;
    fn upsert(&self, instance_id: InstanceId, key: K, value: V);
    fn remove(&self, instance_id: InstanceId, key: &K);
    fn list(&self, instance_id: InstanceId) -> Vec<V>;
    /// Cascade support: drop every row for an instance, used by projection
    /// `reset()` and the `instance.removed` cascade.
    fn clear_instance(&self, instance_id: InstanceId);
}

impl<K, V, S> InstanceStore<K, V> for Arc<S>
where
    S: InstanceStore<K, V> + ?Sized,
{
    fn get(&self, instance_id: InstanceId, key: &K) -> Option<V> {
        (**self).get(instance_id, key)
    }

    fn upsert(&self, instance_id: InstanceId, key: K, value: V) {
        (**self).upsert(instance_id, key, value)
    }

    fn remove(&self, instance_id: InstanceId, key: &K) {
        (**self).remove(instance_id, key)
    }

    fn list(&self, instance_id: InstanceId) -> Vec<V> {
        (**self).list(instance_id)
    }

    fn clear_instance(&self, instance_id: InstanceId) {
        (**self).clear_instance(instance_id)
    }
}

#[derive(Debug)]
pub struct InMemoryInstanceStore<K, V> {
    inner: RwLock<HashMap<(InstanceId, K), V>>,
}

impl<K, V> InMemoryInstanceStore<K, V> {
    pub fn new() -> Self {
        Self { inner: RwLock::new(HashMap::new()) }
    }
}

impl<K, V> Default for InMemoryInstanceStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> InstanceStore<K, V> for InMemoryInstanceStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, instance_id: InstanceId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(instance_id, key.clone())).cloned()
    }

    fn upsert(&self, instance_id: InstanceId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((instance_id, key), value);
        }
    }

    fn remove(&self, instance_id: InstanceId, key: &K) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(&(instance_id, key.clone()));
        }
    }

    fn list(&self, instance_id: InstanceId) -> Vec<V> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return Vec::new(),
        };
        map.iter()
            .filter_map(|((i, _k), v)| if *i == instance_id { Some(v.clone()) } else { None })
            .collect()
    }

    fn clear_instance(&self, instance_id: InstanceId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(i, _k), _v| *i != instance_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolates_rows_by_instance() {
        let store: InMemoryInstanceStore<String, u32> = InMemoryInstanceStore::new();
        let a = InstanceId::new();
        let b = InstanceId::new();

        store.upsert(a, "k".to_string(), 1);
        store.upsert(b, "k".to_string(), 2);

        assert_eq!(store.get(a, &"k".to_string()), Some(1));
        assert_eq!(store.get(b, &"k".to_string()), Some(2));
        assert_eq!(store.list(a).len(), 1);
    }

    #[test]
    fn clear_instance_only_drops_that_instances_rows() {
        let store: InMemoryInstanceStore<String, u32> = InMemoryInstanceStore::new();
        let a = InstanceId::new();
        let b = InstanceId::new();
        store.upsert(a, "k".to_string(), 1);
        store.upsert(b, "k".to_string(), 2);

        store.clear_instance(a);

        assert!(store.get(a, &"k".to_string()).is_none());
        assert_eq!(store.get(b, &"k".to_string()), Some(2));
    }
}
