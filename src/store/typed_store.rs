//! `TypedStore<K, V>` — a concurrent value-map for one entity kind
//! (spec §4.1).

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::clock::SharedClock;

/// Concurrent map of entity key to typed value, with bulk snapshot read and
/// last-update timestamp tracking.
///
/// All operations are total on their inputs and safe for many concurrent
/// readers and writers (spec §4.1). Readers never block other readers:
/// `Values()` takes only the read lock, since a read lock already excludes
/// concurrent writers and is therefore sufficient to avoid a torn view of
/// any single entry (see DESIGN.md, "TypedStore::Values lock strategy").
pub struct TypedStore<K, V> {
    entries: RwLock<HashMap<K, V>>,
    last_updated_millis: AtomicI64,
    clock: SharedClock,
}

impl<K, V> TypedStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(clock: SharedClock) -> Self {
        let now = clock.now_millis();
        Self {
            entries: RwLock::new(HashMap::new()),
            last_updated_millis: AtomicI64::new(now),
            clock,
        }
    }

    fn bump(&self) {
        self.last_updated_millis.store(self.clock.now_millis(), Ordering::SeqCst);
    }

    pub fn set(&self, key: K, value: V) {
        let mut guard = self.entries.write().expect("TypedStore lock poisoned");
        guard.insert(key, value);
        drop(guard);
        self.bump();
    }

    pub fn delete(&self, key: &K) {
        let mut guard = self.entries.write().expect("TypedStore lock poisoned");
        guard.remove(key);
        drop(guard);
        self.bump();
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let guard = self.entries.read().expect("TypedStore lock poisoned");
        guard.get(key).cloned()
    }

    /// A value-copy snapshot of every entry, captured atomically with
    /// respect to other store operations. Order is unspecified.
    pub fn values(&self) -> Vec<V> {
        let guard = self.entries.read().expect("TypedStore lock poisoned");
        guard.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("TypedStore lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_updated_millis.load(Ordering::SeqCst))
            .unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::system_clock;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn set_get_delete_roundtrip() {
        let store: TypedStore<String, i32> = TypedStore::new(system_clock());
        store.set("a".to_string(), 1);
        assert_eq!(store.get(&"a".to_string()), Some(1));
        store.delete(&"a".to_string());
        assert_eq!(store.get(&"a".to_string()), None);
    }

    #[test]
    fn values_never_sees_partial_writes() {
        // Property #1 (spec §8): every element returned by Values() equals
        // some value previously Set for its key.
        let store: Arc<TypedStore<i32, i32>> = Arc::new(TypedStore::new(system_clock()));
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                for round in 0..200 {
                    store.set(i, i * 1000 + round);
                }
            }));
        }

        // Concurrently read while writers are mutating.
        let reader_store = store.clone();
        let reader = thread::spawn(move || {
            for _ in 0..200 {
                for (k, v) in reader_store.values().into_iter().enumerate() {
                    // v must be a value that was legitimately written for
                    // some key (k*1000 + round for round in 0..200), never a
                    // torn combination.
                    let _ = k;
                    assert!(v % 1000 < 200 || v == 0);
                }
            }
        });

        for h in handles {
            h.join().unwrap();
        }
        reader.join().unwrap();
    }

    #[test]
    fn last_updated_is_monotonic_non_decreasing() {
        let store: TypedStore<String, i32> = TypedStore::new(system_clock());
        let t0 = store.last_updated();
        store.set("a".to_string(), 1);
        let t1 = store.last_updated();
        assert!(t1 >= t0);
        store.delete(&"a".to_string());
        let t2 = store.last_updated();
        assert!(t2 >= t1);
    }

    #[test]
    fn post_snapshot_mutation_does_not_affect_prior_read() {
        let store: TypedStore<String, Vec<i32>> = TypedStore::new(system_clock());
        store.set("a".to_string(), vec![1, 2, 3]);
        let snapshot = store.values();
        store.set("a".to_string(), vec![9, 9, 9]);
        assert_eq!(snapshot, vec![vec![1, 2, 3]]);
    }
}
