// =============================================================================
// TtlCache — in-process map with a freshness window
// =============================================================================
//
// Owned by a single MarketDataService instance; not shared across processes.

use std::collections::HashMap;
use std::hash::Hash;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, (DateTime<Utc>, V)>>,
    ttl: Duration,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// The cached value if it was stored less than `ttl` before `now`.
    pub fn get_fresh(&self, key: &K, now: DateTime<Utc>) -> Option<V> {
        let entries = self.entries.read();
        let (stored_at, value) = entries.get(key)?;
        (now - *stored_at < self.ttl).then(|| value.clone())
    }

    pub fn insert(&self, key: K, value: V, now: DateTime<Utc>) {
        self.entries.write().insert(key, (now, value));
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}
