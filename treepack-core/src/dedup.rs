use std::collections::hash_map::{DefaultHasher, Entry, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

const SHARD_COUNT: usize = 16;

/// String-keyed concurrent map with per-shard mutual exclusion. The only
/// write primitives are atomic: `insert_if_absent` and an exclusive
/// `update` of a single entry. Get-then-insert is never exposed as two
/// separate calls, so two workers racing on one key cannot both win.
pub struct ShardedMap<V> {
    shards: [Mutex<HashMap<String, V>>; SHARD_COUNT],
}

impl<V> Default for ShardedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ShardedMap<V> {
    pub fn new() -> Self {
        ShardedMap { shards: std::array::from_fn(|_| Mutex::new(HashMap::new())) }
    }

    fn shard(&self, key: &str) -> &Mutex<HashMap<String, V>> {
        let mut h = DefaultHasher::new();
        key.hash(&mut h);
        &self.shards[h.finish() as usize % SHARD_COUNT]
    }

    /// Insert `value` under `key` unless the key is already present.
    /// Returns whether the insert won.
    pub fn insert_if_absent(&self, key: &str, value: V) -> bool {
        let mut shard = self.shard(key).lock().unwrap();
        match shard.entry(key.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(e) => {
                e.insert(value);
                true
            }
        }
    }

    /// Apply `f` to the entry under `key`, if present. Returns whether the
    /// entry existed. The shard stays locked for the duration of `f`.
    pub fn update(&self, key: &str, f: impl FnOnce(&mut V)) -> bool {
        let mut shard = self.shard(key).lock().unwrap();
        match shard.get_mut(key) {
            Some(v) => {
                f(v);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.shard(key).lock().unwrap().remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.shard(key).lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().unwrap().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> ShardedMap<V> {
    pub fn get(&self, key: &str) -> Option<V> {
        self.shard(key).lock().unwrap().get(key).cloned()
    }

    /// Snapshot of all values. Shards are locked one at a time, so the
    /// snapshot is only consistent when no writers are running.
    pub fn values(&self) -> Vec<V> {
        let mut out = Vec::new();
        for shard in &self.shards {
            out.extend(shard.lock().unwrap().values().cloned());
        }
        out
    }
}
