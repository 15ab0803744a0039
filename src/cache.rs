use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Process-local TTL cache. Expiry is checked on read; stale entries are
/// dropped then, there is no background eviction. Callers own an instance
/// and pass it in — nothing here is a global.
#[derive(Debug)]
pub struct TtlCache<T> {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, T)>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<T> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let (inserted_at, _) = entries.get(key)?;
        if inserted_at.elapsed() > self.ttl {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|(_, value)| value.clone())
    }

    pub fn put(&self, key: &str, value: T) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.insert(key.to_string(), (Instant::now(), value));
    }

    pub fn clear(&self) {
        self.entries.lock().expect("cache lock poisoned").clear();
    }
}

impl<T: Clone> Default for TtlCache<T> {
    /// Ranking results stay valid for about a minute; recomputation touches
    /// every match in the pool, so the default TTL trades a little staleness
    /// for a lot of repeated work.
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
