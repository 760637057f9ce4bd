//! In-process tier. Always available; entries are serialized `CacheEntry`
//! JSON strings so both tiers share one format.

use std::collections::HashMap;
use std::sync::Mutex;

use metrics::counter;

#[derive(Debug)]
struct Slot {
    value: String,
    expires_at_ms: i64,
}

#[derive(Debug)]
pub struct FastTier {
    inner: Mutex<HashMap<String, Slot>>,
    max_entries: usize,
}

impl FastTier {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    /// Raw lookup; expiry is enforced by the caller on the decoded entry,
    /// with `expires_at_ms` as a coarse guard for cleanup.
    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).map(|s| s.value.clone())
    }

    pub fn set(&self, key: &str, value: String, expires_at_ms: i64) {
        let mut map = self.lock();
        if map.len() >= self.max_entries && !map.contains_key(key) {
            // Full: drop the entry closest to expiry.
            if let Some(victim) = map
                .iter()
                .min_by_key(|(_, s)| s.expires_at_ms)
                .map(|(k, _)| k.clone())
            {
                map.remove(&victim);
                counter!("cache_fast_evictions_total").increment(1);
            }
        }
        map.insert(
            key.to_string(),
            Slot {
                value,
                expires_at_ms,
            },
        );
    }

    pub fn del(&self, key: &str) {
        self.lock().remove(key);
    }

    pub fn flush(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Opportunistic cleanup; returns how many entries were dropped.
    pub fn sweep_expired(&self, now_ms: i64) -> usize {
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, s| s.expires_at_ms >= now_ms);
        let removed = before - map.len();
        if removed > 0 {
            counter!("cache_fast_evictions_total").increment(removed as u64);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_evicts_soonest_expiring() {
        let t = FastTier::new(2);
        t.set("a", "1".into(), 100);
        t.set("b", "2".into(), 50);
        t.set("c", "3".into(), 200);
        assert_eq!(t.len(), 2);
        assert!(t.get("b").is_none());
        assert_eq!(t.get("a").as_deref(), Some("1"));
    }

    #[test]
    fn sweep_drops_only_expired() {
        let t = FastTier::new(10);
        t.set("old", "x".into(), 10);
        t.set("new", "y".into(), 1_000);
        assert_eq!(t.sweep_expired(500), 1);
        assert!(t.get("old").is_none());
        assert!(t.get("new").is_some());
    }
}
