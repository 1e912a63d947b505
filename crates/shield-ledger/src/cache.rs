//! Short-TTL fingerprint -> artifact cache (spec.md §4.5, §5: "shared;
//! last-write-wins; TTL bounds staleness").

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

struct Entry {
    value: serde_json::Value,
    expires_at: DateTime<Utc>,
}

/// Best-effort cache: misses (including expired entries) never affect
/// correctness, only how often callers recompute. Entries are reaped lazily
/// on read rather than by a background sweep, matching the low write volume
/// expected here (one entry per claim per consensus/proof artifact).
#[derive(Clone, Default)]
pub struct Cache {
    entries: Arc<DashMap<String, Entry>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: serde_json::Value, ttl: Duration) {
        self.entries.insert(
            key.into(),
            Entry {
                value,
                expires_at: Utc::now() + ttl,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.expires_at <= Utc::now(),
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|e| e.value.clone())
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fresh_entry_is_returned() {
        let cache = Cache::new();
        cache.set("claim-1", json!({"verdict": "verified"}), Duration::seconds(60));
        assert_eq!(cache.get("claim-1"), Some(json!({"verdict": "verified"})));
    }

    #[test]
    fn expired_entry_is_a_miss_and_is_reaped() {
        let cache = Cache::new();
        cache.set("claim-1", json!({"verdict": "verified"}), Duration::seconds(-1));
        assert_eq!(cache.get("claim-1"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn missing_key_is_a_miss() {
        let cache = Cache::new();
        assert_eq!(cache.get("nope"), None);
    }

    #[test]
    fn overwriting_a_key_is_last_write_wins() {
        let cache = Cache::new();
        cache.set("claim-1", json!({"verdict": "verified"}), Duration::seconds(60));
        cache.set("claim-1", json!({"verdict": "halt"}), Duration::seconds(60));
        assert_eq!(cache.get("claim-1"), Some(json!({"verdict": "halt"})));
    }

    #[test]
    fn invalidate_removes_the_entry() {
        let cache = Cache::new();
        cache.set("claim-1", json!({"verdict": "verified"}), Duration::seconds(60));
        cache.invalidate("claim-1");
        assert_eq!(cache.get("claim-1"), None);
    }
}
