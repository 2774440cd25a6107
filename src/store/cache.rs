//! In-memory query cache with invalidation.
//!
//! Entries are JSON snapshots keyed by a query key such as
//! `overrides:<client>:<project>`. Every key carries a generation counter that
//! invalidation bumps, so a fetch that started before an invalidation cannot
//! repopulate the cache with stale rows.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Cache key for the override list of one project.
pub fn overrides_key(client_id: &str, project_id: &str) -> String {
    format!("overrides:{}:{}", client_id, project_id)
}

/// Cache key for the reference lines of one plan.
pub fn reference_lines_key(plan_id: &str) -> String {
    format!("reference_lines:{}", plan_id)
}

/// Cache key for the activities of one project.
pub fn activities_key(client_id: &str, project_id: &str) -> String {
    format!("activities:{}:{}", client_id, project_id)
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, Value>,
    generations: HashMap<String, u64>,
}

/// Shared cache of query results.
#[derive(Debug, Default)]
pub struct QueryCache {
    inner: Mutex<CacheInner>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Cached value for `key`, if present and decodable as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let inner = self.lock();
        let value = inner.entries.get(key)?;
        serde_json::from_value(value.clone()).ok()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Current generation of `key`. Take this before starting a fetch.
    pub fn generation(&self, key: &str) -> u64 {
        let mut inner = self.lock();
        *inner.generations.entry(key.to_string()).or_insert(0)
    }

    /// Store `value` unconditionally.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) {
        if let Ok(value) = serde_json::to_value(value) {
            self.lock().entries.insert(key.to_string(), value);
        }
    }

    /// Store `value` only if `key` has not been invalidated since `generation`.
    ///
    /// Returns whether the value was stored.
    pub fn put_if_generation<T: Serialize>(&self, key: &str, generation: u64, value: &T) -> bool {
        let Ok(value) = serde_json::to_value(value) else {
            return false;
        };
        let mut inner = self.lock();
        let current = inner.generations.get(key).copied().unwrap_or(0);
        if current != generation {
            tracing::debug!(key, generation, current, "discarding stale query result");
            return false;
        }
        inner.entries.insert(key.to_string(), value);
        true
    }

    /// Drop the entry for `key` and bump its generation.
    pub fn invalidate(&self, key: &str) {
        let mut inner = self.lock();
        inner.entries.remove(key);
        *inner.generations.entry(key.to_string()).or_insert(0) += 1;
        tracing::debug!(key, "cache invalidated");
    }

    /// Invalidate every key starting with `prefix`. Returns how many entries were dropped.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|k, _| !k.starts_with(prefix));
        for (key, generation) in inner.generations.iter_mut() {
            if key.starts_with(prefix) {
                *generation += 1;
            }
        }
        before - inner.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let cache = QueryCache::new();
        cache.put("k", &vec![1, 2, 3]);
        assert_eq!(cache.get::<Vec<i32>>("k"), Some(vec![1, 2, 3]));
        assert_eq!(cache.get::<Vec<i32>>("missing"), None);
    }

    #[test]
    fn test_invalidate_drops_entry() {
        let cache = QueryCache::new();
        cache.put("k", &1);
        cache.invalidate("k");
        assert!(!cache.contains("k"));
    }

    #[test]
    fn test_stale_fetch_is_discarded() {
        let cache = QueryCache::new();
        let generation = cache.generation("k");
        cache.invalidate("k");
        assert!(!cache.put_if_generation("k", generation, &"stale"));
        assert!(!cache.contains("k"));

        let generation = cache.generation("k");
        assert!(cache.put_if_generation("k", generation, &"fresh"));
        assert_eq!(cache.get::<String>("k").as_deref(), Some("fresh"));
    }

    #[test]
    fn test_invalidate_prefix() {
        let cache = QueryCache::new();
        cache.put(&overrides_key("c1", "p1"), &1);
        cache.put(&overrides_key("c1", "p2"), &2);
        cache.put(&activities_key("c1", "p1"), &3);
        let pending = cache.generation(&overrides_key("c1", "p3"));

        assert_eq!(cache.invalidate_prefix("overrides:c1:"), 2);
        assert!(cache.contains(&activities_key("c1", "p1")));
        assert!(!cache.put_if_generation(&overrides_key("c1", "p3"), pending, &4));
    }

    #[test]
    fn test_keys() {
        assert_eq!(overrides_key("c", "p"), "overrides:c:p");
        assert_eq!(reference_lines_key("plan"), "reference_lines:plan");
        assert_eq!(activities_key("c", "p"), "activities:c:p");
    }
}
