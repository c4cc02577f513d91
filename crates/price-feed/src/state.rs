//! TTL cache state
//!
//! Uses DashMap for concurrent reads/writes with minimal contention. Expiry
//! is lazy: a stale entry is never returned and is dropped when read or
//! overwritten; there is no background sweep.

use dashmap::DashMap;
use std::borrow::Borrow;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

/// Timestamped cache entry
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub written_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V) -> Self {
        Self {
            value,
            written_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.written_at.elapsed()
    }

    /// Fresh only while `now - written_at < ttl`
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}

/// Injected cache store: get / set / clear
pub trait CacheStore<V>: Send + Sync {
    /// Fresh value for `key`, if any
    fn get(&self, key: &str) -> Option<V>;
    fn set(&self, key: &str, value: V);
    fn clear(&self);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory store with one TTL for every entry
#[derive(Debug)]
pub struct TtlCache<K: Eq + Hash, V> {
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh entry (value plus write time) for `key`
    pub fn get_entry<Q>(&self, key: &Q) -> Option<CacheEntry<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.entries.get(key) {
            Some(entry) if entry.is_fresh(self.ttl) => return Some(entry.value().clone()),
            Some(_) => {}
            None => return None,
        }

        self.entries.remove_if(key, |_, e| !e.is_fresh(self.ttl));
        None
    }

    pub fn get_fresh<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_entry(key).map(|e| e.value)
    }

    /// Like `get_fresh`, with a per-call TTL instead of the store default
    pub fn get_within<Q>(&self, key: &Q, ttl: Duration) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.entries.get(key) {
            Some(entry) if entry.is_fresh(ttl) => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }

        self.entries.remove_if(key, |_, e| !e.is_fresh(ttl));
        None
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(key, CacheEntry::new(value));
    }

    pub fn remove(&self, key: &K) {
        self.entries.remove(key);
    }

    pub fn clear_all(&self) {
        self.entries.clear();
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl<V: Clone + Send + Sync> CacheStore<V> for TtlCache<String, V> {
    fn get(&self, key: &str) -> Option<V> {
        self.get_fresh(key)
    }

    fn set(&self, key: &str, value: V) {
        self.insert(key.to_string(), value);
    }

    fn clear(&self) {
        self.clear_all();
    }

    fn len(&self) -> usize {
        self.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_fresh_until_ttl() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(10));
        cache.set("k", 1);

        tokio::time::advance(Duration::from_millis(9_999)).await;
        assert_eq!(cache.get("k"), Some(1));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("k"), None);
        // Expired entries are dropped on read
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_resets_timestamp() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(5));
        cache.set("k", 1);
        tokio::time::advance(Duration::from_secs(4)).await;
        cache.set("k", 2);
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(cache.get("k"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_within_custom_ttl() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60));
        cache.insert("k".to_string(), 7);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get_within("k", Duration::from_secs(3)), Some(7));
        assert_eq!(cache.len(), 1);

        // Stale under the shorter TTL: dropped, not just hidden
        assert_eq!(cache.get_within("k", Duration::from_secs(1)), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.get_within("k", Duration::from_secs(3)), None);
    }

    #[test]
    fn test_clear() {
        let cache: TtlCache<String, &str> = TtlCache::new(Duration::from_secs(60));
        cache.set("a", "x");
        cache.set("b", "y");
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let cache: Arc<TtlCache<String, u64>> = Arc::new(TtlCache::new(Duration::from_secs(60)));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for j in 0..100u64 {
                        cache.set(&format!("{i}-{j}"), j);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(cache.len(), 400);
    }
}
