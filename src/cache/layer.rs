//! Two-tier cache
//!
//! Reads consult the in-process tier, then the persistent tier. Persistent
//! hits are not promoted unless the caller asks. Writes always reach the
//! persistent tier and reach the in-process tier only under a hot-path policy.
//! Failures of the persistent tier are logged and surface as misses.

use super::entry::CacheEntry;
use super::local::LocalKeyValueStore;
use super::memory::MemoryTier;
use crate::config::CacheConfig;
use crate::core::{system_clock, Clock, KeyValueStore};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Which tiers a write reaches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WritePolicy {
    /// Persistent tier only
    #[default]
    Persistent,
    /// Persistent tier plus the in-process tier
    Hot,
    /// In-process tier only
    MemoryOnly,
}

/// Counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub persistent_hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.memory_hits + self.persistent_hits
    }

    /// Fraction of lookups served from either tier
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    memory_hits: AtomicU64,
    persistent_hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    errors: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Two-tier cache shared by every component that caches
pub struct CacheLayer {
    memory: MemoryTier,
    persistent: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    key_prefix: String,
    default_ttl: Duration,
    enabled: AtomicBool,
    counters: Counters,
}

impl CacheLayer {
    /// Create a cache over the given persistent tier
    pub fn new(config: &CacheConfig, persistent: Arc<dyn KeyValueStore>) -> Self {
        CacheLayer {
            memory: MemoryTier::new(config.memory_capacity, config.memory_ttl),
            persistent,
            clock: system_clock(),
            key_prefix: config.key_prefix.clone(),
            default_ttl: config.default_ttl,
            enabled: AtomicBool::new(config.enabled),
            counters: Counters::default(),
        }
    }

    /// Cache whose persistent tier also lives in process memory
    pub fn in_process(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let persistent = Arc::new(LocalKeyValueStore::new(clock.clone()));
        Self::new(config, persistent).with_clock(clock)
    }

    /// Replace the time source used for TTL decisions
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn persistent_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    /// Turn every operation into a no-op miss
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// Fetch and decode a value
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_value(key).await?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Cached value for {} has unexpected shape: {}", key, e);
                None
            }
        }
    }

    /// Fetch a raw JSON value
    pub async fn get_value(&self, key: &str) -> Option<serde_json::Value> {
        if !self.is_enabled() {
            return None;
        }
        let now = self.clock.now();

        if let Some(entry) = self.memory.get(key, now).await {
            bump(&self.counters.memory_hits);
            debug!("Cache hit (memory): {}", key);
            return Some(entry.value);
        }

        match self.persistent.get(&self.persistent_key(key)).await {
            Ok(Some(raw)) => match serde_json::from_str::<CacheEntry>(&raw) {
                Ok(entry) if !entry.is_expired(now) => {
                    bump(&self.counters.persistent_hits);
                    debug!("Cache hit ({}): {}", self.persistent.name(), key);
                    return Some(entry.value);
                }
                Ok(_) => {}
                Err(e) => {
                    bump(&self.counters.errors);
                    warn!("Discarding undecodable cache entry {}: {}", key, e);
                }
            },
            Ok(None) => {}
            Err(e) => {
                bump(&self.counters.errors);
                warn!("Cache tier {} unavailable on get {}: {}", self.persistent.name(), key, e);
            }
        }

        bump(&self.counters.misses);
        None
    }

    /// Store a value. Returns `false` if any targeted tier rejected it.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        policy: WritePolicy,
    ) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                bump(&self.counters.errors);
                warn!("Value for {} is not cacheable: {}", key, e);
                return false;
            }
        };
        let entry = CacheEntry::new(value, self.clock.now(), ttl.unwrap_or(self.default_ttl));
        bump(&self.counters.writes);

        if policy != WritePolicy::Persistent {
            self.memory.insert(key, entry.clone()).await;
        }
        if policy == WritePolicy::MemoryOnly {
            return true;
        }

        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                bump(&self.counters.errors);
                warn!("Failed to encode cache entry {}: {}", key, e);
                return false;
            }
        };
        let ttl = Duration::from_secs(entry.ttl_secs);
        match self.persistent.set_ex(&self.persistent_key(key), raw, ttl).await {
            Ok(()) => true,
            Err(e) => {
                bump(&self.counters.errors);
                warn!("Cache tier {} unavailable on set {}: {}", self.persistent.name(), key, e);
                false
            }
        }
    }

    /// Copy a value into the in-process tier, typically after a persistent hit
    pub async fn promote<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        self.set(key, value, ttl, WritePolicy::MemoryOnly).await;
    }

    /// Remove a key from both tiers. `false` if the persistent tier failed.
    pub async fn delete(&self, key: &str) -> bool {
        self.memory.remove(key).await;
        match self.persistent.delete(&self.persistent_key(key)).await {
            Ok(_) => true,
            Err(e) => {
                bump(&self.counters.errors);
                warn!("Cache tier {} unavailable on delete {}: {}", self.persistent.name(), key, e);
                false
            }
        }
    }

    /// Remove every key matching a glob pattern from both tiers.
    ///
    /// Walks the persistent keyspace; cost grows with the number of matching
    /// keys. Returns how many distinct keys were removed.
    pub async fn clear(&self, pattern: &str) -> usize {
        let mut removed: HashSet<String> = self.memory.remove_matching(pattern).await.into_iter().collect();

        let persistent_pattern = self.persistent_key(pattern);
        let keys = match self.persistent.scan(&persistent_pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                bump(&self.counters.errors);
                warn!("Cache tier {} unavailable on clear {}: {}", self.persistent.name(), pattern, e);
                return removed.len();
            }
        };

        match self.persistent.delete_many(&keys).await {
            Ok(_) => {
                removed.extend(
                    keys.iter()
                        .filter_map(|k| k.strip_prefix(&self.key_prefix))
                        .map(str::to_string),
                );
            }
            Err(e) => {
                bump(&self.counters.errors);
                warn!("Cache tier {} failed to delete {} keys: {}", self.persistent.name(), keys.len(), e);
            }
        }

        debug!("Cleared {} cache keys matching {}", removed.len(), pattern);
        removed.len()
    }

    /// Remove everything under this cache's namespace
    pub async fn clear_all(&self) -> usize {
        let count = self.clear("*").await;
        self.memory.clear();
        count
    }

    /// Drop expired in-process entries ahead of eviction
    pub async fn clear_expired(&self) -> usize {
        self.memory.purge_expired(self.clock.now()).await
    }

    /// Counter snapshot
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            persistent_hits: self.counters.persistent_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    /// Entries resident in the in-process tier
    pub async fn memory_entries(&self) -> u64 {
        self.memory.len().await
    }

    /// Whether the persistent tier answers
    pub async fn health_check(&self) -> bool {
        self.persistent.health_check().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use serde_json::json;

    fn config() -> CacheConfig {
        CacheConfig {
            memory_capacity: 100,
            ..CacheConfig::default()
        }
    }

    fn cache_with_clock() -> (CacheLayer, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (CacheLayer::in_process(&config(), clock.clone()), clock)
    }

    /// Persistent tier that is always down
    struct UnreachableStore;

    #[async_trait]
    impl KeyValueStore for UnreachableStore {
        fn name(&self) -> &'static str {
            "unreachable"
        }
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(Error::StoreConnection("connection refused".into()))
        }
        async fn set_ex(&self, _key: &str, _value: String, _ttl: Duration) -> Result<()> {
            Err(Error::StoreConnection("connection refused".into()))
        }
        async fn delete(&self, _key: &str) -> Result<bool> {
            Err(Error::StoreConnection("connection refused".into()))
        }
        async fn scan(&self, _pattern: &str) -> Result<Vec<String>> {
            Err(Error::StoreConnection("connection refused".into()))
        }
        async fn delete_many(&self, _keys: &[String]) -> Result<usize> {
            Err(Error::StoreConnection("connection refused".into()))
        }
        async fn health_check(&self) -> Result<()> {
            Err(Error::StoreConnection("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_user_record_expires_after_ttl() {
        let (cache, clock) = cache_with_clock();
        let user = json!({"id": "123", "username": "aisha"});

        assert!(cache.set("user:123", &user, Some(Duration::from_secs(300)), WritePolicy::Persistent).await);

        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.get::<serde_json::Value>("user:123").await, Some(user));

        clock.advance(Duration::from_secs(291));
        assert_eq!(cache.get::<serde_json::Value>("user:123").await, None);
    }

    #[tokio::test]
    async fn test_persistent_hit_is_not_promoted() {
        let (cache, _clock) = cache_with_clock();
        cache.set("k", &1u32, None, WritePolicy::Persistent).await;

        assert_eq!(cache.get::<u32>("k").await, Some(1));
        assert_eq!(cache.get::<u32>("k").await, Some(1));

        let stats = cache.stats();
        assert_eq!(stats.persistent_hits, 2);
        assert_eq!(stats.memory_hits, 0);
        assert_eq!(cache.memory_entries().await, 0);
    }

    #[tokio::test]
    async fn test_hot_write_and_promote_serve_from_memory() {
        let (cache, _clock) = cache_with_clock();
        cache.set("hot", &"v", None, WritePolicy::Hot).await;
        assert_eq!(cache.get::<String>("hot").await.as_deref(), Some("v"));

        cache.set("cold", &"w", None, WritePolicy::Persistent).await;
        let value: String = cache.get("cold").await.unwrap();
        cache.promote("cold", &value, None).await;
        assert_eq!(cache.get::<String>("cold").await.as_deref(), Some("w"));

        assert_eq!(cache.stats().memory_hits, 2);
    }

    #[tokio::test]
    async fn test_clear_pattern_spans_both_tiers() {
        let (cache, _clock) = cache_with_clock();
        cache.set("memory_search:u1:a:5", &1, None, WritePolicy::Hot).await;
        cache.set("memory_search:u1:b:5", &2, None, WritePolicy::Persistent).await;
        cache.set("memory_search:u2:a:5", &3, None, WritePolicy::Persistent).await;

        assert_eq!(cache.clear("memory_search:u1:*").await, 2);
        assert_eq!(cache.get::<i32>("memory_search:u1:a:5").await, None);
        assert_eq!(cache.get::<i32>("memory_search:u1:b:5").await, None);
        assert_eq!(cache.get::<i32>("memory_search:u2:a:5").await, Some(3));
    }

    #[tokio::test]
    async fn test_unreachable_tier_degrades_to_miss() {
        let cache = CacheLayer::new(&config(), Arc::new(UnreachableStore));

        assert!(!cache.set("k", &1, None, WritePolicy::Persistent).await);
        assert_eq!(cache.get::<i32>("k").await, None);
        assert!(!cache.delete("k").await);
        assert_eq!(cache.clear("k*").await, 0);
        assert!(!cache.health_check().await);
        assert!(cache.stats().errors >= 4);
    }

    #[tokio::test]
    async fn test_hot_write_survives_unreachable_tier() {
        let cache = CacheLayer::new(&config(), Arc::new(UnreachableStore));

        assert!(!cache.set("k", &1, None, WritePolicy::Hot).await);
        assert_eq!(cache.get::<i32>("k").await, Some(1));
    }

    #[tokio::test]
    async fn test_disabled_cache_is_noop() {
        let (cache, _clock) = cache_with_clock();
        cache.disable();
        assert!(!cache.set("k", &1, None, WritePolicy::Hot).await);
        assert_eq!(cache.get::<i32>("k").await, None);

        cache.enable();
        assert!(cache.set("k", &1, None, WritePolicy::Hot).await);
        assert_eq!(cache.get::<i32>("k").await, Some(1));
    }

    #[tokio::test]
    async fn test_clear_expired_and_stats() {
        let (cache, clock) = cache_with_clock();
        cache.set("short", &1, Some(Duration::from_secs(5)), WritePolicy::Hot).await;
        cache.set("long", &2, Some(Duration::from_secs(500)), WritePolicy::Hot).await;

        clock.advance(Duration::from_secs(6));
        assert_eq!(cache.clear_expired().await, 1);
        assert_eq!(cache.get::<i32>("nope").await, None);

        let stats = cache.stats();
        assert_eq!(stats.writes, 2);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_clear_all() {
        let (cache, _clock) = cache_with_clock();
        cache.set("a", &1, None, WritePolicy::Hot).await;
        cache.set("b", &2, None, WritePolicy::Persistent).await;

        assert_eq!(cache.clear_all().await, 2);
        assert_eq!(cache.get::<i32>("a").await, None);
        assert_eq!(cache.get::<i32>("b").await, None);
    }
}
