//! In-process cache tier
//!
//! Uses moka async cache (Send + Sync, bounded, LRU eviction). moka's own
//! TTL only bounds physical residency; logical expiry is decided per entry
//! against the injected clock.

use super::entry::{glob_match, CacheEntry};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use std::time::Duration;

/// Bounded in-process tier
#[derive(Clone)]
pub struct MemoryTier {
    entries: Cache<String, CacheEntry>,
    max_ttl: Duration,
}

impl MemoryTier {
    /// Create a tier holding at most `capacity` entries, none longer than `max_ttl`
    pub fn new(capacity: u64, max_ttl: Duration) -> Self {
        MemoryTier {
            entries: Cache::builder()
                .max_capacity(capacity)
                .eviction_policy(EvictionPolicy::lru())
                .time_to_live(max_ttl)
                .build(),
            max_ttl,
        }
    }

    /// Longest TTL an entry may carry in this tier
    pub fn max_ttl(&self) -> Duration {
        self.max_ttl
    }

    /// Fetch a live entry; expired entries are dropped on read
    pub async fn get(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let entry = self.entries.get(key).await?;
        if entry.is_expired(now) {
            self.entries.invalidate(key).await;
            return None;
        }
        Some(entry)
    }

    /// Insert, capping the entry TTL at the tier maximum
    pub async fn insert(&self, key: &str, mut entry: CacheEntry) {
        entry.ttl_secs = entry.ttl_secs.min(self.max_ttl.as_secs());
        self.entries.insert(key.to_string(), entry).await;
    }

    /// Remove a key; `true` if it was resident
    pub async fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).await.is_some()
    }

    /// Remove every key matching a glob pattern, returning the removed keys
    pub async fn remove_matching(&self, pattern: &str) -> Vec<String> {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(key, _)| glob_match(pattern, key))
            .map(|(key, _)| key.to_string())
            .collect();

        for key in &keys {
            self.entries.invalidate(key).await;
        }
        keys
    }

    /// Drop expired entries ahead of eviction
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.to_string())
            .collect();

        for key in &expired {
            self.entries.invalidate(key).await;
        }
        expired.len()
    }

    /// Drop everything
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    /// Resident entry count after pending maintenance
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(now: DateTime<Utc>, ttl: u64) -> CacheEntry {
        CacheEntry::new(json!("v"), now, Duration::from_secs(ttl))
    }

    #[tokio::test]
    async fn test_get_respects_entry_ttl() {
        let tier = MemoryTier::new(10, Duration::from_secs(3600));
        let now = Utc::now();
        tier.insert("k", entry(now, 60)).await;

        assert!(tier.get("k", now + chrono::Duration::seconds(59)).await.is_some());
        assert!(tier.get("k", now + chrono::Duration::seconds(61)).await.is_none());
        // expired read removed it
        assert!(tier.get("k", now).await.is_none());
    }

    #[tokio::test]
    async fn test_ttl_capped_at_tier_maximum() {
        let tier = MemoryTier::new(10, Duration::from_secs(100));
        let now = Utc::now();
        tier.insert("k", entry(now, 10_000)).await;

        assert!(tier.get("k", now + chrono::Duration::seconds(101)).await.is_none());
    }

    #[tokio::test]
    async fn test_capacity_is_bounded() {
        let tier = MemoryTier::new(3, Duration::from_secs(60));
        let now = Utc::now();
        for i in 0..10 {
            tier.insert(&format!("k{}", i), entry(now, 60)).await;
        }
        assert!(tier.len().await <= 3);
    }

    #[tokio::test]
    async fn test_remove_matching() {
        let tier = MemoryTier::new(10, Duration::from_secs(60));
        let now = Utc::now();
        tier.insert("memory_search:u1:a:5", entry(now, 60)).await;
        tier.insert("memory_search:u1:b:5", entry(now, 60)).await;
        tier.insert("memory_search:u2:a:5", entry(now, 60)).await;

        let removed = tier.remove_matching("memory_search:u1:*").await;
        assert_eq!(removed.len(), 2);
        assert!(tier.get("memory_search:u2:a:5", now).await.is_some());
        assert!(tier.get("memory_search:u1:a:5", now).await.is_none());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let tier = MemoryTier::new(10, Duration::from_secs(3600));
        let now = Utc::now();
        tier.insert("short", entry(now, 1)).await;
        tier.insert("long", entry(now, 600)).await;

        let purged = tier.purge_expired(now + chrono::Duration::seconds(5)).await;
        assert_eq!(purged, 1);
        assert!(tier.get("long", now).await.is_some());
    }
}
