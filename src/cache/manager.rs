//! Cache Manager Module
//!
//! TTL cache over the persistent key-value store. Entries live under the
//! `cache_` key prefix, carry their own TTL and format version, and are capped
//! per bucket by evicting the oldest writes.

use std::sync::Arc;

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{
    current_timestamp_ms, CacheCounters, CacheEntry, CacheLookup, CacheMiss, CacheStats,
};
use crate::config::{bucket_of, CacheStrategyConfig};
use crate::error::{OfflineError, Result};
use crate::storage::KeyValueStore;

/// Prefix separating cache entries from other data in the shared store.
pub const CACHE_PREFIX: &str = "cache_";

/// Envelope parsed without decoding the payload.
type EntryHeader = CacheEntry<IgnoredAny>;

// == Cache Manager ==
pub struct CacheManager {
    /// Shared persistent store
    store: Arc<dyn KeyValueStore>,
    /// Current cache-format version
    version: String,
    /// Lookup counters for this instance
    counters: CacheCounters,
}

impl CacheManager {
    // == Constructor ==
    /// Creates a cache over `store` that only accepts entries written under `version`.
    pub fn new(store: Arc<dyn KeyValueStore>, version: impl Into<String>) -> Self {
        Self {
            store,
            version: version.into(),
            counters: CacheCounters::new(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    fn storage_key(key: &str) -> String {
        format!("{}{}", CACHE_PREFIX, key)
    }

    // == Get ==
    /// Looks up `key`.
    ///
    /// Never fails: a malformed envelope is purged and reported as `Corrupted`,
    /// an entry from another version is purged and reported as
    /// `VersionMismatch`. A payload that does not decode as `T` is reported as
    /// `Corrupted` but left in place. Every call counts as a hit or a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> CacheLookup<T> {
        let storage_key = Self::storage_key(key);

        let raw = match self.store.get(&storage_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return self.miss(CacheMiss::Absent),
            Err(e) => {
                warn!("Cache read failed for '{}': {}", key, e);
                return self.miss(CacheMiss::Unavailable);
            }
        };

        let entry: CacheEntry<Value> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Purging malformed cache entry '{}': {}", key, e);
                self.purge(&storage_key).await;
                return self.miss(CacheMiss::Corrupted);
            }
        };

        if !entry.matches_version(&self.version) {
            debug!(
                "Purging cache entry '{}' from version {} (current {})",
                key, entry.version, self.version
            );
            self.purge(&storage_key).await;
            return self.miss(CacheMiss::VersionMismatch);
        }

        let now = current_timestamp_ms();
        let is_stale = entry.is_stale_at(now);
        let age = entry.age_at(now);

        match serde_json::from_value::<T>(entry.data) {
            Ok(data) => {
                self.counters.record_hit();
                CacheLookup::Hit {
                    data,
                    is_stale,
                    age,
                }
            }
            Err(e) => {
                warn!("Cache entry '{}' does not match requested type: {}", key, e);
                self.miss(CacheMiss::Corrupted)
            }
        }
    }

    fn miss<T>(&self, reason: CacheMiss) -> CacheLookup<T> {
        self.counters.record_miss();
        CacheLookup::Miss(reason)
    }

    async fn purge(&self, storage_key: &str) {
        if let Err(e) = self.store.remove(storage_key).await {
            warn!("Failed to purge cache entry '{}': {}", storage_key, e);
        }
    }

    // == Set ==
    /// Stores `data` under `key`, replacing any previous entry.
    ///
    /// Storage failures propagate. After a successful write the key's bucket
    /// is trimmed to `config.max_size` entries, oldest first.
    ///
    /// # Arguments
    /// * `key` - Logical cache key
    /// * `data` - Payload to serialize
    /// * `config` - Strategy of the key's bucket (TTL and capacity)
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
        config: &CacheStrategyConfig,
    ) -> Result<()> {
        if key.is_empty() {
            return Err(OfflineError::InvalidKey(
                "cache key must not be empty".to_string(),
            ));
        }

        let payload = serde_json::to_value(data)?;
        let size = payload.to_string().len() as u64;
        let entry = CacheEntry::new(payload, config.ttl, self.version.clone(), size);

        self.store
            .set(&Self::storage_key(key), serde_json::to_string(&entry)?)
            .await?;

        match self.enforce_max_size(key, config.max_size).await {
            Ok(0) => {}
            Ok(evicted) => debug!(
                "Evicted {} entries from bucket '{}'",
                evicted,
                bucket_of(key)
            ),
            Err(e) => warn!("Eviction for bucket '{}' failed: {}", bucket_of(key), e),
        }

        Ok(())
    }

    // == Enforce Max Size ==
    /// Deletes the oldest entries of the bucket `key` belongs to until at most
    /// `max_size` remain. Unreadable entries sort as timestamp 0. On equal
    /// timestamps the just-written key is kept.
    async fn enforce_max_size(&self, key: &str, max_size: usize) -> Result<usize> {
        let bucket = bucket_of(key);
        let members: Vec<String> = self
            .keys()
            .await?
            .into_iter()
            .filter(|k| bucket_of(k) == bucket)
            .collect();

        if members.len() <= max_size {
            return Ok(0);
        }

        let mut dated = Vec::with_capacity(members.len());
        for member in members {
            let timestamp = self
                .read_header(&member)
                .await
                .map(|header| header.timestamp)
                .unwrap_or(0);
            dated.push((timestamp, member == key, member));
        }
        dated.sort();

        let excess = dated.len() - max_size;
        let victims: Vec<String> = dated
            .into_iter()
            .take(excess)
            .map(|(_, _, member)| Self::storage_key(&member))
            .collect();

        self.store.remove_many(&victims).await?;
        Ok(victims.len())
    }

    async fn read_header(&self, key: &str) -> Option<EntryHeader> {
        let raw = self.store.get(&Self::storage_key(key)).await.ok()??;
        serde_json::from_str(&raw).ok()
    }

    // == Delete ==
    /// Removes one entry; absent keys are fine.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.store.remove(&Self::storage_key(key)).await
    }

    // == Invalidate ==
    /// Removes every entry whose key contains `pattern`. Returns the count removed.
    pub async fn invalidate(&self, pattern: &str) -> Result<usize> {
        let victims: Vec<String> = self
            .keys()
            .await?
            .into_iter()
            .filter(|k| k.contains(pattern))
            .map(|k| Self::storage_key(&k))
            .collect();

        if !victims.is_empty() {
            self.store.remove_many(&victims).await?;
            info!("Invalidated {} cache entries matching '{}'", victims.len(), pattern);
        }

        Ok(victims.len())
    }

    // == Clear ==
    /// Removes every cache entry and resets the hit/miss counters.
    pub async fn clear(&self) -> Result<()> {
        let victims: Vec<String> = self
            .keys()
            .await?
            .iter()
            .map(|k| Self::storage_key(k))
            .collect();

        self.store.remove_many(&victims).await?;
        self.counters.reset();
        info!("Cleared {} cache entries", victims.len());
        Ok(())
    }

    // == Cleanup ==
    /// Removes expired, version-mismatched and unreadable entries.
    ///
    /// Returns the number of entries removed.
    pub async fn cleanup(&self) -> Result<usize> {
        let now = current_timestamp_ms();
        let mut victims = Vec::new();

        for key in self.keys().await? {
            let storage_key = Self::storage_key(&key);
            let raw = match self.store.get(&storage_key).await {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping unreadable cache entry '{}': {}", key, e);
                    continue;
                }
            };

            let remove = match serde_json::from_str::<EntryHeader>(&raw) {
                Ok(header) => !header.matches_version(&self.version) || header.is_stale_at(now),
                Err(_) => true,
            };
            if remove {
                victims.push(storage_key);
            }
        }

        if !victims.is_empty() {
            self.store.remove_many(&victims).await?;
        }

        Ok(victims.len())
    }

    // == Stats ==
    /// Aggregates size and age over every readable entry of the current version.
    pub async fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();

        match self.keys().await {
            Ok(keys) => {
                for key in keys {
                    if let Some(header) = self.read_header(&key).await {
                        if header.matches_version(&self.version) {
                            stats.record_entry(header.timestamp, header.size);
                        }
                    }
                }
            }
            Err(e) => warn!("Unable to list cache entries for stats: {}", e),
        }

        stats.with_counters(self.counters.hits(), self.counters.misses())
    }

    /// Total bytes of cached payloads.
    pub async fn total_size(&self) -> u64 {
        self.stats().await.total_size
    }

    // == Is Valid ==
    /// True iff the entry exists, matches the current version and is within its TTL.
    pub async fn is_valid(&self, key: &str) -> bool {
        self.read_header(key)
            .await
            .map(|header| header.matches_version(&self.version) && !header.is_stale())
            .unwrap_or(false)
    }

    // == Keys ==
    /// Logical keys of every stored cache entry.
    pub async fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .list_keys()
            .await?
            .into_iter()
            .filter_map(|k| k.strip_prefix(CACHE_PREFIX).map(str::to_string))
            .collect())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheStrategy;
    use crate::storage::MemoryStore;

    const VERSION: &str = "1.0.0";

    fn setup() -> (Arc<MemoryStore>, CacheManager) {
        let store = Arc::new(MemoryStore::new());
        let cache = CacheManager::new(store.clone(), VERSION);
        (store, cache)
    }

    fn config(ttl: u64, max_size: usize) -> CacheStrategyConfig {
        CacheStrategyConfig::new(ttl, max_size, CacheStrategy::CacheFirst)
    }

    async fn put_raw(store: &MemoryStore, key: &str, timestamp: u64, ttl: u64, version: &str) {
        let entry = CacheEntry {
            data: serde_json::json!({ "key": key }),
            timestamp,
            ttl,
            version: version.to_string(),
            size: 12,
        };
        store
            .set(
                &format!("{}{}", CACHE_PREFIX, key),
                serde_json::to_string(&entry).unwrap(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (_, cache) = setup();

        cache
            .set("routes:1", &vec!["a", "b"], &config(60_000, 10))
            .await
            .unwrap();
        let lookup = cache.get::<Vec<String>>("routes:1").await;

        assert!(lookup.is_fresh());
        assert_eq!(lookup.into_data(), Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[tokio::test]
    async fn test_get_absent() {
        let (_, cache) = setup();

        let lookup = cache.get::<String>("nope").await;
        assert_eq!(lookup, CacheLookup::Miss(CacheMiss::Absent));
    }

    #[tokio::test]
    async fn test_set_rejects_empty_key() {
        let (_, cache) = setup();

        let result = cache.set("", &1, &config(1000, 10)).await;
        assert!(matches!(result, Err(OfflineError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_set_propagates_storage_full() {
        let store = Arc::new(MemoryStore::with_quota(64));
        let cache = CacheManager::new(store, VERSION);

        let big = "x".repeat(256);
        let result = cache.set("routes", &big, &config(1000, 10)).await;
        assert!(matches!(result, Err(OfflineError::StorageFull(_))));
        assert!(!cache.get::<String>("routes").await.is_from_cache());
    }

    #[tokio::test]
    async fn test_stale_entry_still_returned() {
        let (store, cache) = setup();
        let now = current_timestamp_ms();
        put_raw(&store, "routes", now - 120_000, 60_000, VERSION).await;

        let lookup = cache.get::<Value>("routes").await;
        assert!(lookup.is_stale());
        assert!(lookup.data().is_some());
        assert!(lookup.age().unwrap() >= 120_000);
    }

    #[tokio::test]
    async fn test_version_mismatch_purges() {
        let (store, cache) = setup();
        put_raw(&store, "profile", current_timestamp_ms(), 60_000, "0.9.0").await;

        let lookup = cache.get::<Value>("profile").await;
        assert_eq!(lookup.miss_reason(), Some(CacheMiss::VersionMismatch));
        assert_eq!(store.get("cache_profile").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_malformed_entry_is_a_miss() {
        let (store, cache) = setup();
        store
            .set("cache_routes", "{definitely not json".to_string())
            .await
            .unwrap();

        let lookup = cache.get::<Value>("routes").await;
        assert_eq!(lookup.miss_reason(), Some(CacheMiss::Corrupted));
        assert_eq!(store.get("cache_routes").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_wrong_type_is_a_miss_but_kept() {
        let (store, cache) = setup();
        cache.set("routes", &"text", &config(60_000, 10)).await.unwrap();

        let lookup = cache.get::<Vec<u32>>("routes").await;
        assert_eq!(lookup.miss_reason(), Some(CacheMiss::Corrupted));
        assert!(store.get("cache_routes").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete() {
        let (_, cache) = setup();
        cache.set("routes", &1, &config(60_000, 10)).await.unwrap();

        cache.delete("routes").await.unwrap();
        cache.delete("routes").await.unwrap();
        assert!(!cache.get::<u32>("routes").await.is_from_cache());
    }

    #[tokio::test]
    async fn test_invalidate_pattern() {
        let (_, cache) = setup();
        let cfg = config(60_000, 10);
        cache.set("routes:1", &1, &cfg).await.unwrap();
        cache.set("truckRoutes:1", &2, &cfg).await.unwrap();
        cache.set("profile", &3, &cfg).await.unwrap();

        let removed = cache.invalidate("routes").await.unwrap();

        // Case-sensitive: "truckRoutes" does not contain "routes"
        assert_eq!(removed, 1);
        assert!(!cache.get::<u32>("routes:1").await.is_from_cache());
        assert!(cache.get::<u32>("truckRoutes:1").await.is_from_cache());
        assert!(cache.get::<u32>("profile").await.is_from_cache());
        assert_eq!(cache.invalidate("nothing-matches").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_only_touches_cache_namespace() {
        let (store, cache) = setup();
        store.set("sync_queue_default", "[]".to_string()).await.unwrap();
        cache.set("routes", &1, &config(60_000, 10)).await.unwrap();
        let _ = cache.get::<u32>("routes").await;

        cache.clear().await.unwrap();

        assert!(cache.keys().await.unwrap().is_empty());
        assert!(store.get("sync_queue_default").await.unwrap().is_some());
        let stats = cache.stats().await;
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test]
    async fn test_cleanup_removes_expired_mismatched_and_corrupt() {
        let (store, cache) = setup();
        let now = current_timestamp_ms();
        put_raw(&store, "expired", now - 120_000, 60_000, VERSION).await;
        put_raw(&store, "old_version", now, 60_000, "0.1.0").await;
        put_raw(&store, "fresh", now, 60_000, VERSION).await;
        store.set("cache_broken", "[".to_string()).await.unwrap();

        assert_eq!(cache.cleanup().await.unwrap(), 3);
        assert_eq!(cache.keys().await.unwrap(), vec!["fresh".to_string()]);
        assert_eq!(cache.cleanup().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_empty_cache() {
        let (_, cache) = setup();
        assert_eq!(cache.cleanup().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_eviction_removes_oldest_in_bucket() {
        let (store, cache) = setup();
        let now = current_timestamp_ms();
        put_raw(&store, "routes:a", now - 3_000, 60_000, VERSION).await;
        put_raw(&store, "routes:b", now - 2_000, 60_000, VERSION).await;
        put_raw(&store, "routes:c", now - 1_000, 60_000, VERSION).await;
        put_raw(&store, "profile:a", now - 9_000, 60_000, VERSION).await;

        cache.set("routes:d", &4, &config(60_000, 2)).await.unwrap();

        let mut keys = cache.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["profile:a", "routes:c", "routes:d"]);
    }

    #[tokio::test]
    async fn test_eviction_prefers_unreadable_entries() {
        let (store, cache) = setup();
        let now = current_timestamp_ms();
        put_raw(&store, "routes:a", now - 1_000, 60_000, VERSION).await;
        store.set("cache_routes:junk", "??".to_string()).await.unwrap();

        cache.set("routes:b", &1, &config(60_000, 2)).await.unwrap();

        let mut keys = cache.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["routes:a", "routes:b"]);
    }

    #[tokio::test]
    async fn test_hit_miss_accounting() {
        let (_, cache) = setup();

        for _ in 0..3 {
            let _ = cache.get::<u32>("absent").await;
        }
        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses), (0, 3));

        cache.set("present", &1, &config(60_000, 10)).await.unwrap();
        let _ = cache.get::<u32>("present").await;
        let _ = cache.get::<u32>("present").await;

        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses), (2, 3));
        assert_eq!(stats.hit_rate, 0.4);
        assert_eq!(stats.miss_rate, 0.6);
    }

    #[tokio::test]
    async fn test_stats_aggregates() {
        let (store, cache) = setup();
        put_raw(&store, "a", 1_000, 60_000, VERSION).await;
        put_raw(&store, "b", 3_000, 60_000, VERSION).await;
        put_raw(&store, "c", 2_000, 60_000, "other").await;

        let stats = cache.stats().await;
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.total_size, 24);
        assert_eq!(stats.oldest_entry, Some(1_000));
        assert_eq!(stats.newest_entry, Some(3_000));
        assert_eq!(stats.hit_rate, 0.0);
        assert_eq!(stats.miss_rate, 0.0);
    }

    #[tokio::test]
    async fn test_is_valid() {
        let (store, cache) = setup();
        let now = current_timestamp_ms();
        put_raw(&store, "fresh", now, 60_000, VERSION).await;
        put_raw(&store, "stale", now - 120_000, 60_000, VERSION).await;
        put_raw(&store, "foreign", now, 60_000, "2.0.0").await;

        assert!(cache.is_valid("fresh").await);
        assert!(!cache.is_valid("stale").await);
        assert!(!cache.is_valid("foreign").await);
        assert!(!cache.is_valid("missing").await);

        // is_valid does not count as a lookup
        assert_eq!(cache.stats().await.misses, 0);
    }
}
