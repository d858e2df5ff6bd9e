//! Cache Statistics Module
//!
//! Hit/miss counters scoped to one cache instance, and the aggregate snapshot
//! returned by `CacheManager::stats`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Counters ==
/// Process-lifetime hit and miss counters.
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheCounters {
    // == Constructor ==
    /// Creates counters starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Hit ==
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Miss ==
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    // == Reset ==
    /// Zeroes both counters.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

// == Cache Stats ==
/// Aggregate view over every cache entry plus the request counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of readable entries
    pub total_entries: usize,
    /// Sum of entry sizes in bytes
    pub total_size: u64,
    /// Timestamp of the oldest entry
    pub oldest_entry: Option<u64>,
    /// Timestamp of the newest entry
    pub newest_entry: Option<u64>,
    /// Lookups that returned data
    pub hits: u64,
    /// Lookups that returned nothing
    pub misses: u64,
    /// hits / (hits + misses)
    pub hit_rate: f64,
    /// misses / (hits + misses)
    pub miss_rate: f64,
}

impl CacheStats {
    /// Creates a snapshot with rates derived from the counters.
    pub fn with_counters(mut self, hits: u64, misses: u64) -> Self {
        let (hit_rate, miss_rate) = rates(hits, misses);
        self.hits = hits;
        self.misses = misses;
        self.hit_rate = hit_rate;
        self.miss_rate = miss_rate;
        self
    }

    // == Record Entry ==
    /// Folds one entry into the aggregates.
    pub fn record_entry(&mut self, timestamp: u64, size: u64) {
        self.total_entries += 1;
        self.total_size += size;
        self.oldest_entry = Some(self.oldest_entry.map_or(timestamp, |t| t.min(timestamp)));
        self.newest_entry = Some(self.newest_entry.map_or(timestamp, |t| t.max(timestamp)));
    }
}

// == Rates ==
/// Returns (hit_rate, miss_rate), both 0.0 if no requests have been made.
pub fn rates(hits: u64, misses: u64) -> (f64, f64) {
    let total = hits + misses;
    if total == 0 {
        (0.0, 0.0)
    } else {
        (hits as f64 / total as f64, misses as f64 / total as f64)
    }
}
