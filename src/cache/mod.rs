//! Cache Module
//!
//! Persistent TTL cache with per-bucket capacity, version invalidation and
//! hit/miss statistics.

mod entry;
mod lookup;
mod manager;
mod stats;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry};
pub use lookup::{CacheLookup, CacheMiss};
pub use manager::{CacheManager, CACHE_PREFIX};
pub use stats::{CacheCounters, CacheStats};
