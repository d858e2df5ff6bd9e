//! Cache Entry Module
//!
//! Defines the persisted envelope for cached payloads, with TTL and version
//! metadata embedded so stored values stay self-describing.

use chrono::Utc;
use serde::{Deserialize, Serialize};

// == Cache Entry ==
/// A cached payload with its write time, validity window and format version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// The stored payload
    pub data: T,
    /// Write timestamp (Unix milliseconds)
    pub timestamp: u64,
    /// Validity window in milliseconds
    pub ttl: u64,
    /// Cache-format version the entry was written under
    pub version: String,
    /// Serialized payload length in bytes
    #[serde(default)]
    pub size: u64,
}

impl<T> CacheEntry<T> {
    // == Constructor ==
    /// Creates a new entry stamped with the current time.
    ///
    /// # Arguments
    /// * `data` - The payload
    /// * `ttl` - Validity window in milliseconds
    /// * `version` - Current cache-format version
    /// * `size` - Serialized payload length in bytes
    pub fn new(data: T, ttl: u64, version: impl Into<String>, size: u64) -> Self {
        Self {
            data,
            timestamp: current_timestamp_ms(),
            ttl,
            version: version.into(),
            size,
        }
    }

    // == Age ==
    /// Milliseconds elapsed between the write and `now`.
    pub fn age_at(&self, now: u64) -> u64 {
        now.saturating_sub(self.timestamp)
    }

    // == Is Stale ==
    /// Checks staleness against an explicit clock reading.
    ///
    /// Boundary condition: an entry whose age equals its TTL is still fresh;
    /// it becomes stale one millisecond later.
    pub fn is_stale_at(&self, now: u64) -> bool {
        self.age_at(now) > self.ttl
    }

    /// Checks staleness against the current time.
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(current_timestamp_ms())
    }

    /// Returns true if the entry was written under `version`.
    pub fn matches_version(&self, version: &str) -> bool {
        self.version == version
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
