//! Configuration Module
//!
//! Cache bucket strategies, sync policy and runtime settings, loaded from
//! environment variables with sensible defaults.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// == Cache Strategy ==
/// Read-time policy deciding whether cache or network is consulted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStrategy {
    /// Serve fresh cache without a network call, fetch otherwise
    CacheFirst,
    /// Always try the network, fall back to cache
    NetworkFirst,
    /// Serve cache immediately, refresh in the background when stale
    StaleWhileRevalidate,
}

// == Cache Strategy Config ==
/// Per-bucket cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStrategyConfig {
    /// Validity window in milliseconds
    pub ttl: u64,
    /// Maximum number of entries kept for the bucket
    pub max_size: usize,
    /// Default read strategy for the bucket
    pub strategy: CacheStrategy,
}

impl CacheStrategyConfig {
    pub fn new(ttl: u64, max_size: usize, strategy: CacheStrategy) -> Self {
        Self {
            ttl,
            max_size,
            strategy,
        }
    }
}

// == Sync Policy ==
/// Global policy for replaying queued operations.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPolicy {
    /// Total attempts before an operation is marked failed
    pub max_retries: u32,
    /// Base delay in milliseconds before the first retry
    pub retry_delay_ms: u64,
    /// Multiplier applied per retry
    pub backoff_multiplier: f64,
    /// Operations executed concurrently per batch
    pub batch_size: usize,
    /// Interval between background sync attempts in milliseconds
    pub background_interval_ms: u64,
    /// Queue used when an operation does not name one
    pub default_queue: String,
}

impl SyncPolicy {
    /// Interval between background sync attempts.
    pub fn background_interval(&self) -> Duration {
        Duration::from_millis(self.background_interval_ms)
    }
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            backoff_multiplier: 2.0,
            batch_size: 10,
            background_interval_ms: 300_000,
            default_queue: "default".to_string(),
        }
    }
}

// == Config ==
/// Offline subsystem configuration.
///
/// All scalar values can be configured via environment variables; the bucket
/// table is built in.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cache-format version; entries written under another version are discarded
    pub cache_version: String,
    /// Strategy per bucket name
    pub buckets: HashMap<String, CacheStrategyConfig>,
    /// Strategy for keys whose bucket is not listed
    pub default_strategy: CacheStrategyConfig,
    /// Queue replay policy
    pub sync: SyncPolicy,
    /// Request timeout handed to the HTTP client in milliseconds
    pub network_timeout_ms: u64,
    /// Linear backoff step between network-first fetch attempts in milliseconds
    pub fetch_retry_delay_ms: u64,
    /// Background cache cleanup interval in seconds
    pub cleanup_interval: u64,
    /// Base URL of the remote API
    pub api_base_url: String,
    /// Directory holding the persisted key-value store
    pub storage_dir: PathBuf,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_VERSION` - Cache format version (default: 1.0.0)
    /// - `SYNC_MAX_RETRIES` - Attempts per queued operation (default: 3)
    /// - `SYNC_RETRY_DELAY_MS` - Base retry delay (default: 1000)
    /// - `SYNC_BACKOFF_MULTIPLIER` - Backoff multiplier (default: 2.0)
    /// - `SYNC_BATCH_SIZE` - Operations per batch (default: 10)
    /// - `SYNC_BACKGROUND_INTERVAL_MS` - Background sync interval (default: 300000)
    /// - `NETWORK_TIMEOUT_MS` - HTTP timeout (default: 30000)
    /// - `FETCH_RETRY_DELAY_MS` - Network-first backoff step (default: 1000)
    /// - `CACHE_CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 600)
    /// - `API_BASE_URL` - Remote API root (default: http://localhost:8080)
    /// - `STORAGE_DIR` - Store directory (default: ./offline-data)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let sync_defaults = defaults.sync.clone();

        Self {
            cache_version: env::var("CACHE_VERSION").unwrap_or(defaults.cache_version),
            buckets: defaults.buckets,
            default_strategy: defaults.default_strategy,
            sync: SyncPolicy {
                max_retries: env_parse("SYNC_MAX_RETRIES", sync_defaults.max_retries),
                retry_delay_ms: env_parse("SYNC_RETRY_DELAY_MS", sync_defaults.retry_delay_ms),
                backoff_multiplier: env_parse(
                    "SYNC_BACKOFF_MULTIPLIER",
                    sync_defaults.backoff_multiplier,
                ),
                batch_size: env_parse("SYNC_BATCH_SIZE", sync_defaults.batch_size),
                background_interval_ms: env_parse(
                    "SYNC_BACKGROUND_INTERVAL_MS",
                    sync_defaults.background_interval_ms,
                ),
                default_queue: sync_defaults.default_queue,
            },
            network_timeout_ms: env_parse("NETWORK_TIMEOUT_MS", defaults.network_timeout_ms),
            fetch_retry_delay_ms: env_parse("FETCH_RETRY_DELAY_MS", defaults.fetch_retry_delay_ms),
            cleanup_interval: env_parse("CACHE_CLEANUP_INTERVAL", defaults.cleanup_interval),
            api_base_url: env::var("API_BASE_URL").unwrap_or(defaults.api_base_url),
            storage_dir: env::var("STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
        }
    }

    // == Strategy Lookup ==
    /// Returns the strategy config for the bucket the key belongs to.
    pub fn strategy_for(&self, key: &str) -> &CacheStrategyConfig {
        self.buckets
            .get(bucket_of(key))
            .unwrap_or(&self.default_strategy)
    }

    /// Request timeout for the HTTP client.
    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        const MINUTE: u64 = 60_000;
        const HOUR: u64 = 60 * MINUTE;

        let buckets = HashMap::from([
            (
                "routes".to_string(),
                CacheStrategyConfig::new(HOUR, 100, CacheStrategy::CacheFirst),
            ),
            (
                "truckRoutes".to_string(),
                CacheStrategyConfig::new(30 * MINUTE, 100, CacheStrategy::NetworkFirst),
            ),
            (
                "profile".to_string(),
                CacheStrategyConfig::new(24 * HOUR, 10, CacheStrategy::StaleWhileRevalidate),
            ),
            (
                "dashboard".to_string(),
                CacheStrategyConfig::new(5 * MINUTE, 20, CacheStrategy::NetworkFirst),
            ),
            (
                "reference".to_string(),
                CacheStrategyConfig::new(7 * 24 * HOUR, 50, CacheStrategy::CacheFirst),
            ),
        ]);

        Self {
            cache_version: "1.0.0".to_string(),
            buckets,
            default_strategy: CacheStrategyConfig::new(
                15 * MINUTE,
                50,
                CacheStrategy::StaleWhileRevalidate,
            ),
            sync: SyncPolicy::default(),
            network_timeout_ms: 30_000,
            fetch_retry_delay_ms: 1000,
            cleanup_interval: 600,
            api_base_url: "http://localhost:8080".to_string(),
            storage_dir: PathBuf::from("./offline-data"),
        }
    }
}

// == Bucket ==
/// Returns the bucket a logical cache key belongs to: the part before the
/// first `:`, or the whole key.
pub fn bucket_of(key: &str) -> &str {
    key.split(':').next().unwrap_or(key)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
