//! Request options and result types of the offline façade.

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::config::CacheStrategy;
use crate::sync::Priority;

// == Data Options ==
/// Per-read overrides for `OfflineManager::get_data`.
#[derive(Debug, Clone, Default)]
pub struct DataOptions {
    /// Strategy to use instead of the bucket default
    pub strategy: Option<CacheStrategy>,
    /// Skip the network regardless of connectivity
    pub force_offline: bool,
    /// Fetch attempts for network-first (defaults to the sync policy)
    pub max_retries: Option<u32>,
    /// TTL for data written by this read, in milliseconds
    pub ttl: Option<u64>,
}

impl DataOptions {
    pub fn with_strategy(strategy: CacheStrategy) -> Self {
        Self {
            strategy: Some(strategy),
            ..Self::default()
        }
    }

    pub fn offline() -> Self {
        Self {
            force_offline: true,
            ..Self::default()
        }
    }
}

// == Revalidation ==
/// Handle to a background cache refresh started by stale-while-revalidate.
#[derive(Debug)]
pub struct Revalidation {
    handle: JoinHandle<bool>,
}

impl Revalidation {
    pub(crate) fn new(handle: JoinHandle<bool>) -> Self {
        Self { handle }
    }

    /// Waits for the refresh. Returns true if the cache was updated.
    pub async fn wait(self) -> bool {
        self.handle.await.unwrap_or(false)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// == Offline Data Result ==
/// Best available data for a read, with where it came from and what went wrong.
///
/// `data` may be present alongside `error`: degraded but usable.
#[derive(Debug)]
pub struct OfflineDataResult<T> {
    pub data: Option<T>,
    pub is_from_cache: bool,
    pub is_stale: bool,
    pub error: Option<String>,
    /// Present when a background refresh was started
    pub revalidation: Option<Revalidation>,
}

impl<T> OfflineDataResult<T> {
    pub fn from_network(data: T) -> Self {
        Self {
            data: Some(data),
            is_from_cache: false,
            is_stale: false,
            error: None,
            revalidation: None,
        }
    }

    pub fn from_cache(data: T, is_stale: bool) -> Self {
        Self {
            data: Some(data),
            is_from_cache: true,
            is_stale,
            error: None,
            revalidation: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            data: None,
            is_from_cache: false,
            is_stale: false,
            error: None,
            revalidation: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub(crate) fn with_revalidation(mut self, revalidation: Revalidation) -> Self {
        self.revalidation = Some(revalidation);
        self
    }
}

// == Operation Options ==
/// Overrides for `OfflineManager::add_offline_operation`.
#[derive(Debug, Clone, Default)]
pub struct OperationOptions {
    pub priority: Option<Priority>,
    pub max_retries: Option<u32>,
    /// Target queue (defaults to the policy's default queue)
    pub queue: Option<String>,
    pub dependencies: Vec<String>,
}

// == Network Status ==
/// Pushed to network listeners on connectivity changes and mode toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkStatus {
    pub is_connected: bool,
    pub is_offline_mode: bool,
}

impl NetworkStatus {
    /// Whether network calls are allowed.
    pub fn is_online(&self) -> bool {
        self.is_connected && !self.is_offline_mode
    }
}

// == Offline Status ==
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineStatus {
    pub is_online: bool,
    pub is_offline_mode: bool,
    pub pending_operations: usize,
    /// Cached payload bytes
    pub cache_size: u64,
    /// Last fully successful sync (Unix milliseconds)
    pub last_sync: Option<u64>,
}
