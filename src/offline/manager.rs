//! Offline Manager Module
//!
//! Single entry point for reads and writes. Reads pick cache or network per
//! bucket strategy and always resolve to the best available data; writes are
//! queued for durable delivery.

use std::fmt::Display;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheLookup, CacheManager};
use crate::config::{CacheStrategy, CacheStrategyConfig, Config};
use crate::connectivity::ConnectivitySource;
use crate::error::Result;
use crate::offline::{
    DataOptions, NetworkStatus, OfflineDataResult, OfflineStatus, OperationOptions, Revalidation,
};
use crate::storage::KeyValueStore;
use crate::sync::{HttpClients, HttpMethod, NewOperation, SyncManager};

type Listener = Arc<dyn Fn(NetworkStatus) + Send + Sync>;

// == Listener Registry ==
#[derive(Default)]
struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener)>>,
}

impl ListenerRegistry {
    fn add(&self, listener: Listener) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, listener));
        id
    }

    fn remove(&self, id: u64) {
        self.listeners.lock().retain(|(existing, _)| *existing != id);
    }

    /// Calls every listener; a panicking listener does not stop the others.
    fn notify(&self, status: NetworkStatus) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(status))).is_err() {
                warn!("Network listener panicked; continuing with the rest");
            }
        }
    }
}

// == Subscription ==
/// Returned by `add_network_listener`.
pub struct Subscription {
    id: u64,
    registry: Weak<ListenerRegistry>,
}

impl Subscription {
    /// Stops delivering notifications to the listener.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

// == Offline Manager ==
pub struct OfflineManager {
    config: Arc<Config>,
    cache: Arc<CacheManager>,
    sync: SyncManager,
    connectivity: Arc<dyn ConnectivitySource>,
    offline_mode: Arc<AtomicBool>,
    listeners: Arc<ListenerRegistry>,
    listener_task: Mutex<Option<JoinHandle<()>>>,
}

impl OfflineManager {
    // == Constructor ==
    /// Wires the cache and the sync manager over one store and starts
    /// forwarding connectivity changes to network listeners.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Arguments
    /// * `config` - Bucket strategies, sync policy and timings
    /// * `store` - Persistent store shared by cache and queues
    /// * `connectivity` - Online/offline source
    /// * `clients` - HTTP clients used by background syncs
    pub fn new(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        connectivity: Arc<dyn ConnectivitySource>,
        clients: HttpClients,
    ) -> Self {
        let config = Arc::new(config);
        let cache = Arc::new(CacheManager::new(store.clone(), config.cache_version.clone()));
        let sync = SyncManager::new(
            store,
            connectivity.clone(),
            config.sync.clone(),
            clients,
        );

        let manager = Self {
            config,
            cache,
            sync,
            connectivity,
            offline_mode: Arc::new(AtomicBool::new(false)),
            listeners: Arc::new(ListenerRegistry::default()),
            listener_task: Mutex::new(None),
        };
        let task = manager.spawn_status_forwarder();
        *manager.listener_task.lock() = Some(task);
        manager
    }

    fn spawn_status_forwarder(&self) -> JoinHandle<()> {
        let mut rx = self.connectivity.subscribe();
        let listeners = self.listeners.clone();
        let offline_mode = self.offline_mode.clone();

        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let status = NetworkStatus {
                    is_connected: *rx.borrow_and_update(),
                    is_offline_mode: offline_mode.load(Ordering::Acquire),
                };
                debug!("Network status changed: {:?}", status);
                listeners.notify(status);
            }
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn sync_manager(&self) -> &SyncManager {
        &self.sync
    }

    fn network_status(&self) -> NetworkStatus {
        NetworkStatus {
            is_connected: self.connectivity.is_online(),
            is_offline_mode: self.offline_mode.load(Ordering::Acquire),
        }
    }

    /// True when connected and not in manual offline mode.
    pub fn is_online(&self) -> bool {
        self.network_status().is_online()
    }

    // == Get Data ==
    /// Resolves `key` using the bucket's strategy (or `options.strategy`).
    ///
    /// Never fails: network errors fall back to cache and are reported in
    /// `error`. When forced offline or disconnected only the cache is read.
    ///
    /// # Arguments
    /// * `key` - Logical cache key
    /// * `fetcher` - Loads fresh data from the network; may be called several
    ///   times (network-first) or in a background task (stale-while-revalidate)
    /// * `options` - Per-read overrides
    pub async fn get_data<T, F, Fut, E>(
        &self,
        key: &str,
        fetcher: F,
        options: DataOptions,
    ) -> OfflineDataResult<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let bucket = self.config.strategy_for(key).clone();
        let strategy = options.strategy.unwrap_or(bucket.strategy);
        let config = CacheStrategyConfig {
            ttl: options.ttl.unwrap_or(bucket.ttl),
            ..bucket
        };

        if options.force_offline || !self.is_online() {
            debug!("Reading '{}' from cache only (offline)", key);
            return self.cache_only(key).await;
        }

        match strategy {
            CacheStrategy::CacheFirst => self.cache_first(key, &fetcher, &config).await,
            CacheStrategy::NetworkFirst => {
                let attempts = options.max_retries.unwrap_or(self.config.sync.max_retries);
                self.network_first(key, &fetcher, &config, attempts).await
            }
            CacheStrategy::StaleWhileRevalidate => {
                self.stale_while_revalidate(key, fetcher, config).await
            }
        }
    }

    async fn cache_only<T: DeserializeOwned>(&self, key: &str) -> OfflineDataResult<T> {
        match self.cache.get::<T>(key).await {
            CacheLookup::Hit { data, is_stale, .. } => OfflineDataResult::from_cache(data, is_stale),
            CacheLookup::Miss(_) => {
                OfflineDataResult::empty().with_error("No cached data available offline")
            }
        }
    }

    async fn cache_first<T, F, Fut, E>(
        &self,
        key: &str,
        fetcher: &F,
        config: &CacheStrategyConfig,
    ) -> OfflineDataResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        let cached = self.cache.get::<T>(key).await;
        if let CacheLookup::Hit {
            data,
            is_stale: false,
            ..
        } = cached
        {
            return OfflineDataResult::from_cache(data, false);
        }

        match fetcher().await {
            Ok(data) => {
                self.store_fetched(key, &data, config).await;
                OfflineDataResult::from_network(data)
            }
            Err(e) => {
                warn!("Fetch for '{}' failed, falling back to cache: {}", key, e);
                Self::fallback(cached, e.to_string())
            }
        }
    }

    async fn network_first<T, F, Fut, E>(
        &self,
        key: &str,
        fetcher: &F,
        config: &CacheStrategyConfig,
        attempts: u32,
    ) -> OfflineDataResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        let attempts = attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match fetcher().await {
                Ok(data) => {
                    self.store_fetched(key, &data, config).await;
                    return OfflineDataResult::from_network(data);
                }
                Err(e) => {
                    debug!("Fetch attempt {}/{} for '{}' failed: {}", attempt, attempts, key, e);
                    last_error = e.to_string();
                    if attempt < attempts {
                        let delay = self.config.fetch_retry_delay_ms * u64::from(attempt);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        }

        warn!(
            "All {} fetch attempts for '{}' failed, falling back to cache",
            attempts, key
        );
        Self::fallback(self.cache.get::<T>(key).await, last_error)
    }

    async fn stale_while_revalidate<T, F, Fut, E>(
        &self,
        key: &str,
        fetcher: F,
        config: CacheStrategyConfig,
    ) -> OfflineDataResult<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let result = match self.cache.get::<T>(key).await {
            CacheLookup::Hit {
                data,
                is_stale: false,
                ..
            } => return OfflineDataResult::from_cache(data, false),
            CacheLookup::Hit { data, .. } => OfflineDataResult::from_cache(data, true),
            CacheLookup::Miss(_) => OfflineDataResult::empty(),
        };

        let cache = self.cache.clone();
        let key = key.to_string();
        let handle = tokio::spawn(async move {
            match fetcher().await {
                Ok(data) => match cache.set(&key, &data, &config).await {
                    Ok(()) => {
                        debug!("Revalidated '{}'", key);
                        true
                    }
                    Err(e) => {
                        warn!("Storing revalidated '{}' failed: {}", key, e);
                        false
                    }
                },
                Err(e) => {
                    warn!("Background revalidation of '{}' failed: {}", key, e);
                    false
                }
            }
        });

        result.with_revalidation(Revalidation::new(handle))
    }

    fn fallback<T>(cached: CacheLookup<T>, error: String) -> OfflineDataResult<T> {
        match cached {
            CacheLookup::Hit { data, is_stale, .. } => {
                OfflineDataResult::from_cache(data, is_stale).with_error(error)
            }
            CacheLookup::Miss(_) => OfflineDataResult::empty().with_error(error),
        }
    }

    /// Caches freshly fetched data; a failed write only costs the next read a fetch.
    async fn store_fetched<T: Serialize>(&self, key: &str, data: &T, config: &CacheStrategyConfig) {
        if let Err(e) = self.cache.set(key, data, config).await {
            warn!("Caching fetched '{}' failed: {}", key, e);
        }
    }

    // == Save Data ==
    /// Writes `data` straight into the cache, bypassing strategies.
    pub async fn save_data<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
        ttl_override: Option<u64>,
    ) -> Result<()> {
        let bucket = self.config.strategy_for(key);
        let config = CacheStrategyConfig {
            ttl: ttl_override.unwrap_or(bucket.ttl),
            ..bucket.clone()
        };
        self.cache.set(key, data, &config).await
    }

    // == Add Offline Operation ==
    /// Queues a mutation for delivery and returns its id.
    ///
    /// Fails only if the operation could not be persisted locally.
    pub async fn add_offline_operation(
        &self,
        operation_type: &str,
        method: HttpMethod,
        endpoint: &str,
        data: Value,
        options: OperationOptions,
    ) -> Result<String> {
        let policy = &self.config.sync;
        let queue = options
            .queue
            .unwrap_or_else(|| policy.default_queue.clone());
        let operation = NewOperation::new(operation_type, method, endpoint, data)
            .with_priority(options.priority.unwrap_or_default())
            .with_max_retries(options.max_retries.unwrap_or(policy.max_retries))
            .with_dependencies(options.dependencies);

        self.sync.add_to_queue(&queue, operation).await
    }

    // == Sync Pending Data ==
    /// Runs a full sync. Returns true only if every queued operation was
    /// delivered; in that case stale cache entries are swept afterwards.
    pub async fn sync_pending_data(&self, clients: &HttpClients) -> bool {
        if !self.is_online() {
            debug!("Offline, not syncing pending data");
            return false;
        }

        let report = match self.sync.sync_all(clients).await {
            Ok(report) => report,
            Err(e) => {
                warn!("Sync failed: {}", e);
                return false;
            }
        };

        let all_delivered = report.values().flatten().all(|result| result.success);
        let remaining = self.sync.has_pending_operations().await.unwrap_or(true);
        if !all_delivered || remaining {
            return false;
        }

        match self.cache.cleanup().await {
            Ok(removed) => debug!("Post-sync cleanup removed {} cache entries", removed),
            Err(e) => warn!("Post-sync cleanup failed: {}", e),
        }
        true
    }

    // == Clear Cache ==
    /// Removes entries matching `pattern`, or the whole cache.
    pub async fn clear_cache(&self, pattern: Option<&str>) -> Result<()> {
        match pattern {
            Some(pattern) => self.cache.invalidate(pattern).await.map(|_| ()),
            None => self.cache.clear().await,
        }
    }

    // == Offline Status ==
    pub async fn offline_status(&self) -> OfflineStatus {
        let status = self.network_status();
        let pending_operations = self.sync.pending_operation_count().await.unwrap_or_else(|e| {
            warn!("Unable to count pending operations: {}", e);
            0
        });

        OfflineStatus {
            is_online: status.is_connected,
            is_offline_mode: status.is_offline_mode,
            pending_operations,
            cache_size: self.cache.total_size().await,
            last_sync: self.sync.last_successful_sync().await,
        }
    }

    // == Offline Mode ==
    /// Toggles manual offline mode and notifies listeners. Leaving offline
    /// mode while connected starts a background sync.
    pub fn set_offline_mode(&self, enabled: bool) {
        let previous = self.offline_mode.swap(enabled, Ordering::AcqRel);
        info!("Offline mode {}", if enabled { "enabled" } else { "disabled" });

        let status = self.network_status();
        self.listeners.notify(status);

        if previous && !enabled && status.is_online() {
            self.sync.trigger_sync();
        }
    }

    pub fn is_offline_mode(&self) -> bool {
        self.offline_mode.load(Ordering::Acquire)
    }

    // == Network Listeners ==
    /// Registers `listener` for connectivity changes and mode toggles.
    pub fn add_network_listener<L>(&self, listener: L) -> Subscription
    where
        L: Fn(NetworkStatus) + Send + Sync + 'static,
    {
        let id = self.listeners.add(Arc::new(listener));
        Subscription {
            id,
            registry: Arc::downgrade(&self.listeners),
        }
    }

    // == Cleanup ==
    /// Sweeps stale cache entries. Returns the number removed.
    pub async fn cleanup(&self) -> Result<usize> {
        self.cache.cleanup().await
    }

    // == Destroy ==
    /// Stops every background task owned by the manager.
    pub fn destroy(&self) {
        if let Some(task) = self.listener_task.lock().take() {
            task.abort();
        }
        self.sync.destroy();
    }
}
