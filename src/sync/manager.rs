//! Sync Manager Module
//!
//! Named, persisted priority queues of pending mutations, replayed through an
//! injected HTTP client once connectivity allows. Delivery is at-least-once:
//! an operation leaves its queue only after the server accepted it or an
//! operator cleared it.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::current_timestamp_ms;
use crate::config::SyncPolicy;
use crate::connectivity::ConnectivitySource;
use crate::error::Result;
use crate::storage::KeyValueStore;
use crate::sync::http::{execute, HttpClient, HttpClients};
use crate::sync::queue::{insert_ordered, record_failure};
use crate::sync::{NewOperation, OperationStatus, QueueStats, SyncOperation, SyncResult};
use crate::tasks::{spawn_connectivity_sync, spawn_interval_sync};

/// Prefix of the store keys holding queues.
pub const QUEUE_PREFIX: &str = "sync_queue_";

const METADATA_KEY: &str = "sync_metadata";

/// Results of one full sync, per queue.
pub type SyncReport = HashMap<String, Vec<SyncResult>>;

// == Sync Metadata ==
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncMetadata {
    last_sync_attempt: Option<u64>,
    last_successful_sync: Option<u64>,
}

/// Per-queue locks. `write` serializes read-modify-write of the persisted
/// array; `process` serializes replay so one queue is never sent twice at once.
#[derive(Default)]
struct QueueLocks {
    write: tokio::sync::Mutex<()>,
    process: tokio::sync::Mutex<()>,
}

struct SyncInner {
    store: Arc<dyn KeyValueStore>,
    connectivity: Arc<dyn ConnectivitySource>,
    policy: SyncPolicy,
    clients: RwLock<HttpClients>,
    locks: Mutex<HashMap<String, Arc<QueueLocks>>>,
    sync_in_progress: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Clears the in-flight flag when a full sync ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// == Sync Manager ==
/// Cloneable handle; clones share queues, locks and background tasks.
#[derive(Clone)]
pub struct SyncManager {
    inner: Arc<SyncInner>,
}

impl SyncManager {
    // == Constructor ==
    /// Creates a manager and starts its background triggers: a sync on every
    /// offline-to-online transition, and a periodic sync every
    /// `policy.background_interval_ms` (disabled when zero).
    ///
    /// Must be called inside a Tokio runtime. Call [`SyncManager::destroy`]
    /// to stop the background tasks.
    ///
    /// # Arguments
    /// * `store` - Persistent store holding the queues
    /// * `connectivity` - Online/offline source
    /// * `policy` - Retry, batching and timer settings
    /// * `clients` - Clients used by background and opportunistic syncs
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        connectivity: Arc<dyn ConnectivitySource>,
        policy: SyncPolicy,
        clients: HttpClients,
    ) -> Self {
        let manager = Self {
            inner: Arc::new(SyncInner {
                store,
                connectivity,
                policy,
                clients: RwLock::new(clients),
                locks: Mutex::new(HashMap::new()),
                sync_in_progress: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
            }),
        };
        manager.start_background();
        manager
    }

    fn start_background(&self) {
        let mut tasks = self.inner.tasks.lock();

        let rx = self.inner.connectivity.subscribe();
        tasks.push(spawn_connectivity_sync(self.clone(), rx));

        if self.inner.policy.background_interval_ms > 0 {
            tasks.push(spawn_interval_sync(
                self.clone(),
                self.inner.policy.background_interval(),
            ));
        }
    }

    // == Destroy ==
    /// Stops the connectivity listener and the periodic timer.
    pub fn destroy(&self) {
        let tasks: Vec<JoinHandle<()>> = self.inner.tasks.lock().drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        debug!("Stopped {} sync background tasks", tasks.len());
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.inner.policy
    }

    pub fn is_online(&self) -> bool {
        self.inner.connectivity.is_online()
    }

    pub fn is_sync_in_progress(&self) -> bool {
        self.inner.sync_in_progress.load(Ordering::Acquire)
    }

    /// Registers the client background syncs use for `queue`.
    pub fn register_client(&self, queue: impl Into<String>, client: Arc<dyn HttpClient>) {
        self.inner.clients.write().insert(queue, client);
    }

    /// Replaces every registered client.
    pub fn set_clients(&self, clients: HttpClients) {
        *self.inner.clients.write() = clients;
    }

    // == Queue Persistence ==
    fn queue_key(queue: &str) -> String {
        format!("{}{}", QUEUE_PREFIX, queue)
    }

    fn queue_locks(&self, queue: &str) -> Arc<QueueLocks> {
        self.inner
            .locks
            .lock()
            .entry(queue.to_string())
            .or_default()
            .clone()
    }

    async fn load_queue(&self, queue: &str) -> Result<Vec<SyncOperation>> {
        match self.inner.store.get(&Self::queue_key(queue)).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save_queue(&self, queue: &str, operations: &[SyncOperation]) -> Result<()> {
        let key = Self::queue_key(queue);
        if operations.is_empty() {
            self.inner.store.remove(&key).await
        } else {
            self.inner
                .store
                .set(&key, serde_json::to_string(operations)?)
                .await
        }
    }

    async fn load_metadata(&self) -> SyncMetadata {
        match self.inner.store.get(METADATA_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
            Ok(None) => SyncMetadata::default(),
            Err(e) => {
                warn!("Unable to read sync metadata: {}", e);
                SyncMetadata::default()
            }
        }
    }

    // == Add To Queue ==
    /// Persists a new operation in `queue` and returns its id.
    ///
    /// Persistence failures propagate. On success a sync attempt is started in
    /// the background; the caller does not wait for it.
    pub async fn add_to_queue(&self, queue: &str, operation: NewOperation) -> Result<String> {
        let operation = SyncOperation::from_new(operation);
        let id = operation.id.clone();
        let summary = format!("{} {}", operation.method, operation.endpoint);

        {
            let locks = self.queue_locks(queue);
            let _write = locks.write.lock().await;
            let mut operations = self.load_queue(queue).await?;
            insert_ordered(&mut operations, operation);
            self.save_queue(queue, &operations).await?;
        }

        info!("Queued {} in '{}' as {}", summary, queue, id);
        self.trigger_sync();
        Ok(id)
    }

    /// Starts a fire-and-forget sync with the registered clients.
    pub fn trigger_sync(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.sync_registered().await {
                warn!("Opportunistic sync failed: {}", e);
            }
        });
    }

    // == Process Queue ==
    /// Replays every due operation of `queue` through `client`.
    ///
    /// Operations run in queue order, `batch_size` at a time. An operation
    /// whose dependency has neither succeeded in this call nor already left
    /// every queue is deferred; deferred operations are retried in further
    /// passes as long as the previous pass produced a success. Successful
    /// operations are removed; failed ones are rescheduled with exponential
    /// backoff or marked failed once `max_retries` attempts are used.
    pub async fn process_queue(
        &self,
        queue: &str,
        client: &dyn HttpClient,
    ) -> Result<Vec<SyncResult>> {
        let locks = self.queue_locks(queue);
        let _processing = locks.process.lock().await;

        let snapshot = {
            let _write = locks.write.lock().await;
            self.load_queue(queue).await?
        };

        let now = current_timestamp_ms();
        let mut remaining: Vec<SyncOperation> =
            snapshot.into_iter().filter(|op| op.is_due(now)).collect();
        if remaining.is_empty() {
            return Ok(Vec::new());
        }

        let queued = self.queued_operation_ids().await?;
        let batch_size = self.inner.policy.batch_size.max(1);
        let mut succeeded: HashSet<String> = HashSet::new();
        let mut attempted: HashMap<String, SyncOperation> = HashMap::new();
        let mut results = Vec::new();

        loop {
            let (ready, deferred): (Vec<SyncOperation>, Vec<SyncOperation>) =
                remaining.into_iter().partition(|op| {
                    op.dependencies
                        .iter()
                        .all(|dep| succeeded.contains(dep) || !queued.contains(dep))
                });
            remaining = deferred;

            if ready.is_empty() {
                break;
            }

            let mut progressed = false;
            for batch in ready.chunks(batch_size) {
                let outcomes = join_all(
                    batch
                        .iter()
                        .map(|op| execute(client, op.method, &op.endpoint, &op.data)),
                )
                .await;

                for (op, outcome) in batch.iter().zip(outcomes) {
                    match outcome {
                        Ok(response) => {
                            debug!("Synced {} {} ({})", op.method, op.endpoint, op.id);
                            succeeded.insert(op.id.clone());
                            results.push(SyncResult::success(&op.id, response.data));
                            progressed = true;
                        }
                        Err(e) => {
                            let mut failed = op.clone();
                            record_failure(
                                &mut failed,
                                e.to_string(),
                                &self.inner.policy,
                                current_timestamp_ms(),
                            );
                            if failed.status == OperationStatus::Failed {
                                warn!(
                                    "Operation {} gave up after {} attempts: {}",
                                    op.id, failed.retry_count, e
                                );
                            } else {
                                warn!(
                                    "Operation {} failed (attempt {}), retrying later: {}",
                                    op.id, failed.retry_count, e
                                );
                            }
                            results.push(SyncResult::failure(&op.id, e.to_string()));
                            attempted.insert(op.id.clone(), failed);
                        }
                    }
                }
            }

            if !progressed || remaining.is_empty() {
                break;
            }
        }

        if !remaining.is_empty() {
            debug!(
                "{} operations in '{}' deferred on unmet dependencies",
                remaining.len(),
                queue
            );
        }

        // Merge with the current persisted queue so concurrent adds survive
        {
            let _write = locks.write.lock().await;
            let current = self.load_queue(queue).await?;
            let merged: Vec<SyncOperation> = current
                .into_iter()
                .filter(|op| !succeeded.contains(&op.id))
                .map(|op| attempted.remove(&op.id).unwrap_or(op))
                .collect();
            self.save_queue(queue, &merged).await?;
        }

        Ok(results)
    }

    async fn queued_operation_ids(&self) -> Result<HashSet<String>> {
        let mut ids = HashSet::new();
        for queue in self.queue_names().await? {
            ids.extend(self.load_queue(&queue).await?.into_iter().map(|op| op.id));
        }
        Ok(ids)
    }

    // == Sync All ==
    /// Processes every queue with its client from `clients`.
    ///
    /// Returns an empty report when offline or when another full sync is
    /// already running. Queues without a client are skipped; a failing queue
    /// does not stop the others. The attempt time is always recorded; the
    /// success time only when every operation went through and no queue
    /// still holds anything.
    pub async fn sync_all(&self, clients: &HttpClients) -> Result<SyncReport> {
        if self
            .inner
            .sync_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sync already in progress, skipping");
            return Ok(SyncReport::new());
        }
        let _guard = InFlightGuard(&self.inner.sync_in_progress);

        if !self.is_online() {
            debug!("Offline, skipping sync");
            return Ok(SyncReport::new());
        }

        let mut report = SyncReport::new();
        let mut all_succeeded = true;

        for queue in self.queue_names().await? {
            let Some(client) = clients.for_queue(&queue) else {
                warn!("No HTTP client for queue '{}', skipping", queue);
                all_succeeded = false;
                continue;
            };

            match self.process_queue(&queue, client.as_ref()).await {
                Ok(results) => {
                    all_succeeded &= results.iter().all(|r| r.success);
                    report.insert(queue, results);
                }
                Err(e) => {
                    warn!("Processing queue '{}' failed: {}", queue, e);
                    all_succeeded = false;
                }
            }
        }

        let now = current_timestamp_ms();
        let remaining = self.has_pending_operations().await.unwrap_or(true);
        let mut metadata = self.load_metadata().await;
        metadata.last_sync_attempt = Some(now);
        if all_succeeded && !remaining {
            metadata.last_successful_sync = Some(now);
        }
        match serde_json::to_string(&metadata) {
            Ok(raw) => {
                if let Err(e) = self.inner.store.set(METADATA_KEY, raw).await {
                    warn!("Unable to persist sync metadata: {}", e);
                }
            }
            Err(e) => warn!("Unable to encode sync metadata: {}", e),
        }

        let synced: usize = report
            .values()
            .map(|results| results.iter().filter(|r| r.success).count())
            .sum();
        info!(
            "Sync finished: {} operations delivered across {} queues",
            synced,
            report.len()
        );

        Ok(report)
    }

    /// Full sync with the registered clients. Does nothing when no client
    /// has been registered.
    pub async fn sync_registered(&self) -> Result<SyncReport> {
        let clients = self.inner.clients.read().clone();
        if clients.is_empty() {
            return Ok(SyncReport::new());
        }
        self.sync_all(&clients).await
    }

    // == Queue Stats ==
    pub async fn queue_stats(&self, queue: &str) -> Result<QueueStats> {
        let operations = self.load_queue(queue).await?;
        let metadata = self.load_metadata().await;
        let failed = operations.iter().filter(|op| op.is_failed()).count();

        Ok(QueueStats {
            total_operations: operations.len(),
            pending_operations: operations.len() - failed,
            failed_operations: failed,
            last_sync_attempt: metadata.last_sync_attempt,
            last_successful_sync: metadata.last_successful_sync,
        })
    }

    /// Snapshot of the operations in `queue`, in queue order.
    pub async fn operations(&self, queue: &str) -> Result<Vec<SyncOperation>> {
        self.load_queue(queue).await
    }

    /// Names of every persisted queue, sorted.
    pub async fn queue_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .inner
            .store
            .list_keys()
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(QUEUE_PREFIX).map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    // == Clear ==
    pub async fn clear_queue(&self, queue: &str) -> Result<()> {
        let locks = self.queue_locks(queue);
        let _write = locks.write.lock().await;
        self.inner.store.remove(&Self::queue_key(queue)).await?;
        info!("Cleared queue '{}'", queue);
        Ok(())
    }

    pub async fn clear_all_queues(&self) -> Result<()> {
        for queue in self.queue_names().await? {
            self.clear_queue(&queue).await?;
        }
        Ok(())
    }

    // == Retry Failed ==
    /// Returns failed operations of `queue` to pending with a fresh retry
    /// budget. Returns how many were reset.
    pub async fn retry_failed(&self, queue: &str) -> Result<usize> {
        let reset = {
            let locks = self.queue_locks(queue);
            let _write = locks.write.lock().await;
            let mut operations = self.load_queue(queue).await?;

            let mut reset = 0;
            for op in operations.iter_mut().filter(|op| op.is_failed()) {
                op.status = OperationStatus::Pending;
                op.retry_count = 0;
                op.next_attempt_at = 0;
                reset += 1;
            }
            if reset > 0 {
                self.save_queue(queue, &operations).await?;
            }
            reset
        };

        if reset > 0 {
            info!("Reset {} failed operations in '{}'", reset, queue);
            self.trigger_sync();
        }
        Ok(reset)
    }

    // == Pending ==
    /// True if any queue holds an operation, failed ones included.
    pub async fn has_pending_operations(&self) -> Result<bool> {
        for queue in self.queue_names().await? {
            if !self.load_queue(&queue).await?.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Operations across all queues that are still awaiting delivery.
    pub async fn pending_operation_count(&self) -> Result<usize> {
        let mut count = 0;
        for queue in self.queue_names().await? {
            count += self
                .load_queue(&queue)
                .await?
                .iter()
                .filter(|op| !op.is_failed())
                .count();
        }
        Ok(count)
    }

    pub async fn last_successful_sync(&self) -> Option<u64> {
        self.load_metadata().await.last_successful_sync
    }

    pub async fn last_sync_attempt(&self) -> Option<u64> {
        self.load_metadata().await.last_sync_attempt
    }
}
