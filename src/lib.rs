//! Route Cache - offline data layer for truck route logging clients
//!
//! Persistent TTL cache with per-bucket strategies and a durable mutation
//! queue that replays writes when connectivity returns.

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod offline;
pub mod storage;
pub mod sync;
pub mod tasks;

pub use cache::{CacheLookup, CacheManager};
pub use config::{CacheStrategy, CacheStrategyConfig, Config, SyncPolicy};
pub use connectivity::{ConnectivitySource, ManualConnectivity};
pub use error::{OfflineError, Result};
pub use offline::{DataOptions, OfflineDataResult, OfflineManager, OperationOptions};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use sync::{HttpClients, HttpMethod, Priority, SyncManager};
pub use tasks::spawn_cleanup_task;
