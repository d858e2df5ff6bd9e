//! Sync Module
//!
//! Durable mutation queues with retry, backoff and dependency ordering.

mod http;
mod manager;
mod operation;
mod queue;

pub use http::{execute, HttpClient, HttpClients, HttpResponse, ReqwestHttpClient};
pub use manager::{SyncManager, SyncReport, QUEUE_PREFIX};
pub use operation::{
    HttpMethod, NewOperation, OperationStatus, Priority, QueueStats, SyncOperation, SyncResult,
};
pub use queue::{insert_ordered, queue_order, retry_delay_ms};
