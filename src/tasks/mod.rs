//! Background Tasks Module
//!
//! Contains background tasks that run periodically while the application is up.
//!
//! # Tasks
//! - Cache cleanup: sweeps stale cache entries at a configured interval
//! - Connectivity sync: replays queues when the device comes back online
//! - Interval sync: replays queues on a timer

mod cleanup;
mod sync;

pub use cleanup::spawn_cleanup_task;
pub use sync::{spawn_connectivity_sync, spawn_interval_sync};
