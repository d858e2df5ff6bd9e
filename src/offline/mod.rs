//! Offline Module
//!
//! Façade combining the cache and the sync queues behind one API that keeps
//! working without a network.

mod manager;
mod types;

pub use manager::{OfflineManager, Subscription};
pub use types::{
    DataOptions, NetworkStatus, OfflineDataResult, OfflineStatus, OperationOptions, Revalidation,
};
