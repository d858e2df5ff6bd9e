//! Sync Trigger Tasks
//!
//! Background tasks that start a full sync when connectivity returns and on a
//! fixed interval, as a safety net for missed connectivity events.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::sync::SyncManager;

/// Spawns a task that syncs on every offline-to-online transition seen on `rx`.
///
/// The task ends when the connectivity source is dropped.
pub fn spawn_connectivity_sync(sync: SyncManager, mut rx: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut was_online = *rx.borrow_and_update();

        while rx.changed().await.is_ok() {
            let online = *rx.borrow_and_update();
            if online && !was_online {
                info!("Connectivity restored, starting sync");
                if let Err(e) = sync.sync_registered().await {
                    warn!("Sync after reconnect failed: {}", e);
                }
            } else if !online {
                debug!("Connectivity lost");
            }
            was_online = online;
        }

        debug!("Connectivity source closed, listener stopped");
    })
}

/// Spawns a task that attempts a sync every `interval`. The first attempt
/// happens one full interval after spawning.
pub fn spawn_interval_sync(sync: SyncManager, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Skip the immediate first tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            debug!("Periodic sync tick");
            if let Err(e) = sync.sync_registered().await {
                warn!("Periodic sync failed: {}", e);
            }
        }
    })
}
