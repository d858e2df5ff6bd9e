//! Route Cache - offline data layer daemon
//!
//! Opens the persistent store, replays queued mutations against the remote
//! API and sweeps stale cache entries until shut down.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use route_cache::connectivity::ManualConnectivity;
use route_cache::storage::FileStore;
use route_cache::sync::{HttpClients, ReqwestHttpClient};
use route_cache::tasks::spawn_cleanup_task;
use route_cache::{Config, OfflineManager};

/// Main entry point.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the file-backed store
/// 4. Build the HTTP client and the offline manager
/// 5. Start background cache cleanup and replay anything left queued
/// 6. Wait for SIGINT/SIGTERM and stop background work
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "route_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting route cache");

    let config = Config::from_env();
    info!(
        "Configuration loaded: version={}, api={}, storage={}, cleanup_interval={}s",
        config.cache_version,
        config.api_base_url,
        config.storage_dir.display(),
        config.cleanup_interval
    );

    let store = FileStore::open(&config.storage_dir)
        .await
        .with_context(|| format!("opening store at {}", config.storage_dir.display()))?;

    let client = ReqwestHttpClient::new(config.api_base_url.clone(), config.network_timeout())
        .context("building HTTP client")?;
    let clients = HttpClients::shared(Arc::new(client));

    let cleanup_interval = config.cleanup_interval;
    let connectivity = Arc::new(ManualConnectivity::new(true));
    let manager = OfflineManager::new(config, Arc::new(store), connectivity, clients.clone());

    let cleanup_handle = spawn_cleanup_task(manager.cache().clone(), cleanup_interval);
    info!("Background cleanup task started");

    let status = manager.offline_status().await;
    info!(
        "Cache holds {} bytes, {} operations pending",
        status.cache_size, status.pending_operations
    );
    if status.pending_operations > 0 && !manager.sync_pending_data(&clients).await {
        warn!("Startup sync left operations queued");
    }

    shutdown_signal().await?;

    cleanup_handle.abort();
    manager.destroy();
    info!("Shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("installing SIGTERM handler")?;
        tokio::select! {
            result = ctrl_c => {
                result.context("installing Ctrl+C handler")?;
                info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, initiating shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.context("installing Ctrl+C handler")?;
        info!("Received Ctrl+C, initiating shutdown...");
    }

    Ok(())
}
