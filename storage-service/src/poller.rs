// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;
use std::time::Duration;

use storage_contracts::TopologyStore;
use storage_types::NodeId;

use crate::coordinator::SyncCoordinator;
use crate::error::Result;
use crate::reconcile::SyncReport;

/// Collect this host's topology and reconcile it once.
pub async fn poll_once<S: TopologyStore + ?Sized + 'static>(
    coordinator: &SyncCoordinator<S>,
    node_id: NodeId,
    collect_disks: bool,
) -> Result<SyncReport> {
    let observation = tokio::task::spawn_blocking(move || {
        storage_sys::collect_observation(node_id, collect_disks)
    })
    .await??;

    coordinator.sync(observation).await
}

/// Resolves on ctrl-c, or at once if the handler cannot be installed.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Received shutdown signal");
}

/// Poll until `shutdown` resolves. A failed cycle is logged and retried on
/// the next tick; the previous snapshot stays in place meanwhile.
///
/// `shutdown` is polled across every cycle, so a signal that arrives while a
/// cycle is running ends the loop once that cycle finishes.
pub async fn run_poll_loop<S: TopologyStore + ?Sized + 'static>(
    coordinator: Arc<SyncCoordinator<S>>,
    node_id: NodeId,
    interval: Duration,
    collect_disks: bool,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    tracing::info!(
        "Polling topology of {} every {}s",
        node_id,
        interval.as_secs()
    );

    loop {
        tokio::select! {
            () = &mut shutdown => return Ok(()),
            _ = ticker.tick() => {
                match poll_once(&coordinator, node_id.clone(), collect_disks).await {
                    Ok(report) => tracing::debug!("Cycle finished: {report:?}"),
                    Err(e) => tracing::error!("Sync cycle for {} failed: {}", node_id, e),
                }
            }
        }
    }
}
