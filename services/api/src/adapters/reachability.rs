//! services/api/src/adapters/reachability.rs
//!
//! Turns periodic store probes into online/offline events for the connectivity monitor.

use job_board_core::connectivity::{ConnectivityMonitor, NetworkEvent};
use job_board_core::ports::DocumentStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Probes `store` every `every` until `shutdown` is cancelled. The first probe runs
/// immediately.
pub fn spawn_probe(
    store: Arc<dyn DocumentStore>,
    monitor: ConnectivityMonitor,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Reachability probe stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let event = match store.probe().await {
                        Ok(()) => NetworkEvent::Online,
                        Err(e) => {
                            if monitor.is_online() {
                                warn!("Document store probe failed: {}", e);
                            }
                            NetworkEvent::Offline
                        }
                    };
                    monitor.handle(event);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use job_board_core::memory::InMemoryDocumentStore;
    use job_board_core::ports::PortError;

    #[tokio::test(start_paused = true)]
    async fn probe_failures_flip_the_monitor() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let monitor = ConnectivityMonitor::new(Some(true));
        let mut online = monitor.subscribe();
        let shutdown = CancellationToken::new();
        let probe = spawn_probe(
            store.clone(),
            monitor.clone(),
            Duration::from_secs(5),
            shutdown.clone(),
        );

        store.fail_with(PortError::store("unavailable", "down")).await;
        online.wait_for(|v| !*v).await.unwrap();

        store.clear_failure().await;
        online.wait_for(|v| *v).await.unwrap();

        shutdown.cancel();
        probe.await.unwrap();
    }
}
