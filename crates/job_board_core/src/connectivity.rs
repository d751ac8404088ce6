//! crates/job_board_core/src/connectivity.rs
//!
//! The connectivity monitor and the two pieces of UI state derived from it:
//! the connection banner and the per-view offline notice.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};

use crate::domain::FetchError;

/// How long the "back online" banner stays up after connectivity returns.
pub const DEFAULT_BANNER_LINGER: Duration = Duration::from_secs(3);

/// A platform-level reachability transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkEvent {
    Online,
    Offline,
}

//=========================================================================================
// ConnectivityMonitor
//=========================================================================================

/// Holds the single `online` boolean. Clones share the same state.
#[derive(Clone, Debug)]
pub struct ConnectivityMonitor {
    online: Arc<watch::Sender<bool>>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ConnectivityMonitor {
    /// Starts from the platform's current reachability, or online when unknown.
    pub fn new(initial: Option<bool>) -> Self {
        let (online, _) = watch::channel(initial.unwrap_or(true));
        Self {
            online: Arc::new(online),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Applies an event. Subscribers are only notified when the value flips.
    pub fn handle(&self, event: NetworkEvent) {
        let online = event == NetworkEvent::Online;
        let flipped = self.online.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if flipped {
            if online {
                info!("Connectivity restored");
            } else {
                warn!("Connectivity lost");
            }
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }
}

//=========================================================================================
// Connection banner
//=========================================================================================

/// What the connection banner shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BannerState {
    Hidden,
    /// "You're Offline", shown for as long as connectivity is lost.
    Offline,
    /// "Back Online", shown for the linger period after connectivity returns.
    BackOnline,
}

/// Drives [`BannerState`] from a connectivity receiver in a background task.
pub struct ConnectivityBanner {
    state: watch::Receiver<BannerState>,
    task: JoinHandle<()>,
}

impl ConnectivityBanner {
    pub fn spawn(mut online: watch::Receiver<bool>, linger: Duration) -> Self {
        let initial = if *online.borrow_and_update() {
            BannerState::Hidden
        } else {
            BannerState::Offline
        };
        let (tx, state) = watch::channel(initial);

        let task = tokio::spawn(async move {
            let mut hide_at: Option<Instant> = None;
            loop {
                tokio::select! {
                    changed = online.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let is_online = *online.borrow_and_update();
                        if !is_online {
                            hide_at = None;
                            tx.send_replace(BannerState::Offline);
                        } else if *tx.borrow() == BannerState::Offline {
                            hide_at = Some(Instant::now() + linger);
                            tx.send_replace(BannerState::BackOnline);
                        }
                    }
                    _ = wait_until(hide_at) => {
                        hide_at = None;
                        tx.send_replace(BannerState::Hidden);
                    }
                }
            }
        });

        Self { state, task }
    }

    pub fn state(&self) -> BannerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<BannerState> {
        self.state.clone()
    }
}

impl Drop for ConnectivityBanner {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

//=========================================================================================
// Offline notice
//=========================================================================================

/// The inline warning a view renders above its data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OfflineNotice {
    None,
    /// Connectivity is lost but the view's data did not fail.
    OfflineWarning { message: String },
    /// The view's last fetch failed because of connectivity. Offers a retry.
    DataUnavailable { message: String },
}

impl OfflineNotice {
    pub fn select(error: Option<&FetchError>, online: bool) -> Self {
        if let Some(error) = error {
            if error.is_offline_error || error.message.contains("offline") {
                let message = if error.message.is_empty() {
                    "Unable to fetch data while offline".to_string()
                } else {
                    error.message.clone()
                };
                return OfflineNotice::DataUnavailable { message };
            }
        }
        if !online {
            return OfflineNotice::OfflineWarning {
                message: "You are offline. Some features may be limited.".to_string(),
            };
        }
        OfflineNotice::None
    }
}
