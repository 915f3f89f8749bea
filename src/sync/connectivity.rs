use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, watch};

use super::events::SyncTrigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    Online,
    Offline,
    Syncing,
}

/// Process-wide connectivity state.
///
/// Tracks the platform's online/offline signal separately from the
/// tri-state shown to the UI, because a drain can be in progress
/// (`Syncing`) when the platform drops. Reconnecting sends
/// `SyncTrigger::Reconnected`; whether a drain then does anything is up to
/// the engine.
pub struct ConnectivityMonitor {
    state: watch::Sender<ConnectivityState>,
    platform_online: AtomicBool,
    trigger_tx: Option<mpsc::UnboundedSender<SyncTrigger>>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let initial = if online {
            ConnectivityState::Online
        } else {
            ConnectivityState::Offline
        };
        let (state, _) = watch::channel(initial);

        Self {
            state,
            platform_online: AtomicBool::new(online),
            trigger_tx: None,
        }
    }

    pub fn with_trigger(mut self, trigger_tx: mpsc::UnboundedSender<SyncTrigger>) -> Self {
        self.trigger_tx = Some(trigger_tx);
        self
    }

    pub fn current(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    pub fn is_platform_online(&self) -> bool {
        self.platform_online.load(Ordering::SeqCst)
    }

    /// Status signal for UI collaborators
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state.subscribe()
    }

    /// Feed the platform's online/offline signal
    pub fn set_platform_online(&self, online: bool) {
        let was_online = self.platform_online.swap(online, Ordering::SeqCst);

        if online {
            let reconnected = self.state.send_if_modified(|state| {
                if *state == ConnectivityState::Offline {
                    *state = ConnectivityState::Online;
                    true
                } else {
                    false
                }
            });

            if reconnected && !was_online {
                log::info!("Connectivity restored");
                if let Some(tx) = &self.trigger_tx {
                    if tx.send(SyncTrigger::Reconnected).is_err() {
                        log::debug!("Sync scheduler not running, reconnect trigger dropped");
                    }
                }
            }
        } else {
            let changed = self.state.send_if_modified(|state| {
                if *state != ConnectivityState::Offline {
                    *state = ConnectivityState::Offline;
                    true
                } else {
                    false
                }
            });
            if changed {
                log::info!("Connectivity lost");
            }
        }
    }

    /// `Online -> Syncing`. Returns false if the state was anything else.
    pub fn begin_sync(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ConnectivityState::Online {
                *state = ConnectivityState::Syncing;
                true
            } else {
                false
            }
        })
    }

    /// Leave `Syncing`: back to `Online`, or `Offline` if the platform
    /// dropped while the drain ran.
    pub fn finish_sync(&self) {
        self.state.send_if_modified(|state| {
            if *state == ConnectivityState::Syncing {
                *state = if self.is_platform_online() {
                    ConnectivityState::Online
                } else {
                    ConnectivityState::Offline
                };
                true
            } else {
                false
            }
        });
    }
}
