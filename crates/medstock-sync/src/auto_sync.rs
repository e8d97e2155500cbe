//! # Reconnect Trigger
//!
//! Background task that drains the queue whenever the network comes back.
//!
//! ```text
//!   ConnectivityObserver ── watch ──► AutoSync loop ── regained? ──► sync_pending_changes()
//!                                        ▲
//!                       AutoSyncHandle ──┘ shutdown
//! ```
//!
//! Opt-in: nothing in the orchestrator retries on its own.

use std::sync::Arc;

use medstock_core::NetworkStatus;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::connectivity::ConnectivityObserver;
use crate::error::{SyncError, SyncResult};
use crate::orchestrator::SyncOrchestrator;

/// Watches connectivity and syncs on every disconnected → connected edge.
pub struct AutoSync {
    orchestrator: SyncOrchestrator,
    status_rx: watch::Receiver<NetworkStatus>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling a spawned [`AutoSync`] task.
pub struct AutoSyncHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
    /// Set when `spawn` started the observer; shutdown stops it again.
    owned_observer: Option<Arc<ConnectivityObserver>>,
}

impl AutoSyncHandle {
    /// Stops the task and waits for it to finish.
    ///
    /// An attempt already in flight completes first. Connectivity monitoring
    /// started by [`AutoSync::spawn`] is stopped too; monitoring the host
    /// had already started keeps running.
    pub async fn shutdown(self) -> SyncResult<()> {
        let sent = self.shutdown_tx.send(()).await;
        if let Some(observer) = &self.owned_observer {
            observer.stop();
        }
        sent.map_err(|_| SyncError::ChannelError("Shutdown channel closed".into()))?;
        self.task.await?;
        Ok(())
    }

    /// Returns true once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl AutoSync {
    /// Creates the trigger loop and the sender that stops it.
    ///
    /// The connectivity subscription is taken here, so an edge published
    /// before `run` is first polled is still seen.
    pub fn new(orchestrator: SyncOrchestrator) -> (Self, mpsc::Sender<()>) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let status_rx = orchestrator.observer().subscribe();
        (
            AutoSync {
                orchestrator,
                status_rx,
                shutdown_rx,
            },
            shutdown_tx,
        )
    }

    /// Starts connectivity monitoring and spawns the trigger loop.
    ///
    /// Returns `None` when `auto_sync_on_reconnect` is turned off.
    pub fn spawn(orchestrator: SyncOrchestrator) -> Option<AutoSyncHandle> {
        if !orchestrator.settings().auto_sync_on_reconnect {
            debug!("Auto sync on reconnect disabled");
            return None;
        }

        let observer = orchestrator.observer().clone();
        let (auto_sync, shutdown_tx) = AutoSync::new(orchestrator);
        let owned_observer = (!observer.is_running()).then(|| observer.clone());
        observer.start();
        let task = tokio::spawn(auto_sync.run());

        Some(AutoSyncHandle {
            shutdown_tx,
            task,
            owned_observer,
        })
    }

    /// Runs the trigger loop.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!("Auto sync starting");

        // Compare against the value seen at subscription; a change since
        // then is still pending on the receiver.
        let mut was_connected = self.status_rx.borrow().is_connected();

        loop {
            tokio::select! {
                changed = self.status_rx.changed() => {
                    if changed.is_err() {
                        debug!("Network status channel closed");
                        break;
                    }

                    let connected = self.status_rx.borrow_and_update().is_connected();
                    if connected && !was_connected {
                        info!("Network regained, syncing pending changes");
                        let synced = self.orchestrator.sync_pending_changes().await;
                        debug!(synced, "Reconnect sync finished");
                    }
                    was_connected = connected;
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Auto sync shutting down");
                    break;
                }
            }
        }

        info!("Auto sync stopped");
    }
}
