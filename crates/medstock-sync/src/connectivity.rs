//! # Connectivity Observer
//!
//! Publishes the device's coarse reachability as a [`NetworkStatus`] stream.
//!
//! ## How It Works
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Connectivity Observer                               │
//! │                                                                         │
//! │  ┌──────────────────┐   current_path()   ┌──────────────────────────┐  │
//! │  │  dyn PathMonitor │ ◄───────────────── │  monitor task            │  │
//! │  │                  │                    │  (tokio::select! on      │  │
//! │  │  SysfsPathMonitor│                    │   interval / shutdown)   │  │
//! │  │  ManualPathMon.  │                    └────────────┬─────────────┘  │
//! │  └──────────────────┘                                 │ publish        │
//! │                                                       ▼ (if changed)   │
//! │  refresh() ──► probe once ──────────────────► watch::Sender<Status>   │
//! │  report(s) ──────────────────────────────────►        │                │
//! │                                                       ▼                │
//! │                                  subscribe() → watch::Receiver         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Until the first probe completes the status is `Disconnected`. A probe that
//! cannot read the platform reports `Disconnected`; it never fails.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use medstock_core::{NetworkMedium, NetworkStatus};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace};

use crate::config::ConnectivitySettings;

// =============================================================================
// Path Monitors
// =============================================================================

/// Source of the platform's current network path.
#[async_trait]
pub trait PathMonitor: Send + Sync {
    /// Probes the platform once.
    async fn current_path(&self) -> NetworkStatus;
}

/// Reads interface state from the Linux sysfs network listing.
///
/// An interface counts as usable when its `operstate` is `up`, or when the
/// driver reports `unknown` (ppp, tun and some modems do) but the `flags`
/// word has both `IFF_UP` and `IFF_RUNNING` set. When several are usable,
/// the best medium wins: wired, then wifi, then cellular.
#[derive(Debug, Clone)]
pub struct SysfsPathMonitor {
    root: PathBuf,
}

impl SysfsPathMonitor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn classify(&self, iface: &Path, name: &str) -> NetworkMedium {
        if tokio::fs::metadata(iface.join("wireless")).await.is_ok()
            || tokio::fs::metadata(iface.join("phy80211")).await.is_ok()
        {
            return NetworkMedium::Wifi;
        }

        if ["wwan", "rmnet", "ccmni"].iter().any(|p| name.starts_with(p)) {
            NetworkMedium::Cellular
        } else if name.starts_with("eth") || name.starts_with("en") {
            NetworkMedium::Wired
        } else {
            NetworkMedium::Other
        }
    }
}

impl Default for SysfsPathMonitor {
    fn default() -> Self {
        Self::new("/sys/class/net")
    }
}

const IFF_UP: u32 = 0x1;
const IFF_RUNNING: u32 = 0x40;

/// Decides usability from the sysfs `operstate` and `flags` contents.
fn is_usable(operstate: &str, flags: Option<&str>) -> bool {
    match operstate.trim() {
        "up" => true,
        "unknown" => flags
            .map(str::trim)
            .and_then(|raw| u32::from_str_radix(raw.trim_start_matches("0x"), 16).ok())
            .is_some_and(|flags| flags & (IFF_UP | IFF_RUNNING) == (IFF_UP | IFF_RUNNING)),
        _ => false,
    }
}

fn medium_rank(medium: NetworkMedium) -> u8 {
    match medium {
        NetworkMedium::Wired => 3,
        NetworkMedium::Wifi => 2,
        NetworkMedium::Cellular => 1,
        NetworkMedium::Other => 0,
    }
}

#[async_trait]
impl PathMonitor for SysfsPathMonitor {
    async fn current_path(&self) -> NetworkStatus {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) => {
                debug!(root = %self.root.display(), error = %e, "Interface listing unavailable");
                return NetworkStatus::Disconnected;
            }
        };

        let mut best: Option<NetworkMedium> = None;
        while let Ok(Some(entry)) = dir.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == "lo" {
                continue;
            }

            let iface = entry.path();
            let operstate = tokio::fs::read_to_string(iface.join("operstate"))
                .await
                .unwrap_or_default();
            let flags = tokio::fs::read_to_string(iface.join("flags")).await.ok();
            if !is_usable(&operstate, flags.as_deref()) {
                continue;
            }

            let medium = self.classify(&iface, &name).await;
            trace!(interface = %name, %medium, "Interface up");
            if best.map_or(true, |b| medium_rank(medium) > medium_rank(b)) {
                best = Some(medium);
            }
        }

        best.map_or(NetworkStatus::Disconnected, NetworkStatus::Connected)
    }
}

/// Monitor whose answer is set by the host.
///
/// For platforms where reachability is pushed from outside (mobile shells,
/// embedded hosts) and for tests.
#[derive(Debug, Default)]
pub struct ManualPathMonitor {
    status: std::sync::RwLock<NetworkStatus>,
}

impl ManualPathMonitor {
    pub fn new(initial: NetworkStatus) -> Self {
        Self {
            status: std::sync::RwLock::new(initial),
        }
    }

    /// Changes what subsequent probes return.
    pub fn set(&self, status: NetworkStatus) {
        if let Ok(mut current) = self.status.write() {
            *current = status;
        }
    }
}

#[async_trait]
impl PathMonitor for ManualPathMonitor {
    async fn current_path(&self) -> NetworkStatus {
        self.status.read().map(|s| *s).unwrap_or_default()
    }
}

// =============================================================================
// Observer
// =============================================================================

struct MonitorTask {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Long-lived reachability observer.
///
/// Cheap to share behind an `Arc`; every subscriber sees the same stream.
pub struct ConnectivityObserver {
    monitor: Arc<dyn PathMonitor>,
    status_tx: Arc<watch::Sender<NetworkStatus>>,
    poll_interval: Duration,
    task: Mutex<Option<MonitorTask>>,
}

impl std::fmt::Debug for ConnectivityObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityObserver")
            .field("status", &*self.status_tx.borrow())
            .field("poll_interval", &self.poll_interval)
            .field("running", &self.is_running())
            .finish()
    }
}

impl ConnectivityObserver {
    /// Creates an observer. Monitoring does not start until [`start`](Self::start).
    pub fn new(monitor: Arc<dyn PathMonitor>, poll_interval: Duration) -> Self {
        let (status_tx, _) = watch::channel(NetworkStatus::Disconnected);
        Self {
            monitor,
            status_tx: Arc::new(status_tx),
            poll_interval,
            task: Mutex::new(None),
        }
    }

    /// Creates an observer over the sysfs interface listing.
    pub fn from_settings(settings: &ConnectivitySettings) -> Self {
        Self::new(
            Arc::new(SysfsPathMonitor::new(&settings.sysfs_root)),
            settings.poll_interval(),
        )
    }

    /// Latest published status.
    pub fn status(&self) -> NetworkStatus {
        *self.status_tx.borrow()
    }

    /// Subscribes to status changes. The receiver starts at the current value.
    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.status_tx.subscribe()
    }

    /// Probes the monitor now, publishes the result and returns it.
    pub async fn refresh(&self) -> NetworkStatus {
        let status = self.monitor.current_path().await;
        publish(&self.status_tx, status);
        status
    }

    /// Publishes a status pushed by the host.
    pub fn report(&self, status: NetworkStatus) {
        publish(&self.status_tx, status);
    }

    /// Begins background monitoring. Idempotent.
    ///
    /// Must be called from within a Tokio runtime; outside one it logs and
    /// does nothing.
    pub fn start(&self) {
        let Ok(mut task) = self.task.lock() else {
            error!("Connectivity task slot poisoned");
            return;
        };
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            debug!("Connectivity monitoring already running");
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(error = %e, "Cannot start connectivity monitoring outside a runtime");
                return;
            }
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = runtime.spawn(run_monitor(
            Arc::clone(&self.monitor),
            Arc::clone(&self.status_tx),
            self.poll_interval,
            shutdown_rx,
        ));

        *task = Some(MonitorTask { shutdown_tx, handle });
        info!(interval_ms = self.poll_interval.as_millis() as u64, "Connectivity monitoring started");
    }

    /// Ends background monitoring. Idempotent; the last status stays published.
    pub fn stop(&self) {
        let Some(task) = self.task.lock().ok().and_then(|mut slot| slot.take()) else {
            return;
        };

        if task.shutdown_tx.send(()).is_err() {
            // Loop already gone; make sure the handle is released.
            task.handle.abort();
        }
        info!("Connectivity monitoring stopped");
    }

    /// Returns true while the monitor task is alive.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|t| !t.handle.is_finished()))
            .unwrap_or(false)
    }
}

impl Drop for ConnectivityObserver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn publish(status_tx: &watch::Sender<NetworkStatus>, status: NetworkStatus) {
    let changed = status_tx.send_if_modified(|current| {
        if *current == status {
            false
        } else {
            *current = status;
            true
        }
    });

    if changed {
        info!(%status, "Network status changed");
    }
}

async fn run_monitor(
    monitor: Arc<dyn PathMonitor>,
    status_tx: Arc<watch::Sender<NetworkStatus>>,
    poll_interval: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let status = monitor.current_path().await;
                publish(&status_tx, status);
            }
            _ = &mut shutdown_rx => {
                debug!("Connectivity monitor shutting down");
                break;
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
