//! # Sync Configuration
//!
//! Configuration for the cache, the connectivity observer and the sync
//! orchestrator.
//!
//! ## Configuration Sources (Priority Order)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Loading                                │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     MEDSTOCK_CACHE_TTL_SECS=86400                                      │
//! │     MEDSTOCK_CACHE_DB=/var/lib/medstock/cache.db                       │
//! │     MEDSTOCK_POLL_INTERVAL_MS=5000                                     │
//! │     MEDSTOCK_QUEUE_KEY=pending_sync_operations                         │
//! │     MEDSTOCK_DISPATCH_TIMEOUT_SECS=15                                  │
//! │            │                                                            │
//! │            ▼                                                            │
//! │  2. Config File (sync.toml)                                            │
//! │     ~/.config/medstock/sync.toml (Linux)                               │
//! │     ~/Library/Application Support/com.medstock.medstock/ (macOS)       │
//! │            │                                                            │
//! │            ▼                                                            │
//! │  3. Defaults (lowest priority)                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Config File
//! ```toml
//! [cache]
//! ttl_secs = 2592000
//! database_path = "/var/lib/medstock/cache.db"
//!
//! [connectivity]
//! poll_interval_ms = 2000
//! sysfs_root = "/sys/class/net"
//!
//! [sync]
//! queue_key = "pending_sync_operations"
//! dispatch_timeout_secs = 30
//! sync_on_enqueue = true
//! auto_sync_on_reconnect = true
//! ```

use std::path::PathBuf;
use std::time::Duration;

use medstock_core::PENDING_SYNC_OPERATIONS_KEY;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Cache Settings
// =============================================================================

/// Settings for the cache that stores the pending queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Cache-wide time-to-live in seconds. The pending queue is pinned and
    /// never expires; this only ages out ordinary cache entries.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Cache database file. Defaults to the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

fn default_ttl_secs() -> u64 {
    30 * 24 * 60 * 60
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            database_path: None,
        }
    }
}

// =============================================================================
// Connectivity Settings
// =============================================================================

/// Settings for the connectivity observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectivitySettings {
    /// How often the platform path is probed while monitoring (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Root of the kernel's network interface listing.
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from("/sys/class/net")
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            sysfs_root: default_sysfs_root(),
        }
    }
}

impl ConnectivitySettings {
    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Settings for the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Cache key the pending queue lives under.
    #[serde(default = "default_queue_key")]
    pub queue_key: String,

    /// Upper bound for a single dispatch (seconds).
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,

    /// Start a sync attempt right after every enqueue.
    #[serde(default = "default_true")]
    pub sync_on_enqueue: bool,

    /// Start a sync attempt whenever the network comes back.
    #[serde(default = "default_true")]
    pub auto_sync_on_reconnect: bool,
}

fn default_queue_key() -> String {
    PENDING_SYNC_OPERATIONS_KEY.to_string()
}

fn default_dispatch_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            queue_key: default_queue_key(),
            dispatch_timeout_secs: default_dispatch_timeout(),
            sync_on_enqueue: true,
            auto_sync_on_reconnect: true,
        }
    }
}

impl SyncSettings {
    /// Dispatch timeout as a `Duration`.
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }
}

// =============================================================================
// Main Config
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub connectivity: ConnectivitySettings,

    #[serde(default)]
    pub sync: SyncSettings,
}

impl SyncConfig {
    /// Loads configuration from file and environment.
    ///
    /// ## Loading Order
    /// 1. Start with defaults
    /// 2. Load from config file (if exists)
    /// 3. Override with environment variables
    /// 4. Validate
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.cache.ttl_secs == 0 {
            return Err(SyncError::InvalidConfig("ttl_secs must be greater than 0".into()));
        }

        if self.sync.queue_key.trim().is_empty() {
            return Err(SyncError::InvalidConfig("queue_key must not be empty".into()));
        }

        if self.connectivity.poll_interval_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "poll_interval_ms must be greater than 0".into(),
            ));
        }

        if self.sync.dispatch_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "dispatch_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ttl) = lookup("MEDSTOCK_CACHE_TTL_SECS") {
            match ttl.parse::<u64>() {
                Ok(secs) => self.cache.ttl_secs = secs,
                Err(_) => warn!(value = %ttl, "Ignoring invalid MEDSTOCK_CACHE_TTL_SECS"),
            }
        }

        if let Some(path) = lookup("MEDSTOCK_CACHE_DB") {
            debug!(path = %path, "Overriding cache database from environment");
            self.cache.database_path = Some(PathBuf::from(path));
        }

        if let Some(interval) = lookup("MEDSTOCK_POLL_INTERVAL_MS") {
            match interval.parse::<u64>() {
                Ok(ms) => self.connectivity.poll_interval_ms = ms,
                Err(_) => warn!(value = %interval, "Ignoring invalid MEDSTOCK_POLL_INTERVAL_MS"),
            }
        }

        if let Some(key) = lookup("MEDSTOCK_QUEUE_KEY") {
            debug!(key = %key, "Overriding queue key from environment");
            self.sync.queue_key = key;
        }

        if let Some(timeout) = lookup("MEDSTOCK_DISPATCH_TIMEOUT_SECS") {
            match timeout.parse::<u64>() {
                Ok(secs) => self.sync.dispatch_timeout_secs = secs,
                Err(_) => warn!(value = %timeout, "Ignoring invalid MEDSTOCK_DISPATCH_TIMEOUT_SECS"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "medstock", "medstock")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Cache database path: the configured one, else the platform data dir.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.cache.database_path.clone().or_else(|| {
            directories::ProjectDirs::from("com", "medstock", "medstock")
                .map(|dirs| dirs.data_dir().join("cache.db"))
        })
    }

    /// Cache TTL as a `Duration`.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.sync.queue_key, "pending_sync_operations");
        assert_eq!(config.cache.ttl_secs, 2_592_000);
        assert_eq!(config.connectivity.poll_interval(), Duration::from_secs(2));
        assert!(config.sync.sync_on_enqueue);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();
        config.sync.queue_key = "  ".into();
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));

        let mut config = SyncConfig::default();
        config.connectivity.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.sync.dispatch_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.cache.ttl_secs = 0;
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_ttl_from_env_is_rejected() {
        let mut config = SyncConfig::default();
        config.apply_overrides(|name| {
            (name == "MEDSTOCK_CACHE_TTL_SECS").then(|| "0".to_string())
        });
        assert_eq!(config.cache.ttl_secs, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MEDSTOCK_CACHE_TTL_SECS", "60"),
            ("MEDSTOCK_CACHE_DB", "/tmp/medstock.db"),
            ("MEDSTOCK_POLL_INTERVAL_MS", "not-a-number"),
            ("MEDSTOCK_QUEUE_KEY", "queue_v2"),
        ]
        .into_iter()
        .collect();

        let mut config = SyncConfig::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.cache.database_path, Some(PathBuf::from("/tmp/medstock.db")));
        assert_eq!(config.connectivity.poll_interval_ms, 2000);
        assert_eq!(config.sync.queue_key, "queue_v2");
        assert_eq!(config.sync.dispatch_timeout_secs, 30);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: SyncConfig = toml::from_str("[sync]\nsync_on_enqueue = false\n").unwrap();
        assert!(!config.sync.sync_on_enqueue);
        assert_eq!(config.sync.queue_key, "pending_sync_operations");
        assert_eq!(config.cache, CacheSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("sync.toml");

        let mut config = SyncConfig::default();
        config.cache.database_path = Some(dir.path().join("cache.db"));
        config.sync.dispatch_timeout_secs = 5;
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let reloaded: SyncConfig = toml::from_str(&contents).unwrap();
        assert_eq!(reloaded, config);
    }
}
