//! # Sync Configuration
//!
//! Configuration for the sync orchestrator's timing behaviour.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     KHATA_SYNC_INTERVAL_SECS=3600                                      │
//! │     KHATA_DEBOUNCE_SECS=60                                             │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/khata/sync.toml (Linux)                                  │
//! │     ~/Library/Application Support/com.khata.app/sync.toml (macOS)      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     6h interval, 5min debounce, 3s/2s settle, 90d/7d cleanup           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [timing]
//! sync_interval_secs = 21600        # periodic trigger cadence (6h)
//! connectivity_debounce_secs = 300  # suppress reconnect triggers (5min)
//! connectivity_settle_ms = 3000     # let the link settle before syncing
//! login_settle_ms = 2000            # let auth state settle before syncing
//!
//! [cleanup]
//! age_days = 90                     # stale demand data threshold
//! interval_secs = 604800            # cleanup cadence (7 days)
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Timing Settings
// =============================================================================

/// Trigger timing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Periodic trigger cadence (seconds). Default: 6 hours.
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,

    /// Minimum elapsed time since the last sync attempt before a
    /// connectivity-restored trigger is honoured (seconds).
    /// Default: 5 minutes.
    #[serde(default = "default_debounce")]
    pub connectivity_debounce_secs: u64,

    /// Delay after a connectivity restoration before attempting, letting
    /// the link settle (milliseconds). Default: 3 seconds.
    #[serde(default = "default_connectivity_settle")]
    pub connectivity_settle_ms: u64,

    /// Delay after a login event before attempting (milliseconds).
    /// Default: 2 seconds.
    #[serde(default = "default_login_settle")]
    pub login_settle_ms: u64,
}

fn default_sync_interval() -> u64 {
    6 * 60 * 60
}
fn default_debounce() -> u64 {
    5 * 60
}
fn default_connectivity_settle() -> u64 {
    3_000
}
fn default_login_settle() -> u64 {
    2_000
}

impl Default for TimingSettings {
    fn default() -> Self {
        TimingSettings {
            sync_interval_secs: default_sync_interval(),
            connectivity_debounce_secs: default_debounce(),
            connectivity_settle_ms: default_connectivity_settle(),
            login_settle_ms: default_login_settle(),
        }
    }
}

// =============================================================================
// Cleanup Settings
// =============================================================================

/// Stale-record cleanup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupSettings {
    /// Demand data older than this many days (closed and synced) is
    /// deleted. Default: 90.
    #[serde(default = "default_cleanup_age")]
    pub age_days: u32,

    /// Cleanup cadence (seconds). Default: 7 days.
    #[serde(default = "default_cleanup_interval")]
    pub interval_secs: u64,
}

fn default_cleanup_age() -> u32 {
    90
}
fn default_cleanup_interval() -> u64 {
    7 * 24 * 60 * 60
}

impl Default for CleanupSettings {
    fn default() -> Self {
        CleanupSettings {
            age_days: default_cleanup_age(),
            interval_secs: default_cleanup_interval(),
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync orchestrator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Trigger timing settings.
    #[serde(default)]
    pub timing: TimingSettings,

    /// Stale-record cleanup settings.
    #[serde(default)]
    pub cleanup: CleanupSettings,
}

impl SyncConfig {
    /// Creates a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
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
        if self.timing.sync_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "sync_interval_secs must be greater than 0".into(),
            ));
        }

        if self.timing.connectivity_debounce_secs >= self.timing.sync_interval_secs {
            return Err(SyncError::InvalidConfig(
                "connectivity_debounce_secs must be shorter than sync_interval_secs".into(),
            ));
        }

        if self.cleanup.interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "cleanup interval_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_u64("KHATA_SYNC_INTERVAL_SECS") {
            debug!(v, "Overriding sync interval from environment");
            self.timing.sync_interval_secs = v;
        }
        if let Some(v) = env_u64("KHATA_DEBOUNCE_SECS") {
            self.timing.connectivity_debounce_secs = v;
        }
        if let Some(v) = env_u64("KHATA_CONNECTIVITY_SETTLE_MS") {
            self.timing.connectivity_settle_ms = v;
        }
        if let Some(v) = env_u64("KHATA_LOGIN_SETTLE_MS") {
            self.timing.login_settle_ms = v;
        }
        if let Some(v) = env_u64("KHATA_CLEANUP_AGE_DAYS") {
            self.cleanup.age_days = v as u32;
        }
        if let Some(v) = env_u64("KHATA_CLEANUP_INTERVAL_SECS") {
            self.cleanup.interval_secs = v;
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "khata", "app")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Duration Accessors
    // =========================================================================

    /// Periodic trigger cadence.
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.timing.sync_interval_secs)
    }

    /// Debounce window for connectivity-restored triggers.
    pub fn connectivity_debounce(&self) -> Duration {
        Duration::from_secs(self.timing.connectivity_debounce_secs)
    }

    /// Settle delay after connectivity restoration.
    pub fn connectivity_settle(&self) -> Duration {
        Duration::from_millis(self.timing.connectivity_settle_ms)
    }

    /// Settle delay after a login event.
    pub fn login_settle(&self) -> Duration {
        Duration::from_millis(self.timing.login_settle_ms)
    }

    /// Cleanup cadence.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup.interval_secs)
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.timing.sync_interval_secs, 21_600);
        assert_eq!(config.timing.connectivity_debounce_secs, 300);
        assert_eq!(config.timing.connectivity_settle_ms, 3_000);
        assert_eq!(config.timing.login_settle_ms, 2_000);
        assert_eq!(config.cleanup.age_days, 90);
        assert_eq!(config.cleanup.interval_secs, 604_800);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = SyncConfig::default();

        config.timing.sync_interval_secs = 0;
        assert!(config.validate().is_err());

        // Debounce must stay shorter than the interval.
        config.timing.sync_interval_secs = 60;
        config.timing.connectivity_debounce_secs = 300;
        assert!(config.validate().is_err());

        config.timing.connectivity_debounce_secs = 30;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[timing]"));
        assert!(toml_str.contains("[cleanup]"));

        let parsed: SyncConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            parsed.timing.sync_interval_secs,
            config.timing.sync_interval_secs
        );
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let parsed: SyncConfig = toml::from_str(
            r#"
            [timing]
            sync_interval_secs = 3600
            "#,
        )
        .unwrap();

        assert_eq!(parsed.timing.sync_interval_secs, 3_600);
        assert_eq!(parsed.timing.connectivity_debounce_secs, 300);
        assert_eq!(parsed.cleanup.age_days, 90);
    }

    #[test]
    fn test_duration_accessors() {
        let config = SyncConfig::default();
        assert_eq!(config.sync_interval(), Duration::from_secs(21_600));
        assert_eq!(config.connectivity_settle(), Duration::from_millis(3_000));
    }
}
