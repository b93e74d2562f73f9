//! # Sync Configuration
//!
//! ## Configuration Sources
//! ```text
//! 1. Environment Variables (highest priority)
//!    OPENCARE_SERVER_URL=https://api.example.org
//!    OPENCARE_SYNC_PAGE_SIZE=100
//! 2. TOML config file (path supplied by the host application)
//! 3. Default values
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [server]
//! url = "https://api.example.org"
//!
//! [sync]
//! page_size = 100
//! interval_secs = 300
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Server Configuration
// =============================================================================

/// Where to sync to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the backend. Empty means "not configured yet"; the worker
    /// refuses to start without one.
    #[serde(default)]
    pub url: String,
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Records per push request and records requested per pull page.
    ///
    /// Also the pull termination signal: a page shorter than this ends the
    /// pull loop.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Interval between automatic sync cycles (seconds).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_page_size() -> usize {
    100
}
fn default_interval() -> u64 {
    300
}
fn default_request_timeout() -> u64 {
    30
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            page_size: default_page_size(),
            interval_secs: default_interval(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
///
/// ## Example Config File
/// ```toml
/// [server]
/// url = "https://api.example.org"
///
/// [sync]
/// page_size = 100
/// interval_secs = 300
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub sync: SyncSettings,
}

impl SyncConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (if it exists)
    /// 3. Environment variables
    pub fn load(config_path: Option<&Path>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or falls back to defaults on any failure.
    pub fn load_or_default(config_path: Option<&Path>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: &Path) -> SyncResult<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(config_path, contents)
            .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(path = %config_path.display(), "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.sync.page_size == 0 {
            return Err(SyncError::InvalidConfig(
                "page_size must be greater than 0".into(),
            ));
        }

        if self.sync.interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "interval_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("OPENCARE_SERVER_URL") {
            debug!(url = %url, "Overriding server URL from environment");
            self.server.url = url;
        }

        if let Ok(size) = std::env::var("OPENCARE_SYNC_PAGE_SIZE") {
            if let Ok(n) = size.parse::<usize>() {
                self.sync.page_size = n;
            }
        }

        if let Ok(secs) = std::env::var("OPENCARE_SYNC_INTERVAL_SECS") {
            if let Ok(n) = secs.parse::<u64>() {
                self.sync.interval_secs = n;
            }
        }
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn page_size(&self) -> usize {
        self.sync.page_size
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.sync.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.request_timeout_secs)
    }

    /// Returns a sensible default path for the config file, relative to the
    /// host-provided data directory.
    pub fn default_path(data_dir: &Path) -> PathBuf {
        data_dir.join("sync.toml")
    }
}
