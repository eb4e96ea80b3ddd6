// SPDX-License-Identifier: MPL-2.0

use crate::config::{
    APP_ID, AUTO_REFRESH_INTERVAL, DEFAULT_PAGE_SIZE, DEFAULT_REMOTE_TIMEOUT, MAX_PAGE_SIZE,
    RECONCILE_INTERVAL, SNAPSHOT_MAX_AGE,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Persistent engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Posts per feed page
    pub page_size: usize,
    /// Minimum interval between background contact reconciliations
    pub reconcile_interval_secs: u64,
    /// Interval of the silent feed refresh while a feed view is active
    pub auto_refresh_interval_secs: u64,
    /// Upper bound on a single remote call
    pub remote_timeout_secs: u64,
    /// Age after which a saved feed snapshot is reported as stale
    pub snapshot_max_age_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            reconcile_interval_secs: RECONCILE_INTERVAL.as_secs(),
            auto_refresh_interval_secs: AUTO_REFRESH_INTERVAL.as_secs(),
            remote_timeout_secs: DEFAULT_REMOTE_TIMEOUT.as_secs(),
            snapshot_max_age_secs: SNAPSHOT_MAX_AGE.as_secs(),
        }
    }
}

impl EngineSettings {
    /// Get the settings file path (~/.config/{APP_ID}/settings.json)
    fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push(APP_ID);
            p.push("settings.json");
            p
        })
    }

    /// Load settings from disk, or return defaults if not found
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load settings from an explicit file, or return defaults
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str::<Self>(&contents)
                .map(Self::sanitized)
                .unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<(), String> {
        let path = Self::settings_path().ok_or("Could not determine config directory")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {e}"))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {e}"))?;

        std::fs::write(path, json).map_err(|e| format!("Failed to write settings: {e}"))?;

        Ok(())
    }

    /// Clamp values that would stall or flood the engine
    fn sanitized(mut self) -> Self {
        self.page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        self.reconcile_interval_secs = self.reconcile_interval_secs.max(1);
        self.auto_refresh_interval_secs = self.auto_refresh_interval_secs.max(1);
        self.remote_timeout_secs = self.remote_timeout_secs.max(1);
        self
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn auto_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.auto_refresh_interval_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn snapshot_max_age(&self) -> Duration {
        Duration::from_secs(self.snapshot_max_age_secs)
    }
}
