//! Cache settings management
//!
//! Stores non-sensitive configuration in a plain JSON file. Cache contents are
//! never written to disk; only the policy that decides when the cache clears.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{CacheError, Result};

/// Current settings file version
pub const SETTINGS_VERSION: u32 = 1;

/// Upper bound for the auto-clear timeout (24 hours)
const MAX_AUTO_CLEAR_MINUTES: u32 = 24 * 60;

/// Cache clearing policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSettings {
    /// Settings file version
    pub version: u32,
    /// Clear when the host reports idle, not only when it locks
    pub clear_on_idle: bool,
    /// Clear after this many minutes without host activity (0 = never)
    pub auto_clear_timeout_minutes: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            clear_on_idle: false,
            auto_clear_timeout_minutes: 0,
        }
    }
}

impl CacheSettings {
    /// Check that the settings can be applied
    pub fn validate(&self) -> Result<()> {
        if self.version != SETTINGS_VERSION {
            return Err(CacheError::InvalidSettings(format!(
                "Unsupported settings version: expected {}, got {}",
                SETTINGS_VERSION, self.version
            )));
        }
        if self.auto_clear_timeout_minutes > MAX_AUTO_CLEAR_MINUTES {
            return Err(CacheError::InvalidSettings(format!(
                "Auto-clear timeout of {} minutes exceeds the {} minute maximum",
                self.auto_clear_timeout_minutes, MAX_AUTO_CLEAR_MINUTES
            )));
        }
        Ok(())
    }

    /// The auto-clear timeout, if enabled
    pub fn auto_clear_timeout(&self) -> Option<Duration> {
        match self.auto_clear_timeout_minutes {
            0 => None,
            minutes => Some(Duration::from_secs(u64::from(minutes) * 60)),
        }
    }
}

/// Settings manager
pub struct SettingsManager {
    settings_file: PathBuf,
    settings: CacheSettings,
}

impl SettingsManager {
    /// Create a new settings manager, loading `settings.json` from `storage_dir`
    pub fn new(storage_dir: &Path) -> Result<Self> {
        let settings_file = storage_dir.join("settings.json");
        let settings = Self::load_from_file(&settings_file)?;

        Ok(Self {
            settings_file,
            settings,
        })
    }

    /// Default settings directory for the current user
    pub fn default_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "credential-cache")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Load settings from file
    fn load_from_file(path: &Path) -> Result<CacheSettings> {
        if !path.exists() {
            debug!("No settings file found, using defaults");
            return Ok(CacheSettings::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let settings: CacheSettings = serde_json::from_str(&contents)?;
        settings.validate()?;
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub async fn save(&self) -> Result<()> {
        let contents = serde_json::to_string_pretty(&self.settings)?;

        if let Some(parent) = self.settings_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write atomically using temp file
        let temp_path = self.settings_file.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents).await?;
        tokio::fs::rename(&temp_path, &self.settings_file).await?;

        debug!("Saved settings to {:?}", self.settings_file);
        Ok(())
    }

    /// Get current settings
    pub fn get(&self) -> &CacheSettings {
        &self.settings
    }

    /// Validate, replace and save settings
    pub async fn update(&mut self, settings: CacheSettings) -> Result<()> {
        settings.validate()?;
        self.settings = settings;
        self.save().await
    }

    /// Reset settings to defaults and delete settings file
    pub async fn reset(&mut self) -> Result<()> {
        self.settings = CacheSettings::default();

        if self.settings_file.exists() {
            tokio::fs::remove_file(&self.settings_file).await?;
        }

        Ok(())
    }
}
