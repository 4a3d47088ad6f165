//! Provider-wide settings
//!
//! Built once when the provider starts and shared read-only (behind an `Arc`)
//! with every retry executor and resource controller.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default deadline applied to a retried remote call.
pub const DEFAULT_RETRY_TIMEOUT: Duration = Duration::from_secs(60);

pub const ENV_RETRY_TIMEOUT: &str = "TETHER_RETRY_TIMEOUT";
pub const ENV_SUPPRESS_COMPUTED_PLAN: &str = "TETHER_SUPPRESS_COMPUTED_PLAN";
pub const ENV_CONFIG_PATH: &str = "TETHER_CONFIG_PATH";

const SETTINGS_DIR: &str = "tether";
const SETTINGS_FILE: &str = "settings.yaml";

/// Settings shared by all resource controllers of one provider process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    /// Deadline for a single retried remote call
    pub retry_timeout: Duration,

    /// Reuse the prior value for attributes whose planned value is unknown
    pub suppress_computed_plan: bool,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            retry_timeout: DEFAULT_RETRY_TIMEOUT,
            suppress_computed_plan: false,
        }
    }
}

/// On-disk representation; every key is optional
#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    retry_timeout: Option<i64>,
    suppress_computed_plan: Option<bool>,
}

impl ProviderSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry_timeout(mut self, timeout: Duration) -> Self {
        self.retry_timeout = timeout;
        self
    }

    pub fn with_suppress_computed_plan(mut self, enabled: bool) -> Self {
        self.suppress_computed_plan = enabled;
        self
    }

    /// Set the retry timeout in seconds.
    ///
    /// Negative values are ignored and leave the current timeout in place.
    /// Returns whether the value was applied.
    pub fn set_retry_timeout_secs(&mut self, secs: i64) -> bool {
        if secs < 0 {
            tracing::debug!("Ignoring negative retry timeout: {}", secs);
            return false;
        }
        self.retry_timeout = Duration::from_secs(secs as u64);
        true
    }

    /// Load settings: defaults, then the settings file (if any), then the
    /// environment.
    pub fn load() -> Result<Self> {
        let mut settings = Self::default();
        if let Some(path) = find_settings_file()? {
            settings.merge_file(&path)?;
        }
        settings.apply_env();
        Ok(settings)
    }

    /// Build settings from the environment only
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        settings.apply_env();
        settings
    }

    /// Overlay the values of a YAML settings file
    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)?;
        let file: SettingsFile =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::InvalidSettingsFile {
                path: path.display().to_string(),
                source,
            })?;

        if let Some(secs) = file.retry_timeout {
            self.set_retry_timeout_secs(secs);
        }
        if let Some(enabled) = file.suppress_computed_plan {
            self.suppress_computed_plan = enabled;
        }

        tracing::debug!("Loaded settings from {}", path.display());
        Ok(())
    }

    /// Overlay `TETHER_RETRY_TIMEOUT` and `TETHER_SUPPRESS_COMPUTED_PLAN`.
    ///
    /// Values that cannot be parsed are ignored.
    pub fn apply_env(&mut self) {
        if let Ok(raw) = std::env::var(ENV_RETRY_TIMEOUT) {
            match raw.trim().parse::<i64>() {
                Ok(secs) => {
                    self.set_retry_timeout_secs(secs);
                }
                Err(_) => tracing::warn!("Ignoring invalid {}: {:?}", ENV_RETRY_TIMEOUT, raw),
            }
        }

        if let Ok(raw) = std::env::var(ENV_SUPPRESS_COMPUTED_PLAN) {
            match parse_bool(&raw) {
                Some(enabled) => self.suppress_computed_plan = enabled,
                None => tracing::warn!(
                    "Ignoring invalid {}: {:?}",
                    ENV_SUPPRESS_COMPUTED_PLAN,
                    raw
                ),
            }
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Locate the settings file
///
/// 1. `TETHER_CONFIG_PATH` (must exist when set)
/// 2. `~/.config/tether/settings.yaml`
pub fn find_settings_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(ENV_CONFIG_PATH) {
        let path = PathBuf::from(&config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::SettingsFileNotFound(config_path));
    }

    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join(SETTINGS_DIR).join(SETTINGS_FILE);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    Ok(None)
}
