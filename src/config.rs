//! Limiter configuration.
//!
//! Limits live under `rapidapi.plugins.<name>.limits` in the application settings.
//! Other keys in the settings file are ignored.
//!
//! ```yaml
//! rapidapi:
//!   plugins:
//!     linkedin_scraper:
//!       host: fresh-linkedin-profile-data.p.rapidapi.com
//!       limits:
//!         monthly: 5000
//!         per_minute: 30
//!         burst: 10
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default calls per calendar month.
pub const DEFAULT_MONTHLY_LIMIT: u64 = 10_000;
/// Default calls per minute.
pub const DEFAULT_PER_MINUTE: u32 = 60;
/// Environment variable naming the settings file.
pub const SETTINGS_ENV_VAR: &str = "AUTOPILOOT_SETTINGS";
/// Settings file used when [`SETTINGS_ENV_VAR`] is unset.
pub const DEFAULT_SETTINGS_PATH: &str = "config/settings.yaml";

/// Root of the settings document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default)]
    pub rapidapi: RapidApiConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RapidApiConfig {
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    #[serde(default)]
    pub limits: LimitOverrides,
}

/// Limits as written in settings; every field is optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOverrides {
    pub monthly: Option<u64>,
    pub per_minute: Option<u32>,
    pub burst: Option<u32>,
}

/// Limits for one plugin after defaults are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginLimits {
    pub monthly: u64,
    pub per_minute: u32,
    pub burst: u32,
}

impl Default for PluginLimits {
    fn default() -> Self {
        Self {
            monthly: DEFAULT_MONTHLY_LIMIT,
            per_minute: DEFAULT_PER_MINUTE,
            burst: default_burst(DEFAULT_PER_MINUTE),
        }
    }
}

// Half the per-minute rate, but never an empty bucket.
fn default_burst(per_minute: u32) -> u32 {
    (per_minute / 2).max(1)
}

impl PluginLimits {
    /// Apply defaults to `overrides`, rejecting explicit zeros.
    pub fn resolve(plugin: &str, overrides: &LimitOverrides) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidLimits {
            plugin: plugin.to_string(),
            reason: reason.to_string(),
        };

        let monthly = overrides.monthly.unwrap_or(DEFAULT_MONTHLY_LIMIT);
        if monthly == 0 {
            return Err(invalid("monthly must be > 0"));
        }
        let per_minute = overrides.per_minute.unwrap_or(DEFAULT_PER_MINUTE);
        if per_minute == 0 {
            return Err(invalid("per_minute must be > 0"));
        }
        let burst = overrides.burst.unwrap_or_else(|| default_burst(per_minute));
        if burst == 0 {
            return Err(invalid("burst must be > 0"));
        }

        Ok(Self { monthly, per_minute, burst })
    }

    /// Sustained token refill rate for the per-minute bucket.
    pub fn refill_per_second(&self) -> f64 {
        f64::from(self.per_minute) / 60.0
    }
}

impl LimitsConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        // An empty document is an empty config rather than an error.
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Load from a `.yaml`, `.yml` or `.json` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        let parse: fn(&str) -> Result<Self, ConfigError> = match ext.as_deref() {
            Some("yaml" | "yml") => Self::from_yaml_str,
            Some("json") => Self::from_json_str,
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let config = parse(&raw)?;
        info!(
            target: "autopiloot_limiter::config",
            path = %path.display(),
            plugins = config.rapidapi.plugins.len(),
            "loaded plugin limits"
        );
        Ok(config)
    }

    /// Load from the file named by `AUTOPILOOT_SETTINGS`, falling back to
    /// `config/settings.yaml`. A missing file yields an empty config.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var_os(SETTINGS_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));
        match Self::from_path(&path) {
            Err(ConfigError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    target: "autopiloot_limiter::config",
                    path = %path.display(),
                    "settings file not found; no plugins configured"
                );
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Builder-style helper to add a plugin.
    pub fn with_plugin(mut self, name: impl Into<String>, limits: LimitOverrides) -> Self {
        self.rapidapi.plugins.insert(name.into(), PluginConfig { limits });
        self
    }

    /// Resolve every plugin's limits, sorted by name.
    pub fn resolved(&self) -> Result<Vec<(String, PluginLimits)>, ConfigError> {
        self.rapidapi
            .plugins
            .iter()
            .map(|(name, plugin)| Ok((name.clone(), PluginLimits::resolve(name, &plugin.limits)?)))
            .collect()
    }
}
