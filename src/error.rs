//! Error types for plugin limiters
use crate::clock::MonthKey;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A monthly ceiling would be exceeded by the requested call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "monthly quota exhausted for {month}: {used}/{limit} calls used, {requested} requested; resets in {:.1} hours",
    .resets_in.as_secs_f64() / 3600.0
)]
pub struct QuotaExhausted {
    /// Month the counter applies to.
    pub month: MonthKey,
    /// Calls already consumed this month.
    pub used: u64,
    /// Configured ceiling.
    pub limit: u64,
    /// Units the rejected call asked for.
    pub requested: u64,
    /// Time until the counter resets.
    pub resets_in: Duration,
}

impl QuotaExhausted {
    pub fn hours_until_reset(&self) -> f64 {
        self.resets_in.as_secs_f64() / 3600.0
    }
}

/// Failure to gate a call for a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitError {
    /// No limiter is configured under this name. Fix the deployment, not the caller.
    #[error("unknown plugin '{plugin}'; configured plugins: [{}]", .configured.join(", "))]
    UnknownPlugin { plugin: String, configured: Vec<String> },
    /// The plugin's monthly ceiling is reached.
    #[error("plugin '{plugin}': {source}")]
    QuotaExhausted {
        plugin: String,
        #[source]
        source: QuotaExhausted,
    },
    /// The settings backing the registry failed to load, so no plugin is configured.
    #[error("plugin '{plugin}' is unavailable: plugin limits failed to load: {reason}")]
    SettingsUnavailable { plugin: String, reason: String },
}

impl LimitError {
    /// Check if this error is an unconfigured plugin
    pub fn is_unknown_plugin(&self) -> bool {
        matches!(self, Self::UnknownPlugin { .. })
    }

    /// Check if this error is monthly exhaustion
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, Self::QuotaExhausted { .. })
    }

    /// Check if this error comes from settings that failed to load
    pub fn is_settings_unavailable(&self) -> bool {
        matches!(self, Self::SettingsUnavailable { .. })
    }

    /// Plugin name the error refers to.
    pub fn plugin(&self) -> &str {
        match self {
            Self::UnknownPlugin { plugin, .. }
            | Self::QuotaExhausted { plugin, .. }
            | Self::SettingsUnavailable { plugin, .. } => plugin,
        }
    }

    /// Exhaustion details, if present.
    pub fn quota(&self) -> Option<&QuotaExhausted> {
        match self {
            Self::QuotaExhausted { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Error from a guarded operation: either the gate refused or the operation failed.
#[derive(Debug, Error)]
pub enum GuardError<E> {
    /// The limiter refused the call; the operation did not run.
    #[error(transparent)]
    Limit(#[from] LimitError),
    /// The operation ran and failed.
    #[error("{0}")]
    Inner(E),
    /// The gate could not be evaluated (e.g. the blocking task panicked).
    #[error("limiter infrastructure failure: {0}")]
    Infrastructure(String),
}

impl<E> GuardError<E> {
    pub fn is_limit(&self) -> bool {
        matches!(self, Self::Limit(_))
    }

    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_limit(&self) -> Option<&LimitError> {
        match self {
            Self::Limit(e) => Some(e),
            _ => None,
        }
    }
}

/// Problems loading or validating limiter configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML settings: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid JSON settings: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported settings format for {0} (expected .yaml, .yml or .json)")]
    UnsupportedFormat(PathBuf),
    #[error("invalid limits for plugin '{plugin}': {reason}")]
    InvalidLimits { plugin: String, reason: String },
}
