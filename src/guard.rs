//! Gate a call behind a plugin's limiter.
//!
//! ```no_run
//! use autopiloot_limiter::with_plugin_limit;
//!
//! fn fetch_profile(url: String) -> String {
//!     format!("profile for {url}")
//! }
//!
//! let mut fetch = with_plugin_limit("linkedin_scraper").wrap(fetch_profile);
//! match fetch("https://linkedin.com/in/someone".to_string()) {
//!     Ok(profile) => println!("{profile}"),
//!     Err(err) => eprintln!("skipped: {err}"),
//! }
//! ```

use crate::error::{GuardError, LimitError};
use crate::registry::{self, PluginLimiters};
use std::sync::Arc;

/// Runs operations only after the plugin's limiter admits them.
///
/// The blocking acquire is used: a minute-limited call shows up as latency, an
/// exhausted month or unknown plugin as an error, and the operation is skipped.
#[derive(Debug, Clone)]
pub struct PluginGuard {
    limiters: Arc<PluginLimiters>,
    plugin: String,
}

impl PluginGuard {
    pub fn new(limiters: Arc<PluginLimiters>, plugin: impl Into<String>) -> Self {
        Self { limiters, plugin: plugin.into() }
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Acquire, then run `op` and hand back its result untouched.
    pub fn call<T, F>(&self, op: F) -> Result<T, LimitError>
    where
        F: FnOnce() -> T,
    {
        self.limiters.acquire(&self.plugin)?;
        Ok(op())
    }

    /// Like [`PluginGuard::call`] for fallible operations; the operation's error is
    /// returned as [`GuardError::Inner`].
    pub fn try_call<T, E, F>(&self, op: F) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.limiters.acquire(&self.plugin)?;
        op().map_err(GuardError::Inner)
    }

    /// Wrap `f` so every invocation is gated. Use a tuple for several arguments.
    pub fn wrap<A, R, F>(self, mut f: F) -> impl FnMut(A) -> Result<R, LimitError>
    where
        F: FnMut(A) -> R,
    {
        move |arg| {
            self.limiters.acquire(&self.plugin)?;
            Ok(f(arg))
        }
    }
}

/// Guard for `plugin` on the process-wide registry (see [`registry::global`]).
///
/// If the settings failed to load, every call through the guard fails with
/// [`LimitError::SettingsUnavailable`] naming the load error.
pub fn with_plugin_limit(plugin: impl Into<String>) -> PluginGuard {
    PluginGuard::new(registry::global(), plugin)
}
