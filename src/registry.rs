//! Registry of per-plugin limiters.
//!
//! Built once from [`LimitsConfig`]; the plugin map is never modified afterwards, so
//! lookups need no locking. Each plugin's limiter synchronizes itself.

use crate::clock::{Calendar, Clock, MonotonicClock, SystemCalendar};
use crate::config::LimitsConfig;
use crate::error::{ConfigError, LimitError};
use crate::guard::PluginGuard;
use crate::rate_limit::{DualLimiter, LimiterSnapshot};
use crate::sleeper::{Sleeper, ThreadSleeper};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{error, info};

static GLOBAL: OnceLock<GlobalRegistry> = OnceLock::new();

#[derive(Debug)]
struct GlobalRegistry {
    limiters: Arc<PluginLimiters>,
    load_error: Option<Arc<ConfigError>>,
}

/// One [`DualLimiter`] per configured plugin.
#[derive(Debug)]
pub struct PluginLimiters {
    limiters: HashMap<String, DualLimiter>,
    // Set only on the fallback registry built when settings failed to load.
    load_error: Option<String>,
}

impl PluginLimiters {
    /// Build limiters on the system clock, calendar and thread sleeper.
    pub fn new(config: &LimitsConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    /// Start a builder for injecting time sources.
    pub fn builder(config: &LimitsConfig) -> PluginLimitersBuilder<'_> {
        PluginLimitersBuilder {
            config,
            clock: Arc::new(MonotonicClock::default()),
            sleeper: Arc::new(ThreadSleeper),
            calendar: Arc::new(SystemCalendar),
        }
    }

    /// Admit one call for `plugin`, blocking while it is minute-limited.
    ///
    /// # Errors
    /// [`LimitError::UnknownPlugin`] if no limiter is configured under that name;
    /// [`LimitError::SettingsUnavailable`] instead if this registry stands in for
    /// settings that failed to load; [`LimitError::QuotaExhausted`] if the plugin's
    /// month is used up.
    pub fn acquire(&self, plugin: &str) -> Result<(), LimitError> {
        self.lookup(plugin)?.acquire()
    }

    /// Like [`PluginLimiters::acquire`], with the bucket's first attempt at `now`.
    pub fn acquire_at(&self, plugin: &str, now: Duration) -> Result<(), LimitError> {
        self.lookup(plugin)?.acquire_at(now)
    }

    /// Admit one call only if both limits allow it now. Unknown plugins get `false`.
    pub fn try_acquire(&self, plugin: &str) -> bool {
        self.limiters.get(plugin).is_some_and(DualLimiter::try_acquire)
    }

    pub fn try_acquire_at(&self, plugin: &str, now: Duration) -> bool {
        self.limiters.get(plugin).is_some_and(|limiter| limiter.try_acquire_at(now))
    }

    /// Calls left this month; `0` for unknown plugins.
    pub fn monthly_remaining(&self, plugin: &str) -> u64 {
        self.limiters.get(plugin).map_or(0, DualLimiter::monthly_remaining)
    }

    pub fn get(&self, plugin: &str) -> Option<&DualLimiter> {
        self.limiters.get(plugin)
    }

    /// Configured plugin names, sorted.
    pub fn plugins(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.limiters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Snapshot every limiter, sorted by plugin.
    pub fn snapshot(&self) -> Vec<LimiterSnapshot> {
        let mut entries: Vec<LimiterSnapshot> =
            self.limiters.values().map(DualLimiter::snapshot).collect();
        entries.sort_by(|a, b| a.plugin.cmp(&b.plugin));
        entries
    }

    /// Call-site guard for `plugin` backed by this registry.
    pub fn guard(self: &Arc<Self>, plugin: impl Into<String>) -> PluginGuard {
        PluginGuard::new(Arc::clone(self), plugin)
    }

    /// Why the settings behind this registry failed to load, if they did.
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    // Empty registry that answers every blocking lookup with the load failure.
    fn unavailable(err: &ConfigError) -> Self {
        Self { limiters: HashMap::new(), load_error: Some(err.to_string()) }
    }

    fn lookup(&self, plugin: &str) -> Result<&DualLimiter, LimitError> {
        self.limiters.get(plugin).ok_or_else(|| {
            if let Some(reason) = &self.load_error {
                error!(
                    target: "autopiloot_limiter::registry",
                    plugin,
                    reason = %reason,
                    "plugin limits unavailable; settings failed to load"
                );
                return LimitError::SettingsUnavailable {
                    plugin: plugin.to_string(),
                    reason: reason.clone(),
                };
            }
            let configured: Vec<String> = self.plugins().into_iter().map(str::to_owned).collect();
            error!(
                target: "autopiloot_limiter::registry",
                plugin,
                configured = ?configured,
                "no limiter configured for plugin"
            );
            LimitError::UnknownPlugin { plugin: plugin.to_string(), configured }
        })
    }
}

/// Builder for [`PluginLimiters`]; every limiter shares the injected time sources.
#[derive(Debug)]
pub struct PluginLimitersBuilder<'a> {
    config: &'a LimitsConfig,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    calendar: Arc<dyn Calendar>,
}

impl PluginLimitersBuilder<'_> {
    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn calendar<C: Calendar + 'static>(mut self, calendar: C) -> Self {
        self.calendar = Arc::new(calendar);
        self
    }

    /// Resolve each plugin's limits and build its limiter.
    pub fn build(self) -> Result<PluginLimiters, ConfigError> {
        let limiters = self
            .config
            .resolved()?
            .into_iter()
            .map(|(name, limits)| {
                let limiter = DualLimiter::with_parts(
                    name.clone(),
                    limits,
                    Arc::clone(&self.clock),
                    Arc::clone(&self.sleeper),
                    Arc::clone(&self.calendar),
                );
                (name, limiter)
            })
            .collect::<HashMap<_, _>>();
        info!(
            target: "autopiloot_limiter::registry",
            plugins = limiters.len(),
            "plugin limiters built"
        );
        Ok(PluginLimiters { limiters, load_error: None })
    }
}

fn global_registry() -> &'static GlobalRegistry {
    GLOBAL.get_or_init(|| {
        match LimitsConfig::from_env().and_then(|config| PluginLimiters::new(&config)) {
            Ok(limiters) => GlobalRegistry { limiters: Arc::new(limiters), load_error: None },
            Err(err) => {
                error!(
                    target: "autopiloot_limiter::registry",
                    error = %err,
                    "failed to load plugin limits; global registry reports the load error"
                );
                GlobalRegistry {
                    limiters: Arc::new(PluginLimiters::unavailable(&err)),
                    load_error: Some(Arc::new(err)),
                }
            }
        }
    })
}

/// Process-wide registry, built on first use from [`LimitsConfig::from_env`].
///
/// Construction happens at most once even under concurrent first calls. If the
/// settings cannot be loaded the registry is empty and every blocking acquire fails
/// with [`LimitError::SettingsUnavailable`] carrying the load error; use
/// [`try_global`] to get the [`ConfigError`] itself. Applications that wire their own
/// registry should call [`install_global`] before anything calls this.
pub fn global() -> Arc<PluginLimiters> {
    Arc::clone(&global_registry().limiters)
}

/// Like [`global`], but fails with the settings error if the registry could not be
/// built from configuration.
pub fn try_global() -> Result<Arc<PluginLimiters>, Arc<ConfigError>> {
    let global = global_registry();
    match &global.load_error {
        Some(err) => Err(Arc::clone(err)),
        None => Ok(Arc::clone(&global.limiters)),
    }
}

/// Install `limiters` as the process-wide registry.
///
/// Returns the rejected registry if one was already installed or built.
pub fn install_global(limiters: Arc<PluginLimiters>) -> Result<(), Arc<PluginLimiters>> {
    GLOBAL
        .set(GlobalRegistry { limiters, load_error: None })
        .map_err(|rejected| rejected.limiters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedCalendar, ManualClock};
    use crate::config::LimitOverrides;
    use crate::sleeper::InstantSleeper;
    use std::sync::Mutex;
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone)]
    struct SharedWriter(Arc<Mutex<Vec<u8>>>);

    impl<'a> MakeWriter<'a> for SharedWriter {
        type Writer = SharedGuard;
        fn make_writer(&'a self) -> Self::Writer {
            SharedGuard(self.0.clone())
        }
    }

    struct SharedGuard(Arc<Mutex<Vec<u8>>>);
    impl std::io::Write for SharedGuard {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let mut guard = self.0.lock().unwrap();
            guard.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn registry() -> PluginLimiters {
        let config = LimitsConfig::default()
            .with_plugin(
                "linkedin_scraper",
                LimitOverrides { monthly: Some(2), per_minute: Some(60), burst: Some(1) },
            )
            .with_plugin("youtube", LimitOverrides::default());
        PluginLimiters::builder(&config)
            .clock(ManualClock::new())
            .sleeper(InstantSleeper)
            .calendar(FixedCalendar::at_month_start(2025, 1).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn builds_one_limiter_per_plugin() {
        let reg = registry();
        assert_eq!(reg.plugins(), ["linkedin_scraper", "youtube"]);
        let youtube = reg.get("youtube").unwrap();
        assert_eq!(youtube.limits().monthly, 10_000);
        assert_eq!(youtube.bucket().capacity(), 30.0);
    }

    #[test]
    fn unknown_plugin_asymmetry() {
        let reg = registry();
        let err = reg.acquire("nonexistent_plugin").unwrap_err();
        assert_eq!(
            err,
            LimitError::UnknownPlugin {
                plugin: "nonexistent_plugin".into(),
                configured: vec!["linkedin_scraper".into(), "youtube".into()],
            }
        );
        assert!(!reg.try_acquire("nonexistent_plugin"));
        assert_eq!(reg.monthly_remaining("nonexistent_plugin"), 0);
    }

    #[test]
    fn unknown_plugin_is_logged() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::fmt()
            .with_writer(BoxMakeWriter::new(SharedWriter(buffer.clone())))
            .with_target(true)
            .without_time()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let _ = registry().acquire("missing");

        let logs = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("no limiter configured for plugin"));
        assert!(logs.contains("autopiloot_limiter::registry"));
    }

    #[test]
    fn snapshot_is_sorted() {
        let reg = registry();
        reg.acquire("youtube").unwrap();
        let snap = reg.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].plugin, "linkedin_scraper");
        assert_eq!(snap[1].monthly_used, 1);
    }

    #[test]
    fn unavailable_registry_reports_load_error() {
        let err = ConfigError::InvalidLimits { plugin: "broken".into(), reason: "bad".into() };
        let reg = PluginLimiters::unavailable(&err);
        assert_eq!(reg.load_error(), Some(err.to_string().as_str()));

        let limit = reg.acquire("linkedin_scraper").unwrap_err();
        assert!(limit.is_settings_unavailable());
        assert!(limit.to_string().contains("invalid limits for plugin 'broken'"));
        assert!(!reg.try_acquire("linkedin_scraper"));
        assert_eq!(reg.monthly_remaining("linkedin_scraper"), 0);
        assert!(registry().load_error().is_none());
    }

    #[test]
    fn invalid_limits_fail_the_build() {
        let config = LimitsConfig::default()
            .with_plugin("broken", LimitOverrides { burst: Some(0), ..Default::default() });
        assert!(matches!(PluginLimiters::new(&config), Err(ConfigError::InvalidLimits { .. })));
    }
}
