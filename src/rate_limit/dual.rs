use crate::clock::{Calendar, Clock, MonthKey, MonotonicClock, SystemCalendar};
use crate::config::PluginLimits;
use crate::error::LimitError;
use crate::rate_limit::bucket::TokenBucket;
use crate::rate_limit::monthly::MonthlyQuotaTracker;
use crate::sleeper::{Sleeper, ThreadSleeper};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Point-in-time view of one plugin's limiter.
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterSnapshot {
    pub plugin: String,
    pub tokens_available: f64,
    pub burst: u32,
    pub month: MonthKey,
    pub monthly_used: u64,
    pub monthly_limit: u64,
}

impl LimiterSnapshot {
    pub fn monthly_remaining(&self) -> u64 {
        self.monthly_limit.saturating_sub(self.monthly_used)
    }
}

/// Per-plugin gate enforcing a calendar-month ceiling and a per-minute rate.
///
/// The monthly check always runs first, so a call rejected for the month never
/// touches the bucket.
#[derive(Debug)]
pub struct DualLimiter {
    plugin: String,
    limits: PluginLimits,
    minute: TokenBucket,
    monthly: MonthlyQuotaTracker,
}

impl DualLimiter {
    /// Limiter on the system clock, calendar and thread sleeper.
    pub fn new(plugin: impl Into<String>, limits: PluginLimits) -> Self {
        Self::with_parts(
            plugin,
            limits,
            Arc::new(MonotonicClock::default()),
            Arc::new(ThreadSleeper),
            Arc::new(SystemCalendar),
        )
    }

    pub(crate) fn with_parts(
        plugin: impl Into<String>,
        limits: PluginLimits,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
        calendar: Arc<dyn Calendar>,
    ) -> Self {
        let minute = TokenBucket::with_parts(
            f64::from(limits.burst),
            limits.refill_per_second(),
            clock,
            sleeper,
        );
        let monthly = MonthlyQuotaTracker::with_calendar_arc(limits.monthly, calendar);
        Self { plugin: plugin.into(), limits, minute, monthly }
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Limits this limiter was built from.
    pub fn limits(&self) -> &PluginLimits {
        &self.limits
    }

    pub fn bucket(&self) -> &TokenBucket {
        &self.minute
    }

    pub fn quota(&self) -> &MonthlyQuotaTracker {
        &self.monthly
    }

    /// Admit one call: fail fast on the month, then wait for the per-minute bucket.
    pub fn acquire(&self) -> Result<(), LimitError> {
        self.charge_month()?;
        self.minute.acquire(1);
        Ok(())
    }

    /// Like [`DualLimiter::acquire`], with the bucket's first attempt at `now`.
    pub fn acquire_at(&self, now: Duration) -> Result<(), LimitError> {
        self.charge_month()?;
        self.minute.acquire_at(1, now);
        Ok(())
    }

    /// Admit one call only if both limits allow it right now.
    ///
    /// The month is reserved first and refunded when the bucket is empty, so calls
    /// that are merely minute-limited do not burn monthly quota.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_with(|bucket| bucket.try_acquire(1))
    }

    pub fn try_acquire_at(&self, now: Duration) -> bool {
        self.try_acquire_with(|bucket| bucket.try_acquire_at(1, now))
    }

    pub fn monthly_remaining(&self) -> u64 {
        self.monthly.remaining()
    }

    pub fn snapshot(&self) -> LimiterSnapshot {
        LimiterSnapshot {
            plugin: self.plugin.clone(),
            tokens_available: self.minute.available(),
            burst: self.limits.burst,
            month: self.monthly.current_month(),
            monthly_used: self.monthly.used(),
            monthly_limit: self.monthly.limit(),
        }
    }

    fn charge_month(&self) -> Result<(), LimitError> {
        self.monthly
            .acquire(1)
            .map_err(|source| LimitError::QuotaExhausted { plugin: self.plugin.clone(), source })
    }

    fn try_acquire_with(&self, take_token: impl FnOnce(&TokenBucket) -> bool) -> bool {
        let Some(month) = self.monthly.try_reserve(1) else {
            return false;
        };
        if take_token(&self.minute) {
            return true;
        }
        self.monthly.refund(1, month);
        debug!(
            target: "autopiloot_limiter::dual",
            plugin = %self.plugin,
            "minute bucket empty; monthly reservation refunded"
        );
        false
    }
}
