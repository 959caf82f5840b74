#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Autopiloot limiter
//!
//! In-process rate limiting for third-party API plugins. Every plugin gets two
//! limits, enforced together on each call:
//!
//! - **Per-minute rate** with a burst allowance (token bucket, may block briefly)
//! - **Calendar-month quota** (hard ceiling, fails fast, resets on month rollover)
//!
//! ## Quick Start
//!
//! ```rust
//! use autopiloot_limiter::{LimitOverrides, LimitsConfig, PluginLimiters};
//! use std::sync::Arc;
//!
//! let config = LimitsConfig::default().with_plugin(
//!     "linkedin_scraper",
//!     LimitOverrides { monthly: Some(5000), per_minute: Some(30), burst: Some(10) },
//! );
//! let limiters = Arc::new(PluginLimiters::new(&config).unwrap());
//!
//! // Non-blocking: poll and skip when limited.
//! if limiters.try_acquire("linkedin_scraper") {
//!     // call the API
//! }
//!
//! // Blocking: wait out the minute limit, fail on an exhausted month.
//! let profile = limiters.guard("linkedin_scraper").call(|| "profile json");
//! assert!(profile.is_ok());
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod rate_limit;
pub mod registry;
pub mod sleeper;

// Re-exports
pub use clock::{Calendar, Clock, FixedCalendar, ManualClock, MonotonicClock, MonthKey, SystemCalendar};
pub use config::{LimitOverrides, LimitsConfig, PluginLimits};
pub use error::{ConfigError, GuardError, LimitError, QuotaExhausted};
pub use guard::{with_plugin_limit, PluginGuard};
pub use rate_limit::{
    DualLimiter, LimiterSnapshot, MonthlyQuotaTracker, PluginLimitLayer, PluginLimitService,
    TokenBucket,
};
pub use registry::{global, install_global, try_global, PluginLimiters, PluginLimitersBuilder};
pub use sleeper::{InstantSleeper, Sleeper, ThreadSleeper, TrackingSleeper};
