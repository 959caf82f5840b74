//! Time sources used by the limiters.
//!
//! Two kinds of time are involved: a monotonic [`Clock`] that drives token-bucket
//! refill, and a wall-clock [`Calendar`] that decides which calendar month a
//! quota counter belongs to. Both are traits so tests can fake them.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Clock abstraction so timing can be faked in tests.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Time elapsed since the clock's origin. Must never go backwards.
    fn now(&self) -> Duration;
}

/// Monotonic clock backed by `Instant::now()`.
///
/// Notes: resets when the process restarts, which is fine because bucket state is
/// not persisted either.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self { start: Instant::now() }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Manually driven clock starting at zero. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(duration_to_nanos(by), Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, to: Duration) {
        self.nanos.store(duration_to_nanos(to), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

fn duration_to_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Wall-clock source used for calendar-month bookkeeping.
pub trait Calendar: Send + Sync + fmt::Debug {
    fn now(&self) -> NaiveDateTime;

    /// Month the current instant falls in.
    fn current_month(&self) -> MonthKey {
        MonthKey::of(&self.now())
    }
}

/// Calendar reading the system time in UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCalendar;

impl Calendar for SystemCalendar {
    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

/// Settable calendar for tests. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct FixedCalendar {
    now: Arc<Mutex<NaiveDateTime>>,
}

impl FixedCalendar {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now: Arc::new(Mutex::new(now)) }
    }

    /// Start at midnight on the first day of `year-month`. Returns `None` for an
    /// invalid month.
    pub fn at_month_start(year: i32, month: u32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?;
        Some(Self::new(start))
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }
}

impl Calendar for FixedCalendar {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Identifies a calendar month; formats as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    /// Month containing `at`.
    pub fn of(at: &NaiveDateTime) -> Self {
        Self { year: at.year(), month: at.month() }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Month number, 1 through 12.
    pub fn month(&self) -> u32 {
        self.month
    }

    /// The following calendar month.
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    /// Midnight on day 1 of this month, if representable.
    pub fn start(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)?.and_hms_opt(0, 0, 0)
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Time from `at` until midnight on the first day of the following month.
pub fn until_next_month(at: &NaiveDateTime) -> Duration {
    MonthKey::of(at)
        .next()
        .start()
        .and_then(|boundary| (boundary - *at).to_std().ok())
        .unwrap_or(Duration::ZERO)
}
