use crate::clock::{until_next_month, Calendar, MonthKey, SystemCalendar};
use crate::error::QuotaExhausted;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

#[derive(Debug)]
struct QuotaState {
    current_month: MonthKey,
    count: u64,
}

/// Counts calls per calendar month against a hard ceiling.
///
/// The counter belongs to one month at a time. Every read or write first compares
/// the calendar's month with the tracked one and starts a fresh count on rollover,
/// so no timer is needed.
#[derive(Debug)]
pub struct MonthlyQuotaTracker {
    monthly_limit: u64,
    state: Mutex<QuotaState>,
    calendar: Arc<dyn Calendar>,
}

impl MonthlyQuotaTracker {
    /// Tracker for the current UTC month.
    pub fn new(monthly_limit: u64) -> Self {
        Self::with_calendar_arc(monthly_limit, Arc::new(SystemCalendar))
    }

    /// Override the calendar (useful for rollover tests). The count restarts in the
    /// calendar's current month.
    pub fn with_calendar<C: Calendar + 'static>(self, calendar: C) -> Self {
        Self::with_calendar_arc(self.monthly_limit, Arc::new(calendar))
    }

    pub(crate) fn with_calendar_arc(monthly_limit: u64, calendar: Arc<dyn Calendar>) -> Self {
        let state = QuotaState { current_month: calendar.current_month(), count: 0 };
        Self { monthly_limit, state: Mutex::new(state), calendar }
    }

    pub fn limit(&self) -> u64 {
        self.monthly_limit
    }

    /// Calls consumed in the current month.
    pub fn used(&self) -> u64 {
        self.lock_current().count
    }

    /// Calls left in the current month.
    pub fn remaining(&self) -> u64 {
        self.monthly_limit.saturating_sub(self.lock_current().count)
    }

    /// Month the counter currently applies to.
    pub fn current_month(&self) -> MonthKey {
        self.lock_current().current_month
    }

    /// Consume `tokens` or fail immediately; never blocks.
    pub fn acquire(&self, tokens: u64) -> Result<(), QuotaExhausted> {
        let mut state = self.lock_current();
        if !self.fits(&state, tokens) {
            let err = QuotaExhausted {
                month: state.current_month,
                used: state.count,
                limit: self.monthly_limit,
                requested: tokens,
                resets_in: until_next_month(&self.calendar.now()),
            };
            warn!(
                target: "autopiloot_limiter::monthly",
                month = %err.month,
                used = err.used,
                limit = err.limit,
                hours_until_reset = err.hours_until_reset(),
                "monthly quota exhausted"
            );
            return Err(err);
        }
        state.count += tokens;
        Ok(())
    }

    /// Consume `tokens` if the month has room; no mutation otherwise.
    pub fn try_acquire(&self, tokens: u64) -> bool {
        self.try_reserve(tokens).is_some()
    }

    /// Like [`MonthlyQuotaTracker::try_acquire`], returning the month charged.
    pub(crate) fn try_reserve(&self, tokens: u64) -> Option<MonthKey> {
        let mut state = self.lock_current();
        if !self.fits(&state, tokens) {
            return None;
        }
        state.count += tokens;
        Some(state.current_month)
    }

    /// Give back a reservation made in `month`. A reservation from a month that has
    /// since rolled over is dropped: the new month never saw it.
    pub(crate) fn refund(&self, tokens: u64, month: MonthKey) {
        let mut state = self.lock_current();
        if state.current_month == month {
            state.count = state.count.saturating_sub(tokens);
        } else {
            debug!(
                target: "autopiloot_limiter::monthly",
                reserved_in = %month,
                current = %state.current_month,
                "refund skipped after month rollover"
            );
        }
    }

    fn fits(&self, state: &QuotaState, tokens: u64) -> bool {
        state.count.checked_add(tokens).is_some_and(|total| total <= self.monthly_limit)
    }

    // Lock and apply the month-rollover reset before handing out the state.
    fn lock_current(&self) -> MutexGuard<'_, QuotaState> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let month = self.calendar.current_month();
        if month != state.current_month {
            debug!(
                target: "autopiloot_limiter::monthly",
                from = %state.current_month,
                to = %month,
                dropped = state.count,
                "monthly quota rolled over"
            );
            state.current_month = month;
            state.count = 0;
        }
        state
    }
}
