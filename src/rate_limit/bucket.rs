use crate::clock::{Clock, MonotonicClock};
use crate::sleeper::{Sleeper, ThreadSleeper};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Longest single sleep while waiting for tokens.
pub const MAX_WAIT_SLICE: Duration = Duration::from_millis(100);
/// Shortest sleep, so float residue cannot turn the wait into a spin.
pub const MIN_WAIT_SLICE: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Duration,
}

impl BucketState {
    // `now` earlier than `last_refill` refills nothing and leaves the timestamp alone.
    fn refill(&mut self, now: Duration, capacity: f64, rate: f64) {
        let elapsed = now.saturating_sub(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }
}

/// A Token Bucket rate limiter.
///
/// Replenishes tokens at `refill_per_second` up to `capacity` (the burst size). The
/// bucket starts full. Refill is lazy: it is computed whenever the bucket is touched,
/// never by a background task.
///
/// Callers are responsible for sane values: a non-positive capacity or refill rate
/// makes [`TokenBucket::acquire`] wait forever.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_second: f64,
    state: Mutex<BucketState>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl TokenBucket {
    /// Create a full bucket on the monotonic clock.
    pub fn new(capacity: f64, refill_per_second: f64) -> Self {
        Self::with_parts(
            capacity,
            refill_per_second,
            Arc::new(MonotonicClock::default()),
            Arc::new(ThreadSleeper),
        )
    }

    pub(crate) fn with_parts(
        capacity: f64,
        refill_per_second: f64,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let state = Mutex::new(BucketState { tokens: capacity, last_refill: clock.now() });
        Self { capacity, refill_per_second, state, clock, sleeper }
    }

    /// Override the clock (useful for deterministic tests). Refill restarts from the
    /// new clock's current time.
    pub fn with_clock<C: Clock + 'static>(self, clock: C) -> Self {
        self.with_shared_clock(Arc::new(clock))
    }

    pub(crate) fn with_shared_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner).last_refill = clock.now();
        self.clock = clock;
        self
    }

    /// Override how [`TokenBucket::acquire`] waits.
    pub fn with_sleeper<S: Sleeper + 'static>(self, sleeper: S) -> Self {
        self.with_shared_sleeper(Arc::new(sleeper))
    }

    pub(crate) fn with_shared_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_per_second(&self) -> f64 {
        self.refill_per_second
    }

    /// Tokens available right now.
    pub fn available(&self) -> f64 {
        let mut state = self.lock();
        state.refill(self.clock.now(), self.capacity, self.refill_per_second);
        state.tokens
    }

    /// How long until `tokens` could be taken, assuming no other consumers.
    pub fn time_until_available(&self, tokens: u32) -> Duration {
        let missing = f64::from(tokens) - self.available();
        if missing <= 0.0 {
            Duration::ZERO
        } else {
            wait_for(missing, self.refill_per_second)
        }
    }

    /// Take `tokens`, blocking until they are available.
    pub fn acquire(&self, tokens: u32) {
        self.acquire_at(tokens, self.clock.now());
    }

    /// Like [`TokenBucket::acquire`], evaluating the first attempt at `now`. Later
    /// attempts after sleeping read the bucket's clock.
    pub fn acquire_at(&self, tokens: u32, now: Duration) {
        let cost = f64::from(tokens);
        if cost > self.capacity {
            warn!(
                target: "autopiloot_limiter::bucket",
                requested = tokens,
                capacity = self.capacity,
                "token request exceeds bucket capacity and can never be satisfied"
            );
        }

        let mut now = now;
        loop {
            let wait = {
                let mut state = self.lock();
                state.refill(now, self.capacity, self.refill_per_second);
                if state.tokens >= cost {
                    state.tokens -= cost;
                    return;
                }
                wait_for(cost - state.tokens, self.refill_per_second)
            };

            let slice = wait.clamp(MIN_WAIT_SLICE, MAX_WAIT_SLICE);
            debug!(
                target: "autopiloot_limiter::bucket",
                wait_ms = millis(wait),
                slice_ms = millis(slice),
                "waiting for tokens"
            );
            self.sleeper.sleep(slice);
            now = self.clock.now();
        }
    }

    /// Take `tokens` if available right now. Returns `false` without side effects
    /// otherwise.
    pub fn try_acquire(&self, tokens: u32) -> bool {
        self.try_acquire_at(tokens, self.clock.now())
    }

    pub fn try_acquire_at(&self, tokens: u32, now: Duration) -> bool {
        let cost = f64::from(tokens);
        let mut state = self.lock();
        state.refill(now, self.capacity, self.refill_per_second);
        if state.tokens >= cost {
            state.tokens -= cost;
            true
        } else {
            false
        }
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn wait_for(missing: f64, rate: f64) -> Duration {
    if rate > 0.0 {
        Duration::try_from_secs_f64(missing / rate).unwrap_or(Duration::MAX)
    } else {
        Duration::MAX
    }
}
