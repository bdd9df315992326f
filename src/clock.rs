//! Time sources for the console.
//!
//! Components never read the system clock themselves; instants and wall
//! millis come in through `Clock` so reconnect backoff, poll cadence, and
//! frame pacing are all drivable from tests without sleeping.

use std::cell::Cell;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source of monotonic instants and wall-clock milliseconds.
pub trait Clock {
    /// Monotonic now, for deadlines and intervals.
    fn now(&self) -> Instant;
    /// Milliseconds since the Unix epoch, for cache-busting and log stamps.
    fn unix_millis(&self) -> u64;
}

/// System-backed clock used by the binaries.
#[derive(Clone, Copy, Debug, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Hand-advanced clock for deterministic scheduling tests.
pub struct ManualClock {
    base: Instant,
    elapsed: Cell<Duration>,
    epoch_ms: Cell<u64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
            epoch_ms: Cell::new(1_700_000_000_000),
        }
    }

    pub fn advance(&self, step: Duration) {
        self.elapsed.set(self.elapsed.get() + step);
        self.epoch_ms
            .set(self.epoch_ms.get() + step.as_millis() as u64);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed.get()
    }

    fn unix_millis(&self) -> u64 {
        self.epoch_ms.get()
    }
}

/// Fixed-interval deadline. The first firing is due immediately on start;
/// later firings land every `period` regardless of how long the work took.
#[derive(Debug)]
pub struct IntervalTimer {
    period: Duration,
    next_due: Option<Instant>,
}

impl IntervalTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_due: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.next_due = Some(now);
    }

    pub fn stop(&mut self) {
        self.next_due = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    /// Consume a due deadline and arm the next one.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        let Some(due) = self.next_due else {
            return false;
        };
        if now < due {
            return false;
        }
        self.next_due = Some(now + self.period);
        true
    }
}
