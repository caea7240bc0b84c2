//! Timer service contract consumed by the event engine
//!
//! The engine only needs three things from a timer subsystem: how long it
//! may sleep, a way to run whatever is due, and a way to schedule its own
//! periodic housekeeping. The heap-backed implementation lives in
//! `kevloop-runtime`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Unique handle for cancelling a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u64);

impl TimerHandle {
    /// Generate a new unique timer handle
    #[inline]
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        TimerHandle(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TimerHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// What a timer wants after its callback ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Periodic timers are rescheduled; one-shot timers are dropped anyway.
    Keep,
    /// Deregister the timer now.
    Cancel,
}

/// Passed to a timer callback when it fires.
#[derive(Debug, Clone, Copy)]
pub struct TimerFired {
    pub handle: TimerHandle,
    /// Deadline the timer was scheduled for
    pub deadline: Instant,
    /// Time sampled by the loop for this iteration
    pub now: Instant,
}

pub type TimerCallback = Box<dyn FnMut(&TimerFired) -> TimerAction>;

/// Timer subsystem as seen by the dispatch loop.
pub trait TimerService {
    /// How long until the earliest deadline, `None` if nothing is scheduled.
    /// A deadline already in the past yields `Some(Duration::ZERO)`.
    fn time_until_next_deadline(&self, now: Instant) -> Option<Duration>;

    /// Run every timer whose deadline is `<= now`, exactly once each, in
    /// deadline order. Returns how many fired.
    fn run_due_timers(&mut self, now: Instant) -> usize;

    /// Schedule `callback` every `interval`, first firing one interval
    /// after `now`.
    fn add_periodic(&mut self, now: Instant, interval: Duration, callback: TimerCallback)
        -> TimerHandle;

    /// Schedule `callback` once, `delay` after `now`.
    fn add_oneshot(&mut self, now: Instant, delay: Duration, callback: TimerCallback)
        -> TimerHandle;

    /// Cancel a scheduled timer. Returns false if it was unknown or
    /// already gone.
    fn cancel(&mut self, handle: TimerHandle) -> bool;

    /// Number of live timers.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
