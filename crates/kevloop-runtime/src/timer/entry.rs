//! Timer entry types

use std::time::{Duration, Instant};

use kevloop_core::{TimerAction, TimerCallback, TimerFired, TimerHandle};

/// Type of timer - affects behavior after it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerType {
    /// Fire once, then drop
    OneShot,

    /// Reschedule after every firing
    Periodic {
        /// Interval between firings
        interval: Duration,
    },
}

impl TimerType {
    #[inline]
    pub fn is_periodic(&self) -> bool {
        matches!(self, TimerType::Periodic { .. })
    }

    #[inline]
    pub fn periodic_interval(&self) -> Option<Duration> {
        match self {
            TimerType::Periodic { interval } => Some(*interval),
            TimerType::OneShot => None,
        }
    }
}

/// Timer entry - owned by the timer queue while scheduled
pub struct TimerEntry {
    /// Unique handle for cancellation
    pub handle: TimerHandle,

    /// When this timer should fire next
    pub deadline: Instant,

    pub timer_type: TimerType,

    callback: TimerCallback,
}

impl TimerEntry {
    pub fn new(deadline: Instant, timer_type: TimerType, callback: TimerCallback) -> Self {
        Self {
            handle: TimerHandle::new(),
            deadline,
            timer_type,
            callback,
        }
    }

    /// One-shot timer `delay` after `now`.
    #[inline]
    pub fn oneshot(now: Instant, delay: Duration, callback: TimerCallback) -> Self {
        Self::new(now + delay, TimerType::OneShot, callback)
    }

    /// Periodic timer, first firing one `interval` after `now`.
    #[inline]
    pub fn periodic(now: Instant, interval: Duration, callback: TimerCallback) -> Self {
        Self::new(now + interval, TimerType::Periodic { interval }, callback)
    }

    /// Run the callback. `now` is the loop's sampled time.
    pub fn fire(&mut self, now: Instant) -> TimerAction {
        let info = TimerFired {
            handle: self.handle,
            deadline: self.deadline,
            now,
        };
        (self.callback)(&info)
    }

    /// Move the deadline forward for another round. Returns false for
    /// one-shot timers, which are done after their first firing.
    pub fn reschedule(&mut self, now: Instant) -> bool {
        match self.timer_type {
            TimerType::Periodic { interval } => {
                self.deadline = now + interval;
                true
            }
            TimerType::OneShot => false,
        }
    }
}

impl std::fmt::Debug for TimerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerEntry")
            .field("handle", &self.handle)
            .field("deadline", &self.deadline)
            .field("timer_type", &self.timer_type)
            .finish_non_exhaustive()
    }
}
