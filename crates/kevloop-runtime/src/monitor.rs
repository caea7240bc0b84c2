//! Wait-failure monitor
//!
//! Counts consecutive failures of the kernel wait call. The first failure
//! of a streak schedules a periodic decay timer that forgets one failure
//! per period and deregisters itself once the count is back to zero. When
//! the count reaches the threshold the process is restarted.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use kevloop_core::{kerror, kdebug, Process, TimerAction, TimerService};

pub struct ErrorMonitor {
    /// Backend label used in the restart reason, e.g. "kevent"
    label: &'static str,
    threshold: u32,
    expire: Duration,
    errors: Rc<Cell<u32>>,
}

impl ErrorMonitor {
    pub fn new(label: &'static str, threshold: u32, expire: Duration) -> Self {
        Self {
            label,
            threshold,
            expire,
            errors: Rc::new(Cell::new(0)),
        }
    }

    #[inline]
    pub fn consecutive_errors(&self) -> u32 {
        self.errors.get()
    }

    #[inline]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Count one failure. Returns true if the threshold was reached and
    /// `process` was asked to restart.
    pub fn record_failure(
        &mut self,
        now: Instant,
        timers: &mut dyn TimerService,
        process: &Process,
    ) -> bool {
        let count = self.errors.get();
        if count == 0 {
            let errors = Rc::clone(&self.errors);
            let label = self.label;
            timers.add_periodic(
                now,
                self.expire,
                Box::new(move |_| {
                    let left = errors.get().saturating_sub(1);
                    errors.set(left);
                    kdebug!(System: "{} error count decayed to {}", label, left);
                    if left == 0 {
                        TimerAction::Cancel
                    } else {
                        TimerAction::Keep
                    }
                }),
            );
        }

        let count = count + 1;
        self.errors.set(count);

        if count >= self.threshold {
            kerror!(System: "{} failed {} times in a row, restarting", self.label, count);
            process.restart(&format!("too many {} errors", self.label));
            return true;
        }
        false
    }
}

impl std::fmt::Debug for ErrorMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorMonitor")
            .field("label", &self.label)
            .field("errors", &self.errors.get())
            .field("threshold", &self.threshold)
            .finish()
    }
}
