//! Timer subsystem
//!
//! `TimerQueue` is the `TimerService` the dispatch loop consumes: it tells
//! the loop how long it may block and runs whatever is due once the wait
//! returns.
//!
//! ```text
//!   QueueEngine::run_once
//!        │ time_until_next_deadline(now) ──► wait timeout
//!        │ ... dispatch notifications ...
//!        └ run_due_timers(now) ──► callbacks (deadline order)
//! ```

mod entry;
mod heap;

pub use entry::{TimerEntry, TimerType};
pub use heap::{TimerQueue, TimerStats};
