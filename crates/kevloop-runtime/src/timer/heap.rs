//! BinaryHeap-based timer queue
//!
//! # Complexity
//!
//! - Insert: O(log n)
//! - Cancel: O(1) amortized (lazy cancellation)
//! - Run due: O(k log n) where k = number of due timers
//! - Next deadline: O(1)
//!
//! # Cancellation Strategy
//!
//! Entries live in a map keyed by handle; the heap only orders
//! `(deadline, handle)` pairs. Cancelling removes the map entry and leaves
//! the heap slot behind. A heap slot is stale when its handle is gone from
//! the map or its deadline no longer matches (a periodic timer that was
//! rescheduled). Stale slots are discarded whenever they reach the top, so
//! the top of the heap is always live.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

use kevloop_core::{TimerAction, TimerCallback, TimerHandle, TimerService};

use super::entry::TimerEntry;

/// Wrapper for heap ordering (min-heap by deadline)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapEntry {
    deadline: Instant,
    handle: TimerHandle,
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest deadline first)
        // Tie-break by handle so equal deadlines fire in insertion order
        match other.deadline.cmp(&self.deadline) {
            Ordering::Equal => other.handle.cmp(&self.handle),
            ord => ord,
        }
    }
}

/// Heap-backed `TimerService`. Single-threaded; owned by the event loop.
pub struct TimerQueue {
    heap: BinaryHeap<HeapEntry>,
    entries: HashMap<TimerHandle, TimerEntry>,

    /// Stats: total timers inserted
    total_inserted: u64,
    /// Stats: total callback invocations
    total_fired: u64,
    /// Stats: total timers cancelled (explicitly or by their callback)
    total_cancelled: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            entries: HashMap::with_capacity(capacity),
            total_inserted: 0,
            total_fired: 0,
            total_cancelled: 0,
        }
    }

    /// Earliest live deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.deadline)
    }

    /// Get statistics snapshot
    pub fn stats(&self) -> TimerStats {
        TimerStats {
            active: self.entries.len(),
            pending_cancellations: self.heap.len().saturating_sub(self.entries.len()),
            total_inserted: self.total_inserted,
            total_fired: self.total_fired,
            total_cancelled: self.total_cancelled,
        }
    }

    fn insert(&mut self, entry: TimerEntry) -> TimerHandle {
        let handle = entry.handle;
        self.schedule(entry);
        self.total_inserted += 1;
        handle
    }

    fn schedule(&mut self, entry: TimerEntry) {
        self.heap.push(HeapEntry {
            deadline: entry.deadline,
            handle: entry.handle,
        });
        self.entries.insert(entry.handle, entry);
    }

    fn is_stale(&self, slot: &HeapEntry) -> bool {
        self.entries
            .get(&slot.handle)
            .map_or(true, |e| e.deadline != slot.deadline)
    }

    fn purge_stale_top(&mut self) {
        while let Some(top) = self.heap.peek() {
            if !self.is_stale(top) {
                break;
            }
            self.heap.pop();
        }
        if self.entries.is_empty() {
            self.heap.clear();
        }
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerService for TimerQueue {
    fn time_until_next_deadline(&self, now: Instant) -> Option<Duration> {
        self.next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    fn run_due_timers(&mut self, now: Instant) -> usize {
        let mut fired = 0;
        let mut to_reschedule = Vec::new();

        while let Some(&slot) = self.heap.peek() {
            if slot.deadline > now {
                break; // Heap is sorted, nothing else is due
            }
            self.heap.pop();

            if self.is_stale(&slot) {
                continue;
            }
            let Some(mut entry) = self.entries.remove(&slot.handle) else {
                continue;
            };

            let action = entry.fire(now);
            fired += 1;
            self.total_fired += 1;

            match action {
                TimerAction::Cancel => self.total_cancelled += 1,
                TimerAction::Keep => {
                    if entry.reschedule(now) {
                        to_reschedule.push(entry);
                    }
                }
            }
        }

        // Periodic timers rejoin after the sweep so each fires at most once
        // per call, however short its interval.
        for entry in to_reschedule {
            self.schedule(entry);
        }

        self.purge_stale_top();
        fired
    }

    fn add_periodic(
        &mut self,
        now: Instant,
        interval: Duration,
        callback: TimerCallback,
    ) -> TimerHandle {
        assert!(!interval.is_zero(), "periodic timer interval must be > 0");
        self.insert(TimerEntry::periodic(now, interval, callback))
    }

    fn add_oneshot(&mut self, now: Instant, delay: Duration, callback: TimerCallback) -> TimerHandle {
        self.insert(TimerEntry::oneshot(now, delay, callback))
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        if self.entries.remove(&handle).is_none() {
            return false;
        }
        self.total_cancelled += 1;
        self.purge_stale_top();
        true
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Statistics for TimerQueue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerStats {
    /// Currently scheduled timers
    pub active: usize,
    /// Cancelled slots still sitting in the heap
    pub pending_cancellations: usize,
    /// Total timers inserted (lifetime)
    pub total_inserted: u64,
    /// Total callback invocations (lifetime)
    pub total_fired: u64,
    /// Total timers cancelled (lifetime)
    pub total_cancelled: u64,
}
