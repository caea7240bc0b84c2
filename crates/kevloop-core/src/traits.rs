//! Engine traits
//!
//! These define the contract every readiness backend (kqueue, poll, ...)
//! satisfies, and the interface the dispatch loop uses to reach the
//! application.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::error::EngineResult;
use crate::event::{Event, Signal};
use crate::process::Process;
use crate::socket::SocketRef;
use crate::state::{EventMask, SocketState};
use crate::timer::TimerService;

/// Time sampled once per loop iteration; every event delivered in that
/// iteration observes the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub instant: Instant,
    pub wall: SystemTime,
}

impl Timestamp {
    pub fn sample() -> Self {
        Self {
            instant: Instant::now(),
            wall: SystemTime::now(),
        }
    }

    /// Wall-clock seconds since the epoch.
    pub fn unix_secs(&self) -> u64 {
        self.wall
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Socket and signal registration. Available to handlers while the loop
/// is dispatching.
pub trait Registrar {
    /// Deliver `signal` through the event loop instead of a handler. The
    /// signal's default disposition is set to ignore.
    fn register_signal(&mut self, signal: Signal);

    /// Start watching a socket. Fails (logged) if its descriptor does not
    /// fit in the registry.
    ///
    /// # Panics
    ///
    /// If another socket already occupies the descriptor's slot.
    fn add(&mut self, sock: &SocketRef) -> EngineResult<()>;

    /// Socket moves to `state`; kernel interest is adjusted by delta.
    ///
    /// # Panics
    ///
    /// If `sock` is not the socket registered for its descriptor.
    fn change_state(&mut self, sock: &SocketRef, state: SocketState);

    /// Socket asks for a different event mask; kernel interest is adjusted
    /// by delta.
    ///
    /// # Panics
    ///
    /// If `sock` is not the socket registered for its descriptor.
    fn change_events(&mut self, sock: &SocketRef, events: EventMask);

    /// Stop watching a socket. Kernel interest for both directions is
    /// deleted unconditionally.
    ///
    /// # Panics
    ///
    /// If `sock` is not the socket registered for its descriptor.
    fn remove(&mut self, sock: &SocketRef);
}

/// A readiness backend.
pub trait Engine: Registrar {
    /// Backend name, e.g. "kqueue()"
    fn name(&self) -> &'static str;

    /// Create the OS facility and a registry for `max_sockets`
    /// descriptors. `EngineError::Unavailable` means the caller should try
    /// another backend.
    fn init(&mut self, max_sockets: usize) -> EngineResult<()>;

    /// Registry capacity fixed by `init`.
    fn capacity(&self) -> usize;

    /// Time sampled at the start of the current (or last) iteration.
    fn now(&self) -> Timestamp;

    /// Dispatch loop. Returns once `process` is no longer running.
    fn run(
        &mut self,
        timers: &mut dyn TimerService,
        process: &Process,
        handler: &mut dyn EventHandler,
    );
}

/// Everything a handler may touch while an event is being dispatched.
pub struct Context<'a> {
    pub sockets: &'a mut dyn Registrar,
    pub timers: &'a mut dyn TimerService,
    pub process: &'a Process,
    pub now: Timestamp,
}

/// Application side of the loop.
pub trait EventHandler {
    fn on_event(&mut self, event: Event, cx: &mut Context<'_>);
}

impl<F> EventHandler for F
where
    F: FnMut(Event, &mut Context<'_>),
{
    fn on_event(&mut self, event: Event, cx: &mut Context<'_>) {
        self(event, cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_timestamp_unix_secs() {
        let ts = Timestamp {
            instant: Instant::now(),
            wall: UNIX_EPOCH + Duration::from_secs(1_000),
        };
        assert_eq!(ts.unix_secs(), 1_000);
    }
}
