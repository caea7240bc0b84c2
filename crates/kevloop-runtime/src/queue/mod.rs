//! Kernel event queue abstraction.
//!
//! A `KernelQueue` is the OS readiness facility the engine drives, modelled
//! on kevent(2): per-descriptor read and write filters that are enabled,
//! disabled or deleted through batched change lists, signals folded into
//! the same queue, and a blocking wait that returns a batch of
//! notifications.
//!
//! # Implementors
//!
//! - `Kqueue` (macOS / BSD): `nix::sys::event`.
//!
//! Tests drive the engine with an in-memory scripted queue instead.

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

use kevloop_core::Signal;

cfg_if::cfg_if! {
    if #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "dragonfly"
    ))] {
        mod kqueue;
        pub use kqueue::Kqueue;
    }
}

/// Which kernel filter a change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Read,
    Write,
}

/// What to do with a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterAction {
    /// Add the filter if needed and enable it
    Enable,
    /// Add the filter if needed and disable it
    Disable,
    /// Remove the filter
    Delete,
}

/// One entry of a change list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterChange {
    pub fd: RawFd,
    pub filter: Filter,
    pub action: FilterAction,
}

impl FilterChange {
    #[inline]
    pub const fn new(fd: RawFd, filter: Filter, action: FilterAction) -> Self {
        Self { fd, filter, action }
    }
}

/// Kind of readiness reported by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Readable,
    Writable,
    /// `ident` is the signal number
    Signal,
}

/// One entry returned by [`KernelQueue::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    /// Descriptor, or signal number for [`NotificationKind::Signal`]
    pub ident: usize,
    pub kind: NotificationKind,
    /// End-of-stream flagged by the kernel
    pub eof: bool,
}

impl Notification {
    pub const fn readable(fd: usize) -> Self {
        Self { ident: fd, kind: NotificationKind::Readable, eof: false }
    }

    pub const fn writable(fd: usize) -> Self {
        Self { ident: fd, kind: NotificationKind::Writable, eof: false }
    }

    pub const fn eof(fd: usize) -> Self {
        Self { ident: fd, kind: NotificationKind::Readable, eof: true }
    }

    pub const fn signal(sig: Signal) -> Self {
        Self { ident: sig as usize, kind: NotificationKind::Signal, eof: false }
    }
}

/// OS readiness facility driven by [`QueueEngine`](crate::engine::QueueEngine).
///
/// **Contract:**
/// - `apply()` submits the whole change list in one call.
/// - `wait()` is the only call that may block.
pub trait KernelQueue {
    /// Engine name reported by `Engine::name`, e.g. "kqueue()"
    const ENGINE_NAME: &'static str;

    /// Name of the wait call, used in diagnostics and the restart reason
    const WAIT_CALL: &'static str;

    /// Submit a change list.
    fn apply(&mut self, changes: &[FilterChange]) -> io::Result<()>;

    /// Start delivering `signal` as a notification.
    fn watch_signal(&mut self, signal: Signal) -> io::Result<()>;

    /// Set the signal's disposition to ignore so only the queue sees it.
    fn ignore_signal(&mut self, signal: Signal) -> io::Result<()> {
        crate::signal::ignore(signal)
    }

    /// Block for up to `timeout` (`None` = forever) and replace the
    /// contents of `out` with at most `max` notifications. Returns how
    /// many were written.
    fn wait(
        &mut self,
        out: &mut Vec<Notification>,
        max: usize,
        timeout: Option<Duration>,
    ) -> io::Result<usize>;

    /// Pending `SO_ERROR` on a socket; 0 if none. If the query itself
    /// fails its errno is returned instead.
    fn pending_error(&self, fd: RawFd) -> i32;
}
