//! `Kqueue`: kevent(2) backed `KernelQueue` for macOS and the BSDs.
//!
//! Read and write interest map to `EVFILT_READ` / `EVFILT_WRITE` filters
//! that stay registered and are toggled with `EV_ENABLE` / `EV_DISABLE`.
//! Trapped signals arrive as `EVFILT_SIGNAL` events.

use std::io;
use std::os::fd::{BorrowedFd, RawFd};
use std::time::Duration;

use nix::sys::event::{EventFilter, EventFlag, FilterFlag, KEvent, Kqueue as NixKqueue};
use nix::sys::socket::{getsockopt, sockopt};

use kevloop_core::Signal;

use super::{Filter, FilterAction, FilterChange, KernelQueue, Notification, NotificationKind};

pub struct Kqueue {
    kq: NixKqueue,
    events: Vec<KEvent>,
}

fn empty_kevent() -> KEvent {
    KEvent::new(
        0,
        EventFilter::EVFILT_READ,
        EventFlag::empty(),
        FilterFlag::empty(),
        0,
        0,
    )
}

fn to_kevent(change: &FilterChange) -> KEvent {
    let filter = match change.filter {
        Filter::Read => EventFilter::EVFILT_READ,
        Filter::Write => EventFilter::EVFILT_WRITE,
    };
    let flags = match change.action {
        FilterAction::Enable => EventFlag::EV_ADD | EventFlag::EV_ENABLE,
        FilterAction::Disable => EventFlag::EV_ADD | EventFlag::EV_DISABLE,
        FilterAction::Delete => EventFlag::EV_DELETE,
    };
    KEvent::new(change.fd as usize, filter, flags, FilterFlag::empty(), 0, 0)
}

fn to_timespec(d: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    }
}

impl Kqueue {
    /// Create a new kqueue. Fails if the kernel refuses (e.g. fd limit).
    pub fn open() -> io::Result<Self> {
        let kq = NixKqueue::new().map_err(io::Error::from)?;
        Ok(Self {
            kq,
            events: Vec::new(),
        })
    }
}

impl KernelQueue for Kqueue {
    const ENGINE_NAME: &'static str = "kqueue()";
    const WAIT_CALL: &'static str = "kevent";

    fn apply(&mut self, changes: &[FilterChange]) -> io::Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let list: Vec<KEvent> = changes.iter().map(to_kevent).collect();
        self.kq
            .kevent(&list, &mut [], None)
            .map(|_| ())
            .map_err(io::Error::from)
    }

    fn watch_signal(&mut self, signal: Signal) -> io::Result<()> {
        let ev = KEvent::new(
            signal as usize,
            EventFilter::EVFILT_SIGNAL,
            EventFlag::EV_ADD | EventFlag::EV_ENABLE,
            FilterFlag::empty(),
            0,
            0,
        );
        self.kq
            .kevent(&[ev], &mut [], None)
            .map(|_| ())
            .map_err(io::Error::from)
    }

    fn wait(
        &mut self,
        out: &mut Vec<Notification>,
        max: usize,
        timeout: Option<Duration>,
    ) -> io::Result<usize> {
        out.clear();
        if self.events.len() < max {
            self.events.resize(max, empty_kevent());
        }

        let n = self
            .kq
            .kevent(&[], &mut self.events[..max], timeout.map(to_timespec))
            .map_err(io::Error::from)?;

        for ev in &self.events[..n] {
            let kind = match ev.filter() {
                Ok(EventFilter::EVFILT_READ) => NotificationKind::Readable,
                Ok(EventFilter::EVFILT_WRITE) => NotificationKind::Writable,
                Ok(EventFilter::EVFILT_SIGNAL) => NotificationKind::Signal,
                _ => continue,
            };
            out.push(Notification {
                ident: ev.ident(),
                kind,
                eof: ev.flags().contains(EventFlag::EV_EOF),
            });
        }
        Ok(out.len())
    }

    fn pending_error(&self, fd: RawFd) -> i32 {
        // SAFETY: the descriptor belongs to a registered socket and stays
        // open for the duration of this call.
        let fd = unsafe { BorrowedFd::borrow_raw(fd) };
        match getsockopt(&fd, sockopt::SocketError) {
            Ok(code) => code,
            Err(errno) => errno as i32,
        }
    }
}
