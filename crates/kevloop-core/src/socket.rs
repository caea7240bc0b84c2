//! Socket handle shared between its owner and the event engine
//!
//! The owner creates a [`Socket`] and hands clones of the [`SocketRef`] to
//! the engine. The engine reads the descriptor, lifecycle state and the
//! requested event mask, and caches the interest set it installed in the
//! kernel. While the dispatch loop is working on a socket it holds a
//! reference ([`Socket::hold`]) so that an event handler removing the
//! socket mid-dispatch cannot leave the loop with a dangling socket.
//!
//! Everything here is single-threaded: `Rc` + `Cell`, no atomics.

use std::cell::Cell;
use std::fmt;
use std::os::fd::RawFd;
use std::rc::Rc;

use crate::state::{EventMask, SocketState};

/// Shared handle to a socket.
pub type SocketRef = Rc<Socket>;

pub struct Socket {
    fd: RawFd,
    state: Cell<SocketState>,
    events: Cell<EventMask>,
    interest: Cell<EventMask>,
    refs: Cell<u32>,
}

impl Socket {
    /// Create a socket handle for an already-open descriptor.
    ///
    /// `events` is only consulted in the connected and datagram states.
    pub fn new(fd: RawFd, state: SocketState, events: EventMask) -> SocketRef {
        assert!(fd >= 0, "socket descriptor must be non-negative, got {}", fd);
        Rc::new(Self {
            fd,
            state: Cell::new(state),
            events: Cell::new(events),
            interest: Cell::new(EventMask::NONE),
            refs: Cell::new(0),
        })
    }

    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    #[inline]
    pub fn state(&self) -> SocketState {
        self.state.get()
    }

    /// Events the owner asked for.
    #[inline]
    pub fn events(&self) -> EventMask {
        self.events.get()
    }

    /// Interest set the engine last installed in the kernel.
    #[inline]
    pub fn interest(&self) -> EventMask {
        self.interest.get()
    }

    /// Updated by the engine once the kernel side reflects `state`.
    #[inline]
    pub fn set_state(&self, state: SocketState) {
        self.state.set(state);
    }

    /// Updated by the engine once the kernel side reflects `events`.
    #[inline]
    pub fn set_events(&self, events: EventMask) {
        self.events.set(events);
    }

    #[inline]
    pub fn set_interest(&self, interest: EventMask) {
        self.interest.set(interest);
    }

    /// Number of outstanding engine references.
    #[inline]
    pub fn ref_count(&self) -> u32 {
        self.refs.get()
    }

    /// True while the engine is still using this socket. Owners must not
    /// release the descriptor's resources until this is false.
    #[inline]
    pub fn is_referenced(&self) -> bool {
        self.refs.get() > 0
    }

    #[inline]
    pub fn ref_inc(&self) {
        self.refs.set(self.refs.get() + 1);
    }

    #[inline]
    pub fn ref_dec(&self) {
        let refs = self.refs.get();
        debug_assert!(refs > 0, "socket {} reference count underflow", self.fd);
        self.refs.set(refs.saturating_sub(1));
    }

    /// Take a reference for the lifetime of the returned guard.
    pub fn hold(self: &Rc<Self>) -> SocketHold {
        self.ref_inc();
        SocketHold {
            sock: Rc::clone(self),
        }
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("fd", &self.fd)
            .field("state", &self.state.get())
            .field("events", &self.events.get())
            .field("interest", &self.interest.get())
            .field("refs", &self.refs.get())
            .finish()
    }
}

/// Keeps a socket referenced until dropped.
pub struct SocketHold {
    sock: SocketRef,
}

impl SocketHold {
    #[inline]
    pub fn socket(&self) -> &SocketRef {
        &self.sock
    }
}

impl Drop for SocketHold {
    fn drop(&mut self) {
        self.sock.ref_dec();
    }
}
