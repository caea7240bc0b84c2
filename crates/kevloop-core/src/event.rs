//! Application-level events emitted by the dispatch loop

use std::fmt;

use crate::socket::SocketRef;

/// Signal number as delivered by the OS.
pub type Signal = i32;

/// Discriminant of an [`Event`], handy for classification tables and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Non-blocking connect completed
    Connect,
    /// Listening socket has a connection to accept
    Accept,
    /// Data available
    Read,
    /// Room in the send buffer
    Write,
    /// Peer closed its side of the stream
    Eof,
    /// Socket error pending (errno attached)
    Error,
    /// Trapped process signal
    Signal,
}

/// A typed event delivered to the application's handler.
pub enum Event {
    Connect(SocketRef),
    Accept(SocketRef),
    Read(SocketRef),
    Write(SocketRef),
    Eof(SocketRef),
    Error(SocketRef, i32),
    Signal(Signal),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Connect(_) => EventKind::Connect,
            Event::Accept(_) => EventKind::Accept,
            Event::Read(_) => EventKind::Read,
            Event::Write(_) => EventKind::Write,
            Event::Eof(_) => EventKind::Eof,
            Event::Error(..) => EventKind::Error,
            Event::Signal(_) => EventKind::Signal,
        }
    }

    /// The originating socket, `None` for signals.
    pub fn socket(&self) -> Option<&SocketRef> {
        match self {
            Event::Connect(s)
            | Event::Accept(s)
            | Event::Read(s)
            | Event::Write(s)
            | Event::Eof(s)
            | Event::Error(s, _) => Some(s),
            Event::Signal(_) => None,
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Error(s, errno) => write!(f, "Error(fd={}, errno={})", s.fd(), errno),
            Event::Signal(sig) => write!(f, "Signal({})", sig),
            other => match other.socket() {
                Some(s) => write!(f, "{:?}(fd={})", other.kind(), s.fd()),
                None => write!(f, "{:?}", other.kind()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::Socket;
    use crate::state::{EventMask, SocketState};

    #[test]
    fn test_error_carries_errno() {
        let sock = Socket::new(4, SocketState::Connected, EventMask::BOTH);
        let ev = Event::Error(sock, 61);
        assert_eq!(ev.kind(), EventKind::Error);
        assert_eq!(ev.socket().map(|s| s.fd()), Some(4));
        assert_eq!(format!("{:?}", ev), "Error(fd=4, errno=61)");
    }

    #[test]
    fn test_socket_event_debug() {
        let sock = Socket::new(7, SocketState::Listening, EventMask::NONE);
        assert_eq!(format!("{:?}", Event::Accept(sock)), "Accept(fd=7)");
    }

    #[test]
    fn test_signal_has_no_socket() {
        let ev = Event::Signal(1);
        assert!(ev.socket().is_none());
        assert_eq!(ev.kind(), EventKind::Signal);
    }
}
