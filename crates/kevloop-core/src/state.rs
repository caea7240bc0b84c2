//! Socket lifecycle state and event mask types

use core::fmt;
use core::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Lifecycle state of a socket, as seen by the event engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketState {
    /// Non-blocking connect in progress; completion shows up as writability
    Connecting,

    /// Listening for connections; a pending accept shows up as readability
    Listening,

    /// Connected stream socket
    Connected,

    /// Unconnected datagram socket
    Datagram,

    /// Datagram socket with a default peer
    ConnectingDatagram,
}

impl SocketState {
    pub const ALL: [SocketState; 5] = [
        SocketState::Connecting,
        SocketState::Listening,
        SocketState::Connected,
        SocketState::Datagram,
        SocketState::ConnectingDatagram,
    ];
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketState::Connecting => write!(f, "CONNECTING"),
            SocketState::Listening => write!(f, "LISTENING"),
            SocketState::Connected => write!(f, "CONNECTED"),
            SocketState::Datagram => write!(f, "DATAGRAM"),
            SocketState::ConnectingDatagram => write!(f, "CONNECTDG"),
        }
    }
}

/// Readable/writable bitmask.
///
/// Used both for the events a socket asks for and for the interest set the
/// engine has installed in the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventMask(u8);

impl EventMask {
    pub const NONE: EventMask = EventMask(0);
    pub const READABLE: EventMask = EventMask(0x01);
    pub const WRITABLE: EventMask = EventMask(0x02);
    pub const BOTH: EventMask = EventMask(0x03);

    #[inline]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn contains(&self, other: EventMask) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn is_readable(&self) -> bool {
        self.contains(Self::READABLE)
    }

    #[inline]
    pub const fn is_writable(&self) -> bool {
        self.contains(Self::WRITABLE)
    }

    /// Bits that differ between `self` and `other`.
    #[inline]
    pub const fn changed(&self, other: EventMask) -> EventMask {
        EventMask(self.0 ^ other.0)
    }
}

impl BitOr for EventMask {
    type Output = EventMask;
    fn bitor(self, rhs: Self) -> Self {
        EventMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for EventMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for EventMask {
    type Output = EventMask;
    fn bitand(self, rhs: Self) -> Self {
        EventMask(self.0 & rhs.0)
    }
}

impl Not for EventMask {
    type Output = EventMask;
    fn not(self) -> Self {
        EventMask(!self.0 & Self::BOTH.0)
    }
}

impl fmt::Display for EventMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_readable(), self.is_writable()) {
            (false, false) => write!(f, "-"),
            (true, false) => write!(f, "R"),
            (false, true) => write!(f, "W"),
            (true, true) => write!(f, "RW"),
        }
    }
}
