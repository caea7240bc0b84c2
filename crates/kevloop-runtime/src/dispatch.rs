//! Notification classification
//!
//! Maps a socket's lifecycle state and the readiness the kernel reported
//! to the event the application sees. Combinations not listed produce no
//! event.

use std::rc::Rc;

use kevloop_core::{Event, SocketRef, SocketState};

use crate::queue::NotificationKind;

/// | state                          | readable     | writable |
/// |--------------------------------|--------------|----------|
/// | Connecting                     | -            | Connect  |
/// | Listening                      | Accept       | -        |
/// | Connected                      | Read / Eof   | Write    |
/// | Datagram, ConnectingDatagram   | Read         | Write    |
pub fn classify(sock: &SocketRef, kind: NotificationKind, eof: bool) -> Option<Event> {
    use NotificationKind::{Readable, Writable};
    use SocketState::*;

    let make: fn(SocketRef) -> Event = match (sock.state(), kind) {
        (Connecting, Writable) => Event::Connect,
        (Listening, Readable) => Event::Accept,
        (Connected, Readable) if eof => Event::Eof,
        (Connected, Readable) => Event::Read,
        (Connected, Writable) => Event::Write,
        (Datagram | ConnectingDatagram, Readable) => Event::Read,
        (Datagram | ConnectingDatagram, Writable) => Event::Write,
        _ => return None,
    };
    Some(make(Rc::clone(sock)))
}
