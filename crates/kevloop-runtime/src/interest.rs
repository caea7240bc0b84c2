//! State/event translation and interest synchronization
//!
//! `effective_interest` decides what the kernel should watch for a socket;
//! `interest_changes` turns the difference between two interest sets into
//! the minimal change list.

use std::os::fd::RawFd;

use kevloop_core::{EventMask, SocketState};

use crate::queue::{Filter, FilterAction, FilterChange};

/// Readiness the kernel should report for a socket in `state` that asked
/// for `requested`.
///
/// Connecting sockets complete by becoming writable and listening sockets
/// accept by becoming readable; both ignore `requested`.
pub fn effective_interest(state: SocketState, requested: EventMask) -> EventMask {
    match state {
        SocketState::Connecting => EventMask::WRITABLE,
        SocketState::Listening => EventMask::READABLE,
        SocketState::Connected | SocketState::Datagram | SocketState::ConnectingDatagram => {
            requested
        }
    }
}

fn toggle(fd: RawFd, filter: Filter, on: bool) -> FilterChange {
    let action = if on { FilterAction::Enable } else { FilterAction::Disable };
    FilterChange::new(fd, filter, action)
}

/// One directive per bit that differs between `old` and `new`; empty when
/// they are equal.
pub fn interest_changes(fd: RawFd, old: EventMask, new: EventMask) -> Vec<FilterChange> {
    let changed = old.changed(new);
    let mut changes = Vec::with_capacity(2);
    if changed.is_readable() {
        changes.push(toggle(fd, Filter::Read, new.is_readable()));
    }
    if changed.is_writable() {
        changes.push(toggle(fd, Filter::Write, new.is_writable()));
    }
    changes
}

/// Change list deleting both filters, whatever was registered.
pub fn removal_changes(fd: RawFd) -> [FilterChange; 2] {
    [
        FilterChange::new(fd, Filter::Read, FilterAction::Delete),
        FilterChange::new(fd, Filter::Write, FilterAction::Delete),
    ]
}
