//! Socket registry
//!
//! Fixed-capacity table indexed by descriptor. Capacity is chosen once at
//! engine init and never changes; every access is bounds-checked.

use std::fmt;
use std::os::fd::RawFd;
use std::rc::Rc;

use kevloop_core::SocketRef;

/// Why a socket could not be inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// Descriptor is negative or `>= capacity`
    OutOfRange { fd: RawFd, capacity: usize },
    /// Another socket already owns the slot
    Occupied(RawFd),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::OutOfRange { fd, capacity } => {
                write!(f, "descriptor {} out of range (capacity {})", fd, capacity)
            }
            RegistryError::Occupied(fd) => write!(f, "descriptor {} already registered", fd),
        }
    }
}

impl std::error::Error for RegistryError {}

pub struct Registry {
    slots: Vec<Option<SocketRef>>,
    live: usize,
}

impl Registry {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots, live: 0 }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of registered sockets.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    fn index(&self, fd: RawFd) -> Option<usize> {
        usize::try_from(fd).ok().filter(|&i| i < self.slots.len())
    }

    pub fn insert(&mut self, sock: &SocketRef) -> Result<(), RegistryError> {
        let fd = sock.fd();
        let idx = self.index(fd).ok_or(RegistryError::OutOfRange {
            fd,
            capacity: self.capacity(),
        })?;
        let slot = &mut self.slots[idx];
        if slot.is_some() {
            return Err(RegistryError::Occupied(fd));
        }
        *slot = Some(Rc::clone(sock));
        self.live += 1;
        Ok(())
    }

    /// Socket bound to `ident`, if any. Out-of-range idents are simply
    /// absent.
    pub fn lookup(&self, ident: usize) -> Option<&SocketRef> {
        self.slots.get(ident).and_then(Option::as_ref)
    }

    /// True if `sock` itself (not merely its descriptor) is registered.
    pub fn is_registered(&self, sock: &SocketRef) -> bool {
        self.index(sock.fd())
            .and_then(|i| self.slots[i].as_ref())
            .is_some_and(|s| Rc::ptr_eq(s, sock))
    }

    /// Clear the slot for `fd`, returning the socket that was there.
    pub fn remove(&mut self, fd: RawFd) -> Option<SocketRef> {
        let idx = self.index(fd)?;
        let prev = self.slots[idx].take();
        if prev.is_some() {
            self.live -= 1;
        }
        prev
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("capacity", &self.capacity())
            .field("live", &self.live)
            .finish()
    }
}
