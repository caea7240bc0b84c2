//! Error types for the event engine

use core::fmt;
use std::os::fd::RawFd;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors an engine reports to its caller.
///
/// Contract violations (double registration, operating on a socket that
/// was never added) are not represented here; those panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The OS facility backing this engine could not be created (errno).
    /// Callers should fall back to another backend.
    Unavailable(i32),

    /// Descriptor does not fit in the fixed registry.
    DescriptorOutOfRange { fd: RawFd, capacity: usize },

    /// Engine used before `init` succeeded.
    NotInitialized,

    /// No backend compiled for this host could be initialized.
    NoBackend,
}

impl EngineError {
    /// Errno carried by this error, if any.
    pub fn errno(&self) -> Option<i32> {
        match self {
            EngineError::Unavailable(e) => Some(*e),
            _ => None,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Unavailable(e) => write!(f, "engine unavailable: errno {}", e),
            EngineError::DescriptorOutOfRange { fd, capacity } => {
                write!(f, "descriptor {} out of range (capacity {})", fd, capacity)
            }
            EngineError::NotInitialized => write!(f, "engine not initialized"),
            EngineError::NoBackend => write!(f, "no event engine available"),
        }
    }
}

impl std::error::Error for EngineError {}
