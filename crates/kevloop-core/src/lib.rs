//! # kevloop-core
//!
//! Core types and traits for the kevloop socket event engine.
//!
//! This crate is platform-agnostic: no syscalls live here. Backends and
//! the dispatch loop are in `kevloop-runtime`.
//!
//! ## Modules
//!
//! - `state` - Socket lifecycle states and readable/writable masks
//! - `socket` - Reference-counted socket handle shared with the engine
//! - `event` - Events delivered to the application
//! - `traits` - Engine / Registrar / EventHandler contracts
//! - `timer` - Timer service contract
//! - `process` - Running flag and restart hook
//! - `error` - Error types
//! - `kprint` - Kernel-style leveled logging macros
//! - `env` - Environment variable utilities

pub mod kprint;
pub mod env;
pub mod error;
pub mod state;
pub mod socket;
pub mod event;
pub mod timer;
pub mod process;
pub mod traits;

// Re-exports for convenience
pub use error::{EngineError, EngineResult};
pub use state::{EventMask, SocketState};
pub use socket::{Socket, SocketHold, SocketRef};
pub use event::{Event, EventKind, Signal};
pub use timer::{TimerAction, TimerCallback, TimerFired, TimerHandle, TimerService};
pub use process::{Process, RestartHook};
pub use traits::{Context, Engine, EventHandler, Registrar, Timestamp};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_secs};

/// Engine-wide constants
pub mod constants {
    use std::time::Duration;

    /// Kernel events fetched per wait call
    pub const EVENTS_PER_WAIT: usize = 20;

    /// Consecutive wait failures tolerated before restarting the process
    pub const ERROR_THRESHOLD: u32 = 20;

    /// Each pending wait failure is forgotten after this long
    pub const ERROR_EXPIRE: Duration = Duration::from_secs(3600);

    /// Default registry capacity
    pub const DEFAULT_MAX_SOCKETS: usize = 1024;
}
