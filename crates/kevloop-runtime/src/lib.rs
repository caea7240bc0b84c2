//! # kevloop-runtime
//!
//! Platform-specific runtime for the kevloop socket event engine.
//!
//! This crate provides:
//! - `EngineConfig` with environment overrides
//! - The socket registry and the interest translator/synchronizer
//! - The `KernelQueue` abstraction and its kqueue implementation
//! - `QueueEngine`, the dispatch loop, and the wait-failure monitor
//! - The heap-backed `TimerQueue`
//! - Backend selection and the exec-based restart hook

pub mod config;
pub mod registry;
pub mod interest;
pub mod dispatch;
pub mod queue;
pub mod signal;
pub mod monitor;
pub mod timer;
pub mod engine;
pub mod probe;
pub mod process;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use config::{ConfigError, EngineConfig};
pub use engine::{QueueEngine, Turn};
pub use interest::effective_interest;
pub use monitor::ErrorMonitor;
pub use probe::{backend_names, candidate_engines, select_engine, select_from};
pub use process::{default_process, exec_restart};
pub use queue::{
    Filter, FilterAction, FilterChange, KernelQueue, Notification, NotificationKind,
};
pub use registry::{Registry, RegistryError};
pub use timer::{TimerQueue, TimerStats};
