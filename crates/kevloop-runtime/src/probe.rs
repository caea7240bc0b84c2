//! Backend selection
//!
//! Engines compiled for the host are tried in preference order; the first
//! whose `init` succeeds is used. An `Unavailable` backend (kernel refused
//! to create the facility) is skipped so the next one can take over.

use kevloop_core::{kdebug, kinfo, kwarn, Engine, EngineError};

use crate::config::EngineConfig;

cfg_if::cfg_if! {
    if #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "dragonfly"
    ))] {
        use crate::engine::QueueEngine;
        use crate::queue::{KernelQueue, Kqueue};

        const BACKENDS: &[&str] = &[<Kqueue as KernelQueue>::ENGINE_NAME];

        /// Uninitialized engines for this host, most preferred first.
        pub fn candidate_engines(config: &EngineConfig) -> Vec<Box<dyn Engine>> {
            vec![Box::new(QueueEngine::new(config, Kqueue::open))]
        }
    } else {
        const BACKENDS: &[&str] = &[];

        /// Uninitialized engines for this host, most preferred first.
        pub fn candidate_engines(_config: &EngineConfig) -> Vec<Box<dyn Engine>> {
            Vec::new()
        }
    }
}

/// Names of the backends compiled for this host.
pub fn backend_names() -> &'static [&'static str] {
    BACKENDS
}

/// Initialize `candidates` in order and return the first that comes up.
pub fn select_from(
    candidates: Vec<Box<dyn Engine>>,
    max_sockets: usize,
) -> Option<Box<dyn Engine>> {
    for mut engine in candidates {
        match engine.init(max_sockets) {
            Ok(()) => {
                kinfo!(System: "using {} engine ({} sockets)", engine.name(), max_sockets);
                return Some(engine);
            }
            Err(EngineError::Unavailable(errno)) => {
                kdebug!(System: "{} engine unavailable (errno {})", engine.name(), errno);
            }
            Err(e) => {
                kwarn!(System: "{} engine failed to start: {}", engine.name(), e);
            }
        }
    }
    None
}

/// Pick and initialize the best engine for this host.
pub fn select_engine(config: &EngineConfig) -> Option<Box<dyn Engine>> {
    let engine = select_from(candidate_engines(config), config.max_sockets);
    if engine.is_none() {
        kwarn!(System: "no event engine available (compiled: {:?})", backend_names());
    }
    engine
}
