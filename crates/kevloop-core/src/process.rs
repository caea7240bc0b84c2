//! Process lifecycle hooks the engine observes
//!
//! - a running flag checked once per loop iteration
//! - a restart entry point, used only when the engine gives up on its
//!   notification mechanism

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::kerror;

pub type RestartHook = Box<dyn Fn(&str)>;

pub struct Process {
    running: Arc<AtomicBool>,
    restart: RestartHook,
}

impl Process {
    /// Running process with the given restart hook.
    pub fn new(restart: RestartHook) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            restart,
        }
    }

    /// Restart hook that only logs; for embedding and tests.
    pub fn log_only() -> Self {
        Self::new(Box::new(|reason| {
            kerror!(System: "Restart requested: {}", reason);
        }))
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the dispatch loop to return after the current iteration.
    #[inline]
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Shared flag, for code outside the loop thread that needs to stop it.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Restart the process. The default hook does not return.
    pub fn restart(&self, reason: &str) {
        (self.restart)(reason);
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
