//! Scripted in-memory `KernelQueue` for dispatch-loop tests.
//!
//! Records every change list submitted and replays wait results queued
//! by the test. Cloning shares the script, so a test keeps one handle
//! while the engine owns another.

use std::cell::{RefCell, RefMut};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kevloop_core::Signal;

use crate::queue::{FilterChange, KernelQueue, Notification};

pub enum WaitStep {
    Ready(Vec<Notification>),
    Fail(i32),
}

#[derive(Default)]
pub struct Script {
    pub steps: VecDeque<WaitStep>,
    /// Every change list passed to `apply`, including rejected ones
    pub applied: Vec<Vec<FilterChange>>,
    /// `SO_ERROR` by descriptor
    pub pending_errors: HashMap<RawFd, i32>,
    pub watched: Vec<Signal>,
    pub ignored: Vec<Signal>,
    /// Reject every change list with this errno
    pub fail_apply: Option<i32>,
    /// Reject signal filters with this errno
    pub fail_watch: Option<i32>,
    /// Timeout of every wait call
    pub timeouts: Vec<Option<Duration>>,
    /// Cleared when a wait finds no scripted step left
    pub running: Option<Arc<AtomicBool>>,
}

#[derive(Clone, Default)]
pub struct ScriptedQueue {
    script: Rc<RefCell<Script>>,
}

impl ScriptedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self) -> RefMut<'_, Script> {
        self.script.borrow_mut()
    }

    pub fn push_ready(&self, ready: Vec<Notification>) {
        self.script().steps.push_back(WaitStep::Ready(ready));
    }

    pub fn push_failure(&self, errno: i32) {
        self.script().steps.push_back(WaitStep::Fail(errno));
    }

    /// All submitted changes, flattened, and forget them.
    pub fn take_changes(&self) -> Vec<FilterChange> {
        self.script().applied.drain(..).flatten().collect()
    }

    /// Number of `apply` calls since the last `take_changes`.
    pub fn apply_calls(&self) -> usize {
        self.script.borrow().applied.len()
    }
}

impl KernelQueue for ScriptedQueue {
    const ENGINE_NAME: &'static str = "scripted()";
    const WAIT_CALL: &'static str = "wait";

    fn apply(&mut self, changes: &[FilterChange]) -> io::Result<()> {
        let mut script = self.script();
        script.applied.push(changes.to_vec());
        match script.fail_apply {
            Some(errno) => Err(io::Error::from_raw_os_error(errno)),
            None => Ok(()),
        }
    }

    fn watch_signal(&mut self, signal: Signal) -> io::Result<()> {
        let mut script = self.script();
        if let Some(errno) = script.fail_watch {
            return Err(io::Error::from_raw_os_error(errno));
        }
        script.watched.push(signal);
        Ok(())
    }

    fn ignore_signal(&mut self, signal: Signal) -> io::Result<()> {
        self.script().ignored.push(signal);
        Ok(())
    }

    fn wait(
        &mut self,
        out: &mut Vec<Notification>,
        max: usize,
        timeout: Option<Duration>,
    ) -> io::Result<usize> {
        out.clear();
        let mut script = self.script();
        script.timeouts.push(timeout);
        match script.steps.pop_front() {
            Some(WaitStep::Ready(ready)) => {
                out.extend(ready.into_iter().take(max));
                Ok(out.len())
            }
            Some(WaitStep::Fail(errno)) => Err(io::Error::from_raw_os_error(errno)),
            None => {
                if let Some(flag) = &script.running {
                    flag.store(false, Ordering::Release);
                }
                Ok(0)
            }
        }
    }

    fn pending_error(&self, fd: RawFd) -> i32 {
        self.script.borrow().pending_errors.get(&fd).copied().unwrap_or(0)
    }
}
