//! # kevloop - readiness event loop for network servers
//!
//! A single-threaded engine that watches sockets for readiness through the
//! kernel event queue, turns kernel notifications into typed events and
//! runs timers between batches.
//!
//! ## Quick Start
//!
//! ```ignore
//! use kevloop::{Event, EventLoop, EngineConfig, EventMask, Socket, SocketState};
//!
//! let mut ev = EventLoop::new(&EngineConfig::from_env())?;
//! let listener = Socket::new(fd, SocketState::Listening, EventMask::NONE);
//! ev.engine_mut().add(&listener)?;
//! ev.engine_mut().register_signal(libc::SIGTERM);
//!
//! ev.run(&mut |event: Event, cx: &mut kevloop::Context<'_>| match event {
//!     Event::Accept(sock) => { /* accept and cx.sockets.add(...) */ }
//!     Event::Signal(_) => cx.process.stop(),
//!     _ => {}
//! });
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    EventHandler (user)                      │
//! │      Connect / Accept / Read / Write / Eof / Error / Signal │
//! └─────────────────────────────────────────────────────────────┘
//!                              ▲
//!                              │ Context { sockets, timers, process, now }
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 QueueEngine (dispatch loop)                 │
//! │   Registry · interest sync · classify · ErrorMonitor        │
//! └─────────────────────────────────────────────────────────────┘
//!          │                                        │
//!          ▼                                        ▼
//!    ┌───────────┐                           ┌────────────┐
//!    │  Kqueue   │                           │ TimerQueue │
//!    │ (kevent)  │                           │   (heap)   │
//!    └───────────┘                           └────────────┘
//! ```

pub use kevloop_core::{
    constants, kdebug, kerror, kinfo, klog, ktrace, kwarn, kprint, Context, Engine, EngineError,
    EngineResult, Event, EventHandler, EventKind, EventMask, Process, Registrar, Signal, Socket,
    SocketHold, SocketRef, SocketState, TimerAction, TimerFired, TimerHandle, TimerService,
    Timestamp,
};
pub use kevloop_runtime::{
    backend_names, default_process, select_engine, ConfigError, EngineConfig, QueueEngine,
    TimerQueue, TimerStats,
};

pub mod runtime {
    //! Lower-level building blocks.
    pub use kevloop_runtime::*;
}

/// Engine, timers and process lifecycle bundled for the common case of one
/// loop per process.
pub struct EventLoop {
    engine: Box<dyn Engine>,
    timers: TimerQueue,
    process: Process,
}

impl EventLoop {
    /// Select the best engine for this host. The process restarts itself
    /// through exec when the engine gives up.
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        Self::with_process(config, default_process())
    }

    pub fn with_process(config: &EngineConfig, process: Process) -> EngineResult<Self> {
        let engine = select_engine(config).ok_or(EngineError::NoBackend)?;
        Ok(Self::from_engine(engine, process))
    }

    /// Wrap an engine that is already initialized.
    pub fn from_engine(engine: Box<dyn Engine>, process: Process) -> Self {
        Self {
            engine,
            timers: TimerQueue::new(),
            process,
        }
    }

    pub fn name(&self) -> &'static str {
        self.engine.name()
    }

    pub fn engine_mut(&mut self) -> &mut dyn Engine {
        &mut *self.engine
    }

    pub fn timers_mut(&mut self) -> &mut TimerQueue {
        &mut self.timers
    }

    pub fn process(&self) -> &Process {
        &self.process
    }

    /// Time sampled by the engine for its current iteration.
    pub fn now(&self) -> Timestamp {
        self.engine.now()
    }

    /// Dispatch until `process().stop()` is called.
    pub fn run(&mut self, handler: &mut dyn EventHandler) {
        self.engine.run(&mut self.timers, &self.process, handler);
    }
}
