//! `QueueEngine`: the dispatch loop over a `KernelQueue`.
//!
//! One engine owns one kernel queue and a fixed registry of sockets. Each
//! turn of the loop:
//!
//! ```text
//!   deliver deferred errors
//!   wait(timeout = time until next timer)
//!   sample now
//!   for each notification:
//!       signal            -> Signal
//!       vacated fd        -> dropped
//!       hold socket
//!       SO_ERROR pending  -> Error
//!       else              -> classify(state, kind)
//!       release socket
//!   run due timers
//! ```
//!
//! Handlers get the registry back through `Context::sockets`, so they may
//! add, change or remove sockets (including the one being dispatched)
//! while the loop is iterating over a batch.

use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::Instant;

use kevloop_core::{
    kdebug, kerror, ktrace, kwarn, Context, Engine, EngineError, EngineResult, Event, EventHandler,
    EventMask, Process, Registrar, Signal, SocketHold, SocketRef, SocketState, TimerService,
    Timestamp,
};

use crate::config::EngineConfig;
use crate::dispatch::classify;
use crate::interest::{effective_interest, interest_changes, removal_changes};
use crate::monitor::ErrorMonitor;
use crate::queue::{KernelQueue, Notification, NotificationKind};
use crate::registry::{Registry, RegistryError};

/// Outcome of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    /// Wait returned this many notifications; timers ran.
    Dispatched(usize),
    /// Wait was interrupted by a signal; nothing else happened.
    Interrupted,
    /// Wait failed; the failure was counted.
    Failed,
}

type Opener<Q> = Box<dyn FnMut() -> io::Result<Q>>;

/// State reachable from handlers: the registry, the kernel queue and
/// errors waiting to be delivered.
struct Core<Q> {
    registry: Registry,
    queue: Q,
    /// Interest updates the kernel rejected, delivered as `Error` events
    /// by the loop. The hold keeps the socket referenced until then.
    deferred: VecDeque<(SocketHold, i32)>,
}

pub struct QueueEngine<Q: KernelQueue> {
    events_per_wait: usize,
    opener: Opener<Q>,
    core: Option<Core<Q>>,
    ready: Vec<Notification>,
    monitor: ErrorMonitor,
    now: Timestamp,
}

impl<Q: KernelQueue + 'static> QueueEngine<Q> {
    /// Engine that creates its kernel queue with `opener` on `init`.
    pub fn new<F>(config: &EngineConfig, opener: F) -> Self
    where
        F: FnMut() -> io::Result<Q> + 'static,
    {
        Self {
            events_per_wait: config.events_per_wait,
            opener: Box::new(opener),
            core: None,
            ready: Vec::with_capacity(config.events_per_wait),
            monitor: ErrorMonitor::new(Q::WAIT_CALL, config.error_threshold, config.error_expire),
            now: Timestamp::sample(),
        }
    }

    pub fn monitor(&self) -> &ErrorMonitor {
        &self.monitor
    }

    /// Number of registered sockets.
    pub fn registered(&self) -> usize {
        self.core.as_ref().map_or(0, |c| c.registry.len())
    }

    fn core_mut(&mut self) -> &mut Core<Q> {
        match self.core.as_mut() {
            Some(core) => core,
            None => panic!("{} engine used before init", Q::ENGINE_NAME),
        }
    }

    /// Run one iteration of the dispatch loop.
    ///
    /// # Panics
    ///
    /// If `init` has not succeeded.
    pub fn run_once(
        &mut self,
        timers: &mut dyn TimerService,
        process: &Process,
        handler: &mut dyn EventHandler,
    ) -> Turn {
        let Self {
            events_per_wait,
            core,
            ready,
            monitor,
            now,
            ..
        } = self;
        let core = match core.as_mut() {
            Some(core) => core,
            None => panic!("{} engine used before init", Q::ENGINE_NAME),
        };

        core.drain_deferred(timers, process, *now, handler);

        let timeout = timers.time_until_next_deadline(Instant::now());
        let result = core.queue.wait(ready, *events_per_wait, timeout);
        *now = Timestamp::sample();

        let count = match result {
            Ok(count) => count,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Turn::Interrupted,
            Err(e) => {
                kerror!(Socket: "{}() error: {}", Q::WAIT_CALL, e);
                monitor.record_failure(now.instant, timers, process);
                return Turn::Failed;
            }
        };

        for &note in ready.iter() {
            core.notify(note, timers, process, *now, handler);
        }

        timers.run_due_timers(now.instant);
        Turn::Dispatched(count)
    }
}

impl<Q: KernelQueue> Core<Q> {
    fn new(queue: Q, capacity: usize) -> Self {
        Self {
            registry: Registry::with_capacity(capacity),
            queue,
            deferred: VecDeque::new(),
        }
    }

    fn assert_registered(&self, sock: &SocketRef) {
        assert!(
            self.registry.is_registered(sock),
            "socket {} is not registered with the event engine",
            sock.fd()
        );
    }

    /// Bring the kernel's interest for `sock` from its cached value to
    /// `new`, touching only the bits that differ.
    fn synchronize(&mut self, sock: &SocketRef, new: EventMask) {
        let changes = interest_changes(sock.fd(), sock.interest(), new);
        sock.set_interest(new);
        if changes.is_empty() {
            return;
        }

        ktrace!(Socket: "socket {} interest -> {}", sock.fd(), new);
        if let Err(e) = self.queue.apply(&changes) {
            kdebug!(Socket: "{} rejected interest for socket {}: {}", Q::WAIT_CALL, sock.fd(), e);
            let errno = e.raw_os_error().unwrap_or(libc::EIO);
            self.deferred.push_back((sock.hold(), errno));
        }
    }

    fn notify(
        &mut self,
        note: Notification,
        timers: &mut dyn TimerService,
        process: &Process,
        now: Timestamp,
        handler: &mut dyn EventHandler,
    ) {
        if note.kind == NotificationKind::Signal {
            self.deliver(Event::Signal(note.ident as Signal), timers, process, now, handler);
            return;
        }

        let Some(sock) = self.registry.lookup(note.ident) else {
            ktrace!(Socket: "dropping {:?} for vacated descriptor {}", note.kind, note.ident);
            return;
        };
        let hold = sock.hold();
        let sock = Rc::clone(hold.socket());

        let errno = self.queue.pending_error(sock.fd());
        if errno != 0 {
            self.deliver(Event::Error(sock, errno), timers, process, now, handler);
            return;
        }

        if let Some(event) = classify(&sock, note.kind, note.eof) {
            self.deliver(event, timers, process, now, handler);
        }
        drop(hold);
    }

    fn deliver(
        &mut self,
        event: Event,
        timers: &mut dyn TimerService,
        process: &Process,
        now: Timestamp,
        handler: &mut dyn EventHandler,
    ) {
        let mut cx = Context {
            sockets: &mut *self,
            timers: &mut *timers,
            process,
            now,
        };
        handler.on_event(event, &mut cx);
        self.drain_deferred(timers, process, now, handler);
    }

    /// Deliver queued interest failures. Sockets removed in the meantime
    /// are skipped. Failures queued by the handlers called here wait for
    /// the next drain.
    fn drain_deferred(
        &mut self,
        timers: &mut dyn TimerService,
        process: &Process,
        now: Timestamp,
        handler: &mut dyn EventHandler,
    ) {
        for _ in 0..self.deferred.len() {
            let Some((hold, errno)) = self.deferred.pop_front() else {
                break;
            };
            if !self.registry.is_registered(hold.socket()) {
                continue;
            }
            let event = Event::Error(Rc::clone(hold.socket()), errno);
            let mut cx = Context {
                sockets: &mut *self,
                timers: &mut *timers,
                process,
                now,
            };
            handler.on_event(event, &mut cx);
        }
    }
}

impl<Q: KernelQueue> Registrar for Core<Q> {
    fn register_signal(&mut self, signal: Signal) {
        match self.queue.watch_signal(signal) {
            Ok(()) => {
                if let Err(e) = self.queue.ignore_signal(signal) {
                    kwarn!(System: "Unable to ignore signal {}: {}", signal, e);
                }
            }
            Err(e) => kwarn!(System: "Unable to trap signal {}: {}", signal, e),
        }
    }

    fn add(&mut self, sock: &SocketRef) -> EngineResult<()> {
        match self.registry.insert(sock) {
            Ok(()) => {}
            Err(RegistryError::OutOfRange { fd, capacity }) => {
                kerror!(System: "Attempt to add socket {} (> {}) to event engine", fd, capacity);
                return Err(EngineError::DescriptorOutOfRange { fd, capacity });
            }
            Err(e @ RegistryError::Occupied(_)) => panic!("{}", e),
        }

        sock.set_interest(EventMask::NONE);
        self.synchronize(sock, effective_interest(sock.state(), sock.events()));
        Ok(())
    }

    fn change_state(&mut self, sock: &SocketRef, state: SocketState) {
        self.assert_registered(sock);
        sock.set_state(state);
        self.synchronize(sock, effective_interest(state, sock.events()));
    }

    fn change_events(&mut self, sock: &SocketRef, events: EventMask) {
        self.assert_registered(sock);
        sock.set_events(events);
        self.synchronize(sock, effective_interest(sock.state(), events));
    }

    fn remove(&mut self, sock: &SocketRef) {
        self.assert_registered(sock);
        let fd = sock.fd();
        self.registry.remove(fd);
        sock.set_interest(EventMask::NONE);

        if let Err(e) = self.queue.apply(&removal_changes(fd)) {
            kwarn!(Socket: "Unable to delete {} items for socket {}: {}", Q::WAIT_CALL, fd, e);
        }
    }
}

impl<Q: KernelQueue + 'static> Registrar for QueueEngine<Q> {
    fn register_signal(&mut self, signal: Signal) {
        self.core_mut().register_signal(signal)
    }

    fn add(&mut self, sock: &SocketRef) -> EngineResult<()> {
        match self.core.as_mut() {
            Some(core) => core.add(sock),
            None => Err(EngineError::NotInitialized),
        }
    }

    fn change_state(&mut self, sock: &SocketRef, state: SocketState) {
        self.core_mut().change_state(sock, state)
    }

    fn change_events(&mut self, sock: &SocketRef, events: EventMask) {
        self.core_mut().change_events(sock, events)
    }

    fn remove(&mut self, sock: &SocketRef) {
        self.core_mut().remove(sock)
    }
}

impl<Q: KernelQueue + 'static> Engine for QueueEngine<Q> {
    fn name(&self) -> &'static str {
        Q::ENGINE_NAME
    }

    fn init(&mut self, max_sockets: usize) -> EngineResult<()> {
        match (self.opener)() {
            Ok(queue) => {
                self.core = Some(Core::new(queue, max_sockets));
                kdebug!(System: "{} engine ready for {} sockets", Q::ENGINE_NAME, max_sockets);
                Ok(())
            }
            Err(e) => {
                kwarn!(System: "{} engine cannot initialize: {}", Q::ENGINE_NAME, e);
                Err(EngineError::Unavailable(e.raw_os_error().unwrap_or(0)))
            }
        }
    }

    fn capacity(&self) -> usize {
        self.core.as_ref().map_or(0, |c| c.registry.capacity())
    }

    fn now(&self) -> Timestamp {
        self.now
    }

    fn run(
        &mut self,
        timers: &mut dyn TimerService,
        process: &Process,
        handler: &mut dyn EventHandler,
    ) {
        kdebug!(System: "{} engine entering dispatch loop", Q::ENGINE_NAME);
        while process.is_running() {
            self.run_once(timers, process, handler);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{Filter, FilterAction, FilterChange};
    use crate::testing::ScriptedQueue;
    use crate::timer::TimerQueue;
    use kevloop_core::{Socket, TimerAction};
    use std::cell::{Cell, RefCell};
    use std::time::Duration;

    type Hook = Box<dyn FnMut(&Event, &mut Context<'_>)>;

    /// Records every event as its Debug string; optional hook runs first.
    #[derive(Default)]
    struct Recorder {
        log: Vec<String>,
        hook: Option<Hook>,
    }

    impl Recorder {
        fn with_hook(hook: Hook) -> Self {
            Self {
                log: Vec::new(),
                hook: Some(hook),
            }
        }
    }

    impl EventHandler for Recorder {
        fn on_event(&mut self, event: Event, cx: &mut Context<'_>) {
            if let Some(hook) = self.hook.as_mut() {
                hook(&event, cx);
            }
            self.log.push(format!("{:?}", event));
        }
    }

    fn setup() -> (QueueEngine<ScriptedQueue>, ScriptedQueue) {
        let queue = ScriptedQueue::new();
        let shared = queue.clone();
        let config = EngineConfig::new().max_sockets(64);
        let mut engine = QueueEngine::new(&config, move || Ok(shared.clone()));
        engine.init(64).unwrap();
        (engine, queue)
    }

    fn enable(fd: i32, filter: Filter) -> FilterChange {
        FilterChange::new(fd, filter, FilterAction::Enable)
    }

    #[test]
    fn test_connect_then_connected_enables_only_read() {
        let (mut engine, queue) = setup();
        let sock = Socket::new(5, SocketState::Connecting, EventMask::WRITABLE);

        engine.add(&sock).unwrap();
        assert_eq!(sock.interest(), EventMask::WRITABLE);
        assert_eq!(queue.take_changes(), vec![enable(5, Filter::Write)]);

        // Requested mask is ignored while connecting
        engine.change_events(&sock, EventMask::BOTH);
        assert_eq!(queue.apply_calls(), 0);

        engine.change_state(&sock, SocketState::Connected);
        assert_eq!(sock.interest(), EventMask::BOTH);
        assert_eq!(queue.apply_calls(), 1);
        assert_eq!(queue.take_changes(), vec![enable(5, Filter::Read)]);
    }

    #[test]
    fn test_both_bits_changed_in_one_call() {
        let (mut engine, queue) = setup();
        let sock = Socket::new(3, SocketState::Connected, EventMask::READABLE);
        engine.add(&sock).unwrap();
        queue.take_changes();

        engine.change_events(&sock, EventMask::WRITABLE);
        assert_eq!(queue.apply_calls(), 1);
        assert_eq!(
            queue.take_changes(),
            vec![
                FilterChange::new(3, Filter::Read, FilterAction::Disable),
                enable(3, Filter::Write),
            ]
        );

        // Same mask again: nothing to do
        engine.change_events(&sock, EventMask::WRITABLE);
        assert_eq!(queue.apply_calls(), 0);
    }

    #[test]
    fn test_remove_deletes_both_filters() {
        let (mut engine, queue) = setup();
        let sock = Socket::new(4, SocketState::Listening, EventMask::NONE);
        engine.add(&sock).unwrap();
        assert_eq!(queue.take_changes(), vec![enable(4, Filter::Read)]);

        engine.remove(&sock);
        assert_eq!(queue.take_changes(), removal_changes(4).to_vec());
        assert_eq!(engine.registered(), 0);
        assert_eq!(sock.interest(), EventMask::NONE);
    }

    #[test]
    fn test_remove_failure_is_logged() {
        let log = kevloop_core::kprint::capture();
        let (mut engine, queue) = setup();
        let sock = Socket::new(5, SocketState::Connected, EventMask::READABLE);
        engine.add(&sock).unwrap();

        queue.script().fail_apply = Some(libc::ENOENT);
        engine.remove(&sock);
        assert_eq!(engine.registered(), 0);
        assert!(log.contains("Unable to delete wait items for socket 5"));
    }

    #[test]
    fn test_add_out_of_range() {
        let log = kevloop_core::kprint::capture();
        let (mut engine, queue) = setup();
        let sock = Socket::new(64, SocketState::Connected, EventMask::READABLE);

        assert_eq!(
            engine.add(&sock),
            Err(EngineError::DescriptorOutOfRange { fd: 64, capacity: 64 })
        );
        assert_eq!(queue.apply_calls(), 0);
        assert!(log.contains("Attempt to add socket 64 (> 64) to event engine"));
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_add_occupied_slot_panics() {
        let (mut engine, _queue) = setup();
        engine
            .add(&Socket::new(5, SocketState::Connected, EventMask::NONE))
            .unwrap();
        let _ = engine.add(&Socket::new(5, SocketState::Connected, EventMask::NONE));
    }

    #[test]
    #[should_panic(expected = "not registered")]
    fn test_change_unregistered_panics() {
        let (mut engine, _queue) = setup();
        let sock = Socket::new(5, SocketState::Connected, EventMask::NONE);
        engine.change_state(&sock, SocketState::Datagram);
    }

    #[test]
    fn test_add_before_init() {
        let config = EngineConfig::new();
        let mut engine = QueueEngine::new(&config, || Ok(ScriptedQueue::new()));
        let sock = Socket::new(1, SocketState::Connected, EventMask::NONE);
        assert_eq!(engine.add(&sock), Err(EngineError::NotInitialized));
        assert_eq!(engine.capacity(), 0);
    }

    #[test]
    fn test_init_unavailable() {
        let log = kevloop_core::kprint::capture();
        let config = EngineConfig::new();
        let mut engine: QueueEngine<ScriptedQueue> =
            QueueEngine::new(&config, || Err(io::Error::from_raw_os_error(libc::EMFILE)));

        assert_eq!(engine.init(16), Err(EngineError::Unavailable(libc::EMFILE)));
        assert!(log.contains("scripted() engine cannot initialize"));
    }

    #[test]
    fn test_rejected_add_delivers_deferred_error() {
        let (mut engine, queue) = setup();
        let mut timers = TimerQueue::new();
        let process = Process::log_only();
        let mut handler = Recorder::default();

        queue.script().fail_apply = Some(libc::EBADF);
        let sock = Socket::new(5, SocketState::Connected, EventMask::READABLE);
        engine.add(&sock).unwrap();
        assert_eq!(sock.ref_count(), 1);

        engine.run_once(&mut timers, &process, &mut handler);
        assert_eq!(handler.log, vec![format!("Error(fd=5, errno={})", libc::EBADF)]);
        assert_eq!(sock.ref_count(), 0);
    }

    #[test]
    fn test_rejected_change_in_handler_delivered_after_it() {
        let (mut engine, queue) = setup();
        let mut timers = TimerQueue::new();
        let process = Process::log_only();
        let sock = Socket::new(5, SocketState::Connected, EventMask::READABLE);
        engine.add(&sock).unwrap();

        queue.script().fail_apply = Some(libc::EBADF);
        queue.push_ready(vec![Notification::readable(5)]);

        let mut handler = Recorder::with_hook(Box::new(|event, cx| {
            if let Event::Read(s) = event {
                cx.sockets.change_events(s, EventMask::BOTH);
            }
        }));
        engine.run_once(&mut timers, &process, &mut handler);

        assert_eq!(
            handler.log,
            vec!["Read(fd=5)".to_string(), format!("Error(fd=5, errno={})", libc::EBADF)]
        );
        assert_eq!(sock.ref_count(), 0);
    }

    #[test]
    fn test_deferred_error_dropped_after_remove() {
        let (mut engine, queue) = setup();
        let mut timers = TimerQueue::new();
        let process = Process::log_only();
        let mut handler = Recorder::default();

        queue.script().fail_apply = Some(libc::EBADF);
        let sock = Socket::new(5, SocketState::Connected, EventMask::READABLE);
        engine.add(&sock).unwrap();
        engine.remove(&sock);

        engine.run_once(&mut timers, &process, &mut handler);
        assert!(handler.log.is_empty());
        assert_eq!(sock.ref_count(), 0);
    }

    #[test]
    fn test_vacated_descriptor_dropped() {
        let (mut engine, queue) = setup();
        let mut timers = TimerQueue::new();
        let process = Process::log_only();
        let mut handler = Recorder::default();

        queue.push_ready(vec![Notification::readable(9), Notification::writable(63)]);
        assert_eq!(
            engine.run_once(&mut timers, &process, &mut handler),
            Turn::Dispatched(2)
        );
        assert!(handler.log.is_empty());
    }

    #[test]
    fn test_pending_error_suppresses_readiness() {
        let (mut engine, queue) = setup();
        let mut timers = TimerQueue::new();
        let process = Process::log_only();
        let mut handler = Recorder::default();

        let sock = Socket::new(5, SocketState::Connected, EventMask::BOTH);
        engine.add(&sock).unwrap();
        queue.script().pending_errors.insert(5, libc::ECONNRESET);
        queue.push_ready(vec![Notification::readable(5)]);

        engine.run_once(&mut timers, &process, &mut handler);
        assert_eq!(handler.log, vec![format!("Error(fd=5, errno={})", libc::ECONNRESET)]);
        assert_eq!(sock.ref_count(), 0);
    }

    #[test]
    fn test_error_handler_removing_socket_sees_one_error() {
        let (mut engine, queue) = setup();
        let mut timers = TimerQueue::new();
        let process = Process::log_only();

        let sock = Socket::new(5, SocketState::Connected, EventMask::BOTH);
        engine.add(&sock).unwrap();
        queue.script().pending_errors.insert(5, libc::ECONNRESET);
        queue.push_ready(vec![Notification::readable(5), Notification::writable(5)]);

        let mut handler = Recorder::with_hook(Box::new(|event, cx| {
            if let Event::Error(s, _) = event {
                cx.sockets.remove(s);
            }
        }));
        engine.run_once(&mut timers, &process, &mut handler);

        assert_eq!(handler.log.len(), 1);
        assert!(handler.log[0].starts_with("Error(fd=5"));
        assert_eq!(sock.ref_count(), 0);
    }

    #[test]
    fn test_classification_through_loop() {
        let (mut engine, queue) = setup();
        let mut timers = TimerQueue::new();
        let process = Process::log_only();
        let mut handler = Recorder::default();

        let listener = Socket::new(3, SocketState::Listening, EventMask::NONE);
        let pending = Socket::new(4, SocketState::Connecting, EventMask::NONE);
        let stream = Socket::new(5, SocketState::Connected, EventMask::BOTH);
        let dgram = Socket::new(6, SocketState::Datagram, EventMask::BOTH);
        for s in [&listener, &pending, &stream, &dgram] {
            engine.add(s).unwrap();
        }

        queue.push_ready(vec![
            Notification::readable(3),
            Notification::writable(3),
            Notification::writable(4),
            Notification::readable(5),
            Notification::writable(5),
            Notification::eof(5),
            Notification::eof(6),
        ]);
        engine.run_once(&mut timers, &process, &mut handler);

        assert_eq!(
            handler.log,
            vec![
                "Accept(fd=3)",
                "Connect(fd=4)",
                "Read(fd=5)",
                "Write(fd=5)",
                "Eof(fd=5)",
                "Read(fd=6)",
            ]
        );
    }

    #[test]
    fn test_handler_removes_socket_mid_batch() {
        let (mut engine, queue) = setup();
        let mut timers = TimerQueue::new();
        let process = Process::log_only();

        let a = Socket::new(5, SocketState::Connected, EventMask::READABLE);
        let b = Socket::new(6, SocketState::Connected, EventMask::READABLE);
        engine.add(&a).unwrap();
        engine.add(&b).unwrap();
        queue.push_ready(vec![
            Notification::readable(5),
            Notification::readable(6),
            Notification::readable(5),
        ]);

        let peer = Rc::clone(&b);
        let refs_during = Rc::new(Cell::new(0));
        let seen = Rc::clone(&refs_during);
        let mut handler = Recorder::with_hook(Box::new(move |event, cx| {
            if let Event::Read(s) = event {
                seen.set(s.ref_count());
                // Dropping every socket, including the one in hand
                cx.sockets.remove(s);
                if !Rc::ptr_eq(s, &peer) {
                    cx.sockets.remove(&peer);
                }
            }
        }));
        engine.run_once(&mut timers, &process, &mut handler);

        assert_eq!(handler.log, vec!["Read(fd=5)"]);
        assert_eq!(refs_during.get(), 1);
        assert_eq!(a.ref_count(), 0);
        assert_eq!(b.ref_count(), 0);
        assert_eq!(engine.registered(), 0);
    }

    #[test]
    fn test_handler_adds_accepted_socket() {
        let (mut engine, queue) = setup();
        let mut timers = TimerQueue::new();
        let process = Process::log_only();

        let listener = Socket::new(3, SocketState::Listening, EventMask::NONE);
        engine.add(&listener).unwrap();
        queue.take_changes();
        queue.push_ready(vec![Notification::readable(3)]);

        let accepted = Rc::new(RefCell::new(Vec::new()));
        let keep = Rc::clone(&accepted);
        let mut handler = Recorder::with_hook(Box::new(move |event, cx| {
            if let Event::Accept(_) = event {
                let conn = Socket::new(7, SocketState::Connected, EventMask::READABLE);
                cx.sockets.add(&conn).unwrap();
                keep.borrow_mut().push(conn);
            }
        }));
        engine.run_once(&mut timers, &process, &mut handler);

        assert_eq!(accepted.borrow().len(), 1);
        assert_eq!(engine.registered(), 2);
        assert_eq!(queue.take_changes(), vec![enable(7, Filter::Read)]);
    }

    #[test]
    fn test_signal_registration_and_delivery() {
        let (mut engine, queue) = setup();
        let mut timers = TimerQueue::new();
        let process = Process::log_only();
        let mut handler = Recorder::default();

        engine.register_signal(libc::SIGHUP);
        assert_eq!(queue.script().watched, vec![libc::SIGHUP]);
        assert_eq!(queue.script().ignored, vec![libc::SIGHUP]);

        queue.push_ready(vec![Notification::signal(libc::SIGHUP)]);
        engine.run_once(&mut timers, &process, &mut handler);
        assert_eq!(handler.log, vec![format!("Signal({})", libc::SIGHUP)]);
    }

    #[test]
    fn test_signal_trap_failure_keeps_disposition() {
        let log = kevloop_core::kprint::capture();
        let (mut engine, queue) = setup();
        queue.script().fail_watch = Some(libc::EINVAL);

        engine.register_signal(libc::SIGUSR1);
        assert!(queue.script().ignored.is_empty());
        assert!(log.contains(&format!("Unable to trap signal {}", libc::SIGUSR1)));
    }

    #[test]
    fn test_interrupted_wait_is_not_an_error() {
        let (mut engine, queue) = setup();
        let mut timers = TimerQueue::new();
        let process = Process::log_only();
        let mut handler = Recorder::default();

        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        timers.add_oneshot(
            Instant::now(),
            Duration::ZERO,
            Box::new(move |_| {
                flag.set(true);
                TimerAction::Keep
            }),
        );

        queue.push_failure(libc::EINTR);
        assert_eq!(
            engine.run_once(&mut timers, &process, &mut handler),
            Turn::Interrupted
        );
        assert_eq!(engine.monitor().consecutive_errors(), 0);
        assert!(!fired.get());

        engine.run_once(&mut timers, &process, &mut handler);
        assert!(fired.get());
    }

    #[test]
    fn test_failed_wait_skips_dispatch_and_timers() {
        let _log = kevloop_core::kprint::capture();
        let (mut engine, queue) = setup();
        let mut timers = TimerQueue::new();
        let process = Process::log_only();
        let mut handler = Recorder::default();

        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        timers.add_oneshot(
            Instant::now(),
            Duration::ZERO,
            Box::new(move |_| {
                flag.set(true);
                TimerAction::Keep
            }),
        );

        queue.push_failure(libc::EIO);
        assert_eq!(engine.run_once(&mut timers, &process, &mut handler), Turn::Failed);
        assert!(!fired.get());
        assert!(handler.log.is_empty());
        assert_eq!(engine.monitor().consecutive_errors(), 1);
        // The due timer plus the decay timer
        assert_eq!(timers.len(), 2);

        assert_eq!(
            engine.run_once(&mut timers, &process, &mut handler),
            Turn::Dispatched(0)
        );
        assert!(fired.get());
    }

    #[test]
    fn test_error_count_decays_between_failures() {
        let _log = kevloop_core::kprint::capture();
        let queue = ScriptedQueue::new();
        let shared = queue.clone();
        let config = EngineConfig::new()
            .max_sockets(64)
            .error_expire(Duration::from_millis(1));
        let mut engine = QueueEngine::new(&config, move || Ok(shared.clone()));
        engine.init(64).unwrap();

        let mut timers = TimerQueue::new();
        let reasons = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&reasons);
        let process = Process::new(Box::new(move |r| sink.borrow_mut().push(r.to_string())));
        let mut handler = Recorder::default();

        for _ in 0..5 {
            queue.push_failure(libc::EIO);
        }
        for _ in 0..5 {
            engine.run_once(&mut timers, &process, &mut handler);
        }
        assert_eq!(engine.monitor().consecutive_errors(), 5);
        assert_eq!(timers.len(), 1);

        // Quiet turns, each after the decay period: one failure forgotten per turn
        for left in (0..5).rev() {
            std::thread::sleep(Duration::from_millis(5));
            assert_eq!(
                engine.run_once(&mut timers, &process, &mut handler),
                Turn::Dispatched(0)
            );
            assert_eq!(engine.monitor().consecutive_errors(), left);
        }
        assert!(timers.is_empty());

        queue.push_failure(libc::EIO);
        assert_eq!(engine.run_once(&mut timers, &process, &mut handler), Turn::Failed);
        assert_eq!(engine.monitor().consecutive_errors(), 1);
        assert_eq!(timers.len(), 1);
        assert!(reasons.borrow().is_empty());
    }

    #[test]
    fn test_timers_run_after_the_whole_batch() {
        let (mut engine, queue) = setup();
        let mut timers = TimerQueue::new();
        let process = Process::log_only();

        let a = Socket::new(5, SocketState::Connected, EventMask::BOTH);
        let b = Socket::new(6, SocketState::Datagram, EventMask::READABLE);
        engine.add(&a).unwrap();
        engine.add(&b).unwrap();
        queue.push_ready(vec![
            Notification::readable(5),
            Notification::writable(5),
            Notification::readable(6),
        ]);

        let order = Rc::new(RefCell::new(Vec::new()));
        let from_timer = Rc::clone(&order);
        timers.add_oneshot(
            Instant::now(),
            Duration::ZERO,
            Box::new(move |_| {
                from_timer.borrow_mut().push("timer".to_string());
                TimerAction::Keep
            }),
        );

        let from_handler = Rc::clone(&order);
        let mut handler = Recorder::with_hook(Box::new(move |event, _| {
            from_handler.borrow_mut().push(format!("{:?}", event));
        }));
        engine.run_once(&mut timers, &process, &mut handler);

        assert_eq!(
            *order.borrow(),
            vec!["Read(fd=5)", "Write(fd=5)", "Read(fd=6)", "timer"]
        );
    }

    #[test]
    fn test_error_raised_while_draining_waits_for_next_turn() {
        let (mut engine, queue) = setup();
        let mut timers = TimerQueue::new();
        let process = Process::log_only();

        queue.script().fail_apply = Some(libc::EBADF);
        let sock = Socket::new(5, SocketState::Connected, EventMask::READABLE);
        engine.add(&sock).unwrap();

        // Every error answered with another rejected interest change
        let mut handler = Recorder::with_hook(Box::new(|event, cx| {
            if let Event::Error(s, _) = event {
                cx.sockets.change_events(s, !s.events());
            }
        }));

        assert_eq!(
            engine.run_once(&mut timers, &process, &mut handler),
            Turn::Dispatched(0)
        );
        assert_eq!(handler.log.len(), 1);

        engine.run_once(&mut timers, &process, &mut handler);
        assert_eq!(handler.log.len(), 2);
        assert_eq!(sock.ref_count(), 1);
    }

    #[test]
    fn test_wait_failures_escalate_to_restart() {
        let log = kevloop_core::kprint::capture();
        let (mut engine, queue) = setup();
        let mut timers = TimerQueue::new();
        let reasons = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&reasons);
        let process = Process::new(Box::new(move |r| sink.borrow_mut().push(r.to_string())));
        let mut handler = Recorder::default();

        for _ in 0..20 {
            queue.push_failure(libc::EIO);
        }
        for _ in 0..19 {
            assert_eq!(engine.run_once(&mut timers, &process, &mut handler), Turn::Failed);
        }
        assert!(reasons.borrow().is_empty());
        assert_eq!(timers.len(), 1);

        engine.run_once(&mut timers, &process, &mut handler);
        assert_eq!(*reasons.borrow(), vec!["too many wait errors".to_string()]);
        assert!(log.contains("wait() error"));
    }

    #[test]
    fn test_handler_and_timers_share_now() {
        let (mut engine, queue) = setup();
        let mut timers = TimerQueue::new();
        let process = Process::log_only();

        let sock = Socket::new(5, SocketState::Connected, EventMask::READABLE);
        engine.add(&sock).unwrap();
        queue.push_ready(vec![Notification::readable(5)]);

        let timer_now = Rc::new(Cell::new(None));
        let t = Rc::clone(&timer_now);
        timers.add_oneshot(
            Instant::now(),
            Duration::ZERO,
            Box::new(move |fired| {
                t.set(Some(fired.now));
                TimerAction::Keep
            }),
        );

        let handler_now = Rc::new(Cell::new(None));
        let h = Rc::clone(&handler_now);
        let mut handler = Recorder::with_hook(Box::new(move |_, cx| h.set(Some(cx.now))));
        engine.run_once(&mut timers, &process, &mut handler);

        let stamp = engine.now();
        assert_eq!(handler_now.get(), Some(stamp));
        assert_eq!(timer_now.get(), Some(stamp.instant));
    }

    #[test]
    fn test_wait_timeout_follows_timers() {
        let (mut engine, queue) = setup();
        let mut timers = TimerQueue::new();
        let process = Process::log_only();
        let mut handler = Recorder::default();

        engine.run_once(&mut timers, &process, &mut handler);
        timers.add_oneshot(Instant::now(), Duration::from_secs(5), Box::new(|_| TimerAction::Keep));
        engine.run_once(&mut timers, &process, &mut handler);

        let timeouts = queue.script().timeouts.clone();
        assert_eq!(timeouts[0], None);
        let t = timeouts[1].unwrap();
        assert!(t <= Duration::from_secs(5) && t > Duration::from_secs(4));
    }

    #[test]
    fn test_run_returns_when_process_stops() {
        let (mut engine, queue) = setup();
        let mut timers = TimerQueue::new();
        let process = Process::log_only();
        let mut handler = Recorder::default();

        queue.script().running = Some(process.running_flag());
        queue.push_ready(vec![Notification::signal(libc::SIGTERM)]);
        queue.push_ready(vec![Notification::signal(libc::SIGHUP)]);

        engine.run(&mut timers, &process, &mut handler);
        assert!(!process.is_running());
        assert_eq!(handler.log.len(), 2);
    }
}
