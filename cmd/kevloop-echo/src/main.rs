//! kevloop Echo Server
//!
//! Single-threaded TCP echo server driven by the kevloop event engine.
//!
//! Usage:
//!     cargo build --release -p kevloop-echo
//!     ./target/release/kevloop-echo [port] [max_sockets]
//!
//! Test with:
//!     echo "hello" | nc localhost 9999
//!
//!     # Quick load (from another terminal):
//!     for i in $(seq 1 100); do echo "ping $i" | nc -q0 localhost 9999 & done
//!
//! SIGINT/SIGTERM stop the server, SIGHUP prints stats.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::rc::Rc;
use std::time::{Duration, Instant};

use kevloop::{
    kerror, kinfo, kwarn, Context, EngineConfig, EngineError, Event, EventHandler, EventLoop,
    EventMask, Socket, SocketRef, SocketState, TimerAction, TimerService,
};

const BUF_SIZE: usize = 4096;
const STATS_INTERVAL: Duration = Duration::from_secs(5);

// ── Per-connection state ──

struct Conn {
    stream: TcpStream,
    sock: SocketRef,
    /// Bytes read but not yet written back
    pending: Vec<u8>,
}

// ── Stats ──

#[derive(Default)]
struct Stats {
    conns: usize,
    accepts: u64,
    closes: u64,
    bytes_in: u64,
    bytes_out: u64,
    errors: u64,
}

impl Stats {
    fn print(&self, elapsed_secs: f64) {
        kinfo!(
            "[{:.1}s] conns={} accepts={} close={} bytes_in={} bytes_out={} err={}",
            elapsed_secs,
            self.conns,
            self.accepts,
            self.closes,
            self.bytes_in,
            self.bytes_out,
            self.errors,
        );
    }
}

// ── Handler ──

struct Echo {
    listener: TcpListener,
    conns: HashMap<RawFd, Conn>,
    stats: Rc<RefCell<Stats>>,
    start: Instant,
}

impl Echo {
    fn accept(&mut self, cx: &mut Context<'_>) {
        loop {
            let stream = match self.listener.accept() {
                Ok((stream, _)) => stream,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    kwarn!("accept failed: {}", e);
                    self.stats.borrow_mut().errors += 1;
                    return;
                }
            };
            if let Err(e) = stream.set_nonblocking(true) {
                kwarn!("set_nonblocking failed: {}", e);
                continue;
            }

            let fd = stream.as_raw_fd();
            let sock = Socket::new(fd, SocketState::Connected, EventMask::READABLE);
            if cx.sockets.add(&sock).is_err() {
                // Registry full; dropping the stream closes it
                self.stats.borrow_mut().errors += 1;
                continue;
            }

            self.conns.insert(fd, Conn { stream, sock, pending: Vec::new() });
            let mut stats = self.stats.borrow_mut();
            stats.accepts += 1;
            stats.conns = self.conns.len();
        }
    }

    fn read(&mut self, fd: RawFd, cx: &mut Context<'_>) {
        let Some(conn) = self.conns.get_mut(&fd) else {
            return;
        };

        let mut buf = [0u8; BUF_SIZE];
        let mut closed = false;
        loop {
            match conn.stream.read(&mut buf) {
                Ok(0) => {
                    closed = true;
                    break;
                }
                Ok(n) => {
                    conn.pending.extend_from_slice(&buf[..n]);
                    self.stats.borrow_mut().bytes_in += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => {
                    self.stats.borrow_mut().errors += 1;
                    closed = true;
                    break;
                }
            }
        }

        if closed {
            self.close(fd, cx);
        } else {
            self.flush(fd, cx);
        }
    }

    /// Write back whatever is pending and watch for writability only while
    /// something is left over.
    fn flush(&mut self, fd: RawFd, cx: &mut Context<'_>) {
        let Some(conn) = self.conns.get_mut(&fd) else {
            return;
        };

        while !conn.pending.is_empty() {
            match conn.stream.write(&conn.pending) {
                Ok(n) => {
                    conn.pending.drain(..n);
                    self.stats.borrow_mut().bytes_out += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => {
                    self.stats.borrow_mut().errors += 1;
                    self.close(fd, cx);
                    return;
                }
            }
        }

        let wanted = if conn.pending.is_empty() {
            EventMask::READABLE
        } else {
            EventMask::BOTH
        };
        if conn.sock.events() != wanted {
            cx.sockets.change_events(&conn.sock, wanted);
        }
    }

    fn close(&mut self, fd: RawFd, cx: &mut Context<'_>) {
        if let Some(conn) = self.conns.remove(&fd) {
            cx.sockets.remove(&conn.sock);
            let mut stats = self.stats.borrow_mut();
            stats.closes += 1;
            stats.conns = self.conns.len();
        }
    }
}

impl EventHandler for Echo {
    fn on_event(&mut self, event: Event, cx: &mut Context<'_>) {
        match event {
            Event::Accept(_) => self.accept(cx),
            Event::Read(sock) => self.read(sock.fd(), cx),
            Event::Write(sock) => self.flush(sock.fd(), cx),
            Event::Eof(sock) => self.close(sock.fd(), cx),
            Event::Error(sock, errno) => {
                kwarn!("socket {}: {}", sock.fd(), io::Error::from_raw_os_error(errno));
                self.stats.borrow_mut().errors += 1;
                self.close(sock.fd(), cx);
            }
            Event::Signal(sig) if sig == libc::SIGHUP => {
                kinfo!("kevloop-echo: stats requested at {}", cx.now.unix_secs());
                self.stats.borrow().print(self.start.elapsed().as_secs_f64());
            }
            Event::Signal(_) => {
                kinfo!("kevloop-echo: shutting down...");
                cx.process.stop();
            }
            Event::Connect(_) => {}
        }
    }
}

// ── Main ──

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let port: u16 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(9999);

    let mut config = EngineConfig::from_env();
    if let Some(max) = args.get(2).and_then(|s| s.parse().ok()) {
        config = config.max_sockets(max);
    }
    if let Err(e) = config.validate() {
        kerror!("kevloop-echo: {}", e);
        std::process::exit(2);
    }
    config.print();

    let mut ev = match EventLoop::new(&config) {
        Ok(ev) => ev,
        Err(EngineError::NoBackend) => {
            kerror!(
                "kevloop-echo: no event engine for this platform (compiled backends: {:?})",
                kevloop::backend_names()
            );
            std::process::exit(1);
        }
        Err(e) => {
            kerror!("kevloop-echo: {}", e);
            std::process::exit(1);
        }
    };

    let listener = TcpListener::bind(("0.0.0.0", port)).expect("bind failed");
    listener.set_nonblocking(true).expect("set_nonblocking failed");
    let listen_sock = Socket::new(listener.as_raw_fd(), SocketState::Listening, EventMask::NONE);
    ev.engine_mut().add(&listen_sock).expect("listener does not fit in the registry");

    for sig in [libc::SIGINT, libc::SIGTERM, libc::SIGHUP] {
        ev.engine_mut().register_signal(sig);
    }

    let start = Instant::now();
    let stats = Rc::new(RefCell::new(Stats::default()));
    let ticker = Rc::clone(&stats);
    ev.timers_mut().add_periodic(
        start,
        STATS_INTERVAL,
        Box::new(move |fired| {
            ticker.borrow().print(fired.now.duration_since(start).as_secs_f64());
            TimerAction::Keep
        }),
    );

    kinfo!("kevloop-echo: listening on 0.0.0.0:{} ({})", port, ev.name());

    let mut echo = Echo {
        listener,
        conns: HashMap::new(),
        stats: Rc::clone(&stats),
        start,
    };
    ev.run(&mut echo);

    // Shutdown
    stats.borrow().print(start.elapsed().as_secs_f64());
    for conn in echo.conns.values() {
        ev.engine_mut().remove(&conn.sock);
    }
    ev.engine_mut().remove(&listen_sock);
    kinfo!("kevloop-echo: done.");
}
