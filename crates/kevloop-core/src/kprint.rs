//! Kernel-style print macros for kevloop
//!
//! Thread-safe, optionally-flushing leveled output to stderr, tagged with
//! the subsystem that produced it (engine/system setup vs. socket traffic).
//!
//! # Environment Variables
//!
//! - `KEV_FLUSH_EPRINT=1` - Flush stderr after each line (useful when chasing crashes)
//! - `KEV_LOG_LEVEL=<level>` - 0=off, 1=error, 2=warn, 3=info, 4=debug, 5=trace
//!
//! # Usage
//!
//! ```ignore
//! use kevloop_core::{kerror, kwarn, kinfo};
//!
//! kinfo!("engine {} ready", name);
//! kwarn!(System: "Unable to trap signal {}", sig);
//! kerror!(Socket: "kevent() error: {}", err);
//! ```

use std::cell::RefCell;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::env::env_get_bool;

/// Log levels (matches common conventions)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }

    fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "off" | "0" => LogLevel::Off,
            "error" | "1" => LogLevel::Error,
            "warn" | "2" => LogLevel::Warn,
            "info" | "3" => LogLevel::Info,
            "debug" | "4" => LogLevel::Debug,
            "trace" | "5" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }
}

/// Which part of the engine a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSubsystem {
    /// Backend setup, signal trapping, restarts
    System,
    /// Per-socket interest updates and the wait loop
    Socket,
}

impl LogSubsystem {
    pub fn tag(&self) -> &'static str {
        match self {
            LogSubsystem::System => "[system]",
            LogSubsystem::Socket => "[socket]",
        }
    }
}

static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

thread_local! {
    static CAPTURE: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Initialize logging from environment variables
///
/// Called automatically on first log, but can be called explicitly for
/// deterministic initialization.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    FLUSH_ENABLED.store(env_get_bool("KEV_FLUSH_EPRINT", false), Ordering::Relaxed);

    if let Ok(val) = std::env::var("KEV_LOG_LEVEL") {
        LOG_LEVEL.store(LogLevel::parse(&val) as u8, Ordering::Relaxed);
    }
}

#[inline]
pub fn flush_enabled() -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    FLUSH_ENABLED.load(Ordering::Relaxed)
}

#[inline]
pub fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level programmatically (overrides `KEV_LOG_LEVEL`)
pub fn set_log_level(level: LogLevel) {
    INITIALIZED.store(true, Ordering::SeqCst);
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn set_flush_enabled(enabled: bool) {
    FLUSH_ENABLED.store(enabled, Ordering::Relaxed);
}

#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level as u8 <= log_level() as u8
}

/// Captures every line logged on the current thread until dropped.
///
/// Captured lines are recorded regardless of the configured level and are
/// not written to stderr.
pub struct CaptureGuard {
    _private: (),
}

impl CaptureGuard {
    /// Lines captured so far.
    pub fn lines(&self) -> Vec<String> {
        CAPTURE.with(|c| c.borrow().clone().unwrap_or_default())
    }

    /// True if any captured line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        CAPTURE.with(|c| *c.borrow_mut() = None);
    }
}

/// Start capturing log output on this thread.
pub fn capture() -> CaptureGuard {
    CAPTURE.with(|c| *c.borrow_mut() = Some(Vec::new()));
    CaptureGuard { _private: () }
}

fn format_line(
    level: LogLevel,
    subsystem: Option<LogSubsystem>,
    args: std::fmt::Arguments<'_>,
) -> String {
    match subsystem {
        Some(s) => format!("{} {} {}", level.prefix(), s.tag(), args),
        None => format!("{} {}", level.prefix(), args),
    }
}

/// Internal: leveled, tagged print
#[doc(hidden)]
pub fn _klog_impl(
    level: LogLevel,
    subsystem: Option<LogSubsystem>,
    args: std::fmt::Arguments<'_>,
) {
    let captured = CAPTURE.with(|c| match c.borrow_mut().as_mut() {
        Some(buf) => {
            buf.push(format_line(level, subsystem, args));
            true
        }
        None => false,
    });
    if captured || !level_enabled(level) {
        return;
    }

    let line = format_line(level, subsystem, args);
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = handle.write_all(line.as_bytes());
    let _ = handle.write_all(b"\n");
    if flush_enabled() {
        let _ = handle.flush();
    }
}

// ============================================================================
// Public Macros
// ============================================================================

/// Leveled log with optional `System:` / `Socket:` subsystem tag.
#[macro_export]
macro_rules! klog {
    ($level:ident, System: $($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::$level,
            Some($crate::kprint::LogSubsystem::System),
            format_args!($($arg)*)
        );
    }};
    ($level:ident, Socket: $($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::$level,
            Some($crate::kprint::LogSubsystem::Socket),
            format_args!($($arg)*)
        );
    }};
    ($level:ident, $($arg:tt)*) => {{
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::$level,
            None,
            format_args!($($arg)*)
        );
    }};
}

/// Error level log (always shown unless logging is off)
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => { $crate::klog!(Error, $($arg)*) };
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => { $crate::klog!(Warn, $($arg)*) };
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => { $crate::klog!(Info, $($arg)*) };
}

#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => { $crate::klog!(Debug, $($arg)*) };
}

/// Trace level log (most verbose)
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => { $crate::klog!(Trace, $($arg)*) };
}
