//! Environment variable utilities
//!
//! Typed lookups with defaults, used by `EngineConfig::from_env()` and
//! the logging setup.
//!
//! ```ignore
//! use kevloop_core::env::{env_get, env_get_secs};
//!
//! let max: usize = env_get("KEV_MAX_SOCKETS", 1024);
//! let expire = env_get_secs("KEV_ERROR_EXPIRE_SECS", Duration::from_secs(3600));
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Get environment variable parsed as type T, or return default.
///
/// Unset variables and values that fail to parse both yield `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as boolean.
///
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true; any other
/// value is false. Unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// `Some(T)` if the variable is set and parses, `None` otherwise.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Whole seconds as a `Duration`.
#[inline]
pub fn env_get_secs(key: &str, default: Duration) -> Duration {
    env_get_opt::<u64>(key)
        .map(Duration::from_secs)
        .unwrap_or(default)
}
