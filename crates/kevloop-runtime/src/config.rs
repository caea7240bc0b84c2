//! Engine configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use kevloop_runtime::config::EngineConfig;
//!
//! // Defaults with env overrides
//! let config = EngineConfig::from_env();
//!
//! // Or customize programmatically
//! let config = EngineConfig::from_env()
//!     .max_sockets(4096)
//!     .error_threshold(50);
//! ```

use std::time::Duration;

use kevloop_core::constants;
use kevloop_core::env::{env_get, env_get_secs};
use kevloop_core::kinfo;

/// Engine configuration with builder pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Registry capacity; descriptors must be below this
    pub max_sockets: usize,
    /// Notifications fetched per wait call
    pub events_per_wait: usize,
    /// Consecutive wait failures before the process restarts
    pub error_threshold: u32,
    /// Decay timer period for the wait failure counter
    pub error_expire: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl EngineConfig {
    /// Create config from defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `KEV_MAX_SOCKETS` - Registry capacity
    /// - `KEV_EVENTS_PER_WAIT` - Notifications per wait call
    /// - `KEV_ERROR_THRESHOLD` - Wait failures before restart
    /// - `KEV_ERROR_EXPIRE_SECS` - Failure decay period in seconds
    pub fn from_env() -> Self {
        Self {
            max_sockets: env_get("KEV_MAX_SOCKETS", constants::DEFAULT_MAX_SOCKETS),
            events_per_wait: env_get("KEV_EVENTS_PER_WAIT", constants::EVENTS_PER_WAIT),
            error_threshold: env_get("KEV_ERROR_THRESHOLD", constants::ERROR_THRESHOLD),
            error_expire: env_get_secs("KEV_ERROR_EXPIRE_SECS", constants::ERROR_EXPIRE),
        }
    }

    /// Create config with explicit defaults (no env override).
    pub fn new() -> Self {
        Self {
            max_sockets: constants::DEFAULT_MAX_SOCKETS,
            events_per_wait: constants::EVENTS_PER_WAIT,
            error_threshold: constants::ERROR_THRESHOLD,
            error_expire: constants::ERROR_EXPIRE,
        }
    }

    // Builder methods

    pub fn max_sockets(mut self, n: usize) -> Self {
        self.max_sockets = n;
        self
    }

    pub fn events_per_wait(mut self, n: usize) -> Self {
        self.events_per_wait = n;
        self
    }

    pub fn error_threshold(mut self, n: u32) -> Self {
        self.error_threshold = n;
        self
    }

    pub fn error_expire(mut self, d: Duration) -> Self {
        self.error_expire = d;
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sockets == 0 {
            return Err(ConfigError::InvalidValue("max_sockets must be > 0"));
        }
        if self.events_per_wait == 0 {
            return Err(ConfigError::InvalidValue("events_per_wait must be > 0"));
        }
        if self.error_threshold == 0 {
            return Err(ConfigError::InvalidValue("error_threshold must be > 0"));
        }
        if self.error_expire.is_zero() {
            return Err(ConfigError::InvalidValue("error_expire must be > 0"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        kinfo!(System: "kevloop configuration:");
        kinfo!(System: "  max_sockets:      {}", self.max_sockets);
        kinfo!(System: "  events_per_wait:  {}", self.events_per_wait);
        kinfo!(System: "  error_threshold:  {}", self.error_threshold);
        kinfo!(System: "  error_expire:     {:?}", self.error_expire);
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
