//! Watcher configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Event kinds for which only the latest occurrence matters when attaching
/// to a journal that already has history.
pub const DEFAULT_STATE_KINDS: [&str; 5] = ["Docked", "Shutdown", "Undocked", "StartJump", "FSDJump"];

/// How long to keep waiting for the journal directory at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Number of checks before giving up, including the first one.
    pub max_attempts: u32,
    /// Delay between two checks, in milliseconds.
    pub delay_ms: u64,
}

impl RetryPolicy {
    /// Fail on the first check.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            delay_ms: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            delay_ms: 500,
        }
    }
}

/// Configuration for a [`JournalWatcher`](crate::JournalWatcher).
///
/// Every field has a default, so a JSON config file only needs to name the
/// settings it overrides:
///
/// ```
/// use journal_reader::WatchConfig;
///
/// let config = WatchConfig::from_json_str(r#"{ "force_polling": true }"#).unwrap();
/// assert!(config.force_polling);
/// assert_eq!(config.poll_interval_ms, 250);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Use the polling change source even when native notifications work.
    pub force_polling: bool,
    /// Polling change source interval, in milliseconds.
    pub poll_interval_ms: u64,
    /// Heartbeat interval, in milliseconds. Zero disables the heartbeat.
    pub heartbeat_interval_ms: u64,
    /// Startup policy for a journal directory that does not exist yet.
    pub directory_retry: RetryPolicy,
    /// Kinds kept by the bootstrap scan of a freshly attached journal.
    pub state_kinds: Vec<String>,
    /// JSON field holding the event kind.
    pub kind_field: String,
    /// JSON field holding the event timestamp.
    pub timestamp_field: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            force_polling: false,
            poll_interval_ms: 250,
            heartbeat_interval_ms: 100,
            directory_retry: RetryPolicy::default(),
            state_kinds: DEFAULT_STATE_KINDS.iter().map(|k| k.to_string()).collect(),
            kind_field: "event".to_string(),
            timestamp_field: "timestamp".to_string(),
        }
    }
}

impl WatchConfig {
    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a JSON configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::PathNotFound {
                path: path.display().to_string(),
            },
            _ => Error::Io(e),
        })?;
        Self::from_json_str(&json)
    }

    /// Rejects settings the watcher cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms must be greater than zero"));
        }
        if self.directory_retry.max_attempts == 0 {
            return Err(invalid("directory_retry.max_attempts must be at least 1"));
        }
        if self.kind_field.is_empty() {
            return Err(invalid("kind_field must not be empty"));
        }
        if self.timestamp_field.is_empty() {
            return Err(invalid("timestamp_field must not be empty"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// `None` when the heartbeat is disabled.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }
}

fn invalid(message: &str) -> Error {
    Error::InvalidConfig {
        message: message.to_string(),
    }
}
