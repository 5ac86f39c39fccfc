use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::persistence::DEFAULT_STORAGE_KEY;

/// Tunables for persistence, debouncing, retry and sandbox connection.
/// Every field has a default, so a partial (or absent) config file works.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Retention ceiling for persisted sessions
    pub max_sessions: usize,

    /// Sessions that keep full event payloads when storage is compacted
    pub full_event_sessions: usize,

    /// Window in which message/event changes coalesce into one write
    pub debounce_ms: u64,

    /// Countdown used when a rate-limit error carries no usable hint
    pub default_retry_wait_secs: u64,

    pub storage_key: String,

    /// Byte budget for the storage medium. `None` means unbounded.
    pub storage_quota_bytes: Option<usize>,

    pub sandbox: BackoffConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_sessions: 50,
            full_event_sessions: 3,
            debounce_ms: 100,
            default_retry_wait_secs: 60,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            storage_quota_bytes: None,
            sandbox: BackoffConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Load from a JSON file. A missing file yields the defaults.
    ///
    /// # Errors
    /// `ConfigError::Read` for I/O failures other than not-found,
    /// `ConfigError::Parse` for malformed JSON.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn default_retry_wait(&self) -> Duration {
        Duration::from_secs(self.default_retry_wait_secs)
    }
}

/// Bounded exponential backoff for sandbox connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Timeout applied to each individual provisioning call
    pub op_timeout_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
            op_timeout_ms: 30_000,
        }
    }
}

impl BackoffConfig {
    /// Delay before retry number `attempt` (0-based): doubles from
    /// `initial_delay_ms`, capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let ms = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}
