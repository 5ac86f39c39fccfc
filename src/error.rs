//! Error types for desk-sync
//!
//! Domain-specific error enums using thiserror. Expected conditions (unknown
//! ids, missing storage medium) are not errors here: they are absorbed as
//! no-ops or reported through the notification channel.

use crate::model::ToolCallId;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("event {0} already exists")]
    DuplicateId(ToolCallId),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage quota exceeded: {needed} bytes needed, {capacity} available")]
    QuotaExceeded { needed: usize, capacity: usize },
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}

/// Failures reported by the sandbox provisioning service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProvisionError {
    #[error("sandbox {0} not found")]
    NotFound(String),
    #[error("sandbox is not running")]
    NotRunning,
    #[error("provisioning call timed out")]
    Timeout,
    #[error("provisioning: {0}")]
    Other(String),
}

/// Failures reported by the chat transport.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        retry_after_secs: Option<u64>,
    },
    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        last_error: Box<TransportError>,
    },
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("session {0} not found")]
    SessionNotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_exceeded_display_mentions_sizes() {
        let error = StorageError::QuotaExceeded {
            needed: 6_000,
            capacity: 5_000,
        };
        let display = error.to_string();
        assert!(display.contains("quota exceeded"));
        assert!(display.contains("6000"));
        assert!(display.contains("5000"));
        assert!(error.is_quota_exceeded());
    }

    #[test]
    fn io_error_preserves_source_kind() {
        let error = StorageError::Io {
            path: "/data/sessions.json".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(!error.is_quota_exceeded());

        let source_err = std::error::Error::source(&error).unwrap();
        let io_err = source_err.downcast_ref::<std::io::Error>().unwrap();
        assert_eq!(io_err.kind(), std::io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn retries_exhausted_display_includes_inner_error() {
        let error = TransportError::RetriesExhausted {
            attempts: 3,
            last_error: Box::new(TransportError::Http {
                status: 429,
                message: "Too Many Requests".into(),
                retry_after_secs: None,
            }),
        };
        let display = error.to_string();
        assert!(display.contains("3 attempts"));
        assert!(display.contains("HTTP 429"));
    }

    #[test]
    fn sync_error_wraps_store_error_transparently() {
        let error: SyncError = StoreError::DuplicateId("call_1".into()).into();
        assert_eq!(error.to_string(), "event call_1 already exists");
    }
}
