use std::sync::mpsc;

use tracing::debug;

use crate::model::SandboxId;

/// User-facing notices emitted to the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Persistence succeeded only after dropping data (older event payloads)
    StorageQuotaWarning { message: String },

    /// Persistence had to clear all stored sessions
    StorageQuotaError { message: String },

    /// Upstream rate limit hit; a resend is scheduled after `countdown` seconds
    RateLimitExceeded { countdown: u64, message: String },

    /// The session's sandbox was gone and a replacement was provisioned
    SandboxRecovered { sandbox_id: SandboxId },

    /// The sandbox could not be reached after all retries
    SandboxError { message: String },
}

/// Sending half of the notification channel. A notifier without a receiver
/// silently drops notices.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    tx: Option<mpsc::Sender<Notification>>,
}

impl Notifier {
    pub fn new(tx: mpsc::Sender<Notification>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Notifier paired with a fresh receiver.
    pub fn channel() -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel();
        (Self::new(tx), rx)
    }

    /// Notifier that drops everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, notification: Notification) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(notification).is_err() {
            debug!("notification receiver dropped");
        }
    }
}
