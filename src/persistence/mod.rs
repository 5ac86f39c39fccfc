//! Durable persistence of sessions to a capacity-bounded key-value medium.
//!
//! The whole session array lives under one namespaced key. Saving walks an
//! ordered list of [`SaveStrategy`]s: each later strategy keeps less data,
//! and the first one whose write fits wins.

pub mod migrate;
pub mod storage;

pub use migrate::{decode_sessions, migrate};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::error::StorageError;
use crate::model::{SessionId, StoredSession};
use crate::notify::{Notification, Notifier};

/// Storage key holding the persisted session array.
pub const DEFAULT_STORAGE_KEY: &str = "desk-sync:sessions";

/// One step of the degradation cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStrategy {
    /// Keep the newest `ceiling` sessions with full payloads
    Retain { ceiling: usize },

    /// Keep the newest `ceiling` sessions; only the `keep_full` most recently
    /// updated keep their event payloads
    Compact { ceiling: usize, keep_full: usize },

    /// Remove all persisted state
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { retained: usize },
    Compacted { retained: usize, stripped: usize },
    Cleared,
    /// No storage medium; nothing was written
    Skipped,
}

pub struct PersistenceAdapter {
    storage: Option<Box<dyn KeyValueStorage>>,
    key: String,
    max_sessions: usize,
    full_event_sessions: usize,
    notifier: Notifier,
}

impl std::fmt::Debug for PersistenceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceAdapter")
            .field("available", &self.storage.is_some())
            .field("key", &self.key)
            .field("max_sessions", &self.max_sessions)
            .field("full_event_sessions", &self.full_event_sessions)
            .finish()
    }
}

impl PersistenceAdapter {
    pub fn new(storage: impl KeyValueStorage + 'static, config: &SyncConfig, notifier: Notifier) -> Self {
        Self {
            storage: Some(Box::new(storage)),
            key: config.storage_key.clone(),
            max_sessions: config.max_sessions,
            full_event_sessions: config.full_event_sessions,
            notifier,
        }
    }

    /// Adapter for an environment without a storage medium. Every operation
    /// is a logged no-op.
    pub fn unavailable(config: &SyncConfig, notifier: Notifier) -> Self {
        warn!("no storage medium available; sessions will not persist");
        Self {
            storage: None,
            key: config.storage_key.clone(),
            max_sessions: config.max_sessions,
            full_event_sessions: config.full_event_sessions,
            notifier,
        }
    }

    pub fn is_available(&self) -> bool {
        self.storage.is_some()
    }

    pub fn storage(&self) -> Option<&dyn KeyValueStorage> {
        self.storage.as_deref()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// The degradation cascade, tried in order.
    pub fn strategies(&self) -> [SaveStrategy; 3] {
        [
            SaveStrategy::Retain {
                ceiling: self.max_sessions,
            },
            SaveStrategy::Compact {
                ceiling: (self.max_sessions / 2).max(1),
                keep_full: self.full_event_sessions,
            },
            SaveStrategy::Clear,
        ]
    }

    /// Load every persisted session, migrated to the current schema.
    /// Never fails: a missing medium or unreadable data yields an empty list.
    pub fn load(&self) -> Vec<StoredSession> {
        let Some(storage) = &self.storage else {
            warn!("no storage medium; starting without saved sessions");
            return Vec::new();
        };

        let content = match storage.get(&self.key) {
            Ok(Some(content)) => content,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "failed to read saved sessions");
                return Vec::new();
            }
        };

        match decode_sessions(&content) {
            Ok((sessions, _skipped)) => sessions,
            Err(e) => {
                warn!(error = %e, "saved sessions are unreadable; ignoring them");
                Vec::new()
            }
        }
    }

    pub fn load_one(&self, id: &SessionId) -> Option<StoredSession> {
        self.load().into_iter().find(|s| s.id() == id)
    }

    /// Persist `sessions` (in insertion order), degrading on quota errors.
    pub fn save(&mut self, sessions: &[StoredSession]) -> Result<SaveOutcome, StorageError> {
        if self.storage.is_none() {
            debug!("no storage medium; skipping save");
            return Ok(SaveOutcome::Skipped);
        }

        for strategy in self.strategies() {
            match self.try_strategy(strategy, sessions) {
                Ok(outcome) => {
                    self.report(outcome);
                    return Ok(outcome);
                }
                Err(e) if e.is_quota_exceeded() => {
                    warn!(?strategy, error = %e, "save did not fit; degrading");
                }
                Err(e) => return Err(e),
            }
        }

        // Clear always succeeds or returns a non-quota error above.
        Ok(SaveOutcome::Cleared)
    }

    /// Replace (or append) one session and persist the whole array.
    pub fn save_one(&mut self, session: StoredSession) -> Result<SaveOutcome, StorageError> {
        self.save_one_ordered(session, &[])
    }

    /// Replace one session in place. A session not yet persisted is inserted
    /// ahead of every persisted session that follows it in `order` (the
    /// caller's insertion order), so a record the ceiling already evicted
    /// can never push out newer ones. Ids missing from `order` append.
    pub fn save_one_ordered(
        &mut self,
        session: StoredSession,
        order: &[SessionId],
    ) -> Result<SaveOutcome, StorageError> {
        let mut sessions = self.load();
        if let Some(existing) = sessions.iter_mut().find(|s| s.id() == session.id()) {
            *existing = session;
            return self.save(&sessions);
        }

        let later: HashSet<&SessionId> = order
            .iter()
            .skip_while(|id| *id != session.id())
            .skip(1)
            .collect();
        let at = sessions
            .iter()
            .position(|s| later.contains(s.id()))
            .unwrap_or(sessions.len());
        sessions.insert(at, session);
        self.save(&sessions)
    }

    /// Remove one session. Returns whether it was present.
    pub fn delete(&mut self, id: &SessionId) -> Result<bool, StorageError> {
        let mut sessions = self.load();
        let before = sessions.len();
        sessions.retain(|s| s.id() != id);
        if sessions.len() == before {
            return Ok(false);
        }
        self.save(&sessions)?;
        Ok(true)
    }

    pub fn clear(&mut self) -> Result<(), StorageError> {
        match self.storage.as_mut() {
            Some(storage) => storage.remove(&self.key),
            None => Ok(()),
        }
    }

    fn try_strategy(
        &mut self,
        strategy: SaveStrategy,
        sessions: &[StoredSession],
    ) -> Result<SaveOutcome, StorageError> {
        let Some(storage) = self.storage.as_mut() else {
            return Ok(SaveOutcome::Skipped);
        };

        match strategy {
            SaveStrategy::Retain { ceiling } => {
                let kept = retain_newest(sessions, ceiling);
                storage.set(&self.key, &encode_sessions(&kept)?)?;
                Ok(SaveOutcome::Saved {
                    retained: kept.len(),
                })
            }
            SaveStrategy::Compact { ceiling, keep_full } => {
                let (kept, stripped) = compact(&retain_newest(sessions, ceiling), keep_full);
                storage.set(&self.key, &encode_sessions(&kept)?)?;
                Ok(SaveOutcome::Compacted {
                    retained: kept.len(),
                    stripped,
                })
            }
            SaveStrategy::Clear => {
                storage.remove(&self.key)?;
                Ok(SaveOutcome::Cleared)
            }
        }
    }

    fn report(&self, outcome: SaveOutcome) {
        match outcome {
            SaveOutcome::Compacted { retained, stripped } => {
                self.notifier.emit(Notification::StorageQuotaWarning {
                    message: format!(
                        "Storage is nearly full: kept the {retained} most recent sessions and removed event details from {stripped} older ones."
                    ),
                });
            }
            SaveOutcome::Cleared => {
                self.notifier.emit(Notification::StorageQuotaError {
                    message: "Storage is full: saved sessions had to be cleared.".to_string(),
                });
            }
            SaveOutcome::Saved { .. } | SaveOutcome::Skipped => {}
        }
    }
}

/// Serialize sessions to the persisted JSON array.
pub fn encode_sessions(sessions: &[StoredSession]) -> Result<String, StorageError> {
    Ok(serde_json::to_string(sessions)?)
}

/// Keep the last `ceiling` sessions by insertion order.
///
/// # Functional Core
/// Pure; the oldest sessions (front of the list) are dropped first.
pub fn retain_newest(sessions: &[StoredSession], ceiling: usize) -> Vec<StoredSession> {
    let start = sessions.len().saturating_sub(ceiling);
    sessions[start..].to_vec()
}

/// Strip event payloads from all but the `keep_full` most recently updated
/// sessions. Order is preserved. Returns the sessions and how many were
/// stripped.
///
/// # Functional Core
/// Pure data transformation.
pub fn compact(sessions: &[StoredSession], keep_full: usize) -> (Vec<StoredSession>, usize) {
    let mut by_recency: Vec<&StoredSession> = sessions.iter().collect();
    by_recency.sort_by(|a, b| b.session.updated_at.cmp(&a.session.updated_at));
    let keep: HashSet<&SessionId> = by_recency.iter().take(keep_full).map(|s| s.id()).collect();

    let mut stripped = 0;
    let compacted = sessions
        .iter()
        .map(|s| {
            let mut s = s.clone();
            if !keep.contains(s.id()) && !s.events.is_empty() {
                s.strip_events();
                stripped += 1;
            }
            s
        })
        .collect();

    (compacted, stripped)
}
