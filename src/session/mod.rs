//! Session index, active-session pointer and per-session payload writes.
//!
//! The index (`ChatSession` records, insertion order) lives in memory; the
//! full payloads live in the [`PersistenceAdapter`]. Every write reads the
//! persisted record first and writes index and payload back together.

pub mod naming;

pub use naming::{derive_name, ordinal_name, MAX_NAME_CHARS};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::StorageError;
use crate::model::{ChatMessage, ChatSession, Event, NameSource, SandboxId, SessionId, StoredSession};
use crate::persistence::PersistenceAdapter;

// ============================================================================
// FUNCTIONAL CORE: Pure functions over session records
// ============================================================================

/// Apply the rename policy: replace the name only while its source is
/// auto-renamable and a name can be derived.
///
/// Returns `true` if the name changed.
pub fn apply_rename(session: &mut ChatSession, messages: &[ChatMessage], index: usize) -> bool {
    if !session.name_source.is_auto_renamable() {
        return false;
    }
    let Some((name, source)) = derive_name(messages, index) else {
        return false;
    };
    if session.name == name && session.name_source == source {
        return false;
    }
    session.name = name;
    session.name_source = source;
    true
}

/// Merge caller-supplied metadata onto the current index record.
///
/// Identity, creation time and the payload indexes are kept from `current`;
/// a changed name becomes user-sourced.
pub fn merge_metadata(current: &ChatSession, incoming: ChatSession, now: DateTime<Utc>) -> ChatSession {
    let name_source = if incoming.name != current.name {
        NameSource::User
    } else {
        current.name_source
    };

    ChatSession {
        id: current.id.clone(),
        name: incoming.name,
        name_source,
        created_at: current.created_at,
        updated_at: now,
        message_ids: current.message_ids.clone(),
        event_ids: current.event_ids.clone(),
        sandbox_id: incoming.sandbox_id,
    }
}

// ============================================================================
// IMPERATIVE SHELL: index ownership plus persistence
// ============================================================================

pub struct SessionStore {
    sessions: Vec<ChatSession>,
    active: Option<SessionId>,
    persistence: PersistenceAdapter,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.sessions.len())
            .field("active", &self.active)
            .field("persistence", &self.persistence)
            .finish()
    }
}

impl SessionStore {
    /// Build the index from whatever the adapter has persisted. No session
    /// is active until one is selected or created.
    pub fn load(persistence: PersistenceAdapter) -> Self {
        let sessions: Vec<ChatSession> = persistence.load().into_iter().map(|s| s.session).collect();
        info!(count = sessions.len(), "loaded sessions");
        Self {
            sessions,
            active: None,
            persistence,
        }
    }

    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn session(&self, id: &SessionId) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| &s.id == id)
    }

    pub fn active_session_id(&self) -> Option<&SessionId> {
        self.active.as_ref()
    }

    pub fn active_session(&self) -> Option<&ChatSession> {
        self.active.as_ref().and_then(|id| self.session(id))
    }

    pub fn persistence(&self) -> &PersistenceAdapter {
        &self.persistence
    }

    fn position(&self, id: &SessionId) -> Option<usize> {
        self.sessions.iter().position(|s| &s.id == id)
    }

    /// Create a session, append it to the index, make it active and persist
    /// it immediately.
    pub fn create_session(
        &mut self,
        name: Option<String>,
        sandbox_id: Option<SandboxId>,
        now: DateTime<Utc>,
    ) -> Result<SessionId, StorageError> {
        let mut session = ChatSession::new(SessionId::generate(), now);
        if let Some(name) = name {
            session = session.with_name(name);
        }
        session.sandbox_id = sandbox_id;

        let id = session.id.clone();
        info!(session_id = %id, "created session");
        self.sessions.push(session.clone());
        self.active = Some(id.clone());
        self.persist(StoredSession::new(session))?;
        Ok(id)
    }

    /// Merge new metadata (name, sandbox) into an existing session.
    /// Messages and events already persisted are never clobbered.
    ///
    /// Returns `Ok(false)` for an unknown id.
    pub fn update_session(&mut self, session: ChatSession, now: DateTime<Utc>) -> Result<bool, StorageError> {
        let Some(pos) = self.position(&session.id) else {
            debug!(session_id = %session.id, "update for unknown session ignored");
            return Ok(false);
        };

        let mut stored = self.stored_or_empty(pos);
        let merged = merge_metadata(&stored.session, session, now);
        stored.session = merged.clone();
        self.sessions[pos] = merged;
        self.persist(stored)?;
        Ok(true)
    }

    /// Remove the index entry and its persisted payload. If it was active,
    /// the first remaining session (or none) becomes active.
    pub fn delete_session(&mut self, id: &SessionId) -> Result<bool, StorageError> {
        let Some(pos) = self.position(id) else {
            return Ok(false);
        };

        self.sessions.remove(pos);
        if self.active.as_ref() == Some(id) {
            self.active = self.sessions.first().map(|s| s.id.clone());
        }
        info!(session_id = %id, "deleted session");
        self.persistence.delete(id)?;
        Ok(true)
    }

    /// Point the active session at `id`, or clear it with `None`.
    /// An unknown id is ignored and returns `false`.
    pub fn set_active_session(&mut self, id: Option<&SessionId>) -> bool {
        match id {
            None => {
                self.active = None;
                true
            }
            Some(id) if self.position(id).is_some() => {
                self.active = Some(id.clone());
                true
            }
            Some(id) => {
                debug!(session_id = %id, "cannot activate unknown session");
                false
            }
        }
    }

    /// Persist the full message array, applying the rename policy.
    pub fn save_session_messages(
        &mut self,
        id: &SessionId,
        messages: &[ChatMessage],
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        self.save_session_data(id, Some(messages), None, now)
    }

    /// Persist the full event array.
    pub fn save_session_events(
        &mut self,
        id: &SessionId,
        events: &[Event],
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        self.save_session_data(id, None, Some(events), now)
    }

    /// Persist messages and/or events in one write.
    pub fn save_session_data(
        &mut self,
        id: &SessionId,
        messages: Option<&[ChatMessage]>,
        events: Option<&[Event]>,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let Some(pos) = self.position(id) else {
            debug!(session_id = %id, "save for unknown session ignored");
            return Ok(false);
        };

        let mut stored = self.stored_or_empty(pos);
        // The in-memory index is newer than the payload for metadata fields.
        stored.session.name = self.sessions[pos].name.clone();
        stored.session.name_source = self.sessions[pos].name_source;
        stored.session.sandbox_id = self.sessions[pos].sandbox_id.clone();

        if let Some(messages) = messages {
            if apply_rename(&mut stored.session, messages, pos) {
                debug!(session_id = %id, name = %stored.session.name, "renamed session");
            }
            stored = stored.with_messages(messages.to_vec());
        }
        if let Some(events) = events {
            stored = stored.with_events(events.to_vec());
        }
        stored.session.updated_at = now;

        self.sessions[pos] = stored.session.clone();
        self.persist(stored)?;
        Ok(true)
    }

    /// Full persisted record for `id`, or `None` if the session is unknown.
    pub fn load_session_data(&self, id: &SessionId) -> Option<StoredSession> {
        let pos = self.position(id)?;
        Some(self.stored_or_empty(pos))
    }

    /// Persisted record for the session at `pos`. When the record is gone
    /// (evicted by the retention ceiling) the payload is empty, so the id
    /// indexes are emptied with it.
    fn stored_or_empty(&self, pos: usize) -> StoredSession {
        let index = &self.sessions[pos];
        if let Some(stored) = self.persistence.load_one(&index.id) {
            return stored;
        }
        debug!(session_id = %index.id, "no persisted payload; starting from an empty one");
        let mut session = index.clone();
        session.message_ids.clear();
        session.event_ids.clear();
        StoredSession::new(session)
    }

    /// Write one record, keeping it in index order on disk.
    fn persist(&mut self, stored: StoredSession) -> Result<(), StorageError> {
        let order: Vec<SessionId> = self.sessions.iter().map(|s| s.id.clone()).collect();
        self.persistence.save_one_ordered(stored, &order)?;
        Ok(())
    }
}
