//! Event-loop glue: routes [`SyncEvent`]s to the tracker, the event store and
//! the session store, and debounces persistence.
//!
//! The retry controller is not owned here; it runs its own timer and calls
//! the transport directly.

use chrono::Utc;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::debounce::WriteDebouncer;
use crate::error::SyncError;
use crate::event::SyncEvent;
use crate::model::{ChatMessage, Event, SandboxId, SessionId, StreamSnapshot, TransportStatus};
use crate::session::SessionStore;
use crate::store::EventStore;
use crate::tracker::{derive_agent_status, EventTracker, TrackReport};

#[derive(Debug)]
pub struct ChatSync {
    store: EventStore,
    tracker: EventTracker,
    sessions: SessionStore,
    debouncer: WriteDebouncer,
    messages: Vec<ChatMessage>,
    transport: TransportStatus,
}

impl ChatSync {
    pub fn new(sessions: SessionStore, config: &SyncConfig) -> Self {
        Self {
            store: EventStore::new(),
            tracker: EventTracker::new(),
            sessions,
            debouncer: WriteDebouncer::new(config.debounce()),
            messages: Vec::new(),
            transport: TransportStatus::Ready,
        }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Mutable access for subscribing renderers.
    pub fn store_mut(&mut self) -> &mut EventStore {
        &mut self.store
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn active_session_id(&self) -> Option<&SessionId> {
        self.sessions.active_session_id()
    }

    /// Messages of the active session, as last seen from the transport or
    /// restored on switch.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn transport_status(&self) -> TransportStatus {
        self.transport
    }

    pub fn has_pending_write(&self) -> bool {
        self.debouncer.is_dirty()
    }

    /// Apply one event. Returns whether observable state changed.
    pub fn handle(&mut self, event: SyncEvent) -> Result<bool, SyncError> {
        match event {
            SyncEvent::StreamUpdated { snapshot, at } => {
                let report = self.stream_updated(snapshot)?;
                if report.changed() {
                    debug!(created = report.created, resolved = report.resolved, "tracked tool calls");
                }
                self.debouncer.touch(at);
                Ok(true)
            }

            SyncEvent::Tick(now) => {
                if self.debouncer.take_due(now) {
                    self.flush()?;
                    return Ok(true);
                }
                Ok(false)
            }

            SyncEvent::Flush => {
                if self.debouncer.take() {
                    self.flush()?;
                    return Ok(true);
                }
                Ok(false)
            }

            SyncEvent::CreateSession { name, sandbox_id } => {
                self.flush_pending()?;
                self.sessions.create_session(name, sandbox_id, Utc::now())?;
                self.reset_view(Vec::new(), Vec::new());
                Ok(true)
            }

            SyncEvent::SwitchSession(id) => {
                if self.sessions.active_session_id() == Some(&id) {
                    return Ok(false);
                }
                if self.sessions.session(&id).is_none() {
                    return Err(SyncError::SessionNotFound(id.to_string()));
                }
                self.flush_pending()?;
                self.activate(&id);
                Ok(true)
            }

            SyncEvent::DeleteSession(id) => {
                let was_active = self.sessions.active_session_id() == Some(&id);
                if was_active {
                    // Pending changes belong to the session being removed.
                    self.debouncer.take();
                }
                if !self.sessions.delete_session(&id)? {
                    return Ok(false);
                }
                if was_active {
                    match self.sessions.active_session_id().cloned() {
                        Some(next) => self.activate(&next),
                        None => self.reset_view(Vec::new(), Vec::new()),
                    }
                }
                Ok(true)
            }

            SyncEvent::RenameSession { id, name } => {
                let mut session = self
                    .sessions
                    .session(&id)
                    .cloned()
                    .ok_or_else(|| SyncError::SessionNotFound(id.to_string()))?;
                session.name = name;
                Ok(self.sessions.update_session(session, Utc::now())?)
            }

            SyncEvent::SandboxRebound {
                session_id,
                sandbox_id,
            } => self.rebind_sandbox(&session_id, sandbox_id),

            SyncEvent::SelectEvent(id) => Ok(self.store.select_event(id)),
        }
    }

    fn stream_updated(&mut self, snapshot: StreamSnapshot) -> Result<TrackReport, SyncError> {
        if self.sessions.active_session_id().is_none() {
            info!("stream started without a session; creating one");
            self.sessions.create_session(None, None, Utc::now())?;
        }

        self.messages = snapshot.messages;
        self.transport = snapshot.status;

        let report = self.tracker.process(&self.messages, &mut self.store, Utc::now());
        self.store
            .set_agent_status(derive_agent_status(&self.messages, self.transport));
        Ok(report)
    }

    fn rebind_sandbox(&mut self, session_id: &SessionId, sandbox_id: SandboxId) -> Result<bool, SyncError> {
        let mut session = self
            .sessions
            .session(session_id)
            .cloned()
            .ok_or_else(|| SyncError::SessionNotFound(session_id.to_string()))?;
        if session.sandbox_id.as_ref() == Some(&sandbox_id) {
            return Ok(false);
        }
        info!(session_id = %session_id, sandbox_id = %sandbox_id, "rebinding sandbox");
        session.sandbox_id = Some(sandbox_id);
        Ok(self.sessions.update_session(session, Utc::now())?)
    }

    fn flush_pending(&mut self) -> Result<(), SyncError> {
        if self.debouncer.take() {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SyncError> {
        let Some(id) = self.sessions.active_session_id().cloned() else {
            return Ok(());
        };
        self.sessions
            .save_session_data(&id, Some(&self.messages), Some(self.store.events()), Utc::now())?;
        debug!(session_id = %id, events = self.store.events().len(), "flushed session");
        Ok(())
    }

    fn activate(&mut self, id: &SessionId) {
        self.sessions.set_active_session(Some(id));
        let (messages, events) = self
            .sessions
            .load_session_data(id)
            .map(|stored| (stored.messages, stored.events))
            .unwrap_or_default();
        self.reset_view(messages, events);
    }

    /// Replace the view with a session's stored payload. The tracker is
    /// seeded so replaying the stored stream adds nothing twice.
    fn reset_view(&mut self, messages: Vec<ChatMessage>, events: Vec<Event>) {
        self.tracker.reset();
        self.tracker.seed(&events);
        self.store.load_events(events);
        self.transport = TransportStatus::Ready;
        self.store
            .set_agent_status(derive_agent_status(&messages, self.transport));
        self.messages = messages;
    }
}
