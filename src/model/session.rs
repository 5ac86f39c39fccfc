use super::{ChatMessage, Event, MessageId, SandboxId, SessionId, ToolCallId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version tag written on every persisted record.
pub const SCHEMA_VERSION: &str = "2";

/// Name given to sessions before any content-derived name exists.
pub const DEFAULT_SESSION_NAME: &str = "New Session";

/// Lightweight session index entry. The full payload lives in [`StoredSession`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSession {
    pub id: SessionId,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub name_source: NameSource,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub message_ids: Vec<MessageId>,
    #[serde(default)]
    pub event_ids: Vec<ToolCallId>,
    #[serde(default)]
    pub sandbox_id: Option<SandboxId>,
}

fn default_name() -> String {
    DEFAULT_SESSION_NAME.to_string()
}

impl ChatSession {
    pub fn new(id: SessionId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: default_name(),
            name_source: NameSource::Default,
            created_at: now,
            updated_at: now,
            message_ids: Vec::new(),
            event_ids: Vec::new(),
            sandbox_id: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self.name_source = NameSource::User;
        self
    }

    pub fn with_sandbox(mut self, sandbox_id: SandboxId) -> Self {
        self.sandbox_id = Some(sandbox_id);
        self
    }
}

/// Where the current session name came from. Only `Default` and `Ordinal`
/// names are replaced automatically.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NameSource {
    #[default]
    Default,
    Ordinal,
    Content,
    User,
}

impl NameSource {
    pub fn is_auto_renamable(self) -> bool {
        matches!(self, NameSource::Default | NameSource::Ordinal)
    }
}

/// Unit of persistence: index fields plus the full message and event arrays.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredSession {
    #[serde(flatten)]
    pub session: ChatSession,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub schema_version: String,
}

impl StoredSession {
    pub fn new(session: ChatSession) -> Self {
        Self {
            session,
            messages: Vec::new(),
            events: Vec::new(),
            schema_version: SCHEMA_VERSION.to_string(),
        }
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.session.message_ids = messages.iter().map(|m| m.id.clone()).collect();
        self.messages = messages;
        self
    }

    pub fn with_events(mut self, events: Vec<Event>) -> Self {
        self.session.event_ids = events.iter().map(|e| e.id.clone()).collect();
        self.events = events;
        self
    }

    pub fn id(&self) -> &SessionId {
        &self.session.id
    }

    /// Drop the full event payload, keeping `event_ids` as the index.
    pub fn strip_events(&mut self) {
        self.events.clear();
    }
}
