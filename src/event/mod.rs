use std::time::Instant;

use crate::model::{SandboxId, SessionId, StreamSnapshot, ToolCallId};

/// Everything that can drive [`ChatSync`](crate::sync::ChatSync).
/// Sourced from the chat transport, timers and user actions.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Transport re-delivered its full message list
    StreamUpdated { snapshot: StreamSnapshot, at: Instant },

    /// Timer tick; flushes debounced writes whose window elapsed
    Tick(Instant),

    /// Write pending changes now (shutdown, page hide)
    Flush,

    CreateSession {
        name: Option<String>,
        sandbox_id: Option<SandboxId>,
    },

    SwitchSession(SessionId),

    DeleteSession(SessionId),

    RenameSession { id: SessionId, name: String },

    /// The session's sandbox was reconnected or replaced
    SandboxRebound {
        session_id: SessionId,
        sandbox_id: SandboxId,
    },

    /// Click on an event; clicking the selected one again deselects
    SelectEvent(Option<ToolCallId>),
}
