pub mod event;
pub mod ids;
pub mod message;
pub mod serde_utils;
pub mod session;

pub use event::{
    ActionKind, BashPayload, ComputerAction, ComputerPayload, Event, EventKind, EventPatch,
    EventResult, EventStatus, ScrollDirection,
};
pub use ids::{MessageId, SandboxId, SessionId, ToolCallId};
pub use message::{
    ChatMessage, MessagePart, Role, StreamSnapshot, ToolInvocation, ToolPhase, TransportStatus,
};
pub use session::{ChatSession, NameSource, StoredSession, DEFAULT_SESSION_NAME, SCHEMA_VERSION};
