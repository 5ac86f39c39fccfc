use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{MessageId, ToolCallId};

/// One message of the transport's delta stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl ChatMessage {
    pub fn user(id: impl Into<MessageId>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id: id.into(),
            role: Role::User,
            content: text.clone(),
            parts: vec![MessagePart::Text { text }],
        }
    }

    pub fn assistant(id: impl Into<MessageId>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: String::new(),
            parts: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(MessagePart::Text { text: text.into() });
        self
    }

    pub fn with_tool(mut self, invocation: ToolInvocation) -> Self {
        self.parts.push(MessagePart::ToolInvocation {
            tool_invocation: invocation,
        });
        self
    }

    /// Human-readable text of the message: `content` when present, otherwise
    /// the text parts joined by spaces.
    pub fn text(&self) -> String {
        if !self.content.trim().is_empty() {
            return self.content.clone();
        }
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn tool_invocations(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.parts.iter().filter_map(|part| match part {
            MessagePart::ToolInvocation { tool_invocation } => Some(tool_invocation),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum MessagePart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool-invocation")]
    ToolInvocation { tool_invocation: ToolInvocation },
    /// Reasoning, step markers and anything else the tracker ignores.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocation {
    pub tool_call_id: ToolCallId,
    pub tool_name: String,
    pub state: ToolPhase,
    #[serde(default)]
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ToolInvocation {
    pub fn call(id: impl Into<ToolCallId>, tool_name: impl Into<String>, args: Value) -> Self {
        Self {
            tool_call_id: id.into(),
            tool_name: tool_name.into(),
            state: ToolPhase::Call,
            args,
            result: None,
        }
    }

    pub fn resolve(mut self, result: Value) -> Self {
        self.state = ToolPhase::Result;
        self.result = Some(result);
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.state == ToolPhase::Result
    }
}

/// Lifecycle phase of a tool invocation as reported by the transport.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ToolPhase {
    Call,
    Result,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportStatus {
    Submitted,
    Streaming,
    #[default]
    Ready,
    Error,
}

/// One observation of the full (replayed) message list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamSnapshot {
    #[serde(default)]
    pub status: TransportStatus,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}
