use crate::model::{ChatMessage, Role, ToolPhase, TransportStatus};
use crate::store::AgentStatus;

/// Derive the coarse agent activity signal from the current stream shape.
///
/// # Functional Core
/// Pure function of `(messages, transport)`; keeps no history. Rules in
/// precedence order:
/// 1. transport error -> `Idle`
/// 2. any tool invocation still in the `call` phase -> `Executing`
/// 3. last message is the assistant's and the transport is not `Ready`, or
///    that message has unresolved tool calls -> `Thinking`
/// 4. otherwise -> `Idle`
pub fn derive_agent_status(messages: &[ChatMessage], transport: TransportStatus) -> AgentStatus {
    if transport == TransportStatus::Error {
        return AgentStatus::Idle;
    }

    let any_in_flight = messages
        .iter()
        .flat_map(ChatMessage::tool_invocations)
        .any(|inv| inv.state == ToolPhase::Call);
    if any_in_flight {
        return AgentStatus::Executing;
    }

    if let Some(last) = messages.last() {
        if last.role == Role::Assistant {
            let all_resolved = last.tool_invocations().all(|inv| inv.is_resolved());
            if transport != TransportStatus::Ready || !all_resolved {
                return AgentStatus::Thinking;
            }
        }
    }

    AgentStatus::Idle
}
