use std::collections::HashSet;

use crate::error::StoreError;
use crate::model::{Event, EventPatch, ToolCallId};
use crate::store::{AgentStatus, EventCounts, EventStoreState};

/// Every mutation the event store accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum EventAction {
    /// Append a new event; rejected if the id is already present
    AddEvent(Event),

    /// Apply a partial update to an existing event
    UpdateEvent { id: ToolCallId, patch: EventPatch },

    /// Replace the derived activity signal
    SetAgentStatus(AgentStatus),

    /// Select an event, or deselect with `None`
    SelectEvent(Option<ToolCallId>),

    /// Reset to the empty initial state
    ClearAll,

    /// Replace the whole log (session switch)
    LoadEvents(Vec<Event>),
}

/// Reducer for the event log.
/// No I/O, no side effects - fully deterministic and unit testable.
///
/// Returns `Ok(true)` when the state changed. Unknown ids are absorbed as
/// no-ops (`Ok(false)`); the only error is a duplicate `AddEvent`.
pub fn update(state: &mut EventStoreState, action: EventAction) -> Result<bool, StoreError> {
    match action {
        EventAction::AddEvent(event) => {
            if state.contains(&event.id) {
                return Err(StoreError::DuplicateId(event.id));
            }
            state.events.push(event);
            state.counts = EventCounts::tally(&state.events);
            Ok(true)
        }

        EventAction::UpdateEvent { id, patch } => {
            let Some(event) = state.events.iter_mut().find(|e| e.id == id) else {
                return Ok(false);
            };
            if !apply_patch(event, patch) {
                return Ok(false);
            }
            state.counts = EventCounts::tally(&state.events);
            Ok(true)
        }

        EventAction::SetAgentStatus(status) => {
            if state.agent_status == status {
                return Ok(false);
            }
            state.agent_status = status;
            Ok(true)
        }

        EventAction::SelectEvent(target) => {
            let next = match target {
                // Click-to-deselect
                Some(id) if state.selected_event_id.as_ref() == Some(&id) => None,
                Some(id) if !state.contains(&id) => return Ok(false),
                other => other,
            };
            if next == state.selected_event_id {
                return Ok(false);
            }
            state.selected_event_id = next;
            Ok(true)
        }

        EventAction::ClearAll => {
            let cleared = EventStoreState::new();
            if *state == cleared {
                return Ok(false);
            }
            *state = cleared;
            Ok(true)
        }

        EventAction::LoadEvents(events) => {
            let before = state.clone();
            let mut seen = HashSet::new();
            state.events = events
                .into_iter()
                .filter(|e| seen.insert(e.id.clone()))
                .collect();
            state.counts = EventCounts::tally(&state.events);
            if let Some(selected) = &state.selected_event_id {
                if !seen.contains(selected) {
                    state.selected_event_id = None;
                }
            }
            Ok(*state != before)
        }
    }
}

/// Merge a patch into an event. A terminal event's outcome is fixed: a patch
/// touching status, result or error is dropped whole. Only a missing
/// duration may still be filled in.
fn apply_patch(event: &mut Event, patch: EventPatch) -> bool {
    if event.is_terminal() {
        if patch.status.is_some() || patch.result.is_some() || patch.error.is_some() {
            return false;
        }
        if event.duration.is_some() {
            return false;
        }
    }

    let before = event.clone();
    if let Some(status) = patch.status {
        event.status = status;
    }
    if let Some(duration) = patch.duration {
        event.duration = Some(duration);
    }
    if let Some(result) = patch.result {
        event.result = Some(result);
    }
    if let Some(error) = patch.error {
        event.error = Some(error);
    }
    *event != before
}
