use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{ActionKind, Event, ToolCallId};

/// Event log state.
/// Updated only via the `update(state, action)` reducer; `counts` is always
/// a full recount of `events`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventStoreState {
    /// Events in arrival order
    pub events: Vec<Event>,

    /// Per-action totals derived from `events`
    pub counts: EventCounts,

    /// Coarse activity signal derived from the stream
    pub agent_status: AgentStatus,

    /// Event highlighted in the UI, if any
    pub selected_event_id: Option<ToolCallId>,
}

impl EventStoreState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event(&self, id: &ToolCallId) -> Option<&Event> {
        self.events.iter().find(|e| &e.id == id)
    }

    pub fn contains(&self, id: &ToolCallId) -> bool {
        self.event(id).is_some()
    }

    pub fn selected_event(&self) -> Option<&Event> {
        self.selected_event_id.as_ref().and_then(|id| self.event(id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Idle,
    Thinking,
    Executing,
}

impl AgentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Thinking => "thinking",
            AgentStatus::Executing => "executing",
        }
    }
}

/// Count of events per action kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCounts(BTreeMap<ActionKind, usize>);

impl Default for EventCounts {
    fn default() -> Self {
        Self(ActionKind::ALL.iter().map(|kind| (*kind, 0)).collect())
    }
}

impl EventCounts {
    /// Full recount over `events`.
    pub fn tally(events: &[Event]) -> Self {
        let mut counts = Self::default();
        for event in events {
            *counts.0.entry(event.action_kind()).or_insert(0) += 1;
        }
        counts
    }

    pub fn get(&self, kind: ActionKind) -> usize {
        self.0.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActionKind, usize)> + '_ {
        self.0.iter().map(|(kind, count)| (*kind, *count))
    }
}
