//! Event store: the event log, its derived counters and the selection pointer.
//!
//! State is owned by [`EventStore`] and mutated only through
//! [`EventAction`]s run by the [`update`] reducer. Subscribers observe each
//! change synchronously, before the mutating call returns.

pub mod state;
pub mod update;

pub use state::{AgentStatus, EventCounts, EventStoreState};
pub use update::{update, EventAction};

use crate::error::StoreError;
use crate::model::{Event, EventPatch, ToolCallId};

/// Handle returned by [`EventStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&EventStoreState) + Send>;

pub struct EventStore {
    state: EventStoreState,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("state", &self.state)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            state: EventStoreState::new(),
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn state(&self) -> &EventStoreState {
        &self.state
    }

    pub fn events(&self) -> &[Event] {
        &self.state.events
    }

    /// Register a listener called after every state change.
    pub fn subscribe(&mut self, listener: impl FnMut(&EventStoreState) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    /// Run an action through the reducer and notify subscribers if the
    /// state changed.
    pub fn dispatch(&mut self, action: EventAction) -> Result<bool, StoreError> {
        let changed = update(&mut self.state, action)?;
        if changed {
            for (_, listener) in self.subscribers.iter_mut() {
                listener(&self.state);
            }
        }
        Ok(changed)
    }

    pub fn add_event(&mut self, event: Event) -> Result<(), StoreError> {
        self.dispatch(EventAction::AddEvent(event)).map(|_| ())
    }

    pub fn update_event(&mut self, id: &ToolCallId, patch: EventPatch) -> bool {
        self.dispatch(EventAction::UpdateEvent {
            id: id.clone(),
            patch,
        })
        .unwrap_or(false)
    }

    pub fn set_agent_status(&mut self, status: AgentStatus) -> bool {
        self.dispatch(EventAction::SetAgentStatus(status))
            .unwrap_or(false)
    }

    pub fn select_event(&mut self, id: Option<ToolCallId>) -> bool {
        self.dispatch(EventAction::SelectEvent(id)).unwrap_or(false)
    }

    pub fn clear_all(&mut self) -> bool {
        self.dispatch(EventAction::ClearAll).unwrap_or(false)
    }

    /// Replace the whole log. Returns whether the state changed.
    pub fn load_events(&mut self, events: Vec<Event>) -> bool {
        self.dispatch(EventAction::LoadEvents(events))
            .unwrap_or(false)
    }
}
