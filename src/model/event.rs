use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::ids::ToolCallId;
use super::serde_utils::duration_opt_millis;

/// Durable record of one tool call's lifecycle and outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: ToolCallId,
    pub timestamp: DateTime<Utc>,
    pub status: EventStatus,
    #[serde(
        default,
        with = "duration_opt_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<EventResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn pending(id: impl Into<ToolCallId>, kind: EventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            timestamp,
            status: EventStatus::Pending,
            duration: None,
            result: None,
            error: None,
            kind,
        }
    }

    pub fn with_status(mut self, status: EventStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_result(mut self, result: EventResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn action_kind(&self) -> ActionKind {
        self.kind.action_kind()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Pending,
    Complete,
    Error,
}

impl EventStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, EventStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Complete => "complete",
            EventStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EventResult {
    Text { text: String },
    Image { mime_type: String, data: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventKind {
    Computer { payload: ComputerPayload },
    Bash { payload: BashPayload },
}

impl EventKind {
    pub fn computer(payload: ComputerPayload) -> Self {
        Self::Computer { payload }
    }

    pub fn bash(command: impl Into<String>) -> Self {
        Self::Bash {
            payload: BashPayload {
                command: command.into(),
            },
        }
    }

    pub fn action_kind(&self) -> ActionKind {
        match self {
            EventKind::Computer { payload } => payload.action.into(),
            EventKind::Bash { .. } => ActionKind::Bash,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComputerPayload {
    pub action: ComputerAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinate: Option<(i64, i64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_direction: Option<ScrollDirection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drag_start: Option<(i64, i64)>,
}

impl ComputerPayload {
    pub fn new(action: ComputerAction) -> Self {
        Self {
            action,
            coordinate: None,
            text: None,
            wait_seconds: None,
            scroll_amount: None,
            scroll_direction: None,
            drag_start: None,
        }
    }

    pub fn at(mut self, x: i64, y: i64) -> Self {
        self.coordinate = Some((x, y));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BashPayload {
    pub command: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ComputerAction {
    Screenshot,
    LeftClick,
    DoubleClick,
    RightClick,
    MouseMove,
    Type,
    Key,
    Scroll,
    LeftClickDrag,
    Wait,
}

impl ComputerAction {
    pub fn parse(name: &str) -> Option<Self> {
        let action = match name {
            "screenshot" => Self::Screenshot,
            "left_click" => Self::LeftClick,
            "double_click" => Self::DoubleClick,
            "right_click" => Self::RightClick,
            "mouse_move" => Self::MouseMove,
            "type" => Self::Type,
            "key" => Self::Key,
            "scroll" => Self::Scroll,
            "left_click_drag" => Self::LeftClickDrag,
            "wait" => Self::Wait,
            _ => return None,
        };
        Some(action)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Counter key: one per computer action plus `bash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Screenshot,
    LeftClick,
    DoubleClick,
    RightClick,
    MouseMove,
    Type,
    Key,
    Scroll,
    LeftClickDrag,
    Wait,
    Bash,
}

impl ActionKind {
    pub const ALL: [ActionKind; 11] = [
        ActionKind::Screenshot,
        ActionKind::LeftClick,
        ActionKind::DoubleClick,
        ActionKind::RightClick,
        ActionKind::MouseMove,
        ActionKind::Type,
        ActionKind::Key,
        ActionKind::Scroll,
        ActionKind::LeftClickDrag,
        ActionKind::Wait,
        ActionKind::Bash,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Screenshot => "screenshot",
            ActionKind::LeftClick => "left_click",
            ActionKind::DoubleClick => "double_click",
            ActionKind::RightClick => "right_click",
            ActionKind::MouseMove => "mouse_move",
            ActionKind::Type => "type",
            ActionKind::Key => "key",
            ActionKind::Scroll => "scroll",
            ActionKind::LeftClickDrag => "left_click_drag",
            ActionKind::Wait => "wait",
            ActionKind::Bash => "bash",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ComputerAction> for ActionKind {
    fn from(action: ComputerAction) -> Self {
        match action {
            ComputerAction::Screenshot => ActionKind::Screenshot,
            ComputerAction::LeftClick => ActionKind::LeftClick,
            ComputerAction::DoubleClick => ActionKind::DoubleClick,
            ComputerAction::RightClick => ActionKind::RightClick,
            ComputerAction::MouseMove => ActionKind::MouseMove,
            ComputerAction::Type => ActionKind::Type,
            ComputerAction::Key => ActionKind::Key,
            ComputerAction::Scroll => ActionKind::Scroll,
            ComputerAction::LeftClickDrag => ActionKind::LeftClickDrag,
            ComputerAction::Wait => ActionKind::Wait,
        }
    }
}

/// Partial update applied by `update_event`. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPatch {
    pub status: Option<EventStatus>,
    pub duration: Option<Duration>,
    pub result: Option<EventResult>,
    pub error: Option<String>,
}

impl EventPatch {
    pub fn complete(result: EventResult) -> Self {
        Self {
            status: Some(EventStatus::Complete),
            result: Some(result),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(EventStatus::Error),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_type_tag() {
        let event = Event::pending(
            "call_1",
            EventKind::computer(ComputerPayload::new(ComputerAction::LeftClick).at(10, 20)),
            Utc::now(),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "computer");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["payload"]["action"], "left_click");
        assert_eq!(json["payload"]["coordinate"], serde_json::json!([10, 20]));
        assert!(json.get("duration").is_none());
    }

    #[test]
    fn bash_event_deserializes() {
        let json = r#"{
            "id": "call_7",
            "timestamp": "2026-02-11T10:00:00Z",
            "status": "complete",
            "duration": 1200,
            "type": "bash",
            "payload": {"command": "ls -la"},
            "result": {"kind": "text", "text": "total 0"}
        }"#;

        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.action_kind(), ActionKind::Bash);
        assert_eq!(event.duration, Some(Duration::from_millis(1200)));
        assert_eq!(
            event.result,
            Some(EventResult::Text {
                text: "total 0".into()
            })
        );
    }

    #[test]
    fn computer_action_parse_rejects_unknown() {
        assert_eq!(ComputerAction::parse("wait"), Some(ComputerAction::Wait));
        assert_eq!(ComputerAction::parse("triple_click"), None);
    }

    #[test]
    fn action_kind_covers_all_computer_actions_plus_bash() {
        assert_eq!(ActionKind::ALL.len(), 11);
        assert_eq!(ActionKind::from(ComputerAction::LeftClickDrag).as_str(), "left_click_drag");
    }

    #[test]
    fn status_terminality() {
        assert!(!EventStatus::Pending.is_terminal());
        assert!(EventStatus::Complete.is_terminal());
        assert!(EventStatus::Error.is_terminal());
    }
}
