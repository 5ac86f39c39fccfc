//! Event tracker: reconciles the replayed transport stream into exactly-once
//! event store calls.
//!
//! The transport re-delivers the full message list on every change, so the
//! tracker keeps an explicit set of `(tool_call_id, phase)` pairs it has
//! already applied and skips them unconditionally on every later pass.

mod status;

pub use status::derive_agent_status;

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::classifier::classify;
use crate::error::StoreError;
use crate::model::{
    ChatMessage, Event, EventPatch, EventResult, EventStatus, ToolCallId, ToolInvocation,
    ToolPhase,
};
use crate::store::EventStore;

/// Result payload the transport reports for a tool call the user aborted.
pub const ABORT_SENTINEL: &str = "<aborted>";

/// Prefix marking a tool result string as a failure.
pub const ERROR_MARKER: &str = "Error:";

const DEFAULT_IMAGE_MIME: &str = "image/png";

/// What one `process` pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackReport {
    pub created: usize,
    pub resolved: usize,
    pub skipped: usize,
}

impl TrackReport {
    pub fn changed(&self) -> bool {
        self.created > 0 || self.resolved > 0
    }
}

#[derive(Debug, Default)]
pub struct EventTracker {
    applied: HashSet<(ToolCallId, ToolPhase)>,
    started_at: HashMap<ToolCallId, DateTime<Utc>>,
}

impl EventTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything applied so far (session switch).
    pub fn reset(&mut self) {
        self.applied.clear();
        self.started_at.clear();
    }

    /// Mark the phases already materialized in a loaded log as applied, so a
    /// replay of the session's stored messages does not duplicate them.
    pub fn seed(&mut self, events: &[Event]) {
        for event in events {
            self.applied.insert((event.id.clone(), ToolPhase::Call));
            if event.is_terminal() {
                self.applied.insert((event.id.clone(), ToolPhase::Result));
            } else {
                self.started_at.insert(event.id.clone(), event.timestamp);
            }
        }
    }

    pub fn is_applied(&self, id: &ToolCallId, phase: ToolPhase) -> bool {
        self.applied.contains(&(id.clone(), phase))
    }

    /// Scan the full stream and apply every `(id, phase)` not seen before.
    pub fn process(
        &mut self,
        messages: &[ChatMessage],
        store: &mut EventStore,
        now: DateTime<Utc>,
    ) -> TrackReport {
        let mut report = TrackReport::default();

        for invocation in messages.iter().flat_map(ChatMessage::tool_invocations) {
            // A result seen without its call (stream joined mid-flight) still
            // gets its call applied first.
            self.apply_call(invocation, store, now, &mut report);
            if invocation.state == ToolPhase::Result {
                self.apply_result(invocation, store, now, &mut report);
            }
        }

        report
    }

    fn apply_call(
        &mut self,
        invocation: &ToolInvocation,
        store: &mut EventStore,
        now: DateTime<Utc>,
        report: &mut TrackReport,
    ) {
        let id = &invocation.tool_call_id;
        if !self.applied.insert((id.clone(), ToolPhase::Call)) {
            return;
        }

        let Some(kind) = classify(&invocation.tool_name, &invocation.args) else {
            debug!(tool_call_id = %id, tool = %invocation.tool_name, "skipping unrecognized tool call");
            report.skipped += 1;
            return;
        };

        self.started_at.insert(id.clone(), now);
        match store.add_event(Event::pending(id.clone(), kind, now)) {
            Ok(()) => report.created += 1,
            Err(StoreError::DuplicateId(id)) => {
                debug!(tool_call_id = %id, "event already present, keeping existing");
            }
        }
    }

    fn apply_result(
        &mut self,
        invocation: &ToolInvocation,
        store: &mut EventStore,
        now: DateTime<Utc>,
        report: &mut TrackReport,
    ) {
        let id = &invocation.tool_call_id;
        if !self.applied.insert((id.clone(), ToolPhase::Result)) {
            return;
        }
        if !store.state().contains(id) {
            report.skipped += 1;
            return;
        }

        let mut patch = classify_result(invocation.result.as_ref());
        if let Some(start) = self.started_at.remove(id) {
            patch.duration = Some((now - start).to_std().unwrap_or(Duration::ZERO));
        }

        if store.update_event(id, patch) {
            report.resolved += 1;
        }
    }
}

/// Turn a raw tool result into the terminal patch for its event.
///
/// # Functional Core
/// The abort sentinel and strings starting with the error marker fail the
/// event; anything else completes it with a text or image result.
pub fn classify_result(result: Option<&Value>) -> EventPatch {
    match result {
        None | Some(Value::Null) => EventPatch {
            status: Some(EventStatus::Complete),
            ..EventPatch::default()
        },
        Some(Value::String(s)) if s == ABORT_SENTINEL => EventPatch::failed("aborted by user"),
        Some(Value::String(s)) if s.starts_with(ERROR_MARKER) => {
            EventPatch::failed(s.trim_start_matches(ERROR_MARKER).trim())
        }
        Some(Value::String(s)) => EventPatch::complete(EventResult::Text { text: s.clone() }),
        Some(value) => EventPatch::complete(result_shape(value)),
    }
}

fn result_shape(value: &Value) -> EventResult {
    if let Some(blocks) = value.as_array() {
        if let Some(image) = blocks.iter().find_map(image_block) {
            return image;
        }
        let texts: Vec<&str> = blocks.iter().filter_map(text_block).collect();
        if !texts.is_empty() {
            return EventResult::Text {
                text: texts.join("\n"),
            };
        }
    }
    if let Some(image) = image_block(value) {
        return image;
    }
    if let Some(text) = text_block(value) {
        return EventResult::Text {
            text: text.to_string(),
        };
    }
    EventResult::Text {
        text: value.to_string(),
    }
}

fn image_block(value: &Value) -> Option<EventResult> {
    if value.get("type").and_then(Value::as_str) != Some("image") {
        return None;
    }
    // Both `{type, data, mimeType}` and `{type, source: {data, media_type}}` occur.
    let source = value.get("source").unwrap_or(value);
    let data = source.get("data").and_then(Value::as_str)?;
    let mime_type = ["mimeType", "mime_type", "media_type"]
        .iter()
        .find_map(|key| source.get(*key).and_then(Value::as_str))
        .unwrap_or(DEFAULT_IMAGE_MIME);
    Some(EventResult::Image {
        mime_type: mime_type.to_string(),
        data: data.to_string(),
    })
}

fn text_block(value: &Value) -> Option<&str> {
    if value.get("type").and_then(Value::as_str) != Some("text") {
        return None;
    }
    value.get("text").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn abort_sentinel_is_error() {
        let patch = classify_result(Some(&json!(ABORT_SENTINEL)));
        assert_eq!(patch.status, Some(EventStatus::Error));
        assert!(patch.result.is_none());
    }

    #[test]
    fn error_marker_prefix_is_error_with_message() {
        let patch = classify_result(Some(&json!("Error: command not found")));
        assert_eq!(patch.status, Some(EventStatus::Error));
        assert_eq!(patch.error.as_deref(), Some("command not found"));
    }

    #[test]
    fn plain_string_is_text_result() {
        let patch = classify_result(Some(&json!("done")));
        assert_eq!(patch.status, Some(EventStatus::Complete));
        assert_eq!(patch.result, Some(EventResult::Text { text: "done".into() }));
    }

    #[test]
    fn image_object_keeps_mime_type() {
        let patch = classify_result(Some(&json!({
            "type": "image",
            "data": "iVBORw0KGgo=",
            "mimeType": "image/jpeg"
        })));
        assert_eq!(
            patch.result,
            Some(EventResult::Image {
                mime_type: "image/jpeg".into(),
                data: "iVBORw0KGgo=".into()
            })
        );
    }

    #[test]
    fn image_source_block_defaults_mime() {
        let patch = classify_result(Some(&json!([
            {"type": "text", "text": "captured"},
            {"type": "image", "source": {"data": "AAAA"}}
        ])));
        assert_eq!(
            patch.result,
            Some(EventResult::Image {
                mime_type: "image/png".into(),
                data: "AAAA".into()
            })
        );
    }

    #[test]
    fn unknown_shape_falls_back_to_json_text() {
        let patch = classify_result(Some(&json!({"exit_code": 0})));
        assert_eq!(
            patch.result,
            Some(EventResult::Text {
                text: r#"{"exit_code":0}"#.into()
            })
        );
    }

    #[test]
    fn missing_result_completes_without_payload() {
        let patch = classify_result(None);
        assert_eq!(patch.status, Some(EventStatus::Complete));
        assert!(patch.result.is_none());
    }
}
