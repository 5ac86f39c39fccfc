//! Decoding and schema migration of persisted session records.

use serde_json::Value;
use tracing::warn;

use crate::error::StorageError;
use crate::model::{NameSource, StoredSession, DEFAULT_SESSION_NAME, SCHEMA_VERSION};

/// Decode the persisted session array.
///
/// # Functional Core
/// Pure apart from logging. Records that fail to decode are skipped (and
/// counted) rather than failing the whole load; every decoded record is
/// migrated to the current schema.
///
/// # Errors
/// Returns `StorageError::Json` only if `content` is not a JSON array at all.
pub fn decode_sessions(content: &str) -> Result<(Vec<StoredSession>, usize), StorageError> {
    let raw: Vec<Value> = serde_json::from_str(content)?;
    let mut sessions = Vec::with_capacity(raw.len());
    let mut skipped = 0;

    for (index, value) in raw.into_iter().enumerate() {
        match serde_json::from_value::<StoredSession>(value) {
            Ok(mut session) => {
                migrate(&mut session);
                sessions.push(session);
            }
            Err(e) => {
                warn!(index, error = %e, "skipping unreadable session record");
                skipped += 1;
            }
        }
    }

    Ok((sessions, skipped))
}

/// Upgrade a record to `SCHEMA_VERSION` in place. Absent fields were already
/// defaulted by serde (empty arrays, current timestamp); this rebuilds the
/// id indexes from the payload and settles the name source.
///
/// Returns `true` if the record needed upgrading.
pub fn migrate(session: &mut StoredSession) -> bool {
    if session.schema_version == SCHEMA_VERSION {
        return false;
    }

    let index = &mut session.session;
    if index.message_ids.is_empty() && !session.messages.is_empty() {
        index.message_ids = session.messages.iter().map(|m| m.id.clone()).collect();
    }
    if index.event_ids.is_empty() && !session.events.is_empty() {
        index.event_ids = session.events.iter().map(|e| e.id.clone()).collect();
    }

    if index.name.trim().is_empty() {
        index.name = DEFAULT_SESSION_NAME.to_string();
        index.name_source = NameSource::Default;
    } else if index.name != DEFAULT_SESSION_NAME && index.name_source == NameSource::Default {
        // Older records carry no name source; a non-default name was either
        // derived or typed, and must not be auto-renamed either way.
        index.name_source = NameSource::Content;
    }

    session.schema_version = SCHEMA_VERSION.to_string();
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MessageId, ToolCallId};

    #[test]
    fn legacy_record_gets_defaults_and_version() {
        let content = r#"[{"id": "s1", "name": "Book a flight"}]"#;

        let (sessions, skipped) = decode_sessions(content).unwrap();

        assert_eq!(skipped, 0);
        let session = &sessions[0];
        assert_eq!(session.schema_version, SCHEMA_VERSION);
        assert!(session.messages.is_empty());
        assert!(session.events.is_empty());
        assert!(session.session.sandbox_id.is_none());
        assert_eq!(session.session.name_source, NameSource::Content);
    }

    #[test]
    fn legacy_record_rebuilds_id_indexes() {
        let content = r#"[{
            "id": "s1",
            "name": "New Session",
            "schema_version": "1",
            "messages": [{"id": "m1", "role": "user", "content": "hi"}],
            "events": [{
                "id": "call_1",
                "timestamp": "2026-02-11T10:00:00Z",
                "status": "pending",
                "type": "bash",
                "payload": {"command": "ls"}
            }]
        }]"#;

        let (sessions, _) = decode_sessions(content).unwrap();

        let index = &sessions[0].session;
        assert_eq!(index.message_ids, vec![MessageId::new("m1")]);
        assert_eq!(index.event_ids, vec![ToolCallId::new("call_1")]);
        assert_eq!(index.name_source, NameSource::Default);
    }

    #[test]
    fn current_record_is_left_alone() {
        let content = format!(
            r#"[{{"id": "s1", "name": "Session 2", "name_source": "ordinal", "schema_version": "{}"}}]"#,
            SCHEMA_VERSION
        );
        let (mut sessions, _) = decode_sessions(&content).unwrap();
        assert_eq!(sessions[0].session.name_source, NameSource::Ordinal);
        assert!(!migrate(&mut sessions[0]));
    }

    #[test]
    fn corrupt_records_are_skipped() {
        let content = r#"[{"id": "s1"}, {"name": "no id"}, 42]"#;
        let (sessions, skipped) = decode_sessions(content).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(skipped, 2);
    }

    #[test]
    fn non_array_content_is_an_error() {
        assert!(decode_sessions("not json").is_err());
        assert!(decode_sessions(r#"{"id": "s1"}"#).is_err());
    }
}
