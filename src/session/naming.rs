use crate::model::{ChatMessage, NameSource, Role};

/// Longest automatically derived session name, in `char`s.
pub const MAX_NAME_CHARS: usize = 30;

/// Derive a session name from its messages.
///
/// Uses the first user message with extractable text, whitespace collapsed
/// and truncated to [`MAX_NAME_CHARS`]. When messages exist but none has
/// text, falls back to "Session N" where N is the 1-based `index`
/// position. Returns `None` for an empty conversation.
///
/// Pure: callers decide whether the current name may be replaced
/// (see [`NameSource::is_auto_renamable`]).
pub fn derive_name(messages: &[ChatMessage], index: usize) -> Option<(String, NameSource)> {
    if messages.is_empty() {
        return None;
    }

    let first_text = messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| collapse_whitespace(&m.text()))
        .find(|text| !text.is_empty());

    match first_text {
        Some(text) => Some((truncate_chars(&text, MAX_NAME_CHARS), NameSource::Content)),
        None => Some((ordinal_name(index), NameSource::Ordinal)),
    }
}

pub fn ordinal_name(index: usize) -> String {
    format!("Session {}", index + 1)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ToolInvocation;
    use serde_json::json;

    #[test]
    fn empty_conversation_has_no_name() {
        assert_eq!(derive_name(&[], 0), None);
    }

    #[test]
    fn first_user_text_becomes_name() {
        let messages = vec![
            ChatMessage::assistant("m0").with_text("Hello! How can I help?"),
            ChatMessage::user("m1", "  Open   the\n browser  "),
            ChatMessage::user("m2", "then search"),
        ];
        assert_eq!(
            derive_name(&messages, 4),
            Some(("Open the browser".to_string(), NameSource::Content))
        );
    }

    #[test]
    fn long_text_truncates_by_chars() {
        let text = "é".repeat(40);
        let (name, _) = derive_name(&[ChatMessage::user("m1", text)], 0).unwrap();
        assert_eq!(name.chars().count(), MAX_NAME_CHARS);
    }

    #[test]
    fn blank_user_message_is_skipped() {
        let messages = vec![ChatMessage::user("m1", "   "), ChatMessage::user("m2", "take a screenshot")];
        let (name, source) = derive_name(&messages, 0).unwrap();
        assert_eq!(name, "take a screenshot");
        assert_eq!(source, NameSource::Content);
    }

    #[test]
    fn no_text_falls_back_to_ordinal() {
        let messages = vec![ChatMessage::assistant("m1").with_tool(ToolInvocation::call(
            "call_1",
            "computer",
            json!({"action": "screenshot"}),
        ))];
        assert_eq!(
            derive_name(&messages, 2),
            Some(("Session 3".to_string(), NameSource::Ordinal))
        );
    }
}
