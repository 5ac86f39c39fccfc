use serde_json::Value;

use crate::model::{ComputerAction, ComputerPayload, EventKind, ScrollDirection};

/// Tool name the agent uses for desktop actions.
pub const COMPUTER_TOOL: &str = "computer";

/// Tool name the agent uses for shell commands.
pub const BASH_TOOL: &str = "bash";

/// Map a raw tool call to a typed event payload.
///
/// # Functional Core
/// Pure function - no state, no I/O. Returns `None` for anything it does not
/// recognise so the caller can skip the delta. Optional fields that are
/// missing or malformed are simply left out.
pub fn classify(tool_name: &str, args: &Value) -> Option<EventKind> {
    match tool_name {
        COMPUTER_TOOL => classify_computer(args).map(EventKind::computer),
        BASH_TOOL => {
            let command = args.get("command")?.as_str()?;
            Some(EventKind::bash(command))
        }
        _ => None,
    }
}

fn classify_computer(args: &Value) -> Option<ComputerPayload> {
    let action = ComputerAction::parse(args.get("action")?.as_str()?)?;

    Some(ComputerPayload {
        action,
        coordinate: args.get("coordinate").and_then(parse_point),
        text: args
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string),
        wait_seconds: args.get("duration").and_then(Value::as_f64),
        scroll_amount: args.get("scroll_amount").and_then(Value::as_i64),
        scroll_direction: args
            .get("scroll_direction")
            .and_then(Value::as_str)
            .and_then(parse_direction),
        drag_start: args.get("start_coordinate").and_then(parse_point),
    })
}

fn parse_point(value: &Value) -> Option<(i64, i64)> {
    match value.as_array()?.as_slice() {
        [x, y] => Some((as_coord(x)?, as_coord(y)?)),
        _ => None,
    }
}

// Agents occasionally send coordinates as floats.
fn as_coord(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.round() as i64))
}

fn parse_direction(direction: &str) -> Option<ScrollDirection> {
    match direction {
        "up" => Some(ScrollDirection::Up),
        "down" => Some(ScrollDirection::Down),
        "left" => Some(ScrollDirection::Left),
        "right" => Some(ScrollDirection::Right),
        _ => None,
    }
}
