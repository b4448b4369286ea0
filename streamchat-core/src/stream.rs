//! Inbound server events and frame decoding.
//!
//! Contract:
//! - Only lines starting with `data: ` are frames; anything else (comments, keep-alives,
//!   blank separators) is skipped.
//! - A frame whose JSON does not parse is skipped; it never ends the stream.
//! - Unknown `type` tags decode to [`ServerEvent::Unknown`] and are ignored by the driver.

use serde::Deserialize;

/// Prefix that marks a data frame.
pub const DATA_PREFIX: &str = "data: ";

/// Tool name used when neither the event nor its text names one.
pub const DEFAULT_TOOL_NAME: &str = "search";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    ToolStarted {
        #[serde(default, rename = "toolName", alias = "tool_name")]
        tool_name: Option<String>,
        #[serde(default)]
        content: String,
    },
    ToolDelta {
        #[serde(default)]
        content: String,
    },
    ToolFinished {
        #[serde(default)]
        content: String,
    },
    Delta {
        #[serde(default)]
        content: String,
    },
    ChatMessageComplete,
    #[serde(other)]
    Unknown,
}

/// Outcome of looking at one line of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Event(ServerEvent),
    /// Not a data line.
    Ignored,
    /// A data line whose payload did not decode.
    Malformed(String),
}

pub fn decode_line(line: &str) -> Frame {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Frame::Ignored;
    };
    match serde_json::from_str::<ServerEvent>(payload) {
        Ok(ev) => Frame::Event(ev),
        Err(e) => Frame::Malformed(e.to_string()),
    }
}

/// Tool name for a `tool_started` event: the explicit field wins, otherwise the second word
/// of the status text ("Starting web search..." -> "web"). Best effort only.
pub fn resolve_tool_name(explicit: Option<&str>, content: &str) -> String {
    if let Some(name) = explicit.map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    content
        .split(' ')
        .nth(1)
        .map(strip_ellipsis)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TOOL_NAME)
        .to_string()
}

pub fn strip_ellipsis(s: &str) -> &str {
    s.strip_suffix("...").unwrap_or(s)
}

/// "Starting web search..." -> "web search"
pub fn clean_started_text(s: &str) -> &str {
    let s = strip_ellipsis(s);
    s.strip_prefix("Starting ").unwrap_or(s)
}

/// "Web search completed." -> "Web search"
pub fn clean_finished_text(s: &str) -> &str {
    let s = strip_ellipsis(s);
    s.strip_suffix(" completed.").unwrap_or(s)
}
