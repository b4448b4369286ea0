use serde::{Deserialize, Serialize};

/// Summary of one finished turn, handed to the installed sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TurnTrace {
    pub turn_id: String,

    /// Transport name, e.g. "http".
    pub transport: Option<String>,

    /// Number of history entries sent upstream (including the new user entry).
    pub messages_sent: usize,
    pub tool_hints: Vec<String>,

    /// Frames that decoded into an event (known or not).
    pub events_applied: u32,
    /// `data:` frames whose payload failed to decode.
    pub frames_skipped: u32,

    pub latency_ms: Option<u64>,

    /// Normalized outcome label: "completed", "failed", "cancelled".
    pub outcome: Option<String>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}

impl TurnTrace {
    pub fn new(turn_id: impl Into<String>) -> Self {
        Self {
            turn_id: turn_id.into(),
            ..Default::default()
        }
    }

    pub fn transport(mut self, name: &str) -> Self {
        self.transport = Some(name.to_string());
        self
    }

    pub fn request(mut self, messages_sent: usize, tool_hints: &[String]) -> Self {
        self.messages_sent = messages_sent;
        self.tool_hints = tool_hints.to_vec();
        self
    }

    pub fn counts(mut self, events_applied: u32, frames_skipped: u32) -> Self {
        self.events_applied = events_applied;
        self.frames_skipped = frames_skipped;
        self
    }

    pub fn latency_ms(mut self, ms: u64) -> Self {
        self.latency_ms = Some(ms);
        self
    }

    pub fn outcome(mut self, outcome: &str) -> Self {
        self.outcome = Some(outcome.to_string());
        self
    }

    pub fn error(mut self, kind: &str, message: &str) -> Self {
        self.error_kind = Some(kind.to_string());
        self.error_message = Some(message.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn turn_trace_serializes() {
        let trace = TurnTrace::new("turn-123")
            .transport("http")
            .request(3, &["web_search".to_string()])
            .counts(7, 1)
            .latency_ms(42)
            .outcome("failed")
            .error("transport", "reset");

        let as_json = serde_json::to_value(&trace).unwrap();
        assert_eq!(as_json["turn_id"], json!("turn-123"));
        assert_eq!(as_json["transport"], json!("http"));
        assert_eq!(as_json["messages_sent"], json!(3));
        assert_eq!(as_json["tool_hints"], json!(["web_search"]));
        assert_eq!(as_json["events_applied"], json!(7));
        assert_eq!(as_json["frames_skipped"], json!(1));
        assert_eq!(as_json["latency_ms"], json!(42));
        assert_eq!(as_json["error_kind"], json!("transport"));
    }
}
