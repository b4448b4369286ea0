/// Span/log attribute keys for chat turns.
/// Keep these stable; log queries and dashboards match on them.
pub const KEY_TURN_ID: &str = "turn.id";
pub const KEY_TRANSPORT: &str = "turn.transport";
pub const KEY_OUTCOME: &str = "turn.outcome";

pub const KEY_EVENTS_APPLIED: &str = "stream.events_applied";
pub const KEY_FRAMES_SKIPPED: &str = "stream.frames_skipped";
pub const KEY_LATENCY_MS: &str = "latency.ms";

pub const KEY_ERROR_KIND: &str = "error.kind";
pub const KEY_ERROR_MESSAGE: &str = "error.message";
