//! Telemetry primitives for turn-level tracing.
//! By default, no telemetry is emitted unless a sink is installed via `set_telemetry_sink`.

pub mod keys;
pub mod types;

#[cfg(test)]
pub(crate) mod test_span;

pub use keys::*;
pub use types::*;

use std::sync::Arc;

use once_cell::sync::OnceCell;

/// Implement this to receive telemetry events.
///
/// Requirements:
/// - Implementations must be thread-safe (`Send + Sync`) and `'static`.
/// - `record_turn` **may** be called from any thread; implementations should avoid panicking.
pub trait TelemetrySink: Send + Sync + 'static {
    fn record_turn(&self, trace: TurnTrace);
}

static TELEMETRY_SINK: OnceCell<Arc<dyn TelemetrySink>> = OnceCell::new();

/// Install a global telemetry sink. Returns `false` if a sink is already installed.
///
/// This is a write-once global for the process lifetime (backed by `OnceCell`).
pub fn set_telemetry_sink(sink: Arc<dyn TelemetrySink>) -> bool {
    TELEMETRY_SINK.set(sink).is_ok()
}

/// Emit a turn record to `local` if given, otherwise to the global sink if one is installed.
pub(crate) fn emit_turn(trace: TurnTrace, local: Option<&Arc<dyn TelemetrySink>>) {
    tracing::debug!(
        { KEY_TURN_ID } = %trace.turn_id,
        { KEY_OUTCOME } = trace.outcome.as_deref().unwrap_or("unknown"),
        { KEY_EVENTS_APPLIED } = trace.events_applied,
        { KEY_FRAMES_SKIPPED } = trace.frames_skipped,
        { KEY_LATENCY_MS } = trace.latency_ms.unwrap_or(0),
        "turn finished"
    );
    if let Some(sink) = local.or_else(|| TELEMETRY_SINK.get()) {
        sink.record_turn(trace);
    }
}
