//! Drives one request/response cycle per `send` and folds the stream into the transcript.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info_span, trace, warn};
use tracing_futures::Instrument;
use uuid::Uuid;

use crate::config::{Config, HttpCfg};
use crate::error::{ChatError, CoreResult};
use crate::model::{ChatRequest, Message, MessageId, MessageStatus, Role};
use crate::normalizer::{normalize_hints, normalize_input};
use crate::stream::{
    clean_finished_text, clean_started_text, decode_line, resolve_tool_name, strip_ellipsis,
    Frame, ServerEvent,
};
use crate::telemetry::{
    emit_turn, TelemetrySink, TurnTrace, KEY_ERROR_KIND, KEY_ERROR_MESSAGE, KEY_TRANSPORT,
    KEY_TURN_ID,
};
use crate::transcript::TranscriptStore;
use crate::transport::{ChatTransport, HttpTransport};

/// How a turn ended. Failures are already reflected in the transcript; this is for callers
/// that want to log or react.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Input was blank; nothing was sent or recorded.
    Rejected,
    Completed,
    Failed { kind: &'static str, message: String },
    Cancelled,
}

impl TurnOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Rejected => "rejected",
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Cancels whatever turn is in flight on the session it came from.
/// A cancel issued while no turn is running is discarded when the next turn starts.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// One conversation: a transcript plus the transport used to extend it.
pub struct ChatSession {
    store: TranscriptStore,
    transport: Arc<dyn ChatTransport>,
    idle_timeout: Duration,
    default_hints: Vec<String>,
    cancel: Arc<watch::Sender<bool>>,
    sink: Option<Arc<dyn TelemetrySink>>,
}

impl ChatSession {
    pub fn new(store: TranscriptStore, transport: Arc<dyn ChatTransport>) -> Self {
        let (cancel, _rx) = watch::channel(false);
        Self {
            store,
            transport,
            idle_timeout: HttpCfg::default().idle_timeout(),
            default_hints: Vec::new(),
            cancel: Arc::new(cancel),
            sink: None,
        }
    }

    /// Session over HTTP with timeouts and default hints taken from `cfg`.
    pub fn from_config(cfg: &Config) -> CoreResult<Self> {
        let transport = HttpTransport::from_config(cfg)?;
        Ok(Self::new(TranscriptStore::new(), Arc::new(transport))
            .with_idle_timeout(cfg.http.idle_timeout())
            .with_default_hints(&cfg.tools.default_hints))
    }

    pub fn with_idle_timeout(mut self, idle: Duration) -> Self {
        self.idle_timeout = idle;
        self
    }

    pub fn with_default_hints<S: AsRef<str>>(mut self, hints: &[S]) -> Self {
        self.default_hints = normalize_hints(hints);
        self
    }

    /// Send turn traces here instead of the process-wide sink.
    pub fn with_telemetry_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn store(&self) -> &TranscriptStore {
        &self.store
    }

    pub fn is_generating(&self) -> bool {
        self.store.is_generating()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel.clone())
    }

    /// Run one turn. Empty `tool_hints` falls back to the session defaults.
    ///
    /// Never fails: transport and decode problems end the turn and are recorded on the
    /// transcript. Dropping the returned future mid-turn marks every running entry as error.
    pub async fn send<S: AsRef<str>>(&mut self, content: &str, tool_hints: &[S]) -> TurnOutcome {
        let Some(text) = normalize_input(content) else {
            debug!("ignoring blank input");
            return TurnOutcome::Rejected;
        };
        let hints = if tool_hints.is_empty() {
            self.default_hints.clone()
        } else {
            normalize_hints(tool_hints)
        };
        let turn_id = Uuid::new_v4().to_string();
        let span = info_span!(
            "turn",
            { KEY_TURN_ID } = %turn_id,
            { KEY_TRANSPORT } = self.transport.name()
        );
        self.run_turn(text, hints, turn_id).instrument(span).await
    }

    async fn run_turn(&self, text: String, hints: Vec<String>, turn_id: String) -> TurnOutcome {
        let started = Instant::now();
        self.cancel.send_replace(false);
        let mut cancel_rx = self.cancel.subscribe();

        self.store.add_message(Message::user(text));
        self.store.set_generating(true);
        let mut guard = TurnGuard {
            store: &self.store,
            armed: true,
        };

        let request = ChatRequest::from_history(&self.store.snapshot().messages, hints.clone());
        let mut turn = TurnState::new(hints);
        let result = self
            .drive(&request, &turn_id, &mut turn, &mut cancel_rx)
            .await;

        let outcome = match result {
            Ok(()) => TurnOutcome::Completed,
            Err(ChatError::Cancelled) => {
                debug!("turn cancelled");
                fail_running(&self.store);
                TurnOutcome::Cancelled
            }
            Err(e) => {
                warn!({ KEY_ERROR_KIND } = e.kind(), { KEY_ERROR_MESSAGE } = %e, "turn failed");
                fail_running(&self.store);
                TurnOutcome::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        };
        self.store.set_generating(false);
        guard.armed = false;

        let mut trace = TurnTrace::new(&turn_id)
            .transport(self.transport.name())
            .request(request.messages.len(), &request.tool_hints)
            .counts(turn.events_applied, turn.frames_skipped)
            .latency_ms(started.elapsed().as_millis() as u64)
            .outcome(outcome.label());
        if let TurnOutcome::Failed { kind, message } = &outcome {
            trace = trace.error(kind, message);
        }
        emit_turn(trace, self.sink.as_ref());
        outcome
    }

    async fn drive(
        &self,
        request: &ChatRequest,
        turn_id: &str,
        turn: &mut TurnState,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> CoreResult<()> {
        let mut lines = tokio::select! {
            biased;
            _ = cancelled(cancel_rx) => return Err(ChatError::Cancelled),
            opened = self.transport.open(request, turn_id) => opened?,
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = cancelled(cancel_rx) => return Err(ChatError::Cancelled),
                next = tokio::time::timeout(self.idle_timeout, lines.next()) => next,
            };
            match next {
                Err(_) => return Err(ChatError::Timeout("next stream line")),
                Ok(None) => return Ok(()),
                Ok(Some(Err(e))) => return Err(e),
                Ok(Some(Ok(line))) => turn.apply_line(&self.store, &line.line),
            }
        }
    }
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // sender gone: nobody can cancel any more
            std::future::pending::<()>().await;
        }
    }
}

fn fail_running(store: &TranscriptStore) {
    for id in store.running_ids() {
        store.set_status(id, MessageStatus::Error);
    }
}

/// Leaves the transcript terminal if the turn future is dropped before it finishes.
struct TurnGuard<'a> {
    store: &'a TranscriptStore,
    armed: bool,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("turn abandoned before the stream ended");
            fail_running(self.store);
            self.store.set_generating(false);
        }
    }
}

/// State private to one turn.
struct TurnState {
    hints: Vec<String>,
    /// Most recently started tool, whether or not it was requested.
    current_tool: Option<String>,
    assistant_id: Option<MessageId>,
    events_applied: u32,
    frames_skipped: u32,
}

impl TurnState {
    fn new(hints: Vec<String>) -> Self {
        Self {
            hints,
            current_tool: None,
            assistant_id: None,
            events_applied: 0,
            frames_skipped: 0,
        }
    }

    fn apply_line(&mut self, store: &TranscriptStore, line: &str) {
        match decode_line(line) {
            Frame::Event(ev) => {
                self.events_applied += 1;
                self.apply_event(store, ev);
            }
            Frame::Malformed(err) => {
                self.frames_skipped += 1;
                debug!(error = %err, "skipping malformed frame");
            }
            Frame::Ignored => {}
        }
    }

    fn tool_visible(&self) -> bool {
        self.current_tool
            .as_ref()
            .is_some_and(|t| self.hints.iter().any(|h| h == t))
    }

    fn apply_event(&mut self, store: &TranscriptStore, ev: ServerEvent) {
        match ev {
            ServerEvent::ToolStarted { tool_name, content } => {
                let name = resolve_tool_name(tool_name.as_deref(), &content);
                self.current_tool = Some(name.clone());
                if self.tool_visible() {
                    store.add_tool_message(name, clean_started_text(&content));
                } else {
                    trace!(tool = %name, "tool not requested; hidden");
                }
            }
            ServerEvent::ToolDelta { content } => {
                if self.tool_visible() {
                    store.append_to_active_tool_message(strip_ellipsis(&content));
                }
            }
            ServerEvent::ToolFinished { content } => {
                if self.tool_visible() {
                    store.append_to_active_tool_message(clean_finished_text(&content));
                    if let Some(id) = store.last_id_with_role(Role::Tool) {
                        store.set_status(id, MessageStatus::Complete);
                    }
                }
            }
            ServerEvent::Delta { content } => match self.assistant_id {
                None => {
                    let id = store.add_message(Message::assistant_running(content));
                    self.assistant_id = Some(id);
                }
                // a finished tool entry after the reply started no longer takes text
                Some(id) if !store.last_accepts_content() => {
                    debug!("last entry is closed; appending delta to the assistant entry");
                    store.append_to_message(id, content);
                }
                Some(_) => store.append_to_last_message(content),
            },
            ServerEvent::ChatMessageComplete => {
                if let Some(id) = self.assistant_id {
                    store.set_status(id, MessageStatus::Complete);
                }
            }
            ServerEvent::Unknown => trace!("ignoring unknown event type"),
        }
    }
}
