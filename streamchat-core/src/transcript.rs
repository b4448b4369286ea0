//! Transcript state and its reducer.
//!
//! The transcript is only ever changed by folding an [`Action`] through [`reduce`]. The
//! [`TranscriptStore`] handle publishes every new value through a `watch` channel, so readers
//! always see a whole transcript, never one that is halfway through an update.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::model::{Message, MessageId, MessagePatch, MessageStatus, Role};

/// Ordered messages plus the generation-in-progress flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub messages: Vec<Message>,
    pub is_generating: bool,
}

impl Transcript {
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn last_with_role(&self, role: Role) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == role)
    }

    pub fn running_ids(&self) -> Vec<MessageId> {
        self.messages
            .iter()
            .filter(|m| m.is_running())
            .map(|m| m.id)
            .collect()
    }
}

/// The closed set of transcript operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    AddMessage(Message),
    UpdateMessage { id: MessageId, patch: MessagePatch },
    AppendToLast(String),
    AppendTo { id: MessageId, text: String },
    AddTool { id: MessageId, tool_name: String, content: String },
    AppendToTool(String),
    SetGenerating(bool),
}

/// Pure transition function.
pub fn reduce(mut state: Transcript, action: Action) -> Transcript {
    match action {
        Action::AddMessage(message) => state.messages.push(message),
        Action::UpdateMessage { id, patch } => {
            if let Some(msg) = state.messages.iter_mut().find(|m| m.id == id) {
                apply_patch(msg, patch);
            }
        }
        Action::AppendToLast(text) => {
            if let Some(msg) = state.messages.last_mut() {
                append(msg, &text);
            }
        }
        Action::AppendTo { id, text } => {
            if let Some(msg) = state.messages.iter_mut().find(|m| m.id == id) {
                append(msg, &text);
            }
        }
        Action::AddTool {
            id,
            tool_name,
            content,
        } => {
            let mut msg = Message::tool_running(tool_name, content);
            msg.id = id;
            state.messages.push(msg);
        }
        Action::AppendToTool(text) => {
            if let Some(msg) = state.messages.iter_mut().rev().find(|m| m.role == Role::Tool) {
                append(msg, &text);
            }
        }
        Action::SetGenerating(flag) => state.is_generating = flag,
    }
    state
}

fn append(msg: &mut Message, text: &str) {
    if msg.accepts_content() {
        msg.content.push_str(text);
    }
}

fn apply_patch(msg: &mut Message, patch: MessagePatch) {
    if let Some(tool_name) = patch.tool_name {
        msg.tool_name = Some(tool_name);
    }
    // complete and error are final; a late patch must not reopen the entry
    if !msg.is_running() {
        return;
    }
    if let Some(content) = patch.content {
        msg.content = content;
    }
    if let Some(status) = patch.status {
        msg.status = status;
    }
}

/// Shared, observable handle to one conversation's transcript.
///
/// Cloning the handle shares the same transcript. Every operation replaces the published
/// value in one step.
#[derive(Debug, Clone)]
pub struct TranscriptStore {
    tx: std::sync::Arc<watch::Sender<Transcript>>,
}

impl Default for TranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::with_transcript(Transcript::default())
    }

    pub fn with_transcript(initial: Transcript) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            tx: std::sync::Arc::new(tx),
        }
    }

    pub fn dispatch(&self, action: Action) {
        tracing::trace!(?action, "transcript action");
        self.tx
            .send_modify(|state| *state = reduce(std::mem::take(state), action));
    }

    /// Current value, cloned out of the channel.
    pub fn snapshot(&self) -> Transcript {
        self.tx.borrow().clone()
    }

    /// Receiver that is notified after every operation.
    pub fn subscribe(&self) -> watch::Receiver<Transcript> {
        self.tx.subscribe()
    }

    pub fn is_generating(&self) -> bool {
        self.tx.borrow().is_generating
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_message(&self, message: Message) -> MessageId {
        let id = message.id;
        self.dispatch(Action::AddMessage(message));
        id
    }

    pub fn update_message(&self, id: MessageId, patch: MessagePatch) {
        self.dispatch(Action::UpdateMessage { id, patch });
    }

    pub fn set_status(&self, id: MessageId, status: MessageStatus) {
        self.update_message(id, MessagePatch::status(status));
    }

    pub fn append_to_last_message(&self, text: impl Into<String>) {
        self.dispatch(Action::AppendToLast(text.into()));
    }

    /// Append to the entry with `id`; no-op if unknown or no longer running.
    pub fn append_to_message(&self, id: MessageId, text: impl Into<String>) {
        self.dispatch(Action::AppendTo {
            id,
            text: text.into(),
        });
    }

    /// Whether an append to the last entry would land.
    pub fn last_accepts_content(&self) -> bool {
        self.tx
            .borrow()
            .last()
            .is_some_and(|m| m.accepts_content())
    }

    pub fn add_tool_message(
        &self,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> MessageId {
        let id = MessageId::new();
        self.dispatch(Action::AddTool {
            id,
            tool_name: tool_name.into(),
            content: content.into(),
        });
        id
    }

    pub fn append_to_active_tool_message(&self, text: impl Into<String>) {
        self.dispatch(Action::AppendToTool(text.into()));
    }

    pub fn set_generating(&self, flag: bool) {
        self.dispatch(Action::SetGenerating(flag));
    }

    pub fn running_ids(&self) -> Vec<MessageId> {
        self.tx.borrow().running_ids()
    }

    /// Id of the most recent entry with `role`, if any.
    pub fn last_id_with_role(&self, role: Role) -> Option<MessageId> {
        self.tx.borrow().last_with_role(role).map(|m| m.id)
    }
}
