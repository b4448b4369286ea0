use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Running,
    Complete,
    Error,
}

/// Opaque message identifier, assigned once at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One transcript entry.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::User,
            content: content.into(),
            status: MessageStatus::Complete,
            tool_name: None,
        }
    }

    /// A fresh assistant entry that is still being generated.
    pub fn assistant_running(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::Assistant,
            content: content.into(),
            status: MessageStatus::Running,
            tool_name: None,
        }
    }

    pub fn tool_running(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::Tool,
            content: content.into(),
            status: MessageStatus::Running,
            tool_name: Some(tool_name.into()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == MessageStatus::Running
    }

    /// Content and status are frozen once the entry leaves `Running`.
    pub fn accepts_content(&self) -> bool {
        self.is_running()
    }
}

/// Partial update merged into a message by id. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    pub content: Option<String>,
    pub status: Option<MessageStatus>,
    pub tool_name: Option<String>,
}

impl MessagePatch {
    pub fn status(status: MessageStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

/// What goes over the wire for each history entry: role and content only.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for ChatMessage {
    fn from(m: &Message) -> Self {
        Self {
            role: m.role,
            content: m.content.clone(),
        }
    }
}

/// Outbound request body for one turn.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_hints: Vec<String>,
}

impl ChatRequest {
    pub fn from_history<'a>(
        history: impl IntoIterator<Item = &'a Message>,
        tool_hints: Vec<String>,
    ) -> Self {
        Self {
            messages: history.into_iter().map(ChatMessage::from).collect(),
            tool_hints,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_projects_role_and_content_only() {
        let mut tool = Message::tool_running("web_search", "web search");
        tool.status = MessageStatus::Complete;
        let history = vec![Message::user("hello"), tool, Message::assistant_running("Hi")];
        let req = ChatRequest::from_history(&history, vec!["web_search".into()]);

        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(
            v,
            json!({
                "messages": [
                    {"role": "user", "content": "hello"},
                    {"role": "tool", "content": "web search"},
                    {"role": "assistant", "content": "Hi"}
                ],
                "toolHints": ["web_search"]
            })
        );
    }

    #[test]
    fn empty_hints_are_omitted() {
        let history = vec![Message::user("hello")];
        let req = ChatRequest::from_history(&history, Vec::new());
        let s = serde_json::to_string(&req).unwrap();
        assert!(!s.contains("toolHints"));
    }

    #[test]
    fn message_serializes_camel_case() {
        let m = Message::tool_running("web_search", "x");
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["toolName"], json!("web_search"));
        assert_eq!(v["status"], json!("running"));
        assert_eq!(v["role"], json!("tool"));

        let u = serde_json::to_value(Message::user("hi")).unwrap();
        assert!(u.get("toolName").is_none());
    }

    #[test]
    fn complete_messages_refuse_content() {
        assert!(!Message::user("hi").accepts_content());
        assert!(Message::assistant_running("").accepts_content());
    }
}
