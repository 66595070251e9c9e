//! In-memory conversation state: the ordered message list and per-message
//! tool-call sub-state that the stream dispatcher mutates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::SessionMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallState {
    Running,
    Done,
    Error,
}

/// One tool invocation surfaced in an assistant message, in arrival order of
/// its start notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallStatus {
    pub tool: String,
    pub message: String,
    pub state: ToolCallState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub tool_calls: Vec<ToolCallStatus>,
    pub is_streaming: bool,
}

impl ChatMessage {
    fn new(role: Role, content: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
            tool_calls: Vec::new(),
            is_streaming: false,
        }
    }

    /// Convert a server history record. Non-conversational roles and records
    /// with no content are skipped during restore.
    pub fn from_session_message(message: &SessionMessage) -> Option<Self> {
        let role = match message.role.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => return None,
        };
        let content = message.content.as_deref()?;
        Some(Self {
            id: message.id.clone(),
            role,
            content: content.to_string(),
            timestamp: message.created_at,
            tool_calls: Vec::new(),
            is_streaming: false,
        })
    }
}

/// Strict insertion-order message list. At most one assistant message is open
/// (`is_streaming`) at any time, the one belonging to the turn in flight.
#[derive(Debug, Default)]
pub struct ChatState {
    messages: Vec<ChatMessage>,
}

impl ChatState {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push_user(&mut self, content: &str) {
        self.messages.push(ChatMessage::new(Role::User, content));
    }

    /// Append a closed assistant message, used for pre-stream failures that
    /// never reach the decoder.
    pub fn push_assistant_notice(&mut self, content: &str) {
        self.messages
            .push(ChatMessage::new(Role::Assistant, content));
    }

    /// Append the placeholder the current turn's events will target.
    pub fn begin_assistant_turn(&mut self) {
        let mut message = ChatMessage::new(Role::Assistant, "");
        message.is_streaming = true;
        self.messages.push(message);
    }

    fn open_message_mut(&mut self) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().rev().find(|m| m.is_streaming)
    }

    pub fn append_delta(&mut self, text: &str) {
        if let Some(message) = self.open_message_mut() {
            message.content.push_str(text);
        }
    }

    pub fn start_tool(&mut self, tool: &str, message: &str) {
        if let Some(open) = self.open_message_mut() {
            open.tool_calls.push(ToolCallStatus {
                tool: tool.to_string(),
                message: message.to_string(),
                state: ToolCallState::Running,
            });
        }
    }

    /// Resolve the most recently started still-running call for this tool
    /// name. Returns false when nothing matched; the event is then a no-op.
    pub fn resolve_tool(&mut self, tool: &str, success: bool) -> bool {
        let Some(open) = self.open_message_mut() else {
            return false;
        };
        let Some(entry) = open
            .tool_calls
            .iter_mut()
            .rev()
            .find(|c| c.tool == tool && c.state == ToolCallState::Running)
        else {
            return false;
        };
        entry.state = if success {
            ToolCallState::Done
        } else {
            ToolCallState::Error
        };
        true
    }

    /// Inline error surfacing: only fills content that is still empty, and
    /// closes the message. Draining continues at the caller.
    pub fn apply_error(&mut self, message: &str) {
        if let Some(open) = self.open_message_mut() {
            if open.content.is_empty() {
                open.content = message.to_string();
            }
            open.is_streaming = false;
        }
    }

    /// Force-close the open message; runs once reading ends whether or not a
    /// `done` event was ever seen.
    pub fn close_open_message(&mut self) {
        if let Some(open) = self.open_message_mut() {
            open.is_streaming = false;
        }
    }

    pub fn replace_all(&mut self, messages: Vec<ChatMessage>) {
        self.messages = messages;
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
