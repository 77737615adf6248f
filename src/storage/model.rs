use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Title given to conversations until the service names them
pub const DEFAULT_TITLE: &str = "New Conversation";

/// A conversation and its full message log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    /// RFC 3339 UTC timestamp; ordering compares the strings
    pub created_at: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    /// An empty conversation with a fresh identifier
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
        }
    }

    /// The assistant message of the turn in progress, if the log ends with one
    pub fn open_assistant_mut(&mut self) -> Option<&mut AssistantMessage> {
        match self.messages.last_mut() {
            Some(Message::Assistant(msg)) => Some(msg),
            _ => None,
        }
    }

    pub fn last_assistant(&self) -> Option<&AssistantMessage> {
        self.messages.iter().rev().find_map(|m| match m {
            Message::Assistant(msg) => Some(msg),
            Message::User { .. } => None,
        })
    }

    /// Index projection of this record
    pub fn index_entry(&self) -> ConversationIndexEntry {
        let title = if self.title.trim().is_empty() {
            DEFAULT_TITLE.to_string()
        } else {
            self.title.clone()
        };

        ConversationIndexEntry {
            id: self.id.clone(),
            created_at: self.created_at.clone(),
            title,
            message_count: self.messages.len(),
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// One entry of the message log, tagged by `role`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    User { content: String },
    Assistant(AssistantMessage),
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    /// Placeholder for a turn that has not received any event yet
    pub fn assistant_placeholder() -> Self {
        Message::Assistant(AssistantMessage::default())
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            Message::Assistant(msg) => Some(msg),
            Message::User { .. } => None,
        }
    }
}

/// Assistant reply built up stage by stage. Stage payloads are opaque to the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub clarification: Option<Clarification>,
    #[serde(default)]
    pub stage1: Option<Value>,
    #[serde(default)]
    pub stage2: Option<Value>,
    #[serde(default)]
    pub stage3: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub loading: LoadingState,
}

impl AssistantMessage {
    pub fn is_loading(&self) -> bool {
        self.loading.any()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingState {
    #[serde(default)]
    pub clarification: bool,
    #[serde(default)]
    pub stage1: bool,
    #[serde(default)]
    pub stage2: bool,
    #[serde(default)]
    pub stage3: bool,
}

impl LoadingState {
    pub fn any(&self) -> bool {
        self.clarification || self.stage1 || self.stage2 || self.stage3
    }
}

/// Questions the service asks before running the council
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Clarification {
    #[serde(default)]
    pub needs_clarification: bool,
    #[serde(default)]
    pub questions: Vec<String>,
}

/// Listing summary of a stored conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationIndexEntry {
    pub id: String,
    pub created_at: String,
    pub title: String,
    pub message_count: usize,
}
