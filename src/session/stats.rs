use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{Clarification, ConversationIndexEntry};

/// How a turn ended when it did not fail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TurnOutcome {
    /// All stages arrived (or the stream closed with nothing left loading)
    Completed,
    /// The service wants more context before running the council
    ClarificationNeeded(Clarification),
}

/// Statistics about one streamed turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnStats {
    pub outcome: TurnOutcome,

    /// When the stream was opened
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Events read from the stream
    pub events_received: usize,

    /// Events that changed the conversation
    pub events_applied: usize,

    /// Events with a type this client does not know
    pub unknown_events: usize,

    /// Store writes made during the turn
    pub saves: usize,
}

/// Notifications for whatever renders the conversation
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// `messages[index]` of the conversation changed
    MessageUpdated { conversation_id: String, index: usize },
    IndexRefreshed(Vec<ConversationIndexEntry>),
    TitleChanged { conversation_id: String, title: String },
    ClarificationNeeded(Clarification),
    TurnFinished(TurnOutcome),
    /// The optimistic user + assistant pair was removed
    TurnRolledBack { conversation_id: String, reason: String },
}
