use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event of a streamed turn, as sent by the council service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Only set on `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StreamEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            event_type: kind.as_str().to_string(),
            data: None,
            metadata: None,
            message: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(EventKind::Error)
        }
    }

    pub fn kind(&self) -> EventKind {
        EventKind::parse(&self.event_type)
    }
}

/// Event vocabulary. Anything else is carried as `Unknown` and skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    ClarificationStart,
    ClarificationNeeded,
    ClarificationComplete,
    Stage1Start,
    Stage1Complete,
    Stage2Start,
    Stage2Complete,
    Stage3Start,
    Stage3Complete,
    TitleComplete,
    Complete,
    Error,
    Unknown(String),
}

impl EventKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "clarification_start" => EventKind::ClarificationStart,
            "clarification_needed" => EventKind::ClarificationNeeded,
            "clarification_complete" => EventKind::ClarificationComplete,
            "stage1_start" => EventKind::Stage1Start,
            "stage1_complete" => EventKind::Stage1Complete,
            "stage2_start" => EventKind::Stage2Start,
            "stage2_complete" => EventKind::Stage2Complete,
            "stage3_start" => EventKind::Stage3Start,
            "stage3_complete" => EventKind::Stage3Complete,
            "title_complete" => EventKind::TitleComplete,
            "complete" => EventKind::Complete,
            "error" => EventKind::Error,
            other => EventKind::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::ClarificationStart => "clarification_start",
            EventKind::ClarificationNeeded => "clarification_needed",
            EventKind::ClarificationComplete => "clarification_complete",
            EventKind::Stage1Start => "stage1_start",
            EventKind::Stage1Complete => "stage1_complete",
            EventKind::Stage2Start => "stage2_start",
            EventKind::Stage2Complete => "stage2_complete",
            EventKind::Stage3Start => "stage3_start",
            EventKind::Stage3Complete => "stage3_complete",
            EventKind::TitleComplete => "title_complete",
            EventKind::Complete => "complete",
            EventKind::Error => "error",
            EventKind::Unknown(other) => other,
        }
    }
}
