//! Error taxonomy for the conversation engine and audio pipeline.
//!
//! Corrupt persisted records are never an error: the store degrades them to
//! "absent" and logs. Unknown stream events are logged and skipped.

use thiserror::Error;

/// Failures of the conversation store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("conversation has no identifier")]
    MissingIdentifier,

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Failures of microphone capture.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("microphone access denied or unavailable: {0}")]
    Permission(String),

    #[error("no active capture session")]
    NoActiveSession,

    #[error("audio device error: {0}")]
    Device(#[from] anyhow::Error),
}

/// Failures talking to the council service.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("council service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("stream error: {0}")]
    Stream(String),

    #[error("council service reported an error: {0}")]
    Remote(String),

    #[error("failed to decode event: {0}")]
    Decode(String),
}

/// Failures surfaced by the conversation session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no conversation selected")]
    NoConversation,

    #[error("conversation has no open assistant message")]
    NoOpenTurn,

    #[error("no clarification is pending")]
    NoPendingClarification,

    #[error("input is empty")]
    EmptyInput,
}

impl SessionError {
    /// True when the failure came from the network or the remote service,
    /// i.e. the optimistic append must be rolled back.
    pub fn is_transport(&self) -> bool {
        matches!(self, SessionError::Transport(_))
    }
}
