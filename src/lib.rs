pub mod audio;
pub mod config;
pub mod council;
pub mod error;
pub mod session;
pub mod storage;

pub use audio::{
    encode_wav, AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioCapturer, AudioFile,
    AudioFrame, AudioSource, CaptureState, FileBackend, Recording,
};
pub use config::Config;
pub use council::{CouncilClient, CouncilTransport, EventKind, ModelList, StreamEvent, TurnRequest};
pub use error::{CaptureError, SessionError, StoreError, TransportError};
pub use session::{
    ConversationSession, SessionConfig, SessionUpdate, StreamSessionController, TurnOutcome,
    TurnStats,
};
pub use storage::{
    AssistantMessage, Clarification, Conversation, ConversationIndexEntry, ConversationStore,
    FileStore, KeyValueStore, LoadingState, MemoryStore, Message,
};
