pub mod client;
pub mod events;
pub mod messages;
pub mod sse;

pub use client::{CouncilClient, CouncilTransport};
pub use events::{EventKind, StreamEvent};
pub use messages::{HealthStatus, ModelList, TranscriptResponse, TurnRequest};
pub use sse::{event_stream, EventStream, SseParser};
