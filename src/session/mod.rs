//! Conversation session management
//!
//! This module provides:
//! - `ConversationSession`: current conversation, input routing, clarification loop, rollback
//! - `StreamSessionController`: drives one streamed turn and persists after every event
//! - `reducer`: pure event → message mutation
//! - Turn statistics and update notifications

mod config;
pub mod reducer;
mod session;
mod stats;
mod turn;

pub use config::{SessionConfig, DEFAULT_CLARIFICATION_SEPARATOR};
pub use reducer::{apply_event, Effect};
pub use session::ConversationSession;
pub use stats::{SessionUpdate, TurnOutcome, TurnStats};
pub use turn::StreamSessionController;
