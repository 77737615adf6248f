//! Local conversation persistence
//!
//! - `kv`: injected key-value capability (in-memory or directory-backed)
//! - `model`: conversation, message and index types as stored
//! - `store`: `ConversationStore` with record + index bookkeeping

mod kv;
mod model;
mod store;

pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use model::{
    AssistantMessage, Clarification, Conversation, ConversationIndexEntry, LoadingState, Message,
    DEFAULT_TITLE,
};
pub use store::ConversationStore;
