use std::sync::Arc;
use tracing::{debug, info, warn};

use super::kv::KeyValueStore;
use super::model::{Conversation, ConversationIndexEntry};
use crate::error::StoreError;

const INDEX_KEY: &str = "index";

fn conversation_key(id: &str) -> String {
    format!("conversation:{}", id)
}

/// Durable conversation records plus a sorted listing index.
///
/// The index is only ever rewritten from a freshly saved (or removed) record,
/// never patched on its own. Corrupt values read back as absent.
#[derive(Clone)]
pub struct ConversationStore {
    kv: Arc<dyn KeyValueStore>,
}

impl ConversationStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Index entries, newest first. Never fails.
    pub async fn list(&self) -> Vec<ConversationIndexEntry> {
        let raw = match self.kv.get_item(INDEX_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Failed to read conversation index: {:#}", e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<ConversationIndexEntry>>(&raw) {
            Ok(mut index) => {
                sort_newest_first(&mut index);
                index
            }
            Err(e) => {
                warn!("Conversation index is corrupt, treating as empty: {}", e);
                Vec::new()
            }
        }
    }

    /// Persist a new empty conversation and return it with the refreshed index
    pub async fn create(&self) -> Result<(Conversation, Vec<ConversationIndexEntry>), StoreError> {
        let conversation = Conversation::new();
        let index = self.save(&conversation).await?;

        info!("Created conversation {}", conversation.id);

        Ok((conversation, index))
    }

    /// The stored record, or `None` when missing or unreadable
    pub async fn get(&self, id: &str) -> Option<Conversation> {
        let raw = match self.kv.get_item(&conversation_key(id)).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Failed to read conversation {}: {:#}", id, e);
                return None;
            }
        };

        match serde_json::from_str::<Conversation>(&raw) {
            Ok(conversation) => Some(conversation),
            Err(e) => {
                warn!("Conversation {} is corrupt, treating as absent: {}", id, e);
                None
            }
        }
    }

    /// Persist the whole record, then upsert its index entry and re-sort.
    pub async fn save(&self, conversation: &Conversation) -> Result<Vec<ConversationIndexEntry>, StoreError> {
        if conversation.id.trim().is_empty() {
            return Err(StoreError::MissingIdentifier);
        }

        let record = serde_json::to_string(conversation)?;
        self.kv
            .set_item(&conversation_key(&conversation.id), &record)
            .await?;

        let entry = conversation.index_entry();
        let mut index = self.list().await;
        match index.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => index.insert(0, entry),
        }
        sort_newest_first(&mut index);

        self.write_index(&index).await?;

        debug!(
            "Saved conversation {} ({} messages, {} indexed)",
            conversation.id,
            conversation.messages.len(),
            index.len()
        );

        Ok(index)
    }

    /// Delete the record and its index entry. Missing ids are a no-op.
    pub async fn remove(&self, id: &str) -> Result<Vec<ConversationIndexEntry>, StoreError> {
        // Index first so a listed entry never points at a deleted record.
        let mut index = self.list().await;
        let before = index.len();
        index.retain(|e| e.id != id);
        if index.len() != before {
            self.write_index(&index).await?;
        }

        self.kv.remove_item(&conversation_key(id)).await?;

        info!("Removed conversation {}", id);

        Ok(index)
    }

    async fn write_index(&self, index: &[ConversationIndexEntry]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(index)?;
        self.kv.set_item(INDEX_KEY, &raw).await?;
        Ok(())
    }
}

fn sort_newest_first(index: &mut [ConversationIndexEntry]) {
    index.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
