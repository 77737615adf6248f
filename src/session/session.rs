use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::config::SessionConfig;
use super::stats::{SessionUpdate, TurnOutcome, TurnStats};
use super::turn::{notify, StreamSessionController};
use crate::audio::Recording;
use crate::council::{CouncilTransport, ModelList, TurnRequest};
use crate::error::SessionError;
use crate::storage::{Clarification, Conversation, ConversationIndexEntry, ConversationStore, Message};

/// Owns the current conversation and routes user input into turns.
///
/// Turns are serialized by `&mut self`: a new turn cannot start while one is
/// being driven. A failed turn is rolled back so the log is exactly what it
/// was before the message was sent.
pub struct ConversationSession {
    config: SessionConfig,
    store: ConversationStore,
    transport: Arc<dyn CouncilTransport>,
    controller: StreamSessionController,
    updates: Option<mpsc::UnboundedSender<SessionUpdate>>,
    current: Option<Conversation>,
    pending_clarification: Option<Clarification>,
    original_query: Option<String>,
    last_turn: Option<TurnStats>,
}

impl ConversationSession {
    pub fn new(config: SessionConfig, store: ConversationStore, transport: Arc<dyn CouncilTransport>) -> Self {
        let controller = StreamSessionController::new(store.clone(), Arc::clone(&transport));
        Self {
            config,
            store,
            transport,
            controller,
            updates: None,
            current: None,
            pending_clarification: None,
            original_query: None,
            last_turn: None,
        }
    }

    /// Publish [`SessionUpdate`]s to `updates`
    pub fn with_updates(mut self, updates: mpsc::UnboundedSender<SessionUpdate>) -> Self {
        self.controller = StreamSessionController::new(self.store.clone(), Arc::clone(&self.transport))
            .with_updates(updates.clone());
        self.updates = Some(updates);
        self
    }

    pub fn current(&self) -> Option<&Conversation> {
        self.current.as_ref()
    }

    pub fn pending_clarification(&self) -> Option<&Clarification> {
        self.pending_clarification.as_ref()
    }

    pub fn last_turn_stats(&self) -> Option<&TurnStats> {
        self.last_turn.as_ref()
    }

    pub async fn conversations(&self) -> Vec<ConversationIndexEntry> {
        self.store.list().await
    }

    /// Create an empty conversation and make it current
    pub async fn new_conversation(&mut self) -> Result<&Conversation, SessionError> {
        let (conversation, index) = self.store.create().await?;
        notify(self.updates.as_ref(), SessionUpdate::IndexRefreshed(index));

        self.clear_clarification();
        Ok(self.current.insert(conversation))
    }

    /// Load a stored conversation and make it current. Switching drops any pending clarification.
    pub async fn open_conversation(&mut self, id: &str) -> Result<&Conversation, SessionError> {
        let conversation = self.store.get(id).await.ok_or(SessionError::NoConversation)?;

        self.clear_clarification();
        Ok(self.current.insert(conversation))
    }

    pub async fn delete_conversation(&mut self, id: &str) -> Result<(), SessionError> {
        let index = self.store.remove(id).await?;
        notify(self.updates.as_ref(), SessionUpdate::IndexRefreshed(index));

        if self.current.as_ref().is_some_and(|c| c.id == id) {
            self.current = None;
            self.clear_clarification();
        }

        Ok(())
    }

    /// Send user input as a new turn.
    ///
    /// While a clarification is pending, `content` is treated as the answer:
    /// it is appended to the original query and clarification is skipped
    /// regardless of `skip_clarification`.
    pub async fn send_message(&mut self, content: &str, skip_clarification: bool) -> Result<TurnOutcome, SessionError> {
        if content.trim().is_empty() {
            return Err(SessionError::EmptyInput);
        }
        if self.current.is_none() {
            return Err(SessionError::NoConversation);
        }

        let previous_clarification = self.pending_clarification.take();
        let previous_query = self.original_query.clone();

        let (effective, skip) = match &previous_clarification {
            Some(_) => {
                let original = previous_query.clone().unwrap_or_default();
                let combined = format!("{}{}{}", original, self.config.clarification_separator, content);
                (combined, true)
            }
            None => {
                self.original_query = Some(content.to_string());
                (content.to_string(), skip_clarification)
            }
        };

        let result = self.run_turn(effective, skip).await;
        if result.is_err() {
            self.pending_clarification = previous_clarification;
            self.original_query = previous_query;
        }
        result
    }

    /// Re-send the original query without clarification
    pub async fn skip_clarification(&mut self) -> Result<TurnOutcome, SessionError> {
        let previous_clarification = self
            .pending_clarification
            .take()
            .ok_or(SessionError::NoPendingClarification)?;
        let original = self.original_query.clone().unwrap_or_default();

        let result = self.run_turn(original, true).await;
        if result.is_err() {
            self.pending_clarification = Some(previous_clarification);
        }
        result
    }

    /// Inject a speech transcript into the normal message flow
    pub async fn send_transcript(&mut self, transcript: &str) -> Result<TurnOutcome, SessionError> {
        let text = transcript.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyInput);
        }
        self.send_message(text, false).await
    }

    /// Encode a recording as WAV and have the service transcribe it
    pub async fn transcribe(&self, recording: &Recording) -> Result<String, SessionError> {
        let wav = recording.to_wav();
        info!(
            "Transcribing {:.1}s recording ({} bytes)",
            recording.duration_secs(),
            wav.len()
        );

        let text = self
            .transport
            .transcribe(wav, &self.config.stt_format, self.config.stt_model.as_deref())
            .await?;
        Ok(text.trim().to_string())
    }

    pub async fn available_models(&self) -> Result<ModelList, SessionError> {
        Ok(self.transport.list_models().await?)
    }

    async fn run_turn(&mut self, content: String, skip_clarification: bool) -> Result<TurnOutcome, SessionError> {
        let conversation = self.current.as_mut().ok_or(SessionError::NoConversation)?;

        let previous_len = conversation.messages.len();
        let previous_title = conversation.title.clone();

        let request = TurnRequest {
            content: content.clone(),
            chairman_model: self.config.chairman_model.clone(),
            council_models: self.config.council_models.clone(),
            skip_clarification,
            is_first_message: previous_len == 0,
        };

        conversation.messages.push(Message::user(content));
        conversation.messages.push(Message::assistant_placeholder());

        let result = match self.store.save(conversation).await {
            Ok(index) => {
                notify(
                    self.updates.as_ref(),
                    SessionUpdate::MessageUpdated {
                        conversation_id: conversation.id.clone(),
                        index: previous_len + 1,
                    },
                );
                notify(self.updates.as_ref(), SessionUpdate::IndexRefreshed(index));
                self.controller.run_turn(conversation, &request).await
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(stats) => {
                let outcome = stats.outcome.clone();
                if let TurnOutcome::ClarificationNeeded(c) = &outcome {
                    self.pending_clarification = Some(c.clone());
                }
                self.last_turn = Some(stats);
                notify(self.updates.as_ref(), SessionUpdate::TurnFinished(outcome.clone()));
                Ok(outcome)
            }
            Err(e) => {
                warn!("Rolling back turn in {}: {}", conversation.id, e);

                conversation.messages.truncate(previous_len);
                conversation.title = previous_title;

                match self.store.save(conversation).await {
                    Ok(index) => notify(self.updates.as_ref(), SessionUpdate::IndexRefreshed(index)),
                    Err(save_err) => error!("Failed to persist rollback of {}: {}", conversation.id, save_err),
                }

                notify(
                    self.updates.as_ref(),
                    SessionUpdate::TurnRolledBack {
                        conversation_id: conversation.id.clone(),
                        reason: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    fn clear_clarification(&mut self) {
        self.pending_clarification = None;
        self.original_query = None;
    }
}
