use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::reducer::{apply_event, Effect};
use super::stats::{SessionUpdate, TurnOutcome, TurnStats};
use crate::council::{CouncilTransport, EventKind, TurnRequest};
use crate::error::{SessionError, TransportError};
use crate::storage::{Conversation, ConversationStore};

/// Drives one assistant turn: opens the stream, applies events strictly in
/// arrival order and persists the conversation after every mutating event.
///
/// A save for event N completes before event N+1 is read, so the store always
/// holds the conversation as of the last fully applied event.
pub struct StreamSessionController {
    store: ConversationStore,
    transport: Arc<dyn CouncilTransport>,
    updates: Option<mpsc::UnboundedSender<SessionUpdate>>,
}

impl StreamSessionController {
    pub fn new(store: ConversationStore, transport: Arc<dyn CouncilTransport>) -> Self {
        Self {
            store,
            transport,
            updates: None,
        }
    }

    pub fn with_updates(mut self, updates: mpsc::UnboundedSender<SessionUpdate>) -> Self {
        self.updates = Some(updates);
        self
    }

    /// Run a turn against the open assistant message at the end of `conversation`.
    ///
    /// Transport failures and `error` events return `SessionError::Transport`;
    /// the caller owns rollback.
    pub async fn run_turn(
        &self,
        conversation: &mut Conversation,
        request: &TurnRequest,
    ) -> Result<TurnStats, SessionError> {
        if conversation.open_assistant_mut().is_none() {
            return Err(SessionError::NoOpenTurn);
        }

        let started_at = Utc::now();
        let mut stats = TurnStats {
            outcome: TurnOutcome::Completed,
            started_at,
            duration_secs: 0.0,
            events_received: 0,
            events_applied: 0,
            unknown_events: 0,
            saves: 0,
        };

        info!(
            "Starting turn in {} (skip_clarification={}, first_message={})",
            conversation.id, request.skip_clarification, request.is_first_message
        );

        let mut events = self.transport.stream_turn(&conversation.id, request).await?;

        let mut clarification = None;
        let mut terminated = false;

        while let Some(item) = events.next().await {
            let event = item?;
            stats.events_received += 1;

            let kind = event.kind();

            // A halted turn only accepts its title and the terminal events.
            if clarification.is_some()
                && !matches!(kind, EventKind::TitleComplete | EventKind::Complete | EventKind::Error)
            {
                warn!(
                    "Skipping {} in {}: turn halted for clarification",
                    kind.as_str(),
                    conversation.id
                );
                continue;
            }

            if let EventKind::Unknown(_) = kind {
                stats.unknown_events += 1;
            }

            let effect = apply_event(conversation, &event)?;

            match &effect {
                Effect::Failed(message) => {
                    warn!("Turn in {} aborted by service: {}", conversation.id, message);
                    return Err(TransportError::Remote(message.clone()).into());
                }
                Effect::Complete => {
                    terminated = true;
                    break;
                }
                Effect::ClarificationNeeded(c) => {
                    info!(
                        "Clarification requested in {} ({} questions)",
                        conversation.id,
                        c.questions.len()
                    );
                    clarification = Some(c.clone());
                    self.notify(SessionUpdate::ClarificationNeeded(c.clone()));
                }
                Effect::TitleChanged(title) => {
                    self.notify(SessionUpdate::TitleChanged {
                        conversation_id: conversation.id.clone(),
                        title: title.clone(),
                    });
                }
                Effect::MessageChanged | Effect::Ignored => {}
            }

            if effect.mutates() {
                stats.events_applied += 1;
                self.persist(conversation, &mut stats).await?;
            }
        }

        if !terminated {
            let still_loading = conversation
                .open_assistant_mut()
                .is_some_and(|msg| msg.is_loading());
            if still_loading {
                return Err(TransportError::Stream("stream closed before the turn finished".to_string()).into());
            }
            debug!("Stream for {} closed without a complete event", conversation.id);
        }

        stats.outcome = match clarification {
            Some(c) => TurnOutcome::ClarificationNeeded(c),
            None => TurnOutcome::Completed,
        };
        stats.duration_secs = Utc::now().signed_duration_since(started_at).num_milliseconds() as f64 / 1000.0;

        info!(
            "Turn in {} finished: {:?} ({} events, {} saves, {:.1}s)",
            conversation.id, stats.outcome, stats.events_received, stats.saves, stats.duration_secs
        );

        Ok(stats)
    }

    async fn persist(&self, conversation: &Conversation, stats: &mut TurnStats) -> Result<(), SessionError> {
        let index = self.store.save(conversation).await?;
        stats.saves += 1;

        self.notify(SessionUpdate::MessageUpdated {
            conversation_id: conversation.id.clone(),
            index: conversation.messages.len().saturating_sub(1),
        });
        self.notify(SessionUpdate::IndexRefreshed(index));

        Ok(())
    }

    fn notify(&self, update: SessionUpdate) {
        notify(self.updates.as_ref(), update);
    }
}

/// Send to a listener if there is one; a closed receiver is ignored.
pub(crate) fn notify(updates: Option<&mpsc::UnboundedSender<SessionUpdate>>, update: SessionUpdate) {
    if let Some(tx) = updates {
        let _ = tx.send(update);
    }
}
