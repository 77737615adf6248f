//! Pure application of stream events to a conversation.
//!
//! Each event writes only its own fields of the open assistant message (or
//! the conversation title). A set payload is never cleared by a later event.

use serde_json::Value;
use tracing::{debug, warn};

use crate::council::{EventKind, StreamEvent};
use crate::error::SessionError;
use crate::storage::{AssistantMessage, Clarification, Conversation};

/// What applying one event did
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// The open assistant message changed
    MessageChanged,
    TitleChanged(String),
    /// Clarification payload stored; the turn halts before stage 1
    ClarificationNeeded(Clarification),
    Complete,
    /// The service aborted the turn
    Failed(String),
    /// Nothing changed
    Ignored,
}

impl Effect {
    /// Whether the conversation must be persisted after this effect
    pub fn mutates(&self) -> bool {
        matches!(
            self,
            Effect::MessageChanged | Effect::TitleChanged(_) | Effect::ClarificationNeeded(_)
        )
    }
}

/// Apply one event to `conversation`, whose last message must be the open assistant message
/// for message-level events.
pub fn apply_event(conversation: &mut Conversation, event: &StreamEvent) -> Result<Effect, SessionError> {
    let kind = event.kind();
    debug!("Applying {} to {}", kind.as_str(), conversation.id);

    match kind {
        EventKind::TitleComplete => Ok(apply_title(conversation, event.data.as_ref())),
        EventKind::Complete => Ok(Effect::Complete),
        EventKind::Error => Ok(Effect::Failed(
            event
                .message
                .clone()
                .unwrap_or_else(|| "unknown error".to_string()),
        )),
        EventKind::Unknown(name) => {
            warn!("Ignoring unknown stream event: {}", name);
            Ok(Effect::Ignored)
        }
        kind => {
            let msg = conversation
                .open_assistant_mut()
                .ok_or(SessionError::NoOpenTurn)?;
            Ok(apply_to_message(msg, &kind, event))
        }
    }
}

fn apply_to_message(msg: &mut AssistantMessage, kind: &EventKind, event: &StreamEvent) -> Effect {
    let loading = &mut msg.loading;

    match kind {
        EventKind::ClarificationStart => {
            loading.clarification = true;
            Effect::MessageChanged
        }
        EventKind::ClarificationNeeded => {
            expect_loading(loading.clarification, kind);
            let clarification = parse_clarification(event.data.as_ref());
            msg.clarification = Some(clarification.clone());
            msg.loading.clarification = false;
            Effect::ClarificationNeeded(clarification)
        }
        EventKind::ClarificationComplete => {
            expect_loading(loading.clarification, kind);
            loading.clarification = false;
            Effect::MessageChanged
        }
        EventKind::Stage1Start => {
            loading.stage1 = true;
            Effect::MessageChanged
        }
        EventKind::Stage1Complete => {
            expect_loading(loading.stage1, kind);
            loading.stage1 = false;
            set_if_present(&mut msg.stage1, event.data.as_ref());
            Effect::MessageChanged
        }
        EventKind::Stage2Start => {
            loading.stage2 = true;
            Effect::MessageChanged
        }
        EventKind::Stage2Complete => {
            expect_loading(loading.stage2, kind);
            loading.stage2 = false;
            set_if_present(&mut msg.stage2, event.data.as_ref());
            set_if_present(&mut msg.metadata, event.metadata.as_ref());
            Effect::MessageChanged
        }
        EventKind::Stage3Start => {
            loading.stage3 = true;
            Effect::MessageChanged
        }
        EventKind::Stage3Complete => {
            expect_loading(loading.stage3, kind);
            loading.stage3 = false;
            set_if_present(&mut msg.stage3, event.data.as_ref());
            Effect::MessageChanged
        }
        // Conversation-level and terminal events are handled by the caller.
        _ => Effect::Ignored,
    }
}

fn apply_title(conversation: &mut Conversation, data: Option<&Value>) -> Effect {
    let title = data
        .and_then(|d| d.get("title"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty());

    match title {
        Some(title) => {
            conversation.title = title.to_string();
            Effect::TitleChanged(title.to_string())
        }
        None => Effect::Ignored,
    }
}

fn set_if_present(field: &mut Option<Value>, data: Option<&Value>) {
    if let Some(value) = data {
        *field = Some(value.clone());
    }
}

fn parse_clarification(data: Option<&Value>) -> Clarification {
    let parsed = data.map(|d| serde_json::from_value::<Clarification>(d.clone()));
    match parsed {
        Some(Ok(clarification)) => clarification,
        Some(Err(e)) => {
            warn!("Malformed clarification payload: {}", e);
            Clarification {
                needs_clarification: true,
                questions: Vec::new(),
            }
        }
        None => Clarification {
            needs_clarification: true,
            questions: Vec::new(),
        },
    }
}

fn expect_loading(flag: bool, kind: &EventKind) {
    if !flag {
        warn!("{} arrived without its start event", kind.as_str());
    }
}
