// Integration tests for the conversation session
//
// Covers input routing, the clarification round trip and rollback of failed
// turns against a scripted council service.

mod common;

use anyhow::Result;
use common::{event, event_with, Script, ScriptedTransport};
use council_client::{
    ConversationSession, ConversationStore, EventKind, MemoryStore, Recording, SessionConfig,
    SessionError, SessionUpdate, StreamEvent, TransportError, TurnOutcome,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

fn session_with(transport: Arc<ScriptedTransport>) -> (ConversationSession, ConversationStore) {
    let store = ConversationStore::new(Arc::new(MemoryStore::new()));
    let session = ConversationSession::new(SessionConfig::default(), store.clone(), transport);
    (session, store)
}

fn answered_turn(answer: &str) -> Script {
    Script::events(vec![
        event(EventKind::Stage1Start),
        event_with(EventKind::Stage1Complete, json!({"a": answer})),
        event(EventKind::Stage2Start),
        event_with(EventKind::Stage2Complete, json!([])),
        event(EventKind::Stage3Start),
        event_with(EventKind::Stage3Complete, json!({"response": answer})),
        event(EventKind::Complete),
    ])
}

fn clarification_turn(question: &str) -> Script {
    Script::events(vec![
        event(EventKind::ClarificationStart),
        event_with(
            EventKind::ClarificationNeeded,
            json!({"needs_clarification": true, "questions": [question]}),
        ),
        event(EventKind::Complete),
    ])
}

#[tokio::test]
async fn test_successful_turn_records_both_messages() -> Result<()> {
    let transport = ScriptedTransport::new();
    transport.push(answered_turn("4"));
    let (mut session, store) = session_with(transport.clone());

    let id = session.new_conversation().await?.id.clone();
    let outcome = session.send_message("What is 2+2?", false).await?;

    assert_eq!(outcome, TurnOutcome::Completed);

    let current = session.current().expect("current conversation");
    assert_eq!(current.messages.len(), 2);
    let stage1 = current.last_assistant().and_then(|m| m.stage1.clone());
    assert_eq!(stage1, Some(json!({"a": "4"})));

    let stored = store.get(&id).await.expect("stored");
    assert_eq!(stored.messages.len(), 2);
    assert_eq!(store.list().await[0].message_count, 2);

    let request = transport.last_request();
    assert_eq!(request.content, "What is 2+2?");
    assert!(request.is_first_message);
    assert!(!request.skip_clarification);

    let stats = session.last_turn_stats().expect("stats recorded");
    assert_eq!(stats.saves, 6);

    Ok(())
}

#[tokio::test]
async fn test_follow_up_is_not_first_message() -> Result<()> {
    let transport = ScriptedTransport::new();
    transport.push(answered_turn("4"));
    transport.push(answered_turn("8"));
    let (mut session, _) = session_with(transport.clone());

    session.new_conversation().await?;
    session.send_message("What is 2+2?", false).await?;
    session.send_message("And doubled?", true).await?;

    let requests = transport.requests();
    assert!(requests[0].1.is_first_message);
    assert!(!requests[1].1.is_first_message);
    assert!(requests[1].1.skip_clarification);
    assert_eq!(session.current().map(|c| c.messages.len()), Some(4));

    Ok(())
}

#[tokio::test]
async fn test_model_overrides_are_sent() -> Result<()> {
    let transport = ScriptedTransport::new();
    transport.push(answered_turn("4"));
    let store = ConversationStore::new(Arc::new(MemoryStore::new()));
    let config = SessionConfig {
        chairman_model: Some("x-ai/grok-4".to_string()),
        council_models: Some(vec!["openai/gpt-5.1".to_string()]),
        ..SessionConfig::default()
    };
    let mut session = ConversationSession::new(config, store, transport.clone());

    session.new_conversation().await?;
    session.send_message("What is 2+2?", false).await?;

    let request = transport.last_request();
    assert_eq!(request.chairman_model.as_deref(), Some("x-ai/grok-4"));
    assert_eq!(request.council_models, Some(vec!["openai/gpt-5.1".to_string()]));

    Ok(())
}

#[tokio::test]
async fn test_error_event_rolls_back_turn() -> Result<()> {
    let transport = ScriptedTransport::new();
    transport.push(Script::events(vec![
        event(EventKind::Stage1Start),
        StreamEvent::error("upstream failure"),
    ]));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let store = ConversationStore::new(Arc::new(MemoryStore::new()));
    let mut session =
        ConversationSession::new(SessionConfig::default(), store.clone(), transport).with_updates(tx);

    let id = session.new_conversation().await?.id.clone();
    let result = session.send_message("What is 2+2?", false).await;

    assert!(matches!(result, Err(SessionError::Transport(TransportError::Remote(_)))));
    assert!(result.as_ref().is_err_and(|e| e.is_transport()));
    assert_eq!(session.current().map(|c| c.messages.len()), Some(0));

    let stored = store.get(&id).await.expect("stored");
    assert!(stored.messages.is_empty());
    assert_eq!(store.list().await[0].message_count, 0);

    let mut rolled_back = false;
    while let Ok(update) = rx.try_recv() {
        if let SessionUpdate::TurnRolledBack { conversation_id, reason } = update {
            assert_eq!(conversation_id, id);
            assert!(reason.contains("upstream failure"));
            rolled_back = true;
        }
    }
    assert!(rolled_back);

    Ok(())
}

#[tokio::test]
async fn test_refused_stream_rolls_back_and_restores_title() -> Result<()> {
    let transport = ScriptedTransport::new();
    transport.push(Script::events(vec![
        event_with(EventKind::TitleComplete, json!({"title": "Arithmetic"})),
        event(EventKind::Complete),
    ]));
    transport.push(Script::Refuse {
        status: 503,
        body: "overloaded".to_string(),
    });
    let (mut session, store) = session_with(transport);

    let id = session.new_conversation().await?.id.clone();
    session.send_message("What is 2+2?", true).await?;
    let result = session.send_message("And 3+3?", true).await;

    assert!(matches!(
        result,
        Err(SessionError::Transport(TransportError::Status { status: 503, .. }))
    ));
    let stored = store.get(&id).await.expect("stored");
    assert_eq!(stored.messages.len(), 2, "only the failed pair was removed");
    assert_eq!(stored.title, "Arithmetic");

    Ok(())
}

#[tokio::test]
async fn test_title_from_failed_turn_is_reverted() -> Result<()> {
    let transport = ScriptedTransport::new();
    transport.push(Script::events(vec![
        event_with(EventKind::TitleComplete, json!({"title": "Half done"})),
        event(EventKind::Stage1Start),
    ]));
    let (mut session, store) = session_with(transport);

    let id = session.new_conversation().await?.id.clone();
    let result = session.send_message("What is 2+2?", false).await;

    assert!(matches!(result, Err(SessionError::Transport(TransportError::Stream(_)))));
    let stored = store.get(&id).await.expect("stored");
    assert_eq!(stored.title, "New Conversation");
    assert!(stored.messages.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_clarification_answer_combines_with_original_query() -> Result<()> {
    let transport = ScriptedTransport::new();
    transport.push(clarification_turn("Which language?"));
    transport.push(answered_turn("sorted()"));
    let (mut session, store) = session_with(transport.clone());

    let id = session.new_conversation().await?.id.clone();
    let outcome = session.send_message("How do I sort a list?", false).await?;

    match outcome {
        TurnOutcome::ClarificationNeeded(c) => {
            assert!(c.needs_clarification);
            assert_eq!(c.questions, vec!["Which language?"]);
        }
        other => panic!("expected clarification, got {:?}", other),
    }
    assert!(session.pending_clarification().is_some());
    assert_eq!(store.list().await[0].message_count, 2);

    let outcome = session.send_message("Python", false).await?;

    assert_eq!(outcome, TurnOutcome::Completed);
    assert!(session.pending_clarification().is_none());

    let request = transport.last_request();
    assert_eq!(request.content, "How do I sort a list?\n\nAdditional context: Python");
    assert!(request.skip_clarification, "answer forces skip");
    assert!(!request.is_first_message);

    let stored = store.get(&id).await.expect("stored");
    assert_eq!(stored.messages.len(), 4, "clarification exchange stays in history");

    Ok(())
}

#[tokio::test]
async fn test_custom_clarification_separator() -> Result<()> {
    let transport = ScriptedTransport::new();
    transport.push(clarification_turn("Which language?"));
    transport.push(answered_turn("sorted()"));
    let store = ConversationStore::new(Arc::new(MemoryStore::new()));
    let config = SessionConfig {
        clarification_separator: " | ".to_string(),
        ..SessionConfig::default()
    };
    let mut session = ConversationSession::new(config, store, transport.clone());

    session.new_conversation().await?;
    session.send_message("How do I sort?", false).await?;
    session.send_message("Rust", false).await?;

    assert_eq!(transport.last_request().content, "How do I sort? | Rust");

    Ok(())
}

#[tokio::test]
async fn test_skip_clarification_resends_original_query() -> Result<()> {
    let transport = ScriptedTransport::new();
    transport.push(clarification_turn("Which language?"));
    transport.push(answered_turn("sorted()"));
    let (mut session, _) = session_with(transport.clone());

    session.new_conversation().await?;
    session.send_message("How do I sort a list?", false).await?;
    let outcome = session.skip_clarification().await?;

    assert_eq!(outcome, TurnOutcome::Completed);
    let request = transport.last_request();
    assert_eq!(request.content, "How do I sort a list?");
    assert!(request.skip_clarification);

    assert!(matches!(
        session.skip_clarification().await,
        Err(SessionError::NoPendingClarification)
    ));

    Ok(())
}

#[tokio::test]
async fn test_failed_answer_keeps_clarification_pending() -> Result<()> {
    let transport = ScriptedTransport::new();
    transport.push(clarification_turn("Which language?"));
    transport.push(Script::Refuse {
        status: 500,
        body: "boom".to_string(),
    });
    transport.push(answered_turn("sorted()"));
    let (mut session, _) = session_with(transport.clone());

    session.new_conversation().await?;
    session.send_message("How do I sort a list?", false).await?;
    assert!(session.send_message("Python", false).await.is_err());
    assert!(session.pending_clarification().is_some());

    session.send_message("Python", false).await?;
    assert_eq!(
        transport.last_request().content,
        "How do I sort a list?\n\nAdditional context: Python"
    );

    Ok(())
}

#[tokio::test]
async fn test_unknown_event_does_not_disturb_turn() -> Result<()> {
    let transport = ScriptedTransport::new();
    transport.push(Script::events(vec![
        event(EventKind::Stage1Start),
        event_with(EventKind::Unknown("stage1_token".to_string()), json!({"delta": "4"})),
        event_with(EventKind::Stage1Complete, json!({"a": "4"})),
        event(EventKind::Complete),
    ]));
    let (mut session, _) = session_with(transport);

    session.new_conversation().await?;
    session.send_message("What is 2+2?", false).await?;

    let stats = session.last_turn_stats().expect("stats");
    assert_eq!(stats.unknown_events, 1);
    let msg = session.current().and_then(|c| c.last_assistant()).expect("reply");
    assert_eq!(msg.stage1, Some(json!({"a": "4"})));
    assert!(!msg.is_loading());

    Ok(())
}

#[tokio::test]
async fn test_input_validation() -> Result<()> {
    let transport = ScriptedTransport::new();
    let (mut session, _) = session_with(transport.clone());

    assert!(matches!(
        session.send_message("hello", false).await,
        Err(SessionError::NoConversation)
    ));

    session.new_conversation().await?;
    assert!(matches!(
        session.send_message("   ", false).await,
        Err(SessionError::EmptyInput)
    ));
    assert!(matches!(
        session.send_transcript("\n").await,
        Err(SessionError::EmptyInput)
    ));
    assert!(transport.requests().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_open_and_delete_conversations() -> Result<()> {
    let transport = ScriptedTransport::new();
    let (mut session, _) = session_with(transport);

    let first = session.new_conversation().await?.id.clone();
    let second = session.new_conversation().await?.id.clone();
    assert_eq!(session.conversations().await.len(), 2);

    session.open_conversation(&first).await?;
    assert_eq!(session.current().map(|c| c.id.clone()), Some(first.clone()));

    assert!(matches!(
        session.open_conversation("missing").await,
        Err(SessionError::NoConversation)
    ));

    session.delete_conversation(&first).await?;
    assert!(session.current().is_none());
    let remaining = session.conversations().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, second);

    Ok(())
}

#[tokio::test]
async fn test_switching_conversation_drops_pending_clarification() -> Result<()> {
    let transport = ScriptedTransport::new();
    transport.push(clarification_turn("Which language?"));
    transport.push(answered_turn("42"));
    let (mut session, _) = session_with(transport.clone());

    session.new_conversation().await?;
    session.send_message("How do I sort a list?", false).await?;
    assert!(session.pending_clarification().is_some());

    session.new_conversation().await?;
    assert!(session.pending_clarification().is_none());

    session.send_message("Meaning of life?", false).await?;
    assert_eq!(transport.last_request().content, "Meaning of life?");

    Ok(())
}

#[tokio::test]
async fn test_transcript_flows_into_conversation() -> Result<()> {
    let transport = ScriptedTransport::new();
    *transport.transcript.lock().unwrap() = "What is 2+2?".to_string();
    transport.push(answered_turn("4"));
    let (mut session, _) = session_with(transport.clone());

    let recording = Recording {
        samples: vec![0.0; 1600],
        sample_rate: 16000,
        channel_count: 1,
    };

    let text = session.transcribe(&recording).await?;
    assert_eq!(text, "What is 2+2?");

    let uploads = transport.uploads.lock().unwrap().clone();
    assert_eq!(uploads, vec![(44 + 3200, "wav".to_string(), None)]);

    session.new_conversation().await?;
    session.send_transcript(&format!("  {}  ", text)).await?;
    assert_eq!(transport.last_request().content, "What is 2+2?");

    Ok(())
}

#[tokio::test]
async fn test_available_models() -> Result<()> {
    let (session, _) = session_with(ScriptedTransport::new());

    let models = session.available_models().await?;

    assert_eq!(models.default_chairman_model, "x-ai/grok-4");
    assert_eq!(models.available_models.len(), 2);

    Ok(())
}
