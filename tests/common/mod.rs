// Shared fakes for session and turn tests

#![allow(dead_code)]

use council_client::council::EventStream;
use council_client::{
    CouncilTransport, EventKind, KeyValueStore, MemoryStore, ModelList, StreamEvent, TransportError,
    TurnRequest,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// What the fake service does for one `stream_turn` call
pub enum Script {
    Events(Vec<Result<StreamEvent, TransportError>>),
    Refuse { status: u16, body: String },
}

impl Script {
    pub fn events(events: Vec<StreamEvent>) -> Self {
        Script::Events(events.into_iter().map(Ok).collect())
    }
}

/// Transport that replays scripted turns and records every request
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    pub requests: Mutex<Vec<(String, TurnRequest)>>,
    pub uploads: Mutex<Vec<(usize, String, Option<String>)>>,
    pub transcript: Mutex<String>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn requests(&self) -> Vec<(String, TurnRequest)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> TurnRequest {
        self.requests().last().expect("a turn was requested").1.clone()
    }
}

#[async_trait::async_trait]
impl CouncilTransport for ScriptedTransport {
    async fn stream_turn(
        &self,
        conversation_id: &str,
        request: &TurnRequest,
    ) -> Result<EventStream, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), request.clone()));

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Events(Vec::new()));

        match script {
            Script::Events(events) => Ok(Box::pin(futures::stream::iter(events))),
            Script::Refuse { status, body } => Err(TransportError::Status { status, body }),
        }
    }

    async fn list_models(&self) -> Result<ModelList, TransportError> {
        Ok(ModelList {
            available_models: vec!["openai/gpt-5.1".into(), "x-ai/grok-4".into()],
            default_council_models: vec!["openai/gpt-5.1".into()],
            default_chairman_model: "x-ai/grok-4".into(),
        })
    }

    async fn transcribe(
        &self,
        audio: Vec<u8>,
        format: &str,
        model: Option<&str>,
    ) -> Result<String, TransportError> {
        self.uploads
            .lock()
            .unwrap()
            .push((audio.len(), format.to_string(), model.map(str::to_string)));
        Ok(self.transcript.lock().unwrap().clone())
    }
}

/// Key-value store that keeps a copy of every value written
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    pub writes: Mutex<Vec<(String, String)>>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every value written under `key`, oldest first
    pub fn writes_to(&self, key: &str) -> Vec<Value> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| serde_json::from_str(v).unwrap())
            .collect()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for RecordingStore {
    async fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.writes
            .lock()
            .unwrap()
            .push((key.to_string(), value.to_string()));
        self.inner.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> anyhow::Result<()> {
        self.inner.remove_item(key).await
    }
}

pub fn event(kind: EventKind) -> StreamEvent {
    StreamEvent::new(kind)
}

pub fn event_with(kind: EventKind, data: Value) -> StreamEvent {
    StreamEvent::new(kind).with_data(data)
}
