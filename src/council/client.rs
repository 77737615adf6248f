use reqwest::multipart::{Form, Part};
use reqwest::{header, Client, Response};
use std::time::Duration;
use tracing::{debug, info};

use super::messages::{HealthStatus, ModelList, TranscriptResponse, TurnRequest};
use super::sse::{event_stream, EventStream};
use crate::error::TransportError;

/// Calls the engine needs from the council service
#[async_trait::async_trait]
pub trait CouncilTransport: Send + Sync {
    /// Open a streamed turn; events arrive in the order the service emits them
    async fn stream_turn(
        &self,
        conversation_id: &str,
        request: &TurnRequest,
    ) -> Result<EventStream, TransportError>;

    async fn list_models(&self) -> Result<ModelList, TransportError>;

    /// Submit an encoded recording and return the transcript
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        format: &str,
        model: Option<&str>,
    ) -> Result<String, TransportError>;
}

/// HTTP client for the council API
pub struct CouncilClient {
    http: Client,
    base_url: String,
}

impl CouncilClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let http = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        info!("Council client targeting {}", base_url);

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<HealthStatus, TransportError> {
        let resp = self.http.get(format!("{}/", self.base_url)).send().await?;
        Ok(check_status(resp).await?.json().await?)
    }
}

async fn check_status(resp: Response) -> Result<Response, TransportError> {
    if resp.status().is_success() {
        return Ok(resp);
    }

    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_else(|_| "<no body>".into());
    Err(TransportError::Status { status, body })
}

#[async_trait::async_trait]
impl CouncilTransport for CouncilClient {
    async fn stream_turn(
        &self,
        conversation_id: &str,
        request: &TurnRequest,
    ) -> Result<EventStream, TransportError> {
        let url = format!(
            "{}/api/conversations/{}/message/stream",
            self.base_url, conversation_id
        );
        debug!("Opening turn stream: {}", url);

        let resp = self
            .http
            .post(url)
            .header(header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;

        let resp = check_status(resp).await?;
        Ok(event_stream(resp.bytes_stream()))
    }

    async fn list_models(&self) -> Result<ModelList, TransportError> {
        let resp = self
            .http
            .get(format!("{}/api/models", self.base_url))
            .send()
            .await?;
        Ok(check_status(resp).await?.json().await?)
    }

    async fn transcribe(
        &self,
        audio: Vec<u8>,
        format: &str,
        model: Option<&str>,
    ) -> Result<String, TransportError> {
        info!("Uploading {} bytes of {} audio for transcription", audio.len(), format);

        let file = Part::bytes(audio)
            .file_name(format!("recording.{}", format))
            .mime_str(&format!("audio/{}", format))?;

        let mut form = Form::new().part("file", file).text("format", format.to_string());
        if let Some(model) = model {
            form = form.text("model", model.to_string());
        }

        let resp = self
            .http
            .post(format!("{}/api/stt", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let transcript: TranscriptResponse = check_status(resp).await?.json().await?;
        Ok(transcript.text.trim().to_string())
    }
}
