use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::models::{Message, Role};

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("reading the completion stream failed: {0}")]
    Read(String),

    #[error("completion request was cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestMessage {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for RequestMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Body of a completion request: the whole history plus the persona to
/// answer as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRequest {
    pub messages: Vec<RequestMessage>,
    #[serde(rename = "personaId")]
    pub persona_id: String,
}

impl CompletionRequest {
    pub fn new(history: &[Message], persona_id: impl Into<String>) -> Self {
        Self {
            messages: history.iter().map(RequestMessage::from).collect(),
            persona_id: persona_id.into(),
        }
    }
}

pub type ByteStream = BoxStream<'static, Result<Bytes, CompletionError>>;

/// Something that answers a completion request with a raw byte stream.
///
/// Resolving the future means the backend accepted the request (success
/// status); the body is read from the returned stream.
#[async_trait]
pub trait CompletionBackend: Send + Sync + 'static {
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<ByteStream, CompletionError>;
}

/// Streams completions from an HTTP endpoint.
#[derive(Clone)]
pub struct HttpCompletionBackend {
    client: reqwest::Client,
    url: String,
}

impl HttpCompletionBackend {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CompletionError::Transport)?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CompletionBackend for HttpCompletionBackend {
    #[instrument(level = "debug", skip(self, request), fields(url = %self.url, persona = %request.persona_id))]
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<ByteStream, CompletionError> {
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(CompletionError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(status = status.as_u16(), "Completion stream opened");

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| CompletionError::Read(e.to_string())))
            .boxed())
    }
}
