//! The completion endpoint seam.

use crate::message::{Message, Role};
use async_trait::async_trait;
use gemini::{Content, Gemini, Request};
use std::time::Duration;
use thiserror::Error;

/// A completion attempt against one model.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system_instruction: String,
    /// Earlier turns, oldest first.
    pub history: Vec<Turn>,
    pub turn_text: String,
    pub temperature: f32,
    pub max_output_tokens: Option<usize>,
}

/// A replayed conversation turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Turn {
    User(String),
    Assistant(String),
}

impl Turn {
    /// The replayable form of a history entry. System notices have none.
    pub fn from_message(message: &Message) -> Option<Self> {
        if !message.is_replayable() {
            return None;
        }
        let text = message.content.clone();
        Some(match message.role {
            Role::User => Turn::User(text),
            _ => Turn::Assistant(text),
        })
    }
}

/// Errors from a completion attempt, as reported by the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    #[error("no usable credential")]
    Unauthenticated,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("endpoint error (status {status}): {message}")]
    Endpoint { status: u16, message: String },

    #[error("{0}")]
    Other(String),
}

impl CompletionError {
    pub fn status(&self) -> Option<u16> {
        match self {
            CompletionError::Endpoint { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<gemini::Error> for CompletionError {
    fn from(error: gemini::Error) -> Self {
        match error {
            gemini::Error::NoApiKey => CompletionError::Unauthenticated,
            gemini::Error::Network(message) => CompletionError::Network(message),
            gemini::Error::Api { status, message } => CompletionError::Endpoint { status, message },
            other => CompletionError::Other(other.to_string()),
        }
    }
}

/// Something that can turn a request into model text.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Run one completion with the given credential.
    async fn complete(
        &self,
        credential: &str,
        request: CompletionRequest,
    ) -> Result<String, CompletionError>;
}

/// [`CompletionBackend`] over the Gemini API.
#[derive(Clone)]
pub struct GeminiBackend {
    base: Gemini,
}

impl GeminiBackend {
    pub fn new() -> Self {
        Self {
            base: Gemini::new(String::new()),
        }
    }

    /// Use a different API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base = self.base.with_base_url(base_url);
        self
    }
}

impl Default for GeminiBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionBackend for GeminiBackend {
    async fn complete(
        &self,
        credential: &str,
        request: CompletionRequest,
    ) -> Result<String, CompletionError> {
        // The HTTP pool is shared; only the key is swapped per call.
        let client = self.base.clone().with_api_key(credential);
        let response = client.generate(to_gemini_request(request)).await?;
        Ok(response.text())
    }
}

fn to_gemini_request(request: CompletionRequest) -> Request {
    let mut contents: Vec<Content> = request
        .history
        .into_iter()
        .map(|turn| match turn {
            Turn::User(text) => Content::user(text),
            Turn::Assistant(text) => Content::model(text),
        })
        .collect();
    contents.push(Content::user(request.turn_text));

    let mut gemini_request = Request::new(contents)
        .with_model(request.model)
        .with_system(request.system_instruction)
        .with_temperature(request.temperature);

    if let Some(tokens) = request.max_output_tokens {
        gemini_request = gemini_request.with_max_output_tokens(tokens);
    }

    gemini_request
}
