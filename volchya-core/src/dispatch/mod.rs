//! Dispatch layer.
//!
//! Sends one turn to the completion endpoint, walking the candidate
//! models in order until one answers. Model-level rejections (not found,
//! permission denied) move on to the next candidate; anything else ends
//! the dispatch. Every outcome is a value, never an error.

mod backend;
mod classify;
mod credential;

pub use backend::{CompletionBackend, CompletionError, CompletionRequest, GeminiBackend, Turn};
pub use classify::{DefaultClassifier, FailureClassifier};
pub use credential::{
    is_placeholder, CredentialProvider, EnvCredential, SharedCredential, StaticCredential,
    DEFAULT_CREDENTIAL_VARS,
};

use crate::config::DispatchConfig;
use crate::dossier::Dossier;
use crate::prompt;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Class of a failed dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No usable credential; nothing was sent.
    CredentialMissing,
    /// Every candidate model rejected the credential or does not exist.
    PermissionOrModelUnavailable,
    /// Network or server trouble unrelated to the credential.
    Transient,
    /// Anything unclassified. Fatal for the turn.
    Unknown,
}

impl FailureKind {
    /// User-facing notice for this kind of failure.
    pub fn notice(self) -> &'static str {
        match self {
            FailureKind::CredentialMissing => {
                "No API key is configured. Select an API key and try again."
            }
            FailureKind::PermissionOrModelUnavailable => {
                "None of the configured models accepted this API key. Select a different key or model."
            }
            FailureKind::Transient => {
                "Communication error: the message could not be delivered. Try again."
            }
            FailureKind::Unknown => "Unexpected error from the narrative engine. Try again.",
        }
    }

    /// Whether the host should offer credential/model selection.
    pub fn needs_selection(self) -> bool {
        matches!(
            self,
            FailureKind::CredentialMissing | FailureKind::PermissionOrModelUnavailable
        )
    }
}

/// A failed dispatch and the endpoint's own description of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFailure {
    pub kind: FailureKind,
    pub raw_message: String,
}

impl DispatchFailure {
    pub fn new(kind: FailureKind, raw_message: impl Into<String>) -> Self {
        Self {
            kind,
            raw_message: raw_message.into(),
        }
    }
}

/// Result of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success(String),
    Failure(DispatchFailure),
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            DispatchOutcome::Success(text) => Some(text),
            DispatchOutcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&DispatchFailure> {
        match self {
            DispatchOutcome::Success(_) => None,
            DispatchOutcome::Failure(failure) => Some(failure),
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Earlier turns to replay, oldest first.
    pub history: Vec<Turn>,
    /// Overrides the configured temperature for this call.
    pub temperature: Option<f32>,
}

impl DispatchOptions {
    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Sends turns to the completion endpoint with model fallback.
pub struct Dispatcher {
    backend: Arc<dyn CompletionBackend>,
    credentials: Arc<dyn CredentialProvider>,
    classifier: Arc<dyn FailureClassifier>,
    config: DispatchConfig,
}

impl Dispatcher {
    /// Create a dispatcher with the default failure classifier.
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        credentials: Arc<dyn CredentialProvider>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            backend,
            credentials,
            classifier: Arc::new(DefaultClassifier::default()),
            config,
        }
    }

    /// Replace the failure classifier.
    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Send one turn and return the first successful reply.
    pub async fn dispatch(
        &self,
        turn_text: &str,
        dossier: &Dossier,
        options: &DispatchOptions,
    ) -> DispatchOutcome {
        let Some(credential) = self.credentials.credential() else {
            warn!("dispatch skipped: no usable credential");
            return DispatchOutcome::Failure(DispatchFailure::new(
                FailureKind::CredentialMissing,
                "no API credential is configured",
            ));
        };

        let system_instruction = prompt::compile(dossier);
        let temperature = options.temperature.unwrap_or(self.config.temperature);
        let mut last_unavailable = None;

        for model in &self.config.models {
            let request = CompletionRequest {
                model: model.clone(),
                system_instruction: system_instruction.clone(),
                history: options.history.clone(),
                turn_text: turn_text.to_string(),
                temperature,
                max_output_tokens: self.config.max_output_tokens,
            };

            match self.attempt(&credential, request).await {
                Ok(text) => {
                    info!(%model, chars = text.len(), "dispatch succeeded");
                    return DispatchOutcome::Success(text);
                }
                Err(failure) if failure.kind == FailureKind::PermissionOrModelUnavailable => {
                    warn!(%model, error = %failure.raw_message, "model unavailable, trying next candidate");
                    last_unavailable = Some(failure);
                }
                Err(failure) => {
                    warn!(%model, kind = ?failure.kind, error = %failure.raw_message, "dispatch failed");
                    return DispatchOutcome::Failure(failure);
                }
            }
        }

        DispatchOutcome::Failure(last_unavailable.unwrap_or_else(|| {
            DispatchFailure::new(
                FailureKind::PermissionOrModelUnavailable,
                "no candidate models are configured",
            )
        }))
    }

    /// One candidate: bounded by the timeout, retried on transient failures.
    async fn attempt(
        &self,
        credential: &str,
        request: CompletionRequest,
    ) -> Result<String, DispatchFailure> {
        let retry = self.config.retry;
        let mut retries = 0;

        loop {
            debug!(model = %request.model, retries, "sending completion request");
            let result = tokio::time::timeout(
                self.config.timeout,
                self.backend.complete(credential, request.clone()),
            )
            .await
            .unwrap_or(Err(CompletionError::Timeout(self.config.timeout)));

            let error = match result {
                Ok(text) => return Ok(text),
                Err(error) => error,
            };

            let kind = self.classifier.classify(&error);
            if kind == FailureKind::Transient && retries < retry.max_retries {
                retries += 1;
                let backoff = retry.backoff(retries);
                debug!(model = %request.model, ?backoff, %error, "transient failure, retrying");
                tokio::time::sleep(backoff).await;
                continue;
            }

            return Err(DispatchFailure::new(kind, error.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notices_differ_by_kind() {
        let kinds = [
            FailureKind::CredentialMissing,
            FailureKind::PermissionOrModelUnavailable,
            FailureKind::Transient,
            FailureKind::Unknown,
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in &kinds[i + 1..] {
                assert_ne!(a.notice(), b.notice());
            }
        }
    }

    #[test]
    fn test_needs_selection() {
        assert!(FailureKind::CredentialMissing.needs_selection());
        assert!(FailureKind::PermissionOrModelUnavailable.needs_selection());
        assert!(!FailureKind::Transient.needs_selection());
        assert!(!FailureKind::Unknown.needs_selection());
    }

    #[test]
    fn test_outcome_accessors() {
        let ok = DispatchOutcome::Success("snow".to_string());
        assert!(ok.is_success());
        assert_eq!(ok.text(), Some("snow"));
        assert!(ok.failure().is_none());

        let failed = DispatchOutcome::Failure(DispatchFailure::new(FailureKind::Unknown, "boom"));
        assert!(!failed.is_success());
        assert_eq!(failed.failure().map(|f| f.kind), Some(FailureKind::Unknown));
    }
}
