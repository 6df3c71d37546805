//! Testing utilities for narrative sessions.
//!
//! This module provides tools for integration testing:
//! - `ScriptedBackend` for deterministic dispatches without API calls
//! - `TestHarness` for driving a session against scripted replies
//! - Assertion helpers for verifying the message history

use crate::config::DispatchConfig;
use crate::dispatch::{
    CompletionBackend, CompletionError, CompletionRequest, Dispatcher, FailureKind,
    SharedCredential,
};
use crate::dossier::Dossier;
use crate::message::{Message, Role};
use crate::session::{Session, SessionConfig, SessionError, TurnOutcome};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

/// What the scripted backend does for one call.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Answer with this text.
    Reply(String),
    /// Fail with this error.
    Fail(CompletionError),
    /// Never answer.
    Hang,
    /// Wait for the gate to be notified, then answer.
    ReplyAfter(Arc<Notify>, String),
    /// Wait for the gate to be notified, then fail.
    FailAfter(Arc<Notify>, CompletionError),
}

/// One call the scripted backend received.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub credential: String,
    pub request: CompletionRequest,
}

#[derive(Default)]
struct Script {
    /// One-shot responses, consumed first.
    queued: HashMap<String, VecDeque<Scripted>>,
    /// Responses used whenever the queue for a model is empty.
    standing: HashMap<String, Scripted>,
    /// Credential → models it may use. `None` grants everything.
    access: Option<HashMap<String, HashSet<String>>>,
    calls: Vec<RecordedCall>,
}

/// A completion backend that answers from a script.
///
/// Models with nothing scripted answer `404 NOT_FOUND`, like an endpoint
/// that has never heard of them.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<Script>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_script(self, edit: impl FnOnce(&mut Script)) -> Self {
        edit(&mut self.script.lock().unwrap_or_else(PoisonError::into_inner));
        self
    }

    /// Queue a one-shot response for `model`.
    pub fn then(self, model: &str, response: Scripted) -> Self {
        self.with_script(|s| {
            s.queued
                .entry(model.to_string())
                .or_default()
                .push_back(response)
        })
    }

    /// Queue a one-shot reply for `model`.
    pub fn reply(self, model: &str, text: impl Into<String>) -> Self {
        self.then(model, Scripted::Reply(text.into()))
    }

    /// Queue a one-shot failure for `model`.
    pub fn fail(self, model: &str, error: CompletionError) -> Self {
        self.then(model, Scripted::Fail(error))
    }

    /// Answer every otherwise-unscripted call to `model` with `text`.
    pub fn always_reply(self, model: &str, text: impl Into<String>) -> Self {
        let text = text.into();
        self.with_script(|s| {
            s.standing.insert(model.to_string(), Scripted::Reply(text));
        })
    }

    /// Fail every otherwise-unscripted call to `model`.
    pub fn always_fail(self, model: &str, error: CompletionError) -> Self {
        self.with_script(|s| {
            s.standing.insert(model.to_string(), Scripted::Fail(error));
        })
    }

    /// Let `credential` use `models`. Once any grant exists, calls outside
    /// the grants answer `403 PERMISSION_DENIED`.
    pub fn grant(self, credential: &str, models: &[&str]) -> Self {
        self.with_script(|s| {
            s.access
                .get_or_insert_with(HashMap::new)
                .entry(credential.to_string())
                .or_default()
                .extend(models.iter().map(|m| m.to_string()));
        })
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .calls
            .clone()
    }

    /// The model of every call received so far, in order.
    pub fn models_called(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.request.model).collect()
    }

    pub fn call_count(&self) -> usize {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .calls
            .len()
    }

    fn next_action(&self, credential: &str, request: &CompletionRequest) -> Scripted {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        script.calls.push(RecordedCall {
            credential: credential.to_string(),
            request: request.clone(),
        });

        let model = &request.model;
        if let Some(access) = &script.access {
            let allowed = access
                .get(credential)
                .is_some_and(|models| models.contains(model));
            if !allowed {
                return Scripted::Fail(CompletionError::Endpoint {
                    status: 403,
                    message: format!(
                        "PERMISSION_DENIED: caller does not have permission to use {model}"
                    ),
                });
            }
        }

        if let Some(response) = script.queued.get_mut(model).and_then(VecDeque::pop_front) {
            return response;
        }

        script.standing.get(model).cloned().unwrap_or_else(|| {
            Scripted::Fail(CompletionError::Endpoint {
                status: 404,
                message: format!("NOT_FOUND: models/{model} is not found"),
            })
        })
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(
        &self,
        credential: &str,
        request: CompletionRequest,
    ) -> Result<String, CompletionError> {
        match self.next_action(credential, &request) {
            Scripted::Reply(text) => Ok(text),
            Scripted::Fail(error) => Err(error),
            Scripted::Hang => std::future::pending().await,
            Scripted::ReplyAfter(gate, text) => {
                gate.notified().await;
                Ok(text)
            }
            Scripted::FailAfter(gate, error) => {
                gate.notified().await;
                Err(error)
            }
        }
    }
}

/// Test harness for driving a session against a scripted backend.
pub struct TestHarness {
    /// The session under test.
    pub session: Session,
    /// The backend behind it.
    pub backend: Arc<ScriptedBackend>,
    /// The credential slot, initially `"test-key"`.
    pub credential: SharedCredential,
    selections: Arc<AtomicUsize>,
}

impl TestHarness {
    /// Candidate models the harness configures, best first.
    pub const MODELS: [&'static str; 2] = ["model-a", "model-b"];

    /// Create a harness over `backend` with the two harness models.
    pub fn new(backend: ScriptedBackend) -> Self {
        let dispatch = DispatchConfig::default()
            .with_models(Self::MODELS)
            .with_timeout(Duration::from_secs(5));
        Self::with_config(backend, SessionConfig::new().with_dispatch(dispatch))
    }

    /// Create a harness with a custom session configuration.
    pub fn with_config(backend: ScriptedBackend, config: SessionConfig) -> Self {
        let backend = Arc::new(backend);
        let credential = SharedCredential::new();
        credential.set("test-key");

        let selections = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&selections);

        let dispatcher = Dispatcher::new(
            backend.clone(),
            Arc::new(credential.clone()),
            config.dispatch.clone(),
        );
        let session = Session::with_dispatcher(dispatcher, config).with_selection_trigger(
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        Self {
            session,
            backend,
            credential,
            selections,
        }
    }

    /// Fill the dossier, confirm it, and deploy.
    pub async fn open_chat(&self, name: &str) -> Result<TurnOutcome, SessionError> {
        self.session.set_dossier(Dossier::new(name))?;
        self.session.confirm_dossier()?;
        self.session.deploy().await
    }

    /// How many times the session asked the host for key/model selection.
    pub fn selection_requests(&self) -> usize {
        self.selections.load(Ordering::SeqCst)
    }

    /// Roles in the history, in order.
    pub fn roles(&self) -> Vec<Role> {
        self.session.history().iter().map(|m| m.role).collect()
    }

    /// Contents of the user messages, in order.
    pub fn user_messages(&self) -> Vec<String> {
        self.session
            .history()
            .into_iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content)
            .collect()
    }

    pub fn last_message(&self) -> Option<Message> {
        self.session.history().pop()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the history has exactly these roles, in order.
#[track_caller]
pub fn assert_roles(harness: &TestHarness, expected: &[Role]) {
    let actual = harness.roles();
    assert_eq!(
        actual, expected,
        "Expected history roles {expected:?}, got {actual:?}"
    );
}

/// Assert the last history entry is a system notice for `kind`.
#[track_caller]
pub fn assert_last_notice(harness: &TestHarness, kind: FailureKind) {
    let last = harness.last_message();
    assert!(
        matches!(&last, Some(m) if m.role == Role::System && m.failure == Some(kind)),
        "Expected a {kind:?} notice last, got {last:?}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(model: &str) -> CompletionRequest {
        CompletionRequest {
            model: model.to_string(),
            system_instruction: String::new(),
            history: Vec::new(),
            turn_text: "hi".to_string(),
            temperature: 0.9,
            max_output_tokens: None,
        }
    }

    #[tokio::test]
    async fn test_queued_before_standing() {
        let backend = ScriptedBackend::new()
            .always_reply("m", "standing")
            .reply("m", "first");

        assert_eq!(backend.complete("k", request("m")).await.unwrap(), "first");
        assert_eq!(backend.complete("k", request("m")).await.unwrap(), "standing");
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unscripted_model_is_not_found() {
        let backend = ScriptedBackend::new();
        let err = backend.complete("k", request("ghost")).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_grants_gate_models_by_credential() {
        let backend = ScriptedBackend::new()
            .always_reply("m", "ok")
            .grant("good", &["m"]);

        assert!(backend.complete("good", request("m")).await.is_ok());
        let err = backend.complete("bad", request("m")).await.unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert_eq!(backend.calls()[1].credential, "bad");
    }

    #[tokio::test]
    async fn test_harness_opens_chat() {
        let harness = TestHarness::new(ScriptedBackend::new().always_reply("model-a", "Snow."));
        let outcome = harness.open_chat("Anya").await.unwrap();

        assert!(matches!(outcome, TurnOutcome::Replied(_)));
        assert_roles(&harness, &[Role::Assistant]);
        assert_eq!(harness.selection_requests(), 0);
    }
}
