//! Dispatch tests against a scripted backend.
//!
//! These verify model fallback without touching the network:
//! - Candidates are tried in order, stopping at the first success
//! - Only model-level rejections move on to the next candidate
//! - Credentials are read fresh on every dispatch
//! - Timeouts and retries
//!
//! Run with: `cargo test -p volchya-core --test dispatch_fallback`

use std::sync::Arc;
use std::time::Duration;
use volchya_core::dispatch::{
    CompletionError, CredentialProvider, DefaultClassifier, DispatchOptions, Dispatcher, Turn,
};
use volchya_core::testing::{Scripted, ScriptedBackend};
use volchya_core::{
    DispatchConfig, DispatchOutcome, Dossier, FailureKind, RetryPolicy, SharedCredential,
    StaticCredential,
};

fn config() -> DispatchConfig {
    DispatchConfig::default()
        .with_models(["model-a", "model-b"])
        .with_timeout(Duration::from_secs(30))
}

fn dispatcher(
    backend: &Arc<ScriptedBackend>,
    credential: impl CredentialProvider + 'static,
    config: DispatchConfig,
) -> Dispatcher {
    Dispatcher::new(backend.clone(), Arc::new(credential), config)
}

fn endpoint(status: u16, message: &str) -> CompletionError {
    CompletionError::Endpoint {
        status,
        message: message.to_string(),
    }
}

async fn send(dispatcher: &Dispatcher) -> DispatchOutcome {
    dispatcher
        .dispatch("I look around", &Dossier::new("Anya"), &DispatchOptions::default())
        .await
}

#[track_caller]
fn assert_failure(outcome: &DispatchOutcome, kind: FailureKind) {
    assert_eq!(
        outcome.failure().map(|f| f.kind),
        Some(kind),
        "Expected a {kind:?} failure, got {outcome:?}"
    );
}

// =============================================================================
// FALLBACK ORDER
// =============================================================================

#[tokio::test]
async fn test_falls_back_to_the_model_the_credential_can_use() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .always_reply("model-a", "from a")
            .always_reply("model-b", "from b")
            .grant("key", &["model-b"]),
    );
    let dispatcher = dispatcher(&backend, StaticCredential::new("key"), config());

    let outcome = send(&dispatcher).await;

    assert_eq!(outcome.text(), Some("from b"));
    assert_eq!(backend.models_called(), ["model-a", "model-b"]);
}

#[tokio::test]
async fn test_success_short_circuits() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .always_reply("model-a", "from a")
            .always_reply("model-b", "from b"),
    );
    let dispatcher = dispatcher(&backend, StaticCredential::new("key"), config());

    let outcome = send(&dispatcher).await;

    assert_eq!(outcome.text(), Some("from a"));
    assert_eq!(backend.models_called(), ["model-a"]);
}

#[tokio::test]
async fn test_unclassified_failure_aborts_without_fallback() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .always_fail("model-a", endpoint(400, "INVALID_ARGUMENT: API key not valid"))
            .always_reply("model-b", "from b"),
    );
    let dispatcher = dispatcher(&backend, StaticCredential::new("key"), config());

    let outcome = send(&dispatcher).await;

    assert_failure(&outcome, FailureKind::Unknown);
    assert!(outcome
        .failure()
        .is_some_and(|f| f.raw_message.contains("API key not valid")));
    assert_eq!(backend.models_called(), ["model-a"]);
}

#[tokio::test]
async fn test_oversized_request_is_fatal_not_a_model_rejection() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .always_fail(
                "model-a",
                endpoint(
                    400,
                    "INVALID_ARGUMENT: The input token count (1403520) exceeds the maximum number of tokens allowed (1048576).",
                ),
            )
            .always_reply("model-b", "from b"),
    );
    let dispatcher = dispatcher(&backend, StaticCredential::new("key"), config());

    let outcome = send(&dispatcher).await;

    assert_failure(&outcome, FailureKind::Unknown);
    assert_eq!(backend.models_called(), ["model-a"]);
}

#[tokio::test]
async fn test_transient_failure_aborts_without_fallback() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .always_fail("model-a", endpoint(503, "UNAVAILABLE: model overloaded"))
            .always_reply("model-b", "from b"),
    );
    let dispatcher = dispatcher(&backend, StaticCredential::new("key"), config());

    let outcome = send(&dispatcher).await;

    assert_failure(&outcome, FailureKind::Transient);
    assert_eq!(backend.models_called(), ["model-a"]);
}

#[tokio::test]
async fn test_exhausted_candidates_report_the_last_rejection() {
    let backend = Arc::new(ScriptedBackend::new());
    let dispatcher = dispatcher(&backend, StaticCredential::new("key"), config());

    let outcome = send(&dispatcher).await;

    assert_failure(&outcome, FailureKind::PermissionOrModelUnavailable);
    assert!(outcome
        .failure()
        .is_some_and(|f| f.raw_message.contains("model-b")));
    assert_eq!(backend.models_called(), ["model-a", "model-b"]);
}

#[tokio::test]
async fn test_empty_candidate_list_sends_nothing() {
    let backend = Arc::new(ScriptedBackend::new());
    let config = config().with_models(Vec::<String>::new());
    let dispatcher = dispatcher(&backend, StaticCredential::new("key"), config);

    assert_failure(
        &send(&dispatcher).await,
        FailureKind::PermissionOrModelUnavailable,
    );
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_custom_classifier_changes_fallback() {
    let backend = Arc::new(ScriptedBackend::new().always_reply("model-b", "from b"));
    let dispatcher = dispatcher(&backend, StaticCredential::new("key"), config())
        .with_classifier(Arc::new(DefaultClassifier::empty()));

    let outcome = send(&dispatcher).await;

    assert_failure(&outcome, FailureKind::Unknown);
    assert_eq!(backend.models_called(), ["model-a"]);
}

// =============================================================================
// CREDENTIALS
// =============================================================================

#[tokio::test]
async fn test_missing_credential_sends_nothing() {
    let backend = Arc::new(ScriptedBackend::new().always_reply("model-a", "from a"));
    let dispatcher = dispatcher(&backend, StaticCredential::missing(), config());

    let outcome = send(&dispatcher).await;

    assert_failure(&outcome, FailureKind::CredentialMissing);
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_placeholder_credential_counts_as_missing() {
    let backend = Arc::new(ScriptedBackend::new().always_reply("model-a", "from a"));
    let dispatcher = dispatcher(&backend, StaticCredential::new("PLACEHOLDER"), config());

    assert_failure(&send(&dispatcher).await, FailureKind::CredentialMissing);
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_credential_is_read_on_every_dispatch() {
    let backend = Arc::new(ScriptedBackend::new().always_reply("model-a", "from a"));
    let credential = SharedCredential::new();
    let dispatcher = dispatcher(&backend, credential.clone(), config());

    assert_failure(&send(&dispatcher).await, FailureKind::CredentialMissing);

    credential.set("key-1");
    assert!(send(&dispatcher).await.is_success());

    credential.set("key-2");
    assert!(send(&dispatcher).await.is_success());

    let used: Vec<String> = backend.calls().into_iter().map(|c| c.credential).collect();
    assert_eq!(used, ["key-1", "key-2"]);
}

// =============================================================================
// REQUEST CONTENTS
// =============================================================================

#[tokio::test]
async fn test_request_carries_prompt_history_and_settings() {
    let backend = Arc::new(ScriptedBackend::new().always_reply("model-a", "from a"));
    let config = config().with_temperature(0.5).with_max_output_tokens(2048);
    let dispatcher = dispatcher(&backend, StaticCredential::new("key"), config);

    let history = vec![
        Turn::Assistant("The office is cold.".to_string()),
        Turn::User("I sit down".to_string()),
    ];
    let dossier = Dossier::new("Anya").with_role("Interpreter");
    dispatcher
        .dispatch(
            "I ask about the shipment",
            &dossier,
            &DispatchOptions::default()
                .with_history(history.clone())
                .with_temperature(1.1),
        )
        .await;

    let calls = backend.calls();
    let request = &calls[0].request;
    assert_eq!(request.turn_text, "I ask about the shipment");
    assert_eq!(request.history, history);
    assert_eq!(request.temperature, 1.1);
    assert_eq!(request.max_output_tokens, Some(2048));
    assert!(request.system_instruction.contains("Anya"));
    assert!(request.system_instruction.contains("Interpreter"));
}

// =============================================================================
// TIMEOUTS AND RETRIES
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_hung_request_times_out_as_transient() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .then("model-a", Scripted::Hang)
            .always_reply("model-b", "from b"),
    );
    let dispatcher = dispatcher(&backend, StaticCredential::new("key"), config());

    let outcome = send(&dispatcher).await;

    assert_failure(&outcome, FailureKind::Transient);
    assert!(outcome
        .failure()
        .is_some_and(|f| f.raw_message.contains("timed out")));
    assert_eq!(backend.models_called(), ["model-a"]);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried_when_configured() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .fail("model-a", endpoint(503, "UNAVAILABLE"))
            .fail("model-a", endpoint(429, "RESOURCE_EXHAUSTED"))
            .always_reply("model-a", "from a"),
    );
    let config = config().with_retry(RetryPolicy::with_retries(2));
    let dispatcher = dispatcher(&backend, StaticCredential::new("key"), config);

    let outcome = send(&dispatcher).await;

    assert_eq!(outcome.text(), Some("from a"));
    assert_eq!(backend.models_called(), ["model-a", "model-a", "model-a"]);
}

#[tokio::test(start_paused = true)]
async fn test_retries_are_bounded() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .always_fail("model-a", endpoint(503, "UNAVAILABLE"))
            .always_reply("model-b", "from b"),
    );
    let config = config().with_retry(RetryPolicy::with_retries(1));
    let dispatcher = dispatcher(&backend, StaticCredential::new("key"), config);

    let outcome = send(&dispatcher).await;

    assert_failure(&outcome, FailureKind::Transient);
    assert_eq!(backend.models_called(), ["model-a", "model-a"]);
}
