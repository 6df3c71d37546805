//! Integration tests that call the real Gemini API.
//!
//! These tests require GEMINI_API_KEY (or API_KEY) to be set (via .env file or environment).
//! Run with: `cargo test -p volchya-core --test api_integration -- --ignored --nocapture`
//!
//! These are marked #[ignore] by default to avoid:
//! - API costs in CI
//! - Test failures when no API key is available
//! - Slow test runs (API calls take seconds)

use volchya_core::dispatch::{CredentialProvider, EnvCredential};
use volchya_core::{
    Dossier, NarrativeSegment, Role, Session, SessionConfig, SessionPhase, TurnOutcome,
};

/// Load environment variables from .env file
fn setup() {
    let _ = dotenvy::dotenv();
}

/// Check if API key is available
fn has_api_key() -> bool {
    EnvCredential::default().credential().is_some()
}

#[tokio::test]
#[ignore] // Run with: cargo test -p volchya-core --test api_integration -- --ignored
async fn test_opening_scene_and_one_turn() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: GEMINI_API_KEY not set");
        return;
    }

    let config = SessionConfig::from_env().expect("valid environment config");
    let session = Session::from_env(config).expect("Failed to create session");

    session
        .set_dossier(
            Dossier::new("Anya Sokolova")
                .with_age("27")
                .with_role("Interpreter"),
        )
        .unwrap();
    session.confirm_dossier().unwrap();

    let opening = session.deploy().await.expect("deploy should run");
    println!("Opening: {opening:?}");
    assert_eq!(session.phase(), SessionPhase::Chat);

    let TurnOutcome::Replied(reply) = opening else {
        panic!("opening dispatch failed: {opening:?}");
    };
    assert!(!reply.content.trim().is_empty());

    let segments = reply.segments();
    println!("Segments: {segments:#?}");
    assert!(!segments.is_empty(), "reply should parse into segments");
    if !segments
        .iter()
        .any(|s| matches!(s, NarrativeSegment::Header(_)))
    {
        eprintln!("Note: the model skipped the turn header this time");
    }

    let turn = session
        .submit("I bow slightly and wait for the Pakhan to speak first.")
        .await
        .expect("submit should run");
    println!("Turn: {turn:?}");

    let roles: Vec<Role> = session.history().iter().map(|m| m.role).collect();
    assert_eq!(roles[..2], [Role::Assistant, Role::User]);
}
