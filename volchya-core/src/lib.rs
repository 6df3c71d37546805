//! Narrative role-play session engine.
//!
//! This crate provides:
//! - Player dossier intake and the fixed NPC roster
//! - A deterministic system-prompt compiler
//! - Model dispatch with ordered fallback across candidate models
//! - The session state machine (intake, briefing, chat)
//! - A parser for the tagged narrative format replies are written in
//!
//! # Quick Start
//!
//! ```ignore
//! use volchya_core::{Dossier, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::from_env(SessionConfig::from_env()?)?;
//!
//!     session.set_dossier(Dossier::new("Anya").with_role("Interpreter"))?;
//!     session.confirm_dossier()?;
//!     session.deploy().await?;
//!
//!     session.submit("I follow Volk into the warehouse").await?;
//!     for message in session.history() {
//!         println!("{:?}", message.segments());
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod dossier;
pub mod format;
pub mod message;
pub mod narrative;
pub mod prompt;
pub mod roster;
pub mod session;
pub mod testing;

// Primary public API
pub use config::{ConfigError, DispatchConfig, RetryPolicy};
pub use dispatch::{
    CompletionBackend, CredentialProvider, DispatchFailure, DispatchOutcome, Dispatcher,
    EnvCredential, FailureKind, GeminiBackend, SharedCredential, StaticCredential,
};
pub use dossier::{Dossier, DossierError, IntakePolicy};
pub use message::{Message, Role};
pub use narrative::{parse, NarrativeSegment, TurnMeta};
pub use roster::{find_member, roster, RosterEntry};
pub use session::{
    IgnoreReason, SelectionTrigger, Session, SessionConfig, SessionError, SessionPhase,
    TurnOutcome,
};
pub use testing::{ScriptedBackend, TestHarness};
