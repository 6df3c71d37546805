//! Session - the primary public API for a narrative session.
//!
//! A session moves through three phases:
//! - `Intake`: the player fills in their dossier
//! - `Briefing`: the roster is shown; the dossier can still be edited
//! - `Chat`: turns go back and forth with the model
//!
//! The session owns the message history. Methods take `&self` so a host
//! can hold one session behind an `Arc` and still have at most one
//! dispatch in flight: extra submissions are ignored, not queued.

use crate::config::{ConfigError, DispatchConfig};
use crate::dispatch::{
    CompletionBackend, CredentialProvider, DispatchFailure, DispatchOptions, DispatchOutcome,
    Dispatcher, EnvCredential, FailureClassifier, GeminiBackend, Turn,
};
use crate::dossier::{Dossier, DossierError, IntakePolicy};
use crate::message::Message;
use crate::prompt::OPENING_TURN;
use crate::roster::{self, RosterEntry};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

/// Shown when the opening dispatch succeeds with no text.
const OPENING_SILENCE: &str = "Only silence answers...";

/// Shown when a turn succeeds with no text.
const TURN_SILENCE: &str = "...";

/// Errors from Session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not allowed while the session is in the {0:?} phase")]
    WrongPhase(SessionPhase),

    #[error("Invalid dossier: {0}")]
    InvalidDossier(#[from] DossierError),

    #[error("the dossier cannot change once the chat has started")]
    DossierLocked,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Intake,
    Briefing,
    Chat,
}

/// Host action that opens credential/model selection.
pub type SelectionTrigger = Arc<dyn Fn() + Send + Sync>;

/// Configuration for creating a new session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Dispatch settings: candidate models, temperature, timeout.
    pub dispatch: DispatchConfig,

    /// What intake requires of the dossier.
    pub intake_policy: IntakePolicy,

    /// Replay earlier turns to the model with every dispatch.
    pub replay_history: bool,

    /// Replay at most this many of the most recent turns. `None` replays all.
    pub replay_limit: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchConfig::default(),
            intake_policy: IntakePolicy::NameOnly,
            replay_history: true,
            replay_limit: None,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with dispatch settings taken from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            dispatch: DispatchConfig::from_env()?,
            ..Self::default()
        })
    }

    pub fn with_dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_intake_policy(mut self, policy: IntakePolicy) -> Self {
        self.intake_policy = policy;
        self
    }

    /// Send only the current turn, without earlier history.
    pub fn without_history_replay(mut self) -> Self {
        self.replay_history = false;
        self
    }

    /// Replay only the most recent `turns` turns.
    pub fn with_replay_limit(mut self, turns: usize) -> Self {
        self.replay_limit = Some(turns);
        self
    }
}

/// What became of a start or submit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model answered; the reply was appended.
    Replied(Message),
    /// The dispatch failed; a system notice was appended.
    Failed(DispatchFailure),
    /// Nothing was appended or sent.
    Ignored(IgnoreReason),
    /// The session was reset while the dispatch ran; its result was dropped.
    Discarded,
}

/// Why a submission was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    EmptyInput,
    DispatchInFlight,
}

struct SessionState {
    phase: SessionPhase,
    dossier: Dossier,
    history: Vec<Message>,
    /// Bumped on reset so late replies from an old session are dropped.
    epoch: u64,
    /// Epoch of the running dispatch. One from before a reset no longer
    /// blocks new dispatches.
    in_flight: Option<u64>,
}

/// Clears the in-flight marker when dropped, including on timeout or
/// when the caller drops the future.
struct InFlight<'a> {
    state: &'a Mutex<SessionState>,
    epoch: u64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.in_flight == Some(self.epoch) {
            state.in_flight = None;
        }
    }
}

/// A narrative session.
pub struct Session {
    dispatcher: Dispatcher,
    intake_policy: IntakePolicy,
    replay_history: bool,
    replay_limit: Option<usize>,
    state: Mutex<SessionState>,
    selection: Option<SelectionTrigger>,
}

impl Session {
    /// Create a session over any completion backend and credential source.
    pub fn new(
        config: SessionConfig,
        backend: Arc<dyn CompletionBackend>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, SessionError> {
        config.dispatch.validate()?;
        Ok(Self::with_dispatcher(
            Dispatcher::new(backend, credentials, config.dispatch.clone()),
            config,
        ))
    }

    /// Create a session against the Gemini API, reading the key from the
    /// environment on every call.
    pub fn from_env(config: SessionConfig) -> Result<Self, SessionError> {
        Self::new(
            config,
            Arc::new(GeminiBackend::new()),
            Arc::new(EnvCredential::default()),
        )
    }

    /// Create a session around a pre-built dispatcher.
    pub fn with_dispatcher(dispatcher: Dispatcher, config: SessionConfig) -> Self {
        Self {
            dispatcher,
            intake_policy: config.intake_policy,
            replay_history: config.replay_history,
            replay_limit: config.replay_limit,
            state: Mutex::new(SessionState {
                phase: SessionPhase::Intake,
                dossier: Dossier::default(),
                history: Vec::new(),
                epoch: 0,
                in_flight: None,
            }),
            selection: None,
        }
    }

    /// Install the host's credential/model selection action.
    pub fn with_selection_trigger(mut self, trigger: SelectionTrigger) -> Self {
        self.selection = Some(trigger);
        self
    }

    /// Replace the dispatch failure classifier.
    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.dispatcher = self.dispatcher.with_classifier(classifier);
        self
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> SessionPhase {
        self.state().phase
    }

    pub fn dossier(&self) -> Dossier {
        self.state().dossier.clone()
    }

    /// Snapshot of the history in append order.
    pub fn history(&self) -> Vec<Message> {
        self.state().history.clone()
    }

    /// The NPC roster shown during the briefing.
    pub fn roster(&self) -> &'static [RosterEntry] {
        roster::roster()
    }

    /// Whether a dispatch for the current session is running.
    pub fn is_dispatching(&self) -> bool {
        let state = self.state();
        state.in_flight == Some(state.epoch)
    }

    /// Replace the dossier. Allowed until the chat starts.
    pub fn set_dossier(&self, dossier: Dossier) -> Result<(), SessionError> {
        self.edit_dossier(|current| *current = dossier)
    }

    /// Edit the dossier in place. Allowed until the chat starts.
    pub fn edit_dossier(&self, edit: impl FnOnce(&mut Dossier)) -> Result<(), SessionError> {
        let mut state = self.state();
        if state.phase == SessionPhase::Chat {
            return Err(SessionError::DossierLocked);
        }
        edit(&mut state.dossier);
        Ok(())
    }

    /// Intake → Briefing. Rejected, staying in intake, if the dossier is incomplete.
    pub fn confirm_dossier(&self) -> Result<(), SessionError> {
        let mut state = self.state();
        if state.phase != SessionPhase::Intake {
            return Err(SessionError::WrongPhase(state.phase));
        }
        state.dossier.validate(self.intake_policy)?;
        state.phase = SessionPhase::Briefing;
        info!(name = %state.dossier.name, "dossier confirmed, entering briefing");
        Ok(())
    }

    /// Briefing → Chat, dispatching the fixed opening turn.
    ///
    /// The chat opens even if the opening dispatch fails; the history then
    /// holds a single system notice and the player can carry on from there.
    pub async fn deploy(&self) -> Result<TurnOutcome, SessionError> {
        let Some(_in_flight) = self.begin_dispatch() else {
            return Ok(TurnOutcome::Ignored(IgnoreReason::DispatchInFlight));
        };

        let (dossier, epoch) = {
            let mut state = self.state();
            if state.phase != SessionPhase::Briefing {
                return Err(SessionError::WrongPhase(state.phase));
            }
            state.phase = SessionPhase::Chat;
            state.history.clear();
            info!(name = %state.dossier.name, "session deployed");
            (state.dossier.clone(), state.epoch)
        };

        let outcome = self
            .dispatcher
            .dispatch(OPENING_TURN, &dossier, &DispatchOptions::default())
            .await;

        Ok(self.record(epoch, outcome, OPENING_SILENCE))
    }

    /// Submit a player turn.
    ///
    /// The player's message is appended before the dispatch and is kept
    /// whatever the outcome.
    pub async fn submit(&self, text: &str) -> Result<TurnOutcome, SessionError> {
        let phase = self.phase();
        if phase != SessionPhase::Chat {
            return Err(SessionError::WrongPhase(phase));
        }
        if text.trim().is_empty() {
            return Ok(TurnOutcome::Ignored(IgnoreReason::EmptyInput));
        }
        let Some(_in_flight) = self.begin_dispatch() else {
            debug!("submission ignored: dispatch already in flight");
            return Ok(TurnOutcome::Ignored(IgnoreReason::DispatchInFlight));
        };

        let (dossier, options, epoch) = {
            let mut state = self.state();
            if state.phase != SessionPhase::Chat {
                return Err(SessionError::WrongPhase(state.phase));
            }

            let history = if self.replay_history {
                let turns: Vec<Turn> =
                    state.history.iter().filter_map(Turn::from_message).collect();
                let skip = self
                    .replay_limit
                    .map_or(0, |limit| turns.len().saturating_sub(limit));
                turns.into_iter().skip(skip).collect()
            } else {
                Vec::new()
            };
            state.history.push(Message::user(text));

            (
                state.dossier.clone(),
                DispatchOptions::default().with_history(history),
                state.epoch,
            )
        };

        let outcome = self.dispatcher.dispatch(text, &dossier, &options).await;

        Ok(self.record(epoch, outcome, TURN_SILENCE))
    }

    /// Back to intake, clearing the dossier and the history.
    ///
    /// A dispatch still running is abandoned: its result is discarded and
    /// it no longer blocks the next deploy.
    pub fn reset(&self) {
        let mut state = self.state();
        state.phase = SessionPhase::Intake;
        state.dossier = Dossier::default();
        state.history.clear();
        state.epoch += 1;
        info!("session reset");
    }

    fn begin_dispatch(&self) -> Option<InFlight<'_>> {
        let mut state = self.state();
        if state.in_flight == Some(state.epoch) {
            return None;
        }
        state.in_flight = Some(state.epoch);
        Some(InFlight {
            state: &self.state,
            epoch: state.epoch,
        })
    }

    fn record(&self, epoch: u64, outcome: DispatchOutcome, silence: &str) -> TurnOutcome {
        let (message, result) = match outcome {
            DispatchOutcome::Success(text) => {
                let content = if text.trim().is_empty() {
                    silence.to_string()
                } else {
                    text
                };
                let message = Message::assistant(content);
                (message.clone(), TurnOutcome::Replied(message))
            }
            DispatchOutcome::Failure(failure) => (
                Message::failure_notice(failure.kind),
                TurnOutcome::Failed(failure),
            ),
        };

        {
            let mut state = self.state();
            if state.epoch != epoch {
                debug!("dropping dispatch result from before reset");
                return TurnOutcome::Discarded;
            }
            state.history.push(message);
        }

        // Outside the lock: the host's trigger may call back into the session.
        if let TurnOutcome::Failed(failure) = &result {
            if failure.kind.needs_selection() {
                if let Some(trigger) = &self.selection {
                    trigger();
                }
            }
        }
        result
    }
}
