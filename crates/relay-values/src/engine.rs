//! The values-elicitation state machine.
//!
//! | State | Event | Result |
//! |-------|-------|--------|
//! | Idle | normal turn, user has no values | seed question, `CollectingValues` |
//! | Collecting | classifier: valid | commit, success notice, `Idle` |
//! | Collecting | classifier: rejected, budget left | follow-up question, attempt + 1 |
//! | Collecting | classifier: rejected, budget spent | exhaustion notice, `Idle` |
//! | Collecting | classifier unavailable or storage failure | failure notice, `Idle` |
//! | any | stored session unreadable | row discarded, treated as `Idle` |
//!
//! A session that cannot be loaded at all never blocks an ordinary turn:
//! the utterance is reported as [`TurnOutcome::NotCollecting`].
//!
//! Every turn runs under the user's [`SessionLocks`] entry, so the
//! load, decide and save sequence of one turn never interleaves with another
//! turn of the same user.

use relay_oracle::ChatOracle;
use relay_types::UserKey;
use std::sync::Arc;
use std::time::Duration;

use crate::classifier::{ValueClassifier, Verdict, MIN_ANSWER_CHARS};
use crate::error::{ElicitationError, StoreError};
use crate::followup::FollowUpGenerator;
use crate::session::{Session, SessionLocks, SessionStore};
use crate::store::ValuesStore;

pub const SEED_QUESTION: &str = "Кстати, хочу узнать тебя лучше. Расскажи, какие у тебя главные жизненные ценности? Что для тебя по-настоящему важно?";

pub const SUCCESS_NOTICE: &str = "Спасибо! Я запомнил твои ценности.";

pub const EXHAUSTED_NOTICE: &str =
    "Похоже, сейчас не самое подходящее время. Давай вернёмся к этому позже.";

pub const FAILURE_NOTICE: &str =
    "Что-то пошло не так. Давай попробуем поговорить о ценностях в другой раз.";

#[derive(Debug, Clone)]
pub struct DialogueSettings {
    /// Follow-up questions allowed per elicitation.
    pub max_attempts: u32,
    pub min_answer_chars: usize,
    /// Bound on each classifier or generator call.
    pub oracle_timeout: Duration,
}

impl Default for DialogueSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_answer_chars: MIN_ANSWER_CHARS,
            oracle_timeout: Duration::from_secs(30),
        }
    }
}

/// Result of feeding one utterance to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// No elicitation is in progress, or the session could not be loaded;
    /// the utterance is an ordinary question.
    NotCollecting,
    /// The answer named no values; ask again.
    FollowUp {
        question: String,
        attempt: u32,
        /// The model was unavailable and a canned question is used.
        fallback: bool,
    },
    Saved { values: Vec<String> },
    /// Values were confirmed but a record for this user already existed.
    AlreadyRecorded,
    Exhausted { attempts: u32 },
    Failed(ElicitationError),
}

impl TurnOutcome {
    /// Text to send back to the user, if any.
    pub fn notice(&self) -> Option<&str> {
        match self {
            Self::NotCollecting => None,
            Self::FollowUp { question, .. } => Some(question),
            Self::Saved { .. } | Self::AlreadyRecorded => Some(SUCCESS_NOTICE),
            Self::Exhausted { .. } => Some(EXHAUSTED_NOTICE),
            Self::Failed(_) => Some(FAILURE_NOTICE),
        }
    }

    /// The error taxonomy entry this turn falls under, if it did not save values.
    pub fn error(&self) -> Option<ElicitationError> {
        match self {
            Self::NotCollecting | Self::Saved { .. } | Self::AlreadyRecorded => None,
            Self::FollowUp { .. } => Some(ElicitationError::ValidationRejected),
            Self::Exhausted { attempts } => Some(ElicitationError::BudgetExhausted(*attempts)),
            Self::Failed(e) => Some(e.clone()),
        }
    }

    /// True when this turn returned the session to `Idle`.
    pub fn ends_elicitation(&self) -> bool {
        matches!(
            self,
            Self::Saved { .. } | Self::AlreadyRecorded | Self::Exhausted { .. } | Self::Failed(_)
        )
    }
}

pub struct DialogueEngine {
    classifier: ValueClassifier,
    generator: FollowUpGenerator,
    values: Arc<dyn ValuesStore>,
    sessions: Arc<dyn SessionStore>,
    locks: SessionLocks,
    settings: DialogueSettings,
}

impl DialogueEngine {
    pub fn new(
        oracle: Arc<dyn ChatOracle>,
        values: Arc<dyn ValuesStore>,
        sessions: Arc<dyn SessionStore>,
        settings: DialogueSettings,
    ) -> Self {
        Self {
            classifier: ValueClassifier::new(
                oracle.clone(),
                settings.min_answer_chars,
                settings.oracle_timeout,
            ),
            generator: FollowUpGenerator::new(oracle, settings.oracle_timeout),
            values,
            sessions,
            locks: SessionLocks::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &DialogueSettings {
        &self.settings
    }

    /// Starts an elicitation after an ordinary turn, unless one is already in
    /// progress or the user already has values. Returns the seed question.
    pub async fn begin_if_needed(&self, user_key: UserKey) -> Option<String> {
        let _guard = self.locks.acquire(user_key).await;

        let mut session = self.load(user_key).await?;
        if session.is_collecting() {
            return None;
        }

        match self.values.has_values(user_key).await {
            Ok(true) => return None,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(%user_key, error = %e, "values lookup failed, not starting elicitation");
                return None;
            }
        }

        session.begin_elicitation();
        if let Err(e) = self.sessions.save(&session).await {
            tracing::warn!(%user_key, error = %e, "failed to save dialogue session");
            return None;
        }

        tracing::info!(%user_key, "values elicitation started");
        Some(SEED_QUESTION.to_string())
    }

    /// Feeds one user utterance into the elicitation, if one is in progress.
    pub async fn handle_utterance(&self, user_key: UserKey, text: &str) -> TurnOutcome {
        let _guard = self.locks.acquire(user_key).await;

        let Some(mut session) = self.load(user_key).await else {
            return TurnOutcome::NotCollecting;
        };
        if !session.is_collecting() {
            return TurnOutcome::NotCollecting;
        }

        session.record_user(text);
        let outcome = self.decide(&mut session).await;

        if outcome.ends_elicitation() {
            session.reset();
        }
        if let Err(e) = self.sessions.save(&session).await {
            tracing::warn!(%user_key, error = %e, "failed to save dialogue session");
            if !outcome.ends_elicitation() {
                return TurnOutcome::Failed(ElicitationError::StorageFailure(e.to_string()));
            }
        }

        outcome
    }

    /// Loads the user's session. An unreadable row is replaced by an idle
    /// session; `None` means storage could not be reached. Callers hold the
    /// user's lock.
    async fn load(&self, user_key: UserKey) -> Option<Session> {
        match self.sessions.load(user_key).await {
            Ok(session) => Some(session),
            Err(e) if e.is_unreadable() => {
                tracing::error!(%user_key, error = %e, "discarding unreadable dialogue session");
                let session = Session::idle(user_key);
                if let Err(e) = self.sessions.save(&session).await {
                    tracing::warn!(%user_key, error = %e, "failed to clear unreadable dialogue session");
                    return None;
                }
                Some(session)
            }
            Err(e) => {
                tracing::warn!(%user_key, error = %e, "failed to load dialogue session");
                None
            }
        }
    }

    async fn decide(&self, session: &mut Session) -> TurnOutcome {
        let user_key = session.user_key();
        let transcript = session.user_transcript();

        match self.classifier.classify(&transcript).await {
            Verdict::Valid(values) => self.commit(user_key, values).await,
            Verdict::Unavailable(e) => {
                tracing::warn!(%user_key, error = %e, "classifier unavailable, abandoning elicitation");
                TurnOutcome::Failed(ElicitationError::OracleUnavailable(e))
            }
            Verdict::Rejected if session.attempt_count() >= self.settings.max_attempts => {
                tracing::info!(
                    %user_key,
                    attempts = session.attempt_count(),
                    "follow-up budget exhausted"
                );
                TurnOutcome::Exhausted {
                    attempts: session.attempt_count(),
                }
            }
            Verdict::Rejected => {
                let next = session.attempt_count() + 1;
                let follow_up = self.generator.generate(&transcript, next).await;
                let attempt = session.advance_attempt();
                session.record_assistant(follow_up.question.clone());
                tracing::info!(%user_key, attempt, fallback = follow_up.is_fallback(), "asking follow-up");
                TurnOutcome::FollowUp {
                    fallback: follow_up.is_fallback(),
                    question: follow_up.question,
                    attempt,
                }
            }
        }
    }

    async fn commit(&self, user_key: UserKey, values: Vec<String>) -> TurnOutcome {
        match self.values.commit(user_key, &values).await {
            Ok(()) => {
                tracing::info!(%user_key, count = values.len(), "values saved");
                TurnOutcome::Saved { values }
            }
            Err(StoreError::AlreadyExists(_)) => {
                tracing::warn!(%user_key, "values already recorded for user");
                TurnOutcome::AlreadyRecorded
            }
            Err(e) => {
                tracing::error!(%user_key, error = %e, "failed to commit values");
                TurnOutcome::Failed(ElicitationError::StorageFailure(e.to_string()))
            }
        }
    }
}
