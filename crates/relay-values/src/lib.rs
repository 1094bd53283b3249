//! Values elicitation for the voice relay.
//!
//! After a user's first ordinary question, the relay asks what they value
//! in life and keeps asking, up to a fixed budget of follow-up questions,
//! until a hosted classifier confirms the answer names concrete values.
//! The confirmed values are then written once to durable storage.
//!
//! # Components
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`classifier`] | Verdict on accumulated answers (valid + extracted phrases, rejected, or oracle unavailable) |
//! | [`followup`] | Clarifying question for a given attempt, with canned fallbacks |
//! | [`store`] | Durable user + values records, written in one transaction |
//! | [`session`] | Typed per-user dialogue state, its storage, and per-user turn locks |
//! | [`engine`] | The state machine tying the above together |
//!
//! # Usage
//!
//! ```rust,ignore
//! let engine = DialogueEngine::new(oracle, values_store, session_store, DialogueSettings::default());
//!
//! if let Some(seed) = engine.begin_if_needed(user_key).await {
//!     reply(seed);
//! }
//! let outcome = engine.handle_utterance(user_key, &transcribed).await;
//! if let Some(notice) = outcome.notice() {
//!     reply(notice);
//! }
//! ```

pub mod classifier;
pub mod engine;
pub mod error;
pub mod followup;
pub mod session;
pub mod store;

pub use classifier::{ValueClassifier, Verdict, MIN_ANSWER_CHARS};
pub use engine::{
    DialogueEngine, DialogueSettings, TurnOutcome, EXHAUSTED_NOTICE, FAILURE_NOTICE,
    SEED_QUESTION, SUCCESS_NOTICE,
};
pub use error::{ElicitationError, SessionStoreError, StoreError};
pub use followup::{FollowUp, FollowUpGenerator, FALLBACK_QUESTIONS};
pub use session::{
    InMemorySessionStore, Session, SessionLocks, SessionState, SessionStore, SqliteSessionStore,
};
pub use store::{SqliteValuesStore, ValuesStore};
