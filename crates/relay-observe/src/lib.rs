//! Analytics event log for the voice relay.
//!
//! Every step of a user interaction (voice note received, transcription,
//! assistant answer, speech synthesis, values elicitation, photo reading)
//! is appended to the `analytics_events` table with a monotonically
//! increasing sequence number. The log is append-only and queryable by
//! user, domain and event type.
//!
//! # Event domains
//!
//! | Domain | Example events |
//! |--------|---------------|
//! | `TRANSPORT` | `START_COMMAND`, `VOICE_RECEIVED` |
//! | `SPEECH` | `TRANSCRIPTION_FAILED`, `SPEECH_FAILED` |
//! | `ASSISTANT` | `ANSWER_SENT`, `ASSISTANT_FAILED` |
//! | `DIALOGUE` | `ELICITATION_STARTED`, `FOLLOW_UP_ASKED`, `VALUES_SAVED`, `ELICITATION_EXHAUSTED`, `ELICITATION_FAILED` |
//! | `VISION` | `PHOTO_ANALYZED` |
//!
//! # Usage
//!
//! ```rust,ignore
//! use relay_observe::{emit_event, EventPayload};
//!
//! emit_event(&conn, user_key, &EventPayload::ValuesSaved { count: 3 })?;
//! ```

mod error;
mod event;
mod store;

pub use error::ObserveError;
pub use event::{AnalyticsEvent, EventDomain, EventPayload, ParseEventDomainError};
pub use store::{emit_event, next_seq, query_events, EventFilter, DEFAULT_QUERY_LIMIT};

#[cfg(test)]
mod tests;
