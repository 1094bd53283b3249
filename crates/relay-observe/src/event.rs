//! Event domain, payload, and record types for the analytics log.

use relay_types::UserKey;
use serde::{Deserialize, Serialize};

/// Analytics event domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventDomain {
    /// Inbound chat traffic.
    Transport,
    /// Speech recognition and synthesis.
    Speech,
    /// Free-form questions answered by the hosted assistant.
    Assistant,
    /// Values elicitation.
    Dialogue,
    /// Photo mood readings.
    Vision,
}

impl EventDomain {
    /// Returns the canonical string label for this domain.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "TRANSPORT",
            Self::Speech => "SPEECH",
            Self::Assistant => "ASSISTANT",
            Self::Dialogue => "DIALOGUE",
            Self::Vision => "VISION",
        }
    }
}

impl std::fmt::Display for EventDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventDomain {
    type Err = ParseEventDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRANSPORT" => Ok(Self::Transport),
            "SPEECH" => Ok(Self::Speech),
            "ASSISTANT" => Ok(Self::Assistant),
            "DIALOGUE" => Ok(Self::Dialogue),
            "VISION" => Ok(Self::Vision),
            _ => Err(ParseEventDomainError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown event domain string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown event domain: {0}")]
pub struct ParseEventDomainError(pub String);

/// Structured event payloads, stored as JSON in `payload_json`.
/// Each variant corresponds to an `event_type` string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    // ── Transport ────────────────────────────────────────────────────
    StartCommand,

    VoiceReceived {
        /// Duration reported by the chat platform, in seconds.
        duration_secs: u32,
    },

    // ── Speech ───────────────────────────────────────────────────────
    TranscriptionFailed {
        reason: String,
    },

    SpeechFailed {
        reason: String,
    },

    // ── Assistant ────────────────────────────────────────────────────
    AnswerSent {
        question_chars: usize,
        answer_chars: usize,
    },

    AssistantFailed {
        reason: String,
    },

    // ── Dialogue ─────────────────────────────────────────────────────
    ElicitationStarted,

    FollowUpAsked {
        /// 1-based index of the follow-up question.
        attempt: u32,
        /// A canned question was used because the model was unavailable.
        fallback: bool,
    },

    ValuesSaved {
        count: usize,
    },

    ElicitationExhausted {
        attempts: u32,
    },

    ElicitationFailed {
        /// Error kind label, e.g. `oracle_unavailable` or `storage_failure`.
        kind: String,
    },

    // ── Vision ───────────────────────────────────────────────────────
    PhotoAnalyzed {
        face_found: bool,
    },
}

impl EventPayload {
    /// Returns the canonical event type string for this payload.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StartCommand => "START_COMMAND",
            Self::VoiceReceived { .. } => "VOICE_RECEIVED",
            Self::TranscriptionFailed { .. } => "TRANSCRIPTION_FAILED",
            Self::SpeechFailed { .. } => "SPEECH_FAILED",
            Self::AnswerSent { .. } => "ANSWER_SENT",
            Self::AssistantFailed { .. } => "ASSISTANT_FAILED",
            Self::ElicitationStarted => "ELICITATION_STARTED",
            Self::FollowUpAsked { .. } => "FOLLOW_UP_ASKED",
            Self::ValuesSaved { .. } => "VALUES_SAVED",
            Self::ElicitationExhausted { .. } => "ELICITATION_EXHAUSTED",
            Self::ElicitationFailed { .. } => "ELICITATION_FAILED",
            Self::PhotoAnalyzed { .. } => "PHOTO_ANALYZED",
        }
    }

    /// Returns the domain this payload belongs to.
    pub fn domain(&self) -> EventDomain {
        match self {
            Self::StartCommand | Self::VoiceReceived { .. } => EventDomain::Transport,
            Self::TranscriptionFailed { .. } | Self::SpeechFailed { .. } => EventDomain::Speech,
            Self::AnswerSent { .. } | Self::AssistantFailed { .. } => EventDomain::Assistant,
            Self::ElicitationStarted
            | Self::FollowUpAsked { .. }
            | Self::ValuesSaved { .. }
            | Self::ElicitationExhausted { .. }
            | Self::ElicitationFailed { .. } => EventDomain::Dialogue,
            Self::PhotoAnalyzed { .. } => EventDomain::Vision,
        }
    }
}

/// A row of the analytics log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub id: i64,
    pub user_key: UserKey,
    pub domain: String,
    pub event_type: String,
    pub seq: i64,
    pub payload_json: String,
    pub occurred_at: String,
}

impl AnalyticsEvent {
    /// Parses the stored payload back into its typed form.
    pub fn payload(&self) -> Result<EventPayload, serde_json::Error> {
        serde_json::from_str(&self.payload_json)
    }
}
