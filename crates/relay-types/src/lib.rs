//! Shared types for the voice relay.
//!
//! This crate holds the small vocabulary every other relay crate speaks:
//! the platform user key, chat roles and messages replayed to the language
//! model, and the voice profile used for speech synthesis.
//!
//! No crate in the workspace depends on anything *except* `relay-types` for
//! cross-cutting type definitions.

pub mod voice;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use voice::{VoiceProfile, VOICES};

/// Opaque, stable identifier of an end user as assigned by the chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserKey(pub i64);

impl UserKey {
    /// Returns the raw platform id.
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserKey {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Error returned when parsing a user key from a non-numeric string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid user key: {0}")]
pub struct ParseUserKeyError(pub String);

impl FromStr for UserKey {
    type Err = ParseUserKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| ParseUserKeyError(s.to_string()))
    }
}

/// Author of a single conversational turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user.
    User,
    /// The relay speaking on its own behalf.
    Assistant,
}

impl Role {
    /// Returns the wire label used by chat-completion APIs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One entry of a replayable conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
