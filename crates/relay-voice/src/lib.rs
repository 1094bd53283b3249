//! Voice and vision services for the relay.
//!
//! Speech recognition, speech synthesis and photo mood reading are all
//! single calls to the hosted model API through [`relay_oracle::OpenAiClient`].
//! This crate adds the input limits, profile validation and reply
//! interpretation around those calls.

pub mod error;
pub mod mood;
pub mod stt;
pub mod tts;

pub use error::VoiceError;
pub use mood::{MoodReading, MoodService, NO_FACE_MARKER};
pub use stt::SttService;
pub use tts::TtsService;
