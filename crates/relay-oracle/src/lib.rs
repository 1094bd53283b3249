//! Hosted language-model access for the voice relay.
//!
//! One [`OpenAiClient`] is built at startup and handed to every service that
//! needs the hosted API: chat completions (through the [`ChatOracle`] seam
//! the dialogue engine depends on), speech transcription, speech synthesis,
//! image description, and the persistent [`Assistant`] that answers general
//! questions.
//!
//! Nothing here retries. Callers decide what an [`OracleError`] means for
//! them: the values classifier ends the elicitation, the follow-up generator
//! falls back to a canned question.

pub mod assistant;
pub mod chat;
pub mod client;
pub mod config;
pub mod error;

pub use assistant::Assistant;
pub use chat::{ChatOracle, ChatRequest};
pub use client::OpenAiClient;
pub use config::{OpenAiConfig, DEFAULT_BASE_URL};
pub use error::OracleError;
