use relay_oracle::OracleError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("Mood analysis error: {0}")]
    Mood(String),

    #[error("hosted API error: {0}")]
    Oracle(#[from] OracleError),
}
