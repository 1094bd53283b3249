use std::time::Duration;
use thiserror::Error;

/// Failures talking to the hosted model API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    #[error("oracle transport error: {0}")]
    Transport(String),

    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),

    #[error("oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to parse oracle response: {0}")]
    Parse(String),

    #[error("oracle returned an empty response")]
    EmptyResponse,

    #[error("assistant run ended with status '{0}'")]
    RunFailed(String),

    #[error("invalid oracle configuration: {0}")]
    Config(String),
}

impl OracleError {
    /// Short machine-friendly label, used in logs and analytics payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Timeout(_) => "timeout",
            Self::Status { .. } => "status",
            Self::Parse(_) => "parse",
            Self::EmptyResponse => "empty_response",
            Self::RunFailed(_) => "run_failed",
            Self::Config(_) => "config",
        }
    }
}
