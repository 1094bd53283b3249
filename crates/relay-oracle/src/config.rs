use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Public endpoint of the hosted API.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_chat_model() -> String {
    "gpt-4o".to_string()
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model used for classification and follow-up questions.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    /// Model backing the persistent assistant.
    #[serde(default = "default_chat_model")]
    pub assistant_model: String,
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,
    #[serde(default = "default_chat_model")]
    pub vision_model: String,
    /// Per-request HTTP timeout in seconds. Default: 60.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            assistant_model: default_chat_model(),
            transcription_model: default_transcription_model(),
            vision_model: default_chat_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .field("assistant_model", &self.assistant_model)
            .field("transcription_model", &self.transcription_model)
            .field("vision_model", &self.vision_model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_api_key() {
        let config = OpenAiConfig::new("sk-secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: OpenAiConfig = serde_json::from_str(r#"{"api_key":"k"}"#).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.transcription_model, "whisper-1");
        assert_eq!(config.timeout(), Duration::from_secs(60));
    }
}
