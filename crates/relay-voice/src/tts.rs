use crate::error::VoiceError;
use relay_oracle::{OpenAiClient, OracleError};
use relay_types::voice::{VoiceProfile, VOICES};

/// Maximum input length of the hosted speech endpoint, in characters.
const MAX_TTS_INPUT_CHARS: usize = 4096;

const MIN_SPEED: f32 = 0.25;
const MAX_SPEED: f32 = 4.0;

/// Service for generating speech from text.
#[derive(Debug, Clone)]
pub struct TtsService {
    client: OpenAiClient,
    profile: VoiceProfile,
}

impl TtsService {
    /// Creates a `TtsService` speaking with `profile`.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Config`] for an unknown voice or an out-of-range speed.
    pub fn new(client: OpenAiClient, profile: VoiceProfile) -> Result<Self, VoiceError> {
        if !profile.has_known_voice() {
            return Err(VoiceError::Config(format!(
                "unknown voice '{}', expected one of: {}",
                profile.voice,
                VOICES.join(", ")
            )));
        }
        if !(MIN_SPEED..=MAX_SPEED).contains(&profile.speed) {
            return Err(VoiceError::Config(format!(
                "Speed must be between {MIN_SPEED} and {MAX_SPEED}"
            )));
        }
        Ok(Self { client, profile })
    }

    pub fn profile(&self) -> &VoiceProfile {
        &self.profile
    }

    /// Synthesizes `text`, returning audio in the profile's container format.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, VoiceError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VoiceError::Tts("text is empty".to_string()));
        }
        let chars = text.chars().count();
        if chars > MAX_TTS_INPUT_CHARS {
            return Err(VoiceError::Tts(format!(
                "text exceeds maximum size: {chars} characters (limit: {MAX_TTS_INPUT_CHARS})"
            )));
        }

        match self.client.speech(text, &self.profile).await {
            Ok(audio) => {
                tracing::debug!(voice = %self.profile.voice, chars, bytes = audio.len(), "synthesized speech");
                Ok(audio)
            }
            Err(OracleError::EmptyResponse) => {
                Err(VoiceError::Tts("speech endpoint returned no audio".to_string()))
            }
            Err(e) => Err(VoiceError::Oracle(e)),
        }
    }
}
