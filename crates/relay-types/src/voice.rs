//! Voice profile definitions.
//!
//! A `VoiceProfile` selects the hosted speech-synthesis voice, model and
//! output container used when the relay answers with audio.

use serde::{Deserialize, Serialize};

/// Voices accepted by the hosted speech endpoint.
pub const VOICES: &[&str] = &["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

/// A voice profile configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// Hosted voice name (one of [`VOICES`]).
    #[serde(default = "default_voice")]
    pub voice: String,
    /// Speech model (`tts-1` or `tts-1-hd`).
    #[serde(default = "default_model")]
    pub model: String,
    /// Speech speed multiplier (1.0 is normal).
    #[serde(default = "default_speed")]
    pub speed: f32,
    /// Output container. `opus` is what chat platforms play as a voice note.
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_voice() -> String {
    "alloy".to_string()
}

fn default_model() -> String {
    "tts-1".to_string()
}

fn default_speed() -> f32 {
    1.0
}

fn default_format() -> String {
    "opus".to_string()
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self {
            voice: default_voice(),
            model: default_model(),
            speed: default_speed(),
            format: default_format(),
        }
    }
}

impl VoiceProfile {
    /// Returns `true` when the voice is one the hosted endpoint knows.
    pub fn has_known_voice(&self) -> bool {
        VOICES.contains(&self.voice.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_is_known() {
        let profile = VoiceProfile::default();
        assert!(profile.has_known_voice());
        assert_eq!(profile.format, "opus");
    }

    #[test]
    fn unknown_voice_is_flagged() {
        let profile = VoiceProfile {
            voice: "robot".to_string(),
            ..VoiceProfile::default()
        };
        assert!(!profile.has_known_voice());
    }
}
