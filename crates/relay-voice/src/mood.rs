//! Humorous one-line mood reading of a photo.

use crate::error::VoiceError;
use relay_oracle::{OpenAiClient, OracleError};

/// What the model answers when the photo shows no face.
pub const NO_FACE_MARKER: &str = "ЛИЦА НЕТ";

const MAX_TOKENS: u32 = 300;

const PROMPT: &str = "Определи настроение человека на фото и опиши его одним предложением \
на русском, с лёгким юмором, без пошлости, грубости и стереотипов о внешности. \
Если на фото нет лица, ответь ровно 'ЛИЦА НЕТ'.\n\
Примеры: \"Настроение: как у кота, который разбил вазу и надеется, что никто не заметил\"; \
\"На лице написано: кофе закончился, а день только начинается\".";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoodReading {
    Mood(String),
    NoFace,
}

impl MoodReading {
    /// Interprets the model's reply.
    pub fn from_reply(reply: &str) -> Self {
        let normalized: String = reply
            .trim()
            .trim_matches(|c: char| matches!(c, '\'' | '"' | '«' | '»' | '.' | '!'))
            .to_uppercase();
        if normalized.starts_with(NO_FACE_MARKER) {
            Self::NoFace
        } else {
            Self::Mood(reply.trim().to_string())
        }
    }

    pub fn face_found(&self) -> bool {
        matches!(self, Self::Mood(_))
    }
}

#[derive(Debug, Clone)]
pub struct MoodService {
    client: OpenAiClient,
}

impl MoodService {
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }

    /// Reads the mood of the person in the photo at `photo_url`.
    pub async fn analyze(&self, photo_url: &str) -> Result<MoodReading, VoiceError> {
        if photo_url.trim().is_empty() {
            return Err(VoiceError::Mood("photo url is empty".to_string()));
        }

        match self.client.describe_image(PROMPT, photo_url, MAX_TOKENS).await {
            Ok(reply) => {
                let reading = MoodReading::from_reply(&reply);
                tracing::debug!(face_found = reading.face_found(), "analyzed photo mood");
                Ok(reading)
            }
            Err(OracleError::EmptyResponse) => {
                Err(VoiceError::Mood("vision model returned no text".to_string()))
            }
            Err(e) => Err(VoiceError::Oracle(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_face_marker_is_recognised_loosely() {
        assert_eq!(MoodReading::from_reply("ЛИЦА НЕТ"), MoodReading::NoFace);
        assert_eq!(MoodReading::from_reply(" 'Лица нет.' "), MoodReading::NoFace);
    }

    #[test]
    fn other_replies_are_moods() {
        let reading = MoodReading::from_reply("  Выглядишь как человек, нашедший зарядку с первого раза \n");
        assert_eq!(
            reading,
            MoodReading::Mood("Выглядишь как человек, нашедший зарядку с первого раза".to_string())
        );
        assert!(reading.face_found());
    }
}
