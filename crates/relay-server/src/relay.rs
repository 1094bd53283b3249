//! Orchestration of one incoming Telegram update.
//!
//! Voice notes are the main path: transcribe, let the values dialogue take
//! the turn if an elicitation is in progress, otherwise ask the assistant
//! and speak its answer, then possibly open an elicitation. Photos get a
//! mood reading. Everything else gets a short canned reply.

use async_trait::async_trait;
use relay_db::DbPool;
use relay_observe::EventPayload;
use relay_oracle::Assistant;
use relay_types::UserKey;
use relay_values::{DialogueEngine, TurnOutcome};
use relay_voice::{MoodReading, MoodService, SttService, TtsService};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use crate::dispatch::{update_user_key, UpdateHandler};
use crate::record_event;
use crate::telegram::{escape_html, ChatTransport, Message, ParseMode, Update};

pub const VOICE_ONLY_NOTICE: &str = "Отвечаю только на голосовые вопросы!";
pub const WAIT_NOTICE: &str = "Секундочку, сейчас отвечу";
pub const RECOGNITION_FAILED_NOTICE: &str = "Не удалось распознать голосовое сообщение.";
pub const ASSISTANT_FAILED_NOTICE: &str = "Ошибка при получении ответа от ассистента.";
pub const SPEECH_FAILED_NOTICE: &str = "Ошибка при генерации аудио.";
pub const NO_FACE_NOTICE: &str = "На фото не видно лица. Пришли фото, где хорошо видно лицо.";
pub const PHOTO_FAILED_NOTICE: &str = "Не удалось проанализировать фото.";

/// Greeting sent in reply to `/start`, in Telegram HTML.
pub fn greeting(first_name: &str) -> String {
    format!(
        "Привет! <b>{}</b>\nЯ отвечу на твои вопросы! Только голосовые!!!",
        escape_html(first_name)
    )
}

pub struct Relay {
    transport: Arc<dyn ChatTransport>,
    stt: SttService,
    tts: TtsService,
    mood: MoodService,
    assistant: Assistant,
    engine: Arc<DialogueEngine>,
    pool: DbPool,
}

impl Relay {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        stt: SttService,
        tts: TtsService,
        mood: MoodService,
        assistant: Assistant,
        engine: Arc<DialogueEngine>,
        pool: DbPool,
    ) -> Self {
        Self {
            transport,
            stt,
            tts,
            mood,
            assistant,
            engine,
            pool,
        }
    }

    /// Handles one update to completion. Never fails: every error ends as a
    /// notice to the user and a log line.
    pub async fn handle(&self, update: Update) {
        let Some(user_key) = update_user_key(&update) else {
            return;
        };
        let Some(message) = update.message else {
            return;
        };

        let span = tracing::info_span!(
            "update",
            update_id = update.update_id,
            %user_key,
            correlation_id = %Uuid::new_v4(),
        );
        self.route(user_key, message).instrument(span).await;
    }

    async fn route(&self, user_key: UserKey, message: Message) {
        let chat_id = message.chat.id;

        if message.is_start_command() {
            let first_name = message
                .from
                .as_ref()
                .map(|user| user.first_name.as_str())
                .unwrap_or_default();
            self.send_text(chat_id, &greeting(first_name), Some(ParseMode::Html))
                .await;
            self.event(user_key, EventPayload::StartCommand);
        } else if let Some(voice) = &message.voice {
            self.event(
                user_key,
                EventPayload::VoiceReceived {
                    duration_secs: voice.duration,
                },
            );
            self.on_voice(user_key, chat_id, &voice.file_id).await;
        } else if let Some(photo) = message.largest_photo() {
            self.on_photo(user_key, chat_id, &photo.file_id).await;
        } else if message.text.is_some() {
            self.send_text(chat_id, VOICE_ONLY_NOTICE, None).await;
        } else {
            tracing::debug!("ignoring message without text, voice or photo");
        }
    }

    async fn on_voice(&self, user_key: UserKey, chat_id: i64, file_id: &str) {
        self.send_text(chat_id, WAIT_NOTICE, None).await;

        let Some(question) = self.transcribe(user_key, file_id).await else {
            self.send_text(chat_id, RECOGNITION_FAILED_NOTICE, None).await;
            return;
        };
        tracing::info!(chars = question.chars().count(), "voice note transcribed");

        let outcome = self.engine.handle_utterance(user_key, &question).await;
        if outcome != TurnOutcome::NotCollecting {
            if let Some(notice) = outcome.notice() {
                self.speak_or_write(chat_id, notice).await;
            }
            self.event(user_key, outcome_event(&outcome));
            return;
        }

        self.answer(user_key, chat_id, &question).await;

        if let Some(seed) = self.engine.begin_if_needed(user_key).await {
            self.speak_or_write(chat_id, &seed).await;
            self.event(user_key, EventPayload::ElicitationStarted);
        }
    }

    async fn transcribe(&self, user_key: UserKey, file_id: &str) -> Option<String> {
        let audio = match self.transport.download_file(file_id).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(error = %e, "failed to download voice note");
                self.event(
                    user_key,
                    EventPayload::TranscriptionFailed {
                        reason: "download".to_string(),
                    },
                );
                return None;
            }
        };

        match self.stt.transcribe(&audio).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(error = %e, "speech recognition failed");
                self.event(
                    user_key,
                    EventPayload::TranscriptionFailed {
                        reason: e.to_string(),
                    },
                );
                None
            }
        }
    }

    async fn answer(&self, user_key: UserKey, chat_id: i64, question: &str) {
        let answer = match self.assistant.ask(question).await {
            Ok(Some(answer)) => answer,
            Ok(None) => {
                tracing::warn!("assistant run produced no answer");
                self.event(
                    user_key,
                    EventPayload::AssistantFailed {
                        reason: "empty".to_string(),
                    },
                );
                self.send_text(chat_id, ASSISTANT_FAILED_NOTICE, None).await;
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, kind = e.kind(), "assistant request failed");
                self.event(
                    user_key,
                    EventPayload::AssistantFailed {
                        reason: e.kind().to_string(),
                    },
                );
                self.send_text(chat_id, ASSISTANT_FAILED_NOTICE, None).await;
                return;
            }
        };

        match self.tts.synthesize(&answer).await {
            Ok(audio) => {
                self.send_voice(chat_id, audio).await;
                self.event(
                    user_key,
                    EventPayload::AnswerSent {
                        question_chars: question.chars().count(),
                        answer_chars: answer.chars().count(),
                    },
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "speech synthesis failed");
                self.event(
                    user_key,
                    EventPayload::SpeechFailed {
                        reason: e.to_string(),
                    },
                );
                self.send_text(chat_id, SPEECH_FAILED_NOTICE, None).await;
            }
        }
    }

    async fn on_photo(&self, user_key: UserKey, chat_id: i64, file_id: &str) {
        let reading = match self.transport.file_url(file_id).await {
            Ok(url) => self.mood.analyze(&url).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match reading {
            Ok(MoodReading::Mood(text)) => {
                self.send_text(chat_id, &text, None).await;
                self.event(user_key, EventPayload::PhotoAnalyzed { face_found: true });
            }
            Ok(MoodReading::NoFace) => {
                self.send_text(chat_id, NO_FACE_NOTICE, None).await;
                self.event(user_key, EventPayload::PhotoAnalyzed { face_found: false });
            }
            Err(e) => {
                tracing::warn!(error = %e, "photo analysis failed");
                self.send_text(chat_id, PHOTO_FAILED_NOTICE, None).await;
            }
        }
    }

    /// Speaks `text`, falling back to a text message when synthesis fails.
    async fn speak_or_write(&self, chat_id: i64, text: &str) {
        match self.tts.synthesize(text).await {
            Ok(audio) => self.send_voice(chat_id, audio).await,
            Err(e) => {
                tracing::warn!(error = %e, "speech synthesis failed, sending text");
                self.send_text(chat_id, text, None).await;
            }
        }
    }

    async fn send_text(&self, chat_id: i64, text: &str, parse_mode: Option<ParseMode>) {
        if let Err(e) = self.transport.send_text(chat_id, text, parse_mode).await {
            tracing::warn!(chat_id, error = %e, "failed to send text message");
        }
    }

    async fn send_voice(&self, chat_id: i64, audio: Vec<u8>) {
        if let Err(e) = self.transport.send_voice(chat_id, audio).await {
            tracing::warn!(chat_id, error = %e, "failed to send voice message");
        }
    }

    fn event(&self, user_key: UserKey, payload: EventPayload) {
        record_event(&self.pool, user_key, payload);
    }
}

#[async_trait]
impl UpdateHandler for Relay {
    async fn handle_update(&self, update: Update) {
        self.handle(update).await;
    }
}

/// Analytics event describing a dialogue turn that the engine consumed.
pub fn outcome_event(outcome: &TurnOutcome) -> EventPayload {
    match outcome {
        TurnOutcome::FollowUp {
            attempt, fallback, ..
        } => EventPayload::FollowUpAsked {
            attempt: *attempt,
            fallback: *fallback,
        },
        TurnOutcome::Saved { values } => EventPayload::ValuesSaved {
            count: values.len(),
        },
        TurnOutcome::Exhausted { attempts } => EventPayload::ElicitationExhausted {
            attempts: *attempts,
        },
        TurnOutcome::AlreadyRecorded => EventPayload::ElicitationFailed {
            kind: "already_recorded".to_string(),
        },
        TurnOutcome::Failed(e) => EventPayload::ElicitationFailed {
            kind: e.kind().to_string(),
        },
        TurnOutcome::NotCollecting => EventPayload::ElicitationFailed {
            kind: "not_collecting".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_oracle::OracleError;
    use relay_values::ElicitationError;

    #[test]
    fn greeting_escapes_name() {
        assert_eq!(
            greeting("<Аня>"),
            "Привет! <b>&lt;Аня&gt;</b>\nЯ отвечу на твои вопросы! Только голосовые!!!"
        );
    }

    #[test]
    fn outcomes_map_to_dialogue_events() {
        assert_eq!(
            outcome_event(&TurnOutcome::FollowUp {
                question: "?".to_string(),
                attempt: 2,
                fallback: true,
            }),
            EventPayload::FollowUpAsked {
                attempt: 2,
                fallback: true
            }
        );
        assert_eq!(
            outcome_event(&TurnOutcome::Saved {
                values: vec!["семья".to_string(), "свобода".to_string()]
            }),
            EventPayload::ValuesSaved { count: 2 }
        );
        assert_eq!(
            outcome_event(&TurnOutcome::Failed(ElicitationError::OracleUnavailable(
                OracleError::EmptyResponse
            ))),
            EventPayload::ElicitationFailed {
                kind: "oracle_unavailable".to_string()
            }
        );
        assert_eq!(
            outcome_event(&TurnOutcome::Exhausted { attempts: 3 }),
            EventPayload::ElicitationExhausted { attempts: 3 }
        );
    }
}
