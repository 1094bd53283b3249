//! Clarifying questions for answers that named no values.

use relay_oracle::{ChatOracle, ChatRequest, OracleError};
use relay_types::ChatMessage;
use std::sync::Arc;
use std::time::Duration;

/// Canned questions used when the model cannot be reached, one per attempt.
/// Attempts past the end reuse the last entry.
pub const FALLBACK_QUESTIONS: [&str; 3] = [
    "Мне кажется, мы еще не до конца разобрались с твоими ценностями. Можешь, пожалуйста, назвать несколько конкретных вещей, которые для тебя действительно важны в жизни?",
    "Давай попробуем иначе. Какие принципы или идеалы ты считаешь самыми важными для себя?",
    "Пожалуйста, просто перечисли 3-5 своих главных жизненных ценностей.",
];

const TEMPERATURE: f32 = 0.7;

pub(crate) const SYSTEM_PROMPT: &str = "Ты эмпатичный голосовой ассистент. \
Ты помогаешь человеку сформулировать его жизненные ценности наводящими вопросами.";

const SPOKEN_NOTE: &str = "Твой вопрос будет озвучен голосом, поэтому он должен легко \
восприниматься на слух. Ответь только вопросом, без пояснений.";

/// Fallback question for a 1-based attempt index.
pub fn fallback_question(attempt: u32) -> &'static str {
    let index = (attempt.max(1) - 1) as usize;
    FALLBACK_QUESTIONS[index.min(FALLBACK_QUESTIONS.len() - 1)]
}

fn build_prompt(answers: &str, attempt: u32) -> String {
    let task = match attempt {
        0 | 1 => {
            "В этом ответе пока нет ясно названных жизненных ценностей. \
             Задай мягкий, открытый уточняющий вопрос, который поможет человеку их назвать."
        }
        2 => {
            "Ценности всё ещё не удалось определить. \
             Задай более направляющий вопрос и предложи несколько примеров ценностей \
             (семья, развитие, свобода, здоровье, дружба, честность)."
        }
        _ => {
            "Это последняя попытка. \
             Задай максимально прямой и конкретный вопрос: попроси назвать три-пять \
             самых важных ценностей."
        }
    };

    format!(
        "Человек отвечает на вопрос о своих жизненных ценностях. Все его ответы:\n\
         \n\
         ```\n\
         {answers}\n\
         ```\n\
         \n\
         {task}\n\
         \n\
         {SPOKEN_NOTE}"
    )
}

/// A clarifying question ready to be sent to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowUp {
    pub question: String,
    /// Set when the model failed and a canned question was used instead.
    pub fallback: Option<OracleError>,
}

impl FollowUp {
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Produces follow-up questions through a [`ChatOracle`]. Always yields a
/// question.
#[derive(Clone)]
pub struct FollowUpGenerator {
    oracle: Arc<dyn ChatOracle>,
    timeout: Duration,
}

impl FollowUpGenerator {
    pub fn new(oracle: Arc<dyn ChatOracle>, timeout: Duration) -> Self {
        Self { oracle, timeout }
    }

    /// `answers` holds every user answer of the elicitation so far; `attempt`
    /// is the 1-based index of the question being asked.
    pub async fn generate(&self, answers: &str, attempt: u32) -> FollowUp {
        let request = ChatRequest::new(vec![ChatMessage::user(build_prompt(answers, attempt))])
            .with_system(SYSTEM_PROMPT)
            .with_temperature(TEMPERATURE);

        let result = match tokio::time::timeout(self.timeout, self.oracle.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout(self.timeout)),
        };

        let result = result.and_then(|reply| match reply.trim() {
            "" => Err(OracleError::EmptyResponse),
            question => Ok(question.to_string()),
        });

        match result {
            Ok(question) => FollowUp {
                question,
                fallback: None,
            },
            Err(e) => {
                tracing::warn!(attempt, error = %e, "follow-up generation failed, using canned question");
                FollowUp {
                    question: fallback_question(attempt).to_string(),
                    fallback: Some(e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedReply(&'static str);

    #[async_trait]
    impl ChatOracle for FixedReply {
        async fn complete(&self, _request: ChatRequest) -> Result<String, OracleError> {
            Ok(self.0.to_string())
        }
    }

    fn generator(reply: &'static str) -> FollowUpGenerator {
        FollowUpGenerator::new(Arc::new(FixedReply(reply)), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn blank_reply_falls_back_like_an_error() {
        let follow_up = generator(" \n ").generate("не знаю", 2).await;
        assert_eq!(follow_up.question, FALLBACK_QUESTIONS[1]);
        assert_eq!(follow_up.fallback, Some(OracleError::EmptyResponse));
    }

    #[tokio::test]
    async fn generated_question_is_trimmed() {
        let follow_up = generator("  Что тебя вдохновляет?\n").generate("ну", 1).await;
        assert_eq!(follow_up.question, "Что тебя вдохновляет?");
        assert!(!follow_up.is_fallback());
    }

    #[test]
    fn fallback_index_is_clamped() {
        assert_eq!(fallback_question(1), FALLBACK_QUESTIONS[0]);
        assert_eq!(fallback_question(2), FALLBACK_QUESTIONS[1]);
        assert_eq!(fallback_question(3), FALLBACK_QUESTIONS[2]);
        assert_eq!(fallback_question(7), FALLBACK_QUESTIONS[2]);
        assert_eq!(fallback_question(0), FALLBACK_QUESTIONS[0]);
    }

    #[test]
    fn prompt_tone_depends_on_attempt() {
        let first = build_prompt("не знаю", 1);
        let second = build_prompt("не знаю", 2);
        let last = build_prompt("не знаю", 3);
        assert!(first.contains("мягкий"));
        assert!(second.contains("примеров"));
        assert!(last.contains("последняя попытка"));
        assert!(last.contains("не знаю"));
    }
}
