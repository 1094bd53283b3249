//! Value classifier: asks the model whether an answer names concrete
//! personal values and extracts them.
//!
//! The model is instructed to reply with two plain-text lines: a verdict
//! (`VALID` or `INVALID`) and, for valid answers, the comma-separated
//! value phrases. [`parse_verdict`] turns that reply into a [`Verdict`].

use relay_oracle::{ChatOracle, ChatRequest, OracleError};
use relay_types::ChatMessage;
use std::sync::Arc;
use std::time::Duration;

/// Answers shorter than this (after trimming) are rejected without an oracle call.
pub const MIN_ANSWER_CHARS: usize = 5;

const TEMPERATURE: f32 = 0.2;

pub(crate) const SYSTEM_PROMPT: &str = "Ты проверяешь ответы людей о жизненных ценностях. \
Отвечай простым текстом без форматирования.";

/// Outcome of classifying an answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// The answer names values. Never empty.
    Valid(Vec<String>),
    /// The model judged that the answer names no values.
    Rejected,
    /// The model could not be asked or its reply timed out.
    Unavailable(OracleError),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// Extracted values; empty unless the verdict is valid.
    pub fn values(&self) -> &[String] {
        match self {
            Self::Valid(values) => values,
            _ => &[],
        }
    }

    /// The `(is_valid, values)` pair. Outages read as `(false, [])`.
    pub fn into_parts(self) -> (bool, Vec<String>) {
        match self {
            Self::Valid(values) => (true, values),
            _ => (false, Vec::new()),
        }
    }
}

fn build_prompt(answer: &str) -> String {
    format!(
        "Человека спросили: «Какие у тебя главные жизненные ценности?». Вот его ответ:\n\
         \n\
         ```\n\
         {answer}\n\
         ```\n\
         \n\
         Ответ корректен, если в нём названа хотя бы одна понятная жизненная ценность \
         (например: семья, здоровье, свобода, честность, любовь, знания, развитие) \
         и он относится к вопросу.\n\
         Ответ некорректен, если это бессмысленный набор слов, шутка, оскорбление, \
         или в нём нет ни одной ценности.\n\
         \n\
         Извлеки все названные ценности в виде отдельных слов или коротких фраз.\n\
         \n\
         Формат ответа:\n\
         Первая строка: VALID или INVALID.\n\
         Вторая строка: ценности через запятую (только для VALID)."
    )
}

/// Parses the two-line verdict reply.
///
/// The first non-empty line must start with `VALID` (quotes, asterisks and
/// colons ignored); anything else, including `INVALID`, is a rejection.
/// Values come from the next non-empty line. A valid verdict without any
/// value is downgraded to [`Verdict::Rejected`].
pub fn parse_verdict(reply: &str) -> Verdict {
    let mut lines = reply.lines().map(str::trim).filter(|l| !l.is_empty());

    let Some(first) = lines.next() else {
        return Verdict::Rejected;
    };
    let label: String = first
        .chars()
        .filter(|c| !matches!(c, '"' | '\'' | '*' | ':' | '«' | '»' | '`'))
        .collect::<String>()
        .trim()
        .to_uppercase();
    if !label.starts_with("VALID") {
        return Verdict::Rejected;
    }

    let values: Vec<String> = lines
        .next()
        .map(|line| {
            line.split(',')
                .map(|v| {
                    v.trim()
                        .trim_matches(|c: char| matches!(c, '"' | '\'' | '«' | '»' | '.'))
                        .trim()
                        .to_string()
                })
                .filter(|v| !v.is_empty())
                .collect()
        })
        .unwrap_or_default();

    if values.is_empty() {
        Verdict::Rejected
    } else {
        Verdict::Valid(values)
    }
}

/// Classifies answers through a [`ChatOracle`]. Never returns an error:
/// failures surface as [`Verdict::Unavailable`].
#[derive(Clone)]
pub struct ValueClassifier {
    oracle: Arc<dyn ChatOracle>,
    min_chars: usize,
    timeout: Duration,
}

impl ValueClassifier {
    pub fn new(oracle: Arc<dyn ChatOracle>, min_chars: usize, timeout: Duration) -> Self {
        Self {
            oracle,
            min_chars,
            timeout,
        }
    }

    pub async fn classify(&self, answer: &str) -> Verdict {
        let answer = answer.trim();
        if answer.chars().count() < self.min_chars {
            tracing::debug!(chars = answer.chars().count(), "answer too short to classify");
            return Verdict::Rejected;
        }

        let request = ChatRequest::new(vec![ChatMessage::user(build_prompt(answer))])
            .with_system(SYSTEM_PROMPT)
            .with_temperature(TEMPERATURE);

        let reply = match tokio::time::timeout(self.timeout, self.oracle.complete(request)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "value classifier call failed");
                return Verdict::Unavailable(e);
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "value classifier call timed out");
                return Verdict::Unavailable(OracleError::Timeout(self.timeout));
            }
        };

        let verdict = parse_verdict(&reply);
        tracing::debug!(valid = verdict.is_valid(), values = verdict.values().len(), "classified answer");
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_reply_yields_values() {
        let verdict = parse_verdict("VALID\nсемья, здоровье, личностный рост.");
        assert_eq!(
            verdict,
            Verdict::Valid(vec![
                "семья".to_string(),
                "здоровье".to_string(),
                "личностный рост".to_string()
            ])
        );
    }

    #[test]
    fn invalid_is_not_mistaken_for_valid() {
        assert_eq!(parse_verdict("INVALID\n"), Verdict::Rejected);
        assert_eq!(parse_verdict("INVALID\nсемья"), Verdict::Rejected);
    }

    #[test]
    fn valid_without_values_is_downgraded() {
        assert_eq!(parse_verdict("VALID"), Verdict::Rejected);
        assert_eq!(parse_verdict("VALID\n , ,"), Verdict::Rejected);
    }

    #[test]
    fn decorated_verdict_line_is_tolerated() {
        let verdict = parse_verdict("**Valid:**\n\n\"свобода\", «честность»");
        assert_eq!(verdict.values(), ["свобода", "честность"]);
    }

    #[test]
    fn unrecognised_reply_is_rejected() {
        assert_eq!(parse_verdict(""), Verdict::Rejected);
        assert_eq!(parse_verdict("Не знаю"), Verdict::Rejected);
    }

    #[test]
    fn outage_reads_as_not_valid() {
        let verdict = Verdict::Unavailable(OracleError::EmptyResponse);
        assert!(!verdict.is_valid());
        assert_eq!(verdict.into_parts(), (false, Vec::new()));
    }
}
