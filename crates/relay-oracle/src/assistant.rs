//! Persistent hosted assistant used for free-form questions.
//!
//! The assistant is created once on startup and its id is kept inside the
//! [`Assistant`] handle for the lifetime of the process. Each question runs
//! in a throwaway thread that is deleted afterwards, whatever the outcome.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::client::OpenAiClient;
use crate::error::OracleError;

const BETA_HEADER: &str = "OpenAI-Beta";
const BETA_VALUE: &str = "assistants=v2";

/// Default delay between run status checks.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default number of status checks before giving up on a run.
const DEFAULT_MAX_POLLS: u32 = 120;

#[derive(Debug, Serialize)]
struct CreateAssistantBody<'a> {
    name: &'a str,
    instructions: &'a str,
    model: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateMessageBody<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRunBody<'a> {
    assistant_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Run {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<ThreadMessage>,
}

#[derive(Debug, Deserialize)]
struct ThreadMessage {
    role: String,
    #[serde(default)]
    content: Vec<MessageContent>,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    #[serde(default)]
    text: Option<MessageText>,
}

#[derive(Debug, Deserialize)]
struct MessageText {
    value: String,
}

/// Handle to an assistant that already exists on the hosted side.
#[derive(Debug, Clone)]
pub struct Assistant {
    client: OpenAiClient,
    id: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl Assistant {
    /// Creates a new hosted assistant and returns a handle to it.
    pub async fn create(
        client: OpenAiClient,
        name: &str,
        instructions: &str,
    ) -> Result<Self, OracleError> {
        let body = CreateAssistantBody {
            name,
            instructions,
            model: &client.config().assistant_model,
        };
        let created: Created = client
            .send_json(
                client
                    .post("assistants")
                    .header(BETA_HEADER, BETA_VALUE)
                    .json(&body),
            )
            .await?;

        tracing::info!(assistant_id = %created.id, "created hosted assistant");
        Ok(Self::from_id(client, created.id))
    }

    /// Wraps an assistant id created earlier (for example, from configuration).
    pub fn from_id(client: OpenAiClient, id: impl Into<String>) -> Self {
        Self {
            client,
            id: id.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Asks one question in a fresh thread.
    ///
    /// Returns `Ok(None)` when the run completed but produced no assistant
    /// message. The thread is deleted on every exit path.
    pub async fn ask(&self, question: &str) -> Result<Option<String>, OracleError> {
        let thread: Created = self
            .client
            .send_json(self.client.post("threads").header(BETA_HEADER, BETA_VALUE))
            .await?;

        let answer = self.ask_in_thread(&thread.id, question).await;

        if let Err(e) = self
            .client
            .send(
                self.client
                    .delete(&format!("threads/{}", thread.id))
                    .header(BETA_HEADER, BETA_VALUE),
            )
            .await
        {
            tracing::warn!(thread_id = %thread.id, error = %e, "failed to delete assistant thread");
        }

        answer
    }

    async fn ask_in_thread(
        &self,
        thread_id: &str,
        question: &str,
    ) -> Result<Option<String>, OracleError> {
        let message = CreateMessageBody {
            role: "user",
            content: question,
        };
        self.client
            .send(
                self.client
                    .post(&format!("threads/{thread_id}/messages"))
                    .header(BETA_HEADER, BETA_VALUE)
                    .json(&message),
            )
            .await?;

        let mut run: Run = self
            .client
            .send_json(
                self.client
                    .post(&format!("threads/{thread_id}/runs"))
                    .header(BETA_HEADER, BETA_VALUE)
                    .json(&CreateRunBody {
                        assistant_id: &self.id,
                    }),
            )
            .await?;

        let mut polls = 0;
        while matches!(run.status.as_str(), "queued" | "in_progress" | "cancelling") {
            if polls >= self.max_polls {
                return Err(OracleError::Timeout(self.poll_interval * self.max_polls));
            }
            polls += 1;
            tokio::time::sleep(self.poll_interval).await;
            run = self
                .client
                .send_json(
                    self.client
                        .get(&format!("threads/{thread_id}/runs/{}", run.id))
                        .header(BETA_HEADER, BETA_VALUE),
                )
                .await?;
        }

        if run.status != "completed" {
            return Err(OracleError::RunFailed(run.status));
        }

        let messages: MessageList = self
            .client
            .send_json(
                self.client
                    .get(&format!("threads/{thread_id}/messages"))
                    .header(BETA_HEADER, BETA_VALUE),
            )
            .await?;

        Ok(messages
            .data
            .into_iter()
            .find(|m| m.role == "assistant")
            .and_then(|m| m.content.into_iter().find_map(|c| c.text))
            .map(|text| text.value))
    }
}
