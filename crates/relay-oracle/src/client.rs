//! HTTP client for the hosted model API.

use async_trait::async_trait;
use relay_types::{Role, VoiceProfile};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::chat::{ChatOracle, ChatRequest};
use crate::config::OpenAiConfig;
use crate::error::OracleError;

/// Upper bound on error bodies carried inside [`OracleError::Status`].
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Shared handle to the hosted API. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: Arc<OpenAiConfig>,
    http: Client,
}

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: WireContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct SpeechBody<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
    response_format: &'a str,
}

impl OpenAiClient {
    /// Builds the client. Call once at startup and clone the handle.
    ///
    /// # Errors
    ///
    /// Returns `OracleError::Config` if the HTTP client cannot be built.
    pub fn new(config: OpenAiConfig) -> Result<Self, OracleError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| OracleError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    pub(crate) fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(self.url(path))
            .bearer_auth(&self.config.api_key)
    }

    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(self.url(path))
            .bearer_auth(&self.config.api_key)
    }

    pub(crate) fn delete(&self, path: &str) -> RequestBuilder {
        self.http
            .delete(self.url(path))
            .bearer_auth(&self.config.api_key)
    }

    /// Sends a request, mapping transport failures and non-2xx statuses.
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Response, OracleError> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(OracleError::Status {
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        })
    }

    pub(crate) async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, OracleError> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| OracleError::Parse(e.to_string()))
    }

    fn transport_error(&self, err: reqwest::Error) -> OracleError {
        if err.is_timeout() {
            OracleError::Timeout(self.config.timeout())
        } else {
            OracleError::Transport(err.to_string())
        }
    }

    /// Runs one chat completion and returns the first choice's trimmed text.
    ///
    /// # Errors
    ///
    /// Returns `OracleError::EmptyResponse` when the model produced no text.
    pub async fn chat(&self, request: &ChatRequest) -> Result<String, OracleError> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(WireMessage {
                role: "system",
                content: WireContent::Text(system),
            });
        }
        for message in &request.messages {
            messages.push(WireMessage {
                role: message.role.as_str(),
                content: WireContent::Text(&message.content),
            });
        }

        let body = CompletionBody {
            model: request.model.as_deref().unwrap_or(&self.config.chat_model),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        self.complete_body(&body).await
    }

    /// Asks a vision-capable model about the image at `image_url`.
    pub async fn describe_image(
        &self,
        prompt: &str,
        image_url: &str,
        max_tokens: u32,
    ) -> Result<String, OracleError> {
        let body = CompletionBody {
            model: &self.config.vision_model,
            messages: vec![WireMessage {
                role: Role::User.as_str(),
                content: WireContent::Parts(vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: image_url },
                    },
                ]),
            }],
            temperature: None,
            max_tokens: Some(max_tokens),
        };

        self.complete_body(&body).await
    }

    async fn complete_body(&self, body: &CompletionBody<'_>) -> Result<String, OracleError> {
        tracing::debug!(
            model = body.model,
            messages = body.messages.len(),
            "sending chat completion"
        );

        let parsed: CompletionResponse = self
            .send_json(self.post("chat/completions").json(body))
            .await?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(OracleError::EmptyResponse)
    }

    /// Transcribes an audio file to plain text.
    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: &str,
    ) -> Result<String, OracleError> {
        let form = Form::new()
            .text("model", self.config.transcription_model.clone())
            .text("response_format", "text")
            .part("file", Part::bytes(audio).file_name(file_name.to_string()));

        let response = self
            .send(self.post("audio/transcriptions").multipart(form))
            .await?;
        let text = response
            .text()
            .await
            .map_err(|e| OracleError::Parse(e.to_string()))?;

        let text = text.trim();
        if text.is_empty() {
            return Err(OracleError::EmptyResponse);
        }
        Ok(text.to_string())
    }

    /// Synthesizes speech, returning the encoded audio container bytes.
    pub async fn speech(&self, text: &str, profile: &VoiceProfile) -> Result<Vec<u8>, OracleError> {
        let body = SpeechBody {
            model: &profile.model,
            input: text,
            voice: &profile.voice,
            speed: profile.speed,
            response_format: &profile.format,
        };

        let response = self.send(self.post("audio/speech").json(&body)).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| OracleError::Parse(e.to_string()))?;

        if bytes.is_empty() {
            return Err(OracleError::EmptyResponse);
        }
        Ok(bytes.to_vec())
    }

    /// Timeout applied to every request made through this client.
    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }
}

#[async_trait]
impl ChatOracle for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<String, OracleError> {
        self.chat(&request).await
    }
}
