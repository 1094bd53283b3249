//! Telegram Bot API transport.
//!
//! Only the handful of methods the relay needs are modelled: update
//! retrieval (long polling or webhook registration), file lookup and
//! download, and sending text and voice messages.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Slack added to the long-poll timeout before the HTTP request gives up.
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Timeout for every non-polling request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// File name Telegram shows for synthesized replies.
const VOICE_FILE_NAME: &str = "response.ogg";

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("telegram request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("telegram api error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("telegram returned no file path for {0}")]
    MissingFilePath(String),

    #[error("telegram response carried no result")]
    MissingResult,

    #[error("failed to build telegram client: {0}")]
    Config(String),
}

/// One incoming update. Updates that are not messages carry `message: None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub voice: Option<Voice>,
    /// Available sizes of a photo, smallest first.
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
}

impl Message {
    /// True for a `/start` command, with or without a bot-name suffix.
    pub fn is_start_command(&self) -> bool {
        self.text
            .as_deref()
            .and_then(|text| text.split_whitespace().next())
            .map(|command| command == "/start" || command.starts_with("/start@"))
            .unwrap_or(false)
    }

    /// The highest-resolution size of an attached photo.
    pub fn largest_photo(&self) -> Option<&PhotoSize> {
        self.photo
            .as_ref()?
            .iter()
            .max_by_key(|size| size.width as u64 * size.height as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub file_id: String,
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct File {
    pub file_id: String,
    #[serde(default)]
    pub file_path: Option<String>,
}

/// Envelope around every Bot API response.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, TelegramError> {
        if !self.ok {
            return Err(TelegramError::Api {
                code: self.error_code.unwrap_or_default(),
                description: self
                    .description
                    .unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        self.result.ok_or(TelegramError::MissingResult)
    }
}

/// Formatting applied to an outgoing text message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Html,
}

impl ParseMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html => "HTML",
        }
    }
}

/// Outgoing side of the chat platform, as seen by the relay.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<(), TelegramError>;

    /// Sends an OGG/Opus voice note.
    async fn send_voice(&self, chat_id: i64, audio: Vec<u8>) -> Result<(), TelegramError>;

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, TelegramError>;

    /// A URL from which a third party can fetch the file.
    async fn file_url(&self, file_id: &str) -> Result<String, TelegramError>;
}

#[derive(Serialize)]
struct SendMessageBody<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

#[derive(Serialize)]
struct GetUpdatesBody<'a> {
    offset: i64,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Serialize)]
struct SetWebhookBody<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_token: Option<&'a str>,
    allowed_updates: &'a [&'a str],
}

const ALLOWED_UPDATES: &[&str] = &["message"];

/// Bot API client. Cloning is cheap.
#[derive(Clone)]
pub struct TelegramClient {
    http: Client,
    api_base: String,
    token: String,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("api_base", &self.api_base)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl TelegramClient {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Result<Self, TelegramError> {
        let http = Client::builder()
            .build()
            .map_err(|e| TelegramError::Config(e.to_string()))?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    fn download_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.token, file_path)
    }

    /// Sends a request and unwraps the response envelope. The token is part
    /// of every URL, so it is stripped from transport errors.
    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, TelegramError> {
        let response = request.send().await.map_err(|e| e.without_url())?;
        let envelope: ApiResponse<T> = response.json().await.map_err(|e| e.without_url())?;
        envelope.into_result()
    }

    /// Long-polls for updates newer than `offset`.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        let body = GetUpdatesBody {
            offset,
            timeout: timeout_secs,
            allowed_updates: ALLOWED_UPDATES,
        };
        let request = self
            .http
            .post(self.method_url("getUpdates"))
            .timeout(Duration::from_secs(timeout_secs) + POLL_GRACE)
            .json(&body);
        self.call(request).await
    }

    pub async fn get_file(&self, file_id: &str) -> Result<File, TelegramError> {
        let request = self
            .http
            .post(self.method_url("getFile"))
            .timeout(REQUEST_TIMEOUT)
            .json(&serde_json::json!({ "file_id": file_id }));
        self.call(request).await
    }

    async fn file_path(&self, file_id: &str) -> Result<String, TelegramError> {
        self.get_file(file_id)
            .await?
            .file_path
            .ok_or_else(|| TelegramError::MissingFilePath(file_id.to_string()))
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<(), TelegramError> {
        let body = SendMessageBody {
            chat_id,
            text,
            parse_mode: parse_mode.map(ParseMode::as_str),
        };
        let request = self
            .http
            .post(self.method_url("sendMessage"))
            .timeout(REQUEST_TIMEOUT)
            .json(&body);
        let _: serde_json::Value = self.call(request).await?;
        Ok(())
    }

    pub async fn send_voice_note(&self, chat_id: i64, audio: Vec<u8>) -> Result<(), TelegramError> {
        let part = Part::bytes(audio)
            .file_name(VOICE_FILE_NAME)
            .mime_str("audio/ogg")?;
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("voice", part);
        let request = self
            .http
            .post(self.method_url("sendVoice"))
            .timeout(REQUEST_TIMEOUT)
            .multipart(form);
        let _: serde_json::Value = self.call(request).await?;
        Ok(())
    }

    /// Registers the webhook Telegram will post updates to.
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), TelegramError> {
        let body = SetWebhookBody {
            url,
            secret_token: secret,
            allowed_updates: ALLOWED_UPDATES,
        };
        let request = self
            .http
            .post(self.method_url("setWebhook"))
            .timeout(REQUEST_TIMEOUT)
            .json(&body);
        let _: bool = self.call(request).await?;
        Ok(())
    }

    /// Removes any webhook so `getUpdates` is allowed.
    pub async fn delete_webhook(&self) -> Result<(), TelegramError> {
        let request = self
            .http
            .post(self.method_url("deleteWebhook"))
            .timeout(REQUEST_TIMEOUT);
        let _: bool = self.call(request).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<(), TelegramError> {
        self.send_message(chat_id, text, parse_mode).await
    }

    async fn send_voice(&self, chat_id: i64, audio: Vec<u8>) -> Result<(), TelegramError> {
        self.send_voice_note(chat_id, audio).await
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, TelegramError> {
        let path = self.file_path(file_id).await?;
        let response = self
            .http
            .get(self.download_url(&path))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| e.without_url())?
            .error_for_status()
            .map_err(|e| e.without_url())?;
        let bytes = response.bytes().await.map_err(|e| e.without_url())?;
        Ok(bytes.to_vec())
    }

    async fn file_url(&self, file_id: &str) -> Result<String, TelegramError> {
        let path = self.file_path(file_id).await?;
        Ok(self.download_url(&path))
    }
}

/// Escapes text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_voice_update() {
        let raw = r#"{
            "update_id": 42,
            "message": {
                "message_id": 7,
                "date": 1700000000,
                "chat": {"id": 555, "type": "private"},
                "from": {"id": 555, "is_bot": false, "first_name": "Аня"},
                "voice": {"file_id": "AwAD", "file_unique_id": "x", "duration": 4, "mime_type": "audio/ogg"}
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.chat.id, 555);
        assert_eq!(message.from.unwrap().first_name, "Аня");
        assert_eq!(message.voice.unwrap().duration, 4);
        assert!(message.text.is_none());
    }

    #[test]
    fn non_message_updates_parse() {
        let update: Update =
            serde_json::from_str(r#"{"update_id": 1, "edited_message": {}}"#).unwrap();
        assert!(update.message.is_none());
    }

    #[test]
    fn start_command_detection() {
        let mut message: Message = serde_json::from_str(
            r#"{"message_id": 1, "chat": {"id": 1}, "text": "/start"}"#,
        )
        .unwrap();
        assert!(message.is_start_command());
        message.text = Some("/start@relay_bot payload".to_string());
        assert!(message.is_start_command());
        message.text = Some("/starting".to_string());
        assert!(!message.is_start_command());
        message.text = Some("привет".to_string());
        assert!(!message.is_start_command());
    }

    #[test]
    fn largest_photo_is_selected() {
        let message: Message = serde_json::from_str(
            r#"{"message_id": 1, "chat": {"id": 1}, "photo": [
                {"file_id": "s", "width": 90, "height": 90},
                {"file_id": "l", "width": 1280, "height": 960},
                {"file_id": "m", "width": 320, "height": 240}
            ]}"#,
        )
        .unwrap();
        assert_eq!(message.largest_photo().unwrap().file_id, "l");
    }

    #[test]
    fn api_error_envelope_maps_to_error() {
        let envelope: ApiResponse<bool> = serde_json::from_str(
            r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#,
        )
        .unwrap();
        match envelope.into_result() {
            Err(TelegramError::Api { code, description }) => {
                assert_eq!(code, 401);
                assert_eq!(description, "Unauthorized");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn html_is_escaped() {
        assert_eq!(escape_html("<b>Tom & Jerry</b>"), "&lt;b&gt;Tom &amp; Jerry&lt;/b&gt;");
    }

    #[test]
    fn debug_hides_token() {
        let client = TelegramClient::new("https://api.telegram.org/", "123:secret").unwrap();
        assert!(!format!("{client:?}").contains("secret"));
        assert_eq!(
            client.method_url("getMe"),
            "https://api.telegram.org/bot123:secret/getMe"
        );
    }
}
