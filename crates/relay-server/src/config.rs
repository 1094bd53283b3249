//! Server configuration loading from file and environment variables.

use relay_oracle::OpenAiConfig;
use relay_types::VoiceProfile;
use relay_values::DialogueSettings;
use serde::Deserialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Hosted model API access.
    #[serde(default)]
    pub openai: OpenAiConfig,

    #[serde(default)]
    pub assistant: AssistantConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Values elicitation tunables.
    #[serde(default)]
    pub dialogue: DialogueConfig,

    /// Voice used for spoken replies.
    #[serde(default)]
    pub voice: VoiceProfile,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "relay_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// The persistent assistant answering free-form questions.
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantConfig {
    /// Reuse an existing assistant instead of creating one on startup.
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default = "default_assistant_name")]
    pub name: String,

    #[serde(default = "default_assistant_instructions")]
    pub instructions: String,
}

/// How updates reach the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelegramMode {
    /// Long-poll `getUpdates`.
    #[default]
    Polling,
    /// Telegram posts updates to `POST /telegram/webhook`.
    Webhook,
}

impl std::str::FromStr for TelegramMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "polling" => Ok(Self::Polling),
            "webhook" => Ok(Self::Webhook),
            other => Err(ConfigError::Invalid(format!(
                "unknown telegram mode '{other}', expected 'polling' or 'webhook'"
            ))),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,

    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,

    #[serde(default)]
    pub mode: TelegramMode,

    /// Public URL registered with `setWebhook` in webhook mode.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Expected `X-Telegram-Bot-Api-Secret-Token` header value.
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Long-poll timeout for `getUpdates`, in seconds.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("mode", &self.mode)
            .field("webhook_url", &self.webhook_url)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DialogueConfig {
    /// Follow-up questions per elicitation.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_min_answer_chars")]
    pub min_answer_chars: usize,

    #[serde(default = "default_oracle_timeout_secs")]
    pub oracle_timeout_secs: u64,

    /// Keep in-progress elicitations in SQLite so they survive a restart.
    #[serde(default = "default_true")]
    pub persist_sessions: bool,
}

impl DialogueConfig {
    pub fn settings(&self) -> DialogueSettings {
        DialogueSettings {
            max_attempts: self.max_attempts,
            min_answer_chars: self.min_answer_chars,
            oracle_timeout: Duration::from_secs(self.oracle_timeout_secs),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "relay.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_assistant_name() -> String {
    "Persistent Assistant".to_string()
}

fn default_assistant_instructions() -> String {
    "Отвечай на вопросы кратко и по существу.".to_string()
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_min_answer_chars() -> usize {
    relay_values::MIN_ANSWER_CHARS
}

fn default_oracle_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            id: None,
            name: default_assistant_name(),
            instructions: default_assistant_instructions(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: default_telegram_api_base(),
            mode: TelegramMode::default(),
            webhook_url: None,
            webhook_secret: None,
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_answer_chars: default_min_answer_chars(),
            oracle_timeout_secs: default_oracle_timeout_secs(),
            persist_sessions: true,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration is complete but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Checks the settings the relay cannot start without.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first missing or bad setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "telegram.bot_token is empty (set BOT_TOKEN)".to_string(),
            ));
        }
        if self.openai.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "openai.api_key is empty (set OPENAI_API_KEY)".to_string(),
            ));
        }
        if self.telegram.mode == TelegramMode::Webhook && self.telegram.webhook_url.is_none() {
            tracing::warn!("webhook mode without telegram.webhook_url; the webhook must be registered externally");
        }
        if self.dialogue.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "dialogue.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads configuration from a TOML file, falling back to defaults, then
/// applies environment overrides.
///
/// Environment variable overrides:
/// - `RELAY_HOST`, `RELAY_PORT` override `server.host` / `server.port`
/// - `RELAY_DB_PATH` overrides `database.path`
/// - `RELAY_LOG_LEVEL`, `RELAY_LOG_JSON` override `logging.level` / `logging.json`
/// - `OPENAI_API_KEY`, `OPENAI_BASE_URL` override `openai.api_key` / `openai.base_url`
/// - `BOT_TOKEN` overrides `telegram.bot_token`
/// - `RELAY_TELEGRAM_MODE` overrides `telegram.mode` (`polling` or `webhook`)
/// - `RELAY_WEBHOOK_SECRET` overrides `telegram.webhook_secret`
/// - `RELAY_MAX_ATTEMPTS` overrides `dialogue.max_attempts`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Applies overrides looked up by variable name.
///
/// # Errors
///
/// Returns `ConfigError::Invalid` for an unknown `RELAY_TELEGRAM_MODE`.
pub fn apply_overrides(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(host) = lookup("RELAY_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("RELAY_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(db_path) = lookup("RELAY_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = lookup("RELAY_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("RELAY_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(key) = lookup("OPENAI_API_KEY") {
        config.openai.api_key = key;
    }
    if let Some(url) = lookup("OPENAI_BASE_URL") {
        config.openai.base_url = url;
    }
    if let Some(token) = lookup("BOT_TOKEN") {
        config.telegram.bot_token = token;
    }
    if let Some(mode) = lookup("RELAY_TELEGRAM_MODE") {
        config.telegram.mode = mode.parse()?;
    }
    if let Some(secret) = lookup("RELAY_WEBHOOK_SECRET") {
        config.telegram.webhook_secret = Some(secret).filter(|s| !s.is_empty());
    }
    if let Some(attempts) = lookup("RELAY_MAX_ATTEMPTS") {
        if let Ok(parsed) = attempts.parse() {
            config.dialogue.max_attempts = parsed;
        }
    }
    Ok(())
}
