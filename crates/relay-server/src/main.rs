//! Voice relay binary.
//!
//! Starts the Telegram relay with structured logging, database
//! initialization, either long polling or a webhook endpoint, and graceful
//! shutdown on SIGTERM/SIGINT.

use relay_oracle::{Assistant, OpenAiClient};
use relay_server::config::{self, TelegramMode};
use relay_server::dispatch::Dispatcher;
use relay_server::relay::Relay;
use relay_server::telegram::TelegramClient;
use relay_server::{app, background, AppState};
use relay_values::{
    DialogueEngine, InMemorySessionStore, SessionStore, SqliteSessionStore, SqliteValuesStore,
};
use relay_voice::{MoodService, SttService, TtsService};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("RELAY_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration; the relay cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    config
        .validate()
        .expect("invalid configuration; set BOT_TOKEN and OPENAI_API_KEY");

    // Initialize database
    let pool = relay_db::create_pool(
        &config.database.path,
        relay_db::DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )
    .expect("failed to create database pool; check database.path in config");

    {
        let conn = pool
            .get()
            .expect("failed to get database connection for migrations");
        let applied = relay_db::run_migrations(&conn).expect("failed to run database migrations");
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }
    }

    // Hosted model services
    let openai =
        OpenAiClient::new(config.openai.clone()).expect("failed to build the OpenAI client");

    let assistant = match &config.assistant.id {
        Some(id) => {
            tracing::info!(assistant_id = %id, "using configured assistant");
            Assistant::from_id(openai.clone(), id.clone())
        }
        None => Assistant::create(
            openai.clone(),
            &config.assistant.name,
            &config.assistant.instructions,
        )
        .await
        .expect("failed to create the hosted assistant"),
    };

    let stt = SttService::new(openai.clone());
    let tts = TtsService::new(openai.clone(), config.voice.clone())
        .expect("invalid voice configuration");
    let mood = MoodService::new(openai.clone());

    // Values dialogue
    let sessions: Arc<dyn SessionStore> = if config.dialogue.persist_sessions {
        Arc::new(SqliteSessionStore::new(pool.clone()))
    } else {
        Arc::new(InMemorySessionStore::new())
    };
    let engine = Arc::new(DialogueEngine::new(
        Arc::new(openai.clone()),
        Arc::new(SqliteValuesStore::new(pool.clone())),
        sessions,
        config.dialogue.settings(),
    ));

    // Telegram
    let telegram = TelegramClient::new(&config.telegram.api_base, &config.telegram.bot_token)
        .expect("failed to build the Telegram client");

    let relay = Relay::new(
        Arc::new(telegram.clone()),
        stt,
        tts,
        mood,
        assistant,
        engine,
        pool.clone(),
    );
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(relay)));

    let polling = match config.telegram.mode {
        TelegramMode::Polling => Some(tokio::spawn(background::start_polling_task(
            telegram.clone(),
            dispatcher.clone(),
            config.telegram.poll_timeout_secs,
        ))),
        TelegramMode::Webhook => {
            if let Some(url) = &config.telegram.webhook_url {
                telegram
                    .set_webhook(url, config.telegram.webhook_secret.as_deref())
                    .await
                    .expect("failed to register the Telegram webhook");
                tracing::info!(url = %url, "registered telegram webhook");
            }
            None
        }
    };

    // Build application
    let state = AppState {
        pool,
        dispatcher,
        webhook_secret: config.telegram.webhook_secret.clone(),
    };
    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, mode = ?config.telegram.mode, "starting voice relay");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address; is another process using this port?");

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    if let Some(handle) = polling {
        handle.abort();
    }

    tracing::info!("voice relay shut down");
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        () = interrupt => "SIGINT",
        () = terminate => "SIGTERM",
    };
    tracing::info!(signal, "shutting down, draining in-flight requests");
}
