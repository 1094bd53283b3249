//! Voice relay server library.
//!
//! Exposes the application router, shared state and the Telegram-facing
//! pieces so the binary and integration tests build the same server.
//!
//! # Modules
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`config`] | TOML configuration with environment overrides |
//! | [`telegram`] | Bot API types and client, the [`telegram::ChatTransport`] seam |
//! | [`dispatch`] | One sequential worker per user |
//! | [`relay`] | What happens for a voice note, a photo, `/start` or plain text |
//! | [`background`] | Long-polling loop |
//! | [`api`] | HTTP handlers: webhook intake and the analytics query |

pub mod api;
pub mod background;
pub mod config;
pub mod dispatch;
pub mod relay;
pub mod telegram;

use axum::{
    extract::Extension,
    routing::{get, post},
    Json, Router,
};
use relay_db::DbPool;
use relay_observe::EventPayload;
use relay_types::UserKey;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::dispatch::Dispatcher;

/// Application state shared across request handlers.
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Routes webhook updates to per-user workers.
    pub dispatcher: Arc<Dispatcher>,
    /// Secret Telegram must echo on webhook calls, if configured.
    pub webhook_secret: Option<String>,
}

/// Records an analytics event without blocking the caller.
///
/// The insert runs on the blocking pool. Failures are logged as warnings
/// and never surface to the user turn that produced the event.
pub fn record_event(pool: &DbPool, user_key: UserKey, payload: EventPayload) {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let event_type = payload.event_type();
        let conn = match pool.get() {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(%user_key, event_type, "failed to get connection for analytics event: {}", e);
                return;
            }
        };
        if let Err(e) = relay_observe::emit_event(&conn, user_key, &payload) {
            tracing::warn!(
                %user_key,
                domain = payload.domain().as_str(),
                event_type,
                "failed to emit analytics event: {}",
                e
            );
        }
    });
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/telegram/webhook", post(api::webhook_handler))
        .route("/api/events", get(api::get_events_handler))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
