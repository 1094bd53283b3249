//! API handlers for the relay server.

use crate::telegram::Update;
use crate::AppState;
use axum::{
    extract::{Extension, Json, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use relay_observe::{query_events, AnalyticsEvent, EventDomain, EventFilter};
use relay_types::UserKey;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Header Telegram uses to echo the secret given to `setWebhook`.
pub const SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match self {
            ApiError::BadRequest(msg) | ApiError::InternalServerError(msg) => msg,
            ApiError::Unauthorized => "unauthorized".to_string(),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Handler for `POST /telegram/webhook`.
///
/// Acknowledges immediately; the update is handled by the user's worker.
pub async fn webhook_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> Result<StatusCode, ApiError> {
    if let Some(expected) = &state.webhook_secret {
        let provided = headers
            .get(SECRET_HEADER)
            .and_then(|value| value.to_str().ok());
        if provided != Some(expected.as_str()) {
            tracing::warn!(update_id = update.update_id, "webhook call with bad secret");
            return Err(ApiError::Unauthorized);
        }
    }

    state.dispatcher.dispatch(update);
    Ok(StatusCode::OK)
}

/// Query parameters for `GET /api/events`.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub user_key: Option<i64>,
    pub domain: Option<String>,
    pub event_type: Option<String>,
    pub after_seq: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventsResponse {
    pub events: Vec<AnalyticsEvent>,
    pub count: usize,
}

/// Handler for `GET /api/events`.
pub async fn get_events_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let domain = params
        .domain
        .as_deref()
        .map(|d| {
            d.parse::<EventDomain>().map_err(|_| {
                ApiError::BadRequest(format!(
                    "invalid domain: {d}. Expected one of: TRANSPORT, SPEECH, ASSISTANT, DIALOGUE, VISION"
                ))
            })
        })
        .transpose()?;

    let filter = EventFilter {
        user_key: params.user_key.map(UserKey),
        domain,
        event_type: params.event_type,
        after_seq: params.after_seq,
        limit: params.limit,
    };

    let pool = state.pool.clone();
    let events = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(|e| e.to_string())?;
        query_events(&conn, &filter).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {e}")))?
    .map_err(ApiError::InternalServerError)?;

    let count = events.len();
    Ok(Json(EventsResponse { events, count }))
}
