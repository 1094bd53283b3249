//! Background tasks for the relay server.
//!
//! Includes:
//! - Long polling Telegram for updates when no webhook is used.

use crate::dispatch::Dispatcher;
use crate::telegram::TelegramClient;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Next delay after a failed poll.
pub fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

/// Starts the long-polling task.
///
/// Runs until the task is aborted. Each received update is handed to the
/// dispatcher and the offset moves past it, so Telegram does not deliver
/// it again. Failed polls are retried with exponential back-off.
pub async fn start_polling_task(
    client: TelegramClient,
    dispatcher: Arc<Dispatcher>,
    timeout_secs: u64,
) {
    if let Err(e) = client.delete_webhook().await {
        tracing::warn!(error = %e, "failed to delete webhook before polling");
    }

    tracing::info!(timeout_secs, "starting telegram polling task");

    let mut offset: i64 = 0;
    let mut backoff = INITIAL_BACKOFF;

    loop {
        match client.get_updates(offset, timeout_secs).await {
            Ok(updates) => {
                backoff = INITIAL_BACKOFF;
                if !updates.is_empty() {
                    tracing::debug!(count = updates.len(), offset, "received updates");
                }
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    dispatcher.dispatch(update);
                }
            }
            Err(e) => {
                tracing::error!(error = %e, retry_in_secs = backoff.as_secs(), "failed to poll updates");
                sleep(backoff).await;
                backoff = next_backoff(backoff);
            }
        }
    }
}
