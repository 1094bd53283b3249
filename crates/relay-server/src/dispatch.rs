//! Per-user update dispatch.
//!
//! Each user with pending updates gets one worker task that handles that
//! user's updates strictly in arrival order. Different users run in
//! parallel. A worker that stays idle for the configured timeout retires:
//! under the map lock it either finds a late update still queued and keeps
//! going, or removes itself with an empty queue and exits. A replacement
//! worker therefore never overlaps with its predecessor.

use async_trait::async_trait;
use relay_types::UserKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::telegram::Update;

/// Default time a worker waits for the next update before exiting.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Something that processes one update to completion.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    async fn handle_update(&self, update: Update);
}

/// The user an update belongs to: the sender, or the chat when no sender
/// is attached.
pub fn update_user_key(update: &Update) -> Option<UserKey> {
    let message = update.message.as_ref()?;
    let id = message
        .from
        .as_ref()
        .map(|user| user.id)
        .unwrap_or(message.chat.id);
    Some(UserKey(id))
}

struct Worker {
    id: Uuid,
    tx: mpsc::UnboundedSender<Update>,
}

type WorkerMap = Arc<Mutex<HashMap<UserKey, Worker>>>;

fn lock(workers: &Mutex<HashMap<UserKey, Worker>>) -> MutexGuard<'_, HashMap<UserKey, Worker>> {
    // A panic while holding the lock leaves the map itself consistent.
    workers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct Dispatcher {
    handler: Arc<dyn UpdateHandler>,
    workers: WorkerMap,
    idle_timeout: Duration,
}

impl Dispatcher {
    pub fn new(handler: Arc<dyn UpdateHandler>) -> Self {
        Self::with_idle_timeout(handler, DEFAULT_IDLE_TIMEOUT)
    }

    pub fn with_idle_timeout(handler: Arc<dyn UpdateHandler>, idle_timeout: Duration) -> Self {
        Self {
            handler,
            workers: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout,
        }
    }

    /// Queues an update for its user's worker, starting one if needed.
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&self, update: Update) {
        let Some(user_key) = update_user_key(&update) else {
            tracing::debug!(update_id = update.update_id, "ignoring update without a message");
            return;
        };

        // Sending under the lock means a worker that has removed itself
        // can never receive another update.
        let mut workers = lock(&self.workers);
        let update = match workers.get(&user_key) {
            Some(worker) => match worker.tx.send(update) {
                Ok(()) => return,
                Err(mpsc::error::SendError(update)) => {
                    tracing::warn!(%user_key, "update worker is gone, starting a new one");
                    update
                }
            },
            None => update,
        };

        let worker = self.spawn_worker(user_key);
        if worker.tx.send(update).is_err() {
            tracing::error!(%user_key, "new update worker dropped its queue");
            return;
        }
        workers.insert(user_key, worker);
    }

    /// Number of users that currently have a worker.
    pub fn active_workers(&self) -> usize {
        lock(&self.workers).len()
    }

    fn spawn_worker(&self, user_key: UserKey) -> Worker {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        tokio::spawn(run_worker(
            user_key,
            id,
            rx,
            self.handler.clone(),
            self.workers.clone(),
            self.idle_timeout,
        ));
        tracing::debug!(%user_key, worker_id = %id, "started update worker");
        Worker { id, tx }
    }
}

async fn run_worker(
    user_key: UserKey,
    id: Uuid,
    mut rx: mpsc::UnboundedReceiver<Update>,
    handler: Arc<dyn UpdateHandler>,
    workers: WorkerMap,
    idle_timeout: Duration,
) {
    loop {
        let update = match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(update)) => update,
            Ok(None) => break,
            Err(_) => match retire_or_take(&workers, user_key, id, &mut rx) {
                Some(update) => update,
                None => break,
            },
        };
        handler.handle_update(update).await;
    }
    tracing::debug!(%user_key, worker_id = %id, "update worker stopped");
}

/// Called when a worker's idle timeout expires. Returns an update that was
/// queued in the meantime, or removes the worker's map entry and returns
/// `None`. Both happen under the map lock that `dispatch` sends under.
fn retire_or_take(
    workers: &Mutex<HashMap<UserKey, Worker>>,
    user_key: UserKey,
    id: Uuid,
    rx: &mut mpsc::UnboundedReceiver<Update>,
) -> Option<Update> {
    let mut map = lock(workers);
    if let Ok(update) = rx.try_recv() {
        return Some(update);
    }
    if map.get(&user_key).map(|worker| worker.id) == Some(id) {
        map.remove(&user_key);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::{Chat, Message, User};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(i64, i64)>>,
        notify: Notify,
    }

    #[async_trait]
    impl UpdateHandler for Recorder {
        async fn handle_update(&self, update: Update) {
            let message = update.message.expect("test updates carry messages");
            // Slow first update per user to expose reordering.
            if message.message_id == 1 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.seen
                .lock()
                .unwrap()
                .push((message.chat.id, message.message_id));
            self.notify.notify_one();
        }
    }

    fn update(user: i64, message_id: i64) -> Update {
        Update {
            update_id: message_id,
            message: Some(Message {
                message_id,
                chat: Chat { id: user },
                from: Some(User {
                    id: user,
                    first_name: "test".to_string(),
                    username: None,
                }),
                text: Some(format!("message {message_id}")),
                voice: None,
                photo: None,
            }),
        }
    }

    async fn wait_for(recorder: &Recorder, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while recorder.seen.lock().unwrap().len() < count {
                recorder.notify.notified().await;
            }
        })
        .await
        .expect("updates were not handled in time");
    }

    #[tokio::test]
    async fn updates_of_one_user_are_handled_in_order() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = Dispatcher::new(recorder.clone());

        for id in 1..=5 {
            dispatcher.dispatch(update(10, id));
        }
        wait_for(&recorder, 5).await;

        let seen = recorder.seen.lock().unwrap().clone();
        assert_eq!(seen, (1..=5).map(|id| (10, id)).collect::<Vec<_>>());
        assert_eq!(dispatcher.active_workers(), 1);
    }

    #[tokio::test]
    async fn users_do_not_block_each_other() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = Dispatcher::new(recorder.clone());

        dispatcher.dispatch(update(1, 1)); // slow
        dispatcher.dispatch(update(2, 2));
        wait_for(&recorder, 2).await;

        let seen = recorder.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![(2, 2), (1, 1)]);
        assert_eq!(dispatcher.active_workers(), 2);
    }

    #[tokio::test]
    async fn idle_workers_exit_and_restart() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher =
            Dispatcher::with_idle_timeout(recorder.clone(), Duration::from_millis(20));

        dispatcher.dispatch(update(3, 2));
        wait_for(&recorder, 1).await;

        tokio::time::timeout(Duration::from_secs(5), async {
            while dispatcher.active_workers() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("idle worker did not exit");

        dispatcher.dispatch(update(3, 3));
        wait_for(&recorder, 2).await;
        assert_eq!(recorder.seen.lock().unwrap().clone(), vec![(3, 2), (3, 3)]);
    }

    #[test]
    fn idle_worker_with_late_update_keeps_running() {
        let workers: WorkerMap = Arc::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        tx.send(update(4, 9)).unwrap();
        lock(&workers).insert(UserKey(4), Worker { id, tx });

        let late = retire_or_take(&workers, UserKey(4), id, &mut rx);
        assert_eq!(late.map(|u| u.update_id), Some(9));
        assert!(lock(&workers).contains_key(&UserKey(4)));

        assert!(retire_or_take(&workers, UserKey(4), id, &mut rx).is_none());
        assert!(lock(&workers).is_empty());
        // The entry held the only sender, so nothing can reach the old queue.
        assert!(rx.try_recv().is_err());
        assert!(rx.is_closed());
    }

    #[test]
    fn retiring_worker_leaves_its_replacement_alone() {
        let workers: WorkerMap = Arc::default();
        let (_old_tx, mut old_rx) = mpsc::unbounded_channel::<Update>();
        let (new_tx, _new_rx) = mpsc::unbounded_channel();
        let replacement = Uuid::new_v4();
        lock(&workers).insert(
            UserKey(4),
            Worker {
                id: replacement,
                tx: new_tx,
            },
        );

        assert!(retire_or_take(&workers, UserKey(4), Uuid::new_v4(), &mut old_rx).is_none());
        assert_eq!(lock(&workers).get(&UserKey(4)).map(|w| w.id), Some(replacement));
    }

    #[test]
    fn updates_without_message_have_no_key() {
        assert_eq!(
            update_user_key(&Update {
                update_id: 1,
                message: None
            }),
            None
        );
        assert_eq!(update_user_key(&update(77, 1)), Some(UserKey(77)));
    }
}
