//! Per-user dialogue state.
//!
//! A [`Session`] exists for every user; it is `Idle` unless an elicitation is
//! in flight. Storage is behind the [`SessionStore`] trait, and
//! [`SessionLocks`] guarantees that at most one turn per user reads and
//! writes that state at a time.

use async_trait::async_trait;
use relay_db::DbPool;
use relay_types::{ChatMessage, Role, UserKey};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

use crate::error::SessionStoreError;

/// Number of tracked user locks above which idle entries are pruned.
const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// Dialogue state of a single user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    #[default]
    Idle,
    CollectingValues,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::CollectingValues => "COLLECTING_VALUES",
        }
    }
}

impl std::str::FromStr for SessionState {
    type Err = SessionStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IDLE" => Ok(Self::Idle),
            "COLLECTING_VALUES" => Ok(Self::CollectingValues),
            other => Err(SessionStoreError::Corrupt(format!(
                "unknown session state: {other}"
            ))),
        }
    }
}

/// The typed session record.
///
/// Fields are private so that the attempt counter only moves forward
/// within an elicitation and is zeroed only by starting a new one or by
/// returning to `Idle`.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    user_key: UserKey,
    state: SessionState,
    conversation_history: Vec<ChatMessage>,
    attempt_count: u32,
}

impl Session {
    /// A fresh idle session.
    pub fn idle(user_key: UserKey) -> Self {
        Self {
            user_key,
            state: SessionState::Idle,
            conversation_history: Vec::new(),
            attempt_count: 0,
        }
    }

    /// Rebuilds a session from storage. Idle sessions never carry history.
    pub fn restore(
        user_key: UserKey,
        state: SessionState,
        conversation_history: Vec<ChatMessage>,
        attempt_count: u32,
    ) -> Self {
        match state {
            SessionState::Idle => Self::idle(user_key),
            SessionState::CollectingValues => Self {
                user_key,
                state,
                conversation_history,
                attempt_count,
            },
        }
    }

    pub fn user_key(&self) -> UserKey {
        self.user_key
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_collecting(&self) -> bool {
        self.state == SessionState::CollectingValues
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.conversation_history
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Enters `CollectingValues` with an empty history and a zero counter.
    pub fn begin_elicitation(&mut self) {
        self.state = SessionState::CollectingValues;
        self.conversation_history.clear();
        self.attempt_count = 0;
    }

    pub fn record_user(&mut self, content: impl Into<String>) {
        self.conversation_history.push(ChatMessage::user(content));
    }

    pub fn record_assistant(&mut self, content: impl Into<String>) {
        self.conversation_history.push(ChatMessage::assistant(content));
    }

    /// Counts one more follow-up question and returns the new count.
    pub fn advance_attempt(&mut self) -> u32 {
        self.attempt_count += 1;
        self.attempt_count
    }

    /// Back to `Idle`, discarding history.
    pub fn reset(&mut self) {
        *self = Self::idle(self.user_key);
    }

    /// Every user utterance of the current elicitation, oldest first, one per line.
    pub fn user_transcript(&self) -> String {
        self.conversation_history
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Key-value storage of sessions.
///
/// A user with no stored session is `Idle`. Callers serialise access per
/// user with [`SessionLocks`]; implementations need not lock.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, user_key: UserKey) -> Result<Session, SessionStoreError>;

    async fn save(&self, session: &Session) -> Result<(), SessionStoreError>;
}

/// Process-local session storage. Sessions do not survive a restart.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<UserKey, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, user_key: UserKey) -> Result<Session, SessionStoreError> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(sessions
            .get(&user_key)
            .cloned()
            .unwrap_or_else(|| Session::idle(user_key)))
    }

    async fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if session.is_collecting() {
            sessions.insert(session.user_key(), session.clone());
        } else {
            sessions.remove(&session.user_key());
        }
        Ok(())
    }
}

/// Sessions persisted in the `dialogue_sessions` table, so an elicitation
/// in progress survives a restart. Idle sessions have no row.
#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    pool: DbPool,
}

impl SqliteSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Reads a session row, defaulting to `Idle` when absent.
pub fn load_session(
    conn: &rusqlite::Connection,
    user_key: UserKey,
) -> Result<Session, SessionStoreError> {
    let row = conn
        .query_row(
            "SELECT state, history_json, attempt_count
             FROM dialogue_sessions WHERE user_key = ?1",
            [user_key.as_i64()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                ))
            },
        )
        .optional()?;

    match row {
        None => Ok(Session::idle(user_key)),
        Some((state, history_json, attempt_count)) => {
            let state: SessionState = state.parse()?;
            let history: Vec<ChatMessage> = serde_json::from_str(&history_json)?;
            Ok(Session::restore(user_key, state, history, attempt_count))
        }
    }
}

/// Upserts a collecting session or deletes the row of an idle one.
pub fn save_session(
    conn: &rusqlite::Connection,
    session: &Session,
) -> Result<(), SessionStoreError> {
    if !session.is_collecting() {
        conn.execute(
            "DELETE FROM dialogue_sessions WHERE user_key = ?1",
            [session.user_key().as_i64()],
        )?;
        return Ok(());
    }

    let history_json = serde_json::to_string(session.history())?;
    conn.execute(
        "INSERT INTO dialogue_sessions (user_key, state, history_json, attempt_count, updated_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now'))
         ON CONFLICT(user_key) DO UPDATE SET
            state = excluded.state,
            history_json = excluded.history_json,
            attempt_count = excluded.attempt_count,
            updated_at = excluded.updated_at",
        params![
            session.user_key().as_i64(),
            session.state().as_str(),
            history_json,
            session.attempt_count(),
        ],
    )?;
    Ok(())
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, user_key: UserKey) -> Result<Session, SessionStoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            load_session(&conn, user_key)
        })
        .await
        .map_err(|e| SessionStoreError::Task(e.to_string()))?
    }

    async fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        let pool = self.pool.clone();
        let session = session.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            save_session(&conn, &session)
        })
        .await
        .map_err(|e| SessionStoreError::Task(e.to_string()))?
    }
}

/// One async mutex per user key.
///
/// Holding a [`SessionGuard`] gives the holder exclusive use of that user's
/// session until the guard is dropped. Turns for different users never
/// contend.
#[derive(Debug, Clone, Default)]
pub struct SessionLocks {
    locks: Arc<Mutex<HashMap<UserKey, Arc<tokio::sync::Mutex<()>>>>>,
}

/// Exclusive access to one user's session.
#[derive(Debug)]
pub struct SessionGuard {
    _guard: OwnedMutexGuard<()>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other turn for `user_key` is in flight.
    pub async fn acquire(&self, user_key: UserKey) -> SessionGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            if locks.len() > LOCK_PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(user_key).or_default().clone()
        };

        SessionGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of user keys with a tracked lock.
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
