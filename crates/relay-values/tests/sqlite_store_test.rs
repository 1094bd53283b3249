use async_trait::async_trait;
use relay_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use relay_oracle::{ChatOracle, ChatRequest, OracleError};
use relay_types::{ChatMessage, UserKey};
use relay_values::{
    DialogueEngine, DialogueSettings, Session, SessionState, SessionStore, SqliteSessionStore,
    SqliteValuesStore, StoreError, TurnOutcome, ValuesStore, SEED_QUESTION,
};
use std::sync::Arc;
use tempfile::TempDir;

fn test_pool() -> (TempDir, DbPool) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("relay.db");
    let pool = create_pool(path.to_str().unwrap(), DbRuntimeSettings::default())
        .expect("failed to create pool");
    run_migrations(&pool.get().unwrap()).expect("failed to run migrations");
    (dir, pool)
}

fn values(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn commit_persists_values_in_order() {
    let (_dir, pool) = test_pool();
    let store = SqliteValuesStore::new(pool);
    let user = UserKey(1001);

    assert!(!store.has_values(user).await.unwrap());
    store
        .commit(user, &values(&["семья", "здоровье", "свобода"]))
        .await
        .expect("commit should succeed");

    assert!(store.has_values(user).await.unwrap());
    assert_eq!(
        store.values_of(user).await.unwrap(),
        values(&["семья", "здоровье", "свобода"])
    );
}

#[tokio::test]
async fn second_commit_for_same_user_is_rejected() {
    let (_dir, pool) = test_pool();
    let store = SqliteValuesStore::new(pool.clone());
    let user = UserKey(7);

    store.commit(user, &values(&["честность"])).await.unwrap();
    let err = store
        .commit(user, &values(&["доброта", "любовь"]))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(k) if k == user));

    let conn = pool.get().unwrap();
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM user_values", [], |r| r.get(0))
        .unwrap();
    assert_eq!(rows, 1, "rejected commit must leave no partial rows");
}

#[tokio::test]
async fn empty_commit_writes_nothing() {
    let (_dir, pool) = test_pool();
    let store = SqliteValuesStore::new(pool);

    let err = store.commit(UserKey(3), &[]).await.unwrap_err();
    assert!(matches!(err, StoreError::EmptyValues));
    assert!(!store.has_values(UserKey(3)).await.unwrap());
}

#[tokio::test]
async fn collecting_session_survives_reload() {
    let (_dir, pool) = test_pool();
    let store = SqliteSessionStore::new(pool.clone());
    let user = UserKey(55);

    let mut session = Session::idle(user);
    session.begin_elicitation();
    session.record_user("не знаю");
    session.advance_attempt();
    session.record_assistant("Что для тебя важно?");
    store.save(&session).await.unwrap();

    let reopened = SqliteSessionStore::new(pool);
    let loaded = reopened.load(user).await.unwrap();
    assert_eq!(loaded.state(), SessionState::CollectingValues);
    assert_eq!(loaded.attempt_count(), 1);
    assert_eq!(
        loaded.history(),
        [
            ChatMessage::user("не знаю"),
            ChatMessage::assistant("Что для тебя важно?")
        ]
    );
}

#[tokio::test]
async fn idle_session_deletes_row() {
    let (_dir, pool) = test_pool();
    let store = SqliteSessionStore::new(pool.clone());
    let user = UserKey(9);

    let mut session = Session::idle(user);
    session.begin_elicitation();
    session.record_user("свобода");
    store.save(&session).await.unwrap();

    session.reset();
    store.save(&session).await.unwrap();

    let rows: i64 = pool
        .get()
        .unwrap()
        .query_row("SELECT COUNT(*) FROM dialogue_sessions", [], |r| r.get(0))
        .unwrap();
    assert_eq!(rows, 0);
    assert_eq!(store.load(user).await.unwrap(), Session::idle(user));
}

struct OfflineOracle;

#[async_trait]
impl ChatOracle for OfflineOracle {
    async fn complete(&self, _request: ChatRequest) -> Result<String, OracleError> {
        Err(OracleError::Transport("offline".to_string()))
    }
}

fn sqlite_engine(pool: &DbPool) -> DialogueEngine {
    DialogueEngine::new(
        Arc::new(OfflineOracle),
        Arc::new(SqliteValuesStore::new(pool.clone())),
        Arc::new(SqliteSessionStore::new(pool.clone())),
        DialogueSettings::default(),
    )
}

fn insert_unparseable_session(pool: &DbPool, user: UserKey) {
    pool.get()
        .unwrap()
        .execute(
            "INSERT INTO dialogue_sessions (user_key, state, history_json, attempt_count, updated_at)
             VALUES (?1, 'COLLECTING_VALUES', 'not json', 1, datetime('now'))",
            [user.as_i64()],
        )
        .unwrap();
}

fn session_rows(pool: &DbPool) -> i64 {
    pool.get()
        .unwrap()
        .query_row("SELECT COUNT(*) FROM dialogue_sessions", [], |r| r.get(0))
        .unwrap()
}

#[tokio::test]
async fn unparseable_session_row_is_cleared_for_user_with_values() {
    let (_dir, pool) = test_pool();
    let user = UserKey(5);
    SqliteValuesStore::new(pool.clone())
        .commit(user, &values(&["семья"]))
        .await
        .unwrap();
    insert_unparseable_session(&pool, user);

    let engine = sqlite_engine(&pool);
    for question in ["как дела?", "сколько времени?", "что почитать?"] {
        let outcome = engine.handle_utterance(user, question).await;
        assert_eq!(outcome, TurnOutcome::NotCollecting);
    }
    assert_eq!(session_rows(&pool), 0);
    assert_eq!(engine.begin_if_needed(user).await, None);
}

#[tokio::test]
async fn unparseable_session_row_allows_a_fresh_elicitation() {
    let (_dir, pool) = test_pool();
    let user = UserKey(6);
    insert_unparseable_session(&pool, user);

    let engine = sqlite_engine(&pool);
    assert_eq!(
        engine.handle_utterance(user, "привет").await,
        TurnOutcome::NotCollecting
    );
    assert_eq!(engine.begin_if_needed(user).await.as_deref(), Some(SEED_QUESTION));

    let session = SqliteSessionStore::new(pool).load(user).await.unwrap();
    assert!(session.is_collecting());
    assert!(session.history().is_empty());
}
