//! Durable user and value records.
//!
//! A user row exists only once values were confirmed, so its presence is
//! the "already has values" signal. The `users.user_key` UNIQUE constraint
//! rejects a second record for the same user even when two elicitations
//! slip past the entry gate concurrently.

use async_trait::async_trait;
use relay_db::DbPool;
use relay_types::UserKey;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::error::StoreError;

#[async_trait]
pub trait ValuesStore: Send + Sync {
    async fn has_values(&self, user_key: UserKey) -> Result<bool, StoreError>;

    /// Writes the user record and every value in one transaction.
    ///
    /// # Errors
    ///
    /// [`StoreError::AlreadyExists`] if the user already has a record;
    /// [`StoreError::EmptyValues`] for an empty slice.
    async fn commit(&self, user_key: UserKey, values: &[String]) -> Result<(), StoreError>;
}

/// Checks whether a user record exists.
pub fn user_has_values(conn: &Connection, user_key: UserKey) -> Result<bool, StoreError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM users WHERE user_key = ?1",
            [user_key.as_i64()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Inserts the user and its values. Nothing is written unless every row is.
pub fn commit_values(
    conn: &mut Connection,
    user_key: UserKey,
    values: &[String],
) -> Result<(), StoreError> {
    if values.is_empty() {
        return Err(StoreError::EmptyValues);
    }

    // Dropping the transaction without commit rolls it back.
    let tx = conn.transaction()?;

    let inserted = tx.execute(
        "INSERT INTO users (user_key) VALUES (?1)",
        [user_key.as_i64()],
    );
    match inserted {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == ErrorCode::ConstraintViolation =>
        {
            return Err(StoreError::AlreadyExists(user_key));
        }
        Err(e) => return Err(StoreError::Database(e)),
    }
    let user_id = tx.last_insert_rowid();

    {
        let mut stmt =
            tx.prepare("INSERT INTO user_values (user_id, position, value) VALUES (?1, ?2, ?3)")?;
        for (position, value) in values.iter().enumerate() {
            stmt.execute(params![user_id, position as i64, value])?;
        }
    }

    tx.commit()?;
    Ok(())
}

/// Stored values of a user in their original order; empty if none.
pub fn load_values(conn: &Connection, user_key: UserKey) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT v.value FROM user_values v
         JOIN users u ON u.id = v.user_id
         WHERE u.user_key = ?1
         ORDER BY v.position",
    )?;
    let values = stmt
        .query_map([user_key.as_i64()], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(values)
}

#[derive(Debug, Clone)]
pub struct SqliteValuesStore {
    pool: DbPool,
}

impl SqliteValuesStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn values_of(&self, user_key: UserKey) -> Result<Vec<String>, StoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            load_values(&conn, user_key)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl ValuesStore for SqliteValuesStore {
    async fn has_values(&self, user_key: UserKey) -> Result<bool, StoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            user_has_values(&conn, user_key)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn commit(&self, user_key: UserKey, values: &[String]) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        let values = values.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            commit_values(&mut conn, user_key, &values)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}
