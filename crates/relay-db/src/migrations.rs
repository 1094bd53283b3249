//! Embedded SQL migrations.
//!
//! The SQL files under `migrations/` are compiled in and applied in list
//! order at startup. Applied names are kept in `_relay_migrations`, so a
//! migration never runs twice against the same database.

use rusqlite::Connection;
use std::collections::HashSet;
use thiserror::Error;

struct Migration {
    name: &'static str,
    sql: &'static str,
}

/// Append-only; names must stay stable once released.
const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "000_init",
        sql: include_str!("migrations/000_init.sql"),
    },
    Migration {
        name: "001_users",
        sql: include_str!("migrations/001_users.sql"),
    },
    Migration {
        name: "002_user_values",
        sql: include_str!("migrations/002_user_values.sql"),
    },
    Migration {
        name: "003_dialogue_sessions",
        sql: include_str!("migrations/003_dialogue_sessions.sql"),
    },
    Migration {
        name: "004_analytics_events",
        sql: include_str!("migrations/004_analytics_events.sql"),
    },
];

#[derive(Debug, Error)]
pub enum MigrationError {
    /// A migration's SQL, or recording it as applied, failed.
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        name: String,
        source: rusqlite::Error,
    },

    /// The `_relay_migrations` table could not be created or read.
    #[error("failed to read migration state: {0}")]
    StateQuery(rusqlite::Error),
}

/// Applies every embedded migration not yet recorded in `_relay_migrations`.
///
/// Returns how many were applied by this call.
///
/// # Errors
///
/// Returns `MigrationError` on the first migration that fails; earlier ones
/// stay applied.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    apply_pending(conn, MIGRATIONS)
}

fn applied_names(conn: &Connection) -> Result<HashSet<String>, rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _relay_migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;
    let mut stmt = conn.prepare("SELECT name FROM _relay_migrations")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(names)
}

fn apply_pending(conn: &Connection, migrations: &[Migration]) -> Result<usize, MigrationError> {
    let done = applied_names(conn).map_err(MigrationError::StateQuery)?;
    let pending: Vec<&Migration> = migrations
        .iter()
        .filter(|m| !done.contains(m.name))
        .collect();

    for migration in &pending {
        tracing::info!(migration = migration.name, "applying migration");
        apply_one(conn, migration).map_err(|source| MigrationError::ExecutionFailed {
            name: migration.name.to_string(),
            source,
        })?;
    }

    if pending.is_empty() {
        tracing::debug!("database schema is up to date");
    }
    Ok(pending.len())
}

/// Runs one migration and records it, both inside a single transaction.
fn apply_one(conn: &Connection, migration: &Migration) -> Result<(), rusqlite::Error> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(migration.sql)?;
    tx.execute(
        "INSERT INTO _relay_migrations (name) VALUES (?1)",
        [migration.name],
    )?;
    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [name],
            |row| row.get(0),
        )
        .expect("should query sqlite_master")
    }

    #[test]
    fn run_migrations_on_fresh_db() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let applied = run_migrations(&conn).expect("migrations should succeed");
        assert_eq!(applied, MIGRATIONS.len());

        let count: usize = conn
            .query_row("SELECT COUNT(*) FROM _relay_migrations", [], |row| {
                row.get(0)
            })
            .expect("should query migration count");
        assert_eq!(count, MIGRATIONS.len());

        for table in [
            "users",
            "user_values",
            "dialogue_sessions",
            "analytics_events",
        ] {
            assert!(table_exists(&conn, table), "{table} table should exist");
        }
    }

    #[test]
    fn run_migrations_idempotent() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");

        let first = run_migrations(&conn).expect("first run should succeed");
        assert_eq!(first, MIGRATIONS.len());

        let second = run_migrations(&conn).expect("second run should succeed");
        assert_eq!(second, 0, "no new migrations to apply");
    }

    #[test]
    fn users_reject_duplicate_user_key() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        run_migrations(&conn).expect("migrations should succeed");

        conn.execute("INSERT INTO users (user_key) VALUES (7)", [])
            .expect("first insert should succeed");
        let err = conn
            .execute("INSERT INTO users (user_key) VALUES (7)", [])
            .expect_err("duplicate user_key must be rejected");
        assert!(err.to_string().contains("UNIQUE"), "got: {err}");
    }

    #[test]
    fn migration_side_effects_rollback_when_tracking_insert_fails() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let migrations = [Migration {
            name: "001_tracking_insert_conflict",
            sql: "
                CREATE TABLE rollback_probe (id INTEGER PRIMARY KEY);
                INSERT INTO _relay_migrations (name) VALUES ('001_tracking_insert_conflict');
            ",
        }];

        let err = apply_pending(&conn, &migrations)
            .expect_err("tracking insert conflict should fail migration");

        match err {
            MigrationError::ExecutionFailed { name, .. } => {
                assert_eq!(name, "001_tracking_insert_conflict")
            }
            other => panic!("unexpected error type: {other:?}"),
        }

        assert!(
            !table_exists(&conn, "rollback_probe"),
            "schema side effects should be rolled back when tracking insert fails"
        );
    }
}
