//! Database layer for the voice relay.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization
//! and embedded SQL migrations. Every table the relay touches (users and
//! their values, parked dialogue sessions, the analytics log) is created
//! through versioned migrations managed by this crate.
//!
//! SQL files are compiled into the binary via `include_str!`, so the schema
//! ships with the code that depends on it.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
