//! Storage layer for chats, collaborators and invitations
//!
//! Provides SQLite persistence behind an r2d2 connection pool.

pub mod migrations;
pub mod sql_store;

pub use migrations::{migrate, CURRENT_CHAT_SCHEMA_VERSION};
pub use sql_store::ChatSqlStore;

use crate::core_chat::error::CollabResult;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use std::time::Duration;

/// Connection pool type used by the store
pub type ChatPool = Pool<SqliteConnectionManager>;

/// Open a pool on a database file
///
/// Every connection enforces foreign keys and waits up to `busy_timeout`
/// for competing writers.
pub fn open_pool(path: &Path, max_size: u32, busy_timeout: Duration) -> CollabResult<ChatPool> {
    let manager = SqliteConnectionManager::file(path).with_init(move |c| {
        c.busy_timeout(busy_timeout)?;
        c.pragma_update(None, "foreign_keys", "ON")?;
        c.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        Ok(())
    });

    let pool = Pool::builder().max_size(max_size).build(manager)?;
    Ok(pool)
}

/// Open an in-memory pool
///
/// Every in-memory connection is its own database, so the pool holds a
/// single connection.
pub fn memory_pool() -> CollabResult<ChatPool> {
    let manager = SqliteConnectionManager::memory()
        .with_init(|c| c.pragma_update(None, "foreign_keys", "ON"));

    let pool = Pool::builder().max_size(1).build(manager)?;
    Ok(pool)
}
