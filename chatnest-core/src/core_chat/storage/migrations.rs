//! Database migrations for chats and collaboration
//!
//! Each migration is applied atomically and recorded in the
//! `chat_schema_version` table, so `migrate` can run on every startup.

use super::ChatPool;
use crate::core_chat::error::CollabResult;
use crate::core_store::model::types::Timestamp;
use rusqlite::{params, Connection};

/// Current schema version
pub const CURRENT_CHAT_SCHEMA_VERSION: i32 = 2;

/// Migration descriptor
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub up_sql: &'static str,
}

/// All available migrations in order
pub fn get_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Users, directories, chats and messages",
            up_sql: r#"
                CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY,
                    email TEXT NOT NULL UNIQUE,             -- normalized
                    display_name TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS directories (
                    id TEXT PRIMARY KEY,
                    owner_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
                );

                CREATE INDEX IF NOT EXISTS idx_directories_owner ON directories(owner_id);

                CREATE TABLE IF NOT EXISTS chats (
                    id TEXT PRIMARY KEY,
                    directory_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    FOREIGN KEY (directory_id) REFERENCES directories(id) ON DELETE CASCADE
                );

                CREATE INDEX IF NOT EXISTS idx_chats_directory ON chats(directory_id);

                -- seq gives the insertion order of a chat's history
                CREATE TABLE IF NOT EXISTS messages (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    chat_id TEXT NOT NULL,
                    author_role TEXT NOT NULL CHECK(author_role IN ('user', 'assistant')),
                    author_id TEXT,                         -- NULL for assistant turns
                    body TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE
                );

                CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id, seq);
            "#,
        },
        Migration {
            version: 2,
            description: "Invitations and collaborators",
            up_sql: r#"
                CREATE TABLE IF NOT EXISTS invitations (
                    id TEXT PRIMARY KEY,                    -- UUID
                    token TEXT NOT NULL,
                    chat_id TEXT NOT NULL,
                    inviter_id TEXT NOT NULL,
                    invitee_email TEXT NOT NULL,
                    permission TEXT NOT NULL CHECK(permission IN ('ReadOnly', 'ReadWrite')),
                    created_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL,
                    status TEXT NOT NULL
                        CHECK(status IN ('Pending', 'Consumed', 'Expired', 'Revoked')),
                    consumed_by TEXT,
                    consumed_at INTEGER,
                    CHECK (expires_at > created_at),
                    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE,
                    FOREIGN KEY (inviter_id) REFERENCES users(id) ON DELETE CASCADE,
                    FOREIGN KEY (consumed_by) REFERENCES users(id) ON DELETE SET NULL
                );

                CREATE INDEX IF NOT EXISTS idx_invitations_chat ON invitations(chat_id);

                -- At most one Pending invitation per (chat, email)
                CREATE UNIQUE INDEX IF NOT EXISTS idx_invitations_one_pending
                    ON invitations(chat_id, invitee_email)
                    WHERE status = 'Pending';

                CREATE TABLE IF NOT EXISTS collaborators (
                    chat_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    permission TEXT NOT NULL CHECK(permission IN ('ReadOnly', 'ReadWrite')),
                    invitation_id TEXT NOT NULL,
                    invited_email TEXT NOT NULL,
                    granted_at INTEGER NOT NULL,
                    PRIMARY KEY (chat_id, user_id),
                    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE,
                    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                    FOREIGN KEY (invitation_id) REFERENCES invitations(id) ON DELETE CASCADE
                );

                CREATE INDEX IF NOT EXISTS idx_collaborators_user ON collaborators(user_id);
            "#,
        },
    ]
}

fn ensure_version_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS chat_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Get current schema version from database
pub fn get_current_version(pool: &ChatPool) -> CollabResult<i32> {
    let conn = pool.get()?;
    ensure_version_table(&conn)?;

    let version: Option<i32> = conn.query_row(
        "SELECT MAX(version) FROM chat_schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version.unwrap_or(0))
}

/// Run all pending migrations, returning how many were applied
pub fn migrate(pool: &ChatPool) -> CollabResult<usize> {
    let current_version = get_current_version(pool)?;

    let pending: Vec<_> = get_migrations()
        .into_iter()
        .filter(|m| m.version > current_version)
        .collect();

    if pending.is_empty() {
        return Ok(0);
    }

    let conn = pool.get()?;
    let applied = pending.len();

    for migration in pending {
        let tx = conn.unchecked_transaction()?;

        tx.execute_batch(migration.up_sql)?;
        tx.execute(
            "INSERT INTO chat_schema_version (version, applied_at) VALUES (?, ?)",
            params![migration.version, Timestamp::now().as_millis() as i64],
        )?;

        tx.commit()?;

        tracing::info!(
            version = migration.version,
            description = migration.description,
            "Applied migration"
        );
    }

    Ok(applied)
}

/// Get the latest migration version available
pub fn get_latest_version() -> i32 {
    get_migrations().iter().map(|m| m.version).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_chat::storage::memory_pool;

    #[test]
    fn test_initial_migration() {
        let pool = memory_pool().unwrap();
        assert_eq!(migrate(&pool).unwrap(), 2);

        let conn = pool.get().unwrap();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        for table in ["users", "directories", "chats", "messages", "invitations", "collaborators"] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }
    }

    #[test]
    fn test_migration_version_tracking() {
        let pool = memory_pool().unwrap();
        migrate(&pool).unwrap();

        assert_eq!(get_current_version(&pool).unwrap(), CURRENT_CHAT_SCHEMA_VERSION);
        assert_eq!(get_latest_version(), CURRENT_CHAT_SCHEMA_VERSION);
    }

    #[test]
    fn test_idempotent_migrations() {
        let pool = memory_pool().unwrap();

        migrate(&pool).unwrap();
        assert_eq!(migrate(&pool).unwrap(), 0);
        assert_eq!(get_current_version(&pool).unwrap(), CURRENT_CHAT_SCHEMA_VERSION);
    }

    #[test]
    fn test_second_pending_invitation_rejected_by_index() {
        let pool = memory_pool().unwrap();
        migrate(&pool).unwrap();
        let conn = pool.get().unwrap();

        conn.execute_batch(
            "INSERT INTO users VALUES ('u1', 'a@x.com', 'A', 0, 0);
             INSERT INTO directories VALUES ('d1', 'u1', 'Dir', 0);
             INSERT INTO chats VALUES ('c1', 'd1', 'Chat', 0);",
        )
        .unwrap();

        let insert = "INSERT INTO invitations
            (id, token, chat_id, inviter_id, invitee_email, permission, created_at, expires_at, status)
            VALUES (?, 't', 'c1', 'u1', 'b@x.com', 'ReadOnly', 0, 10, ?)";

        conn.execute(insert, params!["i1", "Pending"]).unwrap();
        assert!(conn.execute(insert, params!["i2", "Pending"]).is_err());
        conn.execute(insert, params!["i3", "Revoked"]).unwrap();
    }

    #[test]
    fn test_expiry_must_follow_creation() {
        let pool = memory_pool().unwrap();
        migrate(&pool).unwrap();
        let conn = pool.get().unwrap();

        conn.execute_batch(
            "INSERT INTO users VALUES ('u1', 'a@x.com', 'A', 0, 0);
             INSERT INTO directories VALUES ('d1', 'u1', 'Dir', 0);
             INSERT INTO chats VALUES ('c1', 'd1', 'Chat', 0);",
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO invitations
             (id, token, chat_id, inviter_id, invitee_email, permission, created_at, expires_at, status)
             VALUES ('i1', 't', 'c1', 'u1', 'b@x.com', 'ReadOnly', 10, 10, 'Pending')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_deleting_user_cascades() {
        let pool = memory_pool().unwrap();
        migrate(&pool).unwrap();
        let conn = pool.get().unwrap();

        conn.execute_batch(
            "INSERT INTO users VALUES ('u1', 'a@x.com', 'A', 0, 0);
             INSERT INTO directories VALUES ('d1', 'u1', 'Dir', 0);
             INSERT INTO chats VALUES ('c1', 'd1', 'Chat', 0);
             DELETE FROM users WHERE id = 'u1';",
        )
        .unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chats", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
