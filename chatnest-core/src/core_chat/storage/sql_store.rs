//! SQL-based storage implementation for chats and collaboration

use super::ChatPool;
use crate::core_chat::chat::{Chat, Directory, Message, MessageAuthor, User};
use crate::core_chat::error::{CollabError, CollabResult};
use crate::core_chat::invitation::{Invitation, InvitationId, InvitationStatus};
use crate::core_chat::manager::PermissionStore;
use crate::core_chat::permission::{Collaborator, PermissionLevel};
use crate::core_chat::token::InvitationToken;
use crate::core_store::model::types::{ChatId, DirectoryId, MessageId, Timestamp, UserId};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::time::Instant;

/// SQL-based storage for chats, collaborators and invitations
#[derive(Clone)]
pub struct ChatSqlStore {
    pool: ChatPool,

    /// Write transactions that only get the lock after this instant are
    /// rolled back instead of committed
    deadline: Option<Instant>,
}

const INVITATION_COLUMNS: &str = "id, token, chat_id, inviter_id, invitee_email, permission, \
     created_at, expires_at, status, consumed_by, consumed_at";

const CHAT_COLUMNS: &str = "c.id, c.directory_id, d.owner_id, c.name, c.created_at";

impl ChatSqlStore {
    /// Create a store on the given pool, applying pending migrations
    pub fn new(pool: ChatPool) -> CollabResult<Self> {
        super::migrations::migrate(&pool)?;
        Ok(Self { pool, deadline: None })
    }

    /// Create a new in-memory store
    pub fn memory() -> CollabResult<Self> {
        Self::new(super::memory_pool()?)
    }

    /// A handle on the same pool bound to a request deadline
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            pool: self.pool.clone(),
            deadline: Some(deadline),
        }
    }

    /// Begin an immediate transaction, giving up if the write lock only
    /// became available after the deadline
    fn begin_write<'c>(&self, conn: &'c mut Connection) -> CollabResult<Transaction<'c>> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(deadline) = self.deadline {
            let now = Instant::now();
            if now >= deadline {
                let late = now.duration_since(deadline);
                tracing::warn!(late_ms = late.as_millis() as u64, "Write lock acquired after deadline, rolling back");
                return Err(CollabError::Timeout(format!(
                    "database was busy for {}ms past the request deadline",
                    late.as_millis()
                )));
            }
        }

        Ok(tx)
    }

    // ===== Users =====

    pub fn create_user(&self, user: &User) -> CollabResult<()> {
        let conn = self.pool.get()?;

        conn.execute(
            "INSERT INTO users (id, email, display_name, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                user.id.as_str(),
                &user.email,
                &user.display_name,
                millis(user.created_at),
                millis(user.updated_at),
            ],
        )
        .map_err(|e| on_conflict(e, "user", &user.email))?;

        Ok(())
    }

    pub fn get_user(&self, user_id: &UserId) -> CollabResult<Option<User>> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                "SELECT id, email, display_name, created_at, updated_at FROM users WHERE id = ?",
                params![user_id.as_str()],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn find_user_by_email(&self, email: &str) -> CollabResult<Option<User>> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                "SELECT id, email, display_name, created_at, updated_at FROM users WHERE email = ?",
                params![email],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn list_users(&self) -> CollabResult<Vec<User>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, email, display_name, created_at, updated_at
             FROM users ORDER BY created_at, id",
        )?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Returns false if the user does not exist
    pub fn update_user_display_name(
        &self,
        user_id: &UserId,
        display_name: &str,
        now: Timestamp,
    ) -> CollabResult<bool> {
        let conn = self.pool.get()?;
        let updated = conn.execute(
            "UPDATE users SET display_name = ?, updated_at = ? WHERE id = ?",
            params![display_name, millis(now), user_id.as_str()],
        )?;
        Ok(updated > 0)
    }

    /// Delete a user and, through cascading keys, everything they own
    /// and every collaborator entry they hold
    pub fn delete_user(&self, user_id: &UserId) -> CollabResult<bool> {
        let conn = self.pool.get()?;
        let deleted = conn.execute("DELETE FROM users WHERE id = ?", params![user_id.as_str()])?;
        Ok(deleted > 0)
    }

    // ===== Directories =====

    pub fn create_directory(&self, directory: &Directory) -> CollabResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO directories (id, owner_id, name, created_at) VALUES (?, ?, ?, ?)",
            params![
                directory.id.as_str(),
                directory.owner_id.as_str(),
                &directory.name,
                millis(directory.created_at),
            ],
        )
        .map_err(|e| on_conflict(e, "directory", &directory.id))?;
        Ok(())
    }

    pub fn get_directory(&self, directory_id: &DirectoryId) -> CollabResult<Option<Directory>> {
        let conn = self.pool.get()?;
        let directory = conn
            .query_row(
                "SELECT id, owner_id, name, created_at FROM directories WHERE id = ?",
                params![directory_id.as_str()],
                row_to_directory,
            )
            .optional()?;
        Ok(directory)
    }

    pub fn list_directories(&self, owner_id: &UserId) -> CollabResult<Vec<Directory>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, name, created_at FROM directories
             WHERE owner_id = ? ORDER BY created_at, rowid",
        )?;
        let directories = stmt
            .query_map(params![owner_id.as_str()], row_to_directory)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(directories)
    }

    // ===== Chats =====

    pub fn create_chat(&self, chat: &Chat) -> CollabResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO chats (id, directory_id, name, created_at) VALUES (?, ?, ?, ?)",
            params![
                chat.id.as_str(),
                chat.directory_id.as_str(),
                &chat.name,
                millis(chat.created_at),
            ],
        )
        .map_err(|e| on_conflict(e, "chat", &chat.id))?;
        Ok(())
    }

    /// Get a chat with its owner resolved through the directory
    pub fn get_chat(&self, chat_id: &ChatId) -> CollabResult<Option<Chat>> {
        let conn = self.pool.get()?;
        let chat = conn
            .query_row(
                &format!(
                    "SELECT {CHAT_COLUMNS} FROM chats c
                     JOIN directories d ON d.id = c.directory_id
                     WHERE c.id = ?"
                ),
                params![chat_id.as_str()],
                row_to_chat,
            )
            .optional()?;
        Ok(chat)
    }

    /// Owner of a chat, or `None` if the chat does not exist
    pub fn chat_owner(&self, chat_id: &ChatId) -> CollabResult<Option<UserId>> {
        let conn = self.pool.get()?;
        let owner = conn
            .query_row(
                "SELECT d.owner_id FROM chats c
                 JOIN directories d ON d.id = c.directory_id
                 WHERE c.id = ?",
                params![chat_id.as_str()],
                |row| Ok(UserId::new(row.get::<_, String>(0)?)),
            )
            .optional()?;
        Ok(owner)
    }

    pub fn list_owned_chats(&self, owner_id: &UserId) -> CollabResult<Vec<Chat>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats c
             JOIN directories d ON d.id = c.directory_id
             WHERE d.owner_id = ?
             ORDER BY d.created_at, d.rowid, c.created_at, c.rowid"
        ))?;
        let chats = stmt
            .query_map(params![owner_id.as_str()], row_to_chat)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(chats)
    }

    /// Chats `user_id` collaborates on, with their permission level
    pub fn list_shared_chats(&self, user_id: &UserId) -> CollabResult<Vec<(Chat, PermissionLevel)>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CHAT_COLUMNS}, k.permission FROM collaborators k
             JOIN chats c ON c.id = k.chat_id
             JOIN directories d ON d.id = c.directory_id
             WHERE k.user_id = ?
             ORDER BY k.granted_at, c.rowid"
        ))?;
        let chats = stmt
            .query_map(params![user_id.as_str()], |row| {
                Ok((row_to_chat(row)?, permission_column(row, 5)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(chats)
    }

    // ===== Messages =====

    pub fn append_message(&self, message: &Message) -> CollabResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO messages (id, chat_id, author_role, author_id, body, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                message.id.as_str(),
                message.chat_id.as_str(),
                message.author.role(),
                message.author.user_id().map(|id| id.as_str()),
                &message.body,
                millis(message.created_at),
            ],
        )?;
        Ok(())
    }

    /// A chat's history in insertion order
    pub fn list_messages(&self, chat_id: &ChatId) -> CollabResult<Vec<Message>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, author_role, author_id, body, created_at
             FROM messages WHERE chat_id = ? ORDER BY seq",
        )?;
        let messages = stmt
            .query_map(params![chat_id.as_str()], row_to_message)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    // ===== Invitations =====

    /// Insert a pending invitation, revoking any pending one for the same
    /// chat and email in the same transaction
    ///
    /// Returns the ids of the superseded invitations.
    pub fn insert_invitation(&self, invitation: &Invitation) -> CollabResult<Vec<InvitationId>> {
        let mut conn = self.pool.get()?;
        let tx = self.begin_write(&mut conn)?;

        let superseded = {
            let mut stmt = tx.prepare(
                "SELECT id FROM invitations
                 WHERE chat_id = ? AND invitee_email = ? AND status = 'Pending'",
            )?;
            let ids = stmt
                .query_map(
                    params![invitation.chat_id.as_str(), &invitation.invitee_email],
                    |row| invitation_id_column(row, 0),
                )?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };

        tx.execute(
            "UPDATE invitations SET status = 'Revoked'
             WHERE chat_id = ? AND invitee_email = ? AND status = 'Pending'",
            params![invitation.chat_id.as_str(), &invitation.invitee_email],
        )?;

        tx.execute(
            &format!("INSERT INTO invitations ({INVITATION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                invitation.id.to_string(),
                invitation.token.as_str(),
                invitation.chat_id.as_str(),
                invitation.inviter_id.as_str(),
                &invitation.invitee_email,
                invitation.permission.as_str(),
                millis(invitation.created_at),
                millis(invitation.expires_at),
                invitation.status.as_str(),
                invitation.consumed_by.as_ref().map(|id| id.as_str()),
                invitation.consumed_at.map(millis),
            ],
        )?;

        tx.commit()?;
        Ok(superseded)
    }

    pub fn get_invitation(&self, id: &InvitationId) -> CollabResult<Option<Invitation>> {
        let conn = self.pool.get()?;
        let invitation = conn
            .query_row(
                &format!("SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = ?"),
                params![id.to_string()],
                row_to_invitation,
            )
            .optional()?;
        Ok(invitation)
    }

    pub fn find_pending_invitation(
        &self,
        chat_id: &ChatId,
        invitee_email: &str,
    ) -> CollabResult<Option<Invitation>> {
        let conn = self.pool.get()?;
        let invitation = conn
            .query_row(
                &format!(
                    "SELECT {INVITATION_COLUMNS} FROM invitations
                     WHERE chat_id = ? AND invitee_email = ? AND status = 'Pending'"
                ),
                params![chat_id.as_str(), invitee_email],
                row_to_invitation,
            )
            .optional()?;
        Ok(invitation)
    }

    pub fn list_invitations(&self, chat_id: &ChatId) -> CollabResult<Vec<Invitation>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations
             WHERE chat_id = ? ORDER BY created_at, rowid"
        ))?;
        let invitations = stmt
            .query_map(params![chat_id.as_str()], row_to_invitation)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(invitations)
    }

    /// Revoke the pending invitation for (chat, email), if any
    pub fn revoke_pending(
        &self,
        chat_id: &ChatId,
        invitee_email: &str,
    ) -> CollabResult<Option<InvitationId>> {
        let mut conn = self.pool.get()?;
        let tx = self.begin_write(&mut conn)?;

        let id = tx
            .query_row(
                "SELECT id FROM invitations
                 WHERE chat_id = ? AND invitee_email = ? AND status = 'Pending'",
                params![chat_id.as_str(), invitee_email],
                |row| invitation_id_column(row, 0),
            )
            .optional()?;

        if let Some(id) = &id {
            tx.execute(
                "UPDATE invitations SET status = 'Revoked' WHERE id = ? AND status = 'Pending'",
                params![id.to_string()],
            )?;
        }

        tx.commit()?;
        Ok(id)
    }

    /// Move a pending invitation to Expired; no-op for any other status
    pub fn mark_expired(&self, id: &InvitationId) -> CollabResult<bool> {
        let conn = self.pool.get()?;
        let updated = conn.execute(
            "UPDATE invitations SET status = 'Expired' WHERE id = ? AND status = 'Pending'",
            params![id.to_string()],
        )?;
        Ok(updated > 0)
    }

    /// Atomically consume an invitation and write the collaborator entry
    ///
    /// The invitation must still be Pending and unexpired at `now`.
    /// Returns false, with nothing written, if another caller got there
    /// first or the invitation lapsed.
    pub fn consume_invitation(
        &self,
        collaborator: &Collaborator,
        now: Timestamp,
    ) -> CollabResult<bool> {
        let mut conn = self.pool.get()?;
        let tx = self.begin_write(&mut conn)?;

        let updated = tx.execute(
            "UPDATE invitations SET status = 'Consumed', consumed_by = ?, consumed_at = ?
             WHERE id = ? AND status = 'Pending' AND expires_at > ?",
            params![
                collaborator.user_id.as_str(),
                millis(now),
                collaborator.invitation_id.to_string(),
                millis(now),
            ],
        )?;

        if updated == 0 {
            // dropping the transaction rolls it back
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO collaborators
                (chat_id, user_id, permission, invitation_id, invited_email, granted_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(chat_id, user_id) DO UPDATE SET
                permission = excluded.permission,
                invitation_id = excluded.invitation_id,
                invited_email = excluded.invited_email,
                granted_at = excluded.granted_at",
            params![
                collaborator.chat_id.as_str(),
                collaborator.user_id.as_str(),
                collaborator.permission.as_str(),
                collaborator.invitation_id.to_string(),
                &collaborator.invited_email,
                millis(collaborator.granted_at),
            ],
        )?;

        tx.commit()?;
        Ok(true)
    }

    pub fn get_collaborator(
        &self,
        chat_id: &ChatId,
        user_id: &UserId,
    ) -> CollabResult<Option<Collaborator>> {
        let conn = self.pool.get()?;
        let collaborator = conn
            .query_row(
                "SELECT chat_id, user_id, permission, invitation_id, invited_email, granted_at
                 FROM collaborators WHERE chat_id = ? AND user_id = ?",
                params![chat_id.as_str(), user_id.as_str()],
                row_to_collaborator,
            )
            .optional()?;
        Ok(collaborator)
    }
}

impl PermissionStore for ChatSqlStore {
    fn set_permission(
        &self,
        chat_id: &ChatId,
        user_id: &UserId,
        level: PermissionLevel,
    ) -> CollabResult<()> {
        let conn = self.pool.get()?;
        let updated = conn.execute(
            "UPDATE collaborators SET permission = ? WHERE chat_id = ? AND user_id = ?",
            params![level.as_str(), chat_id.as_str(), user_id.as_str()],
        )?;

        if updated == 0 {
            return Err(CollabError::not_found("collaborator", user_id));
        }
        Ok(())
    }

    fn get_permission(
        &self,
        chat_id: &ChatId,
        user_id: &UserId,
    ) -> CollabResult<Option<PermissionLevel>> {
        let conn = self.pool.get()?;
        let level = conn
            .query_row(
                "SELECT permission FROM collaborators WHERE chat_id = ? AND user_id = ?",
                params![chat_id.as_str(), user_id.as_str()],
                |row| permission_column(row, 0),
            )
            .optional()?;
        Ok(level)
    }

    fn remove_permission(&self, chat_id: &ChatId, user_id: &UserId) -> CollabResult<bool> {
        let conn = self.pool.get()?;
        let deleted = conn.execute(
            "DELETE FROM collaborators WHERE chat_id = ? AND user_id = ?",
            params![chat_id.as_str(), user_id.as_str()],
        )?;
        Ok(deleted > 0)
    }

    fn list_collaborators(&self, chat_id: &ChatId) -> CollabResult<Vec<Collaborator>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT chat_id, user_id, permission, invitation_id, invited_email, granted_at
             FROM collaborators WHERE chat_id = ? ORDER BY granted_at, user_id",
        )?;
        let collaborators = stmt
            .query_map(params![chat_id.as_str()], row_to_collaborator)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(collaborators)
    }

    fn chats_shared_with(&self, user_id: &UserId) -> CollabResult<Vec<(ChatId, PermissionLevel)>> {
        Ok(self
            .list_shared_chats(user_id)?
            .into_iter()
            .map(|(chat, level)| (chat.id, level))
            .collect())
    }
}

// ===== Row mapping =====

fn millis(ts: Timestamp) -> i64 {
    i64::try_from(ts.as_millis()).unwrap_or(i64::MAX)
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<Timestamp> {
    Ok(Timestamp::from_millis(row.get::<_, i64>(idx)?.max(0) as u64))
}

fn invalid_column(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn permission_column(row: &Row, idx: usize) -> rusqlite::Result<PermissionLevel> {
    let value: String = row.get(idx)?;
    PermissionLevel::parse(&value)
        .ok_or_else(|| invalid_column(idx, format!("unknown permission level '{}'", value)))
}

fn invitation_id_column(row: &Row, idx: usize) -> rusqlite::Result<InvitationId> {
    let value: String = row.get(idx)?;
    uuid::Uuid::parse_str(&value)
        .map(InvitationId)
        .map_err(|e| invalid_column(idx, format!("invalid invitation id '{}': {}", value, e)))
}

/// Map unique-key violations to `AlreadyExists`
fn on_conflict(e: rusqlite::Error, entity: &'static str, id: impl ToString) -> CollabError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == ErrorCode::ConstraintViolation
                && matches!(
                    err.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                ) =>
        {
            CollabError::AlreadyExists {
                entity,
                id: id.to_string(),
            }
        }
        _ => e.into(),
    }
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId::new(row.get::<_, String>(0)?),
        email: row.get(1)?,
        display_name: row.get(2)?,
        created_at: timestamp_column(row, 3)?,
        updated_at: timestamp_column(row, 4)?,
    })
}

fn row_to_directory(row: &Row) -> rusqlite::Result<Directory> {
    Ok(Directory {
        id: DirectoryId::new(row.get::<_, String>(0)?),
        owner_id: UserId::new(row.get::<_, String>(1)?),
        name: row.get(2)?,
        created_at: timestamp_column(row, 3)?,
    })
}

fn row_to_chat(row: &Row) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: ChatId::new(row.get::<_, String>(0)?),
        directory_id: DirectoryId::new(row.get::<_, String>(1)?),
        owner_id: UserId::new(row.get::<_, String>(2)?),
        name: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
    })
}

fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
    let role: String = row.get(2)?;
    let author_id: Option<String> = row.get(3)?;

    let author = match (role.as_str(), author_id) {
        ("user", Some(id)) => MessageAuthor::User(UserId::new(id)),
        ("assistant", _) => MessageAuthor::Assistant,
        (other, _) => return Err(invalid_column(2, format!("invalid author role '{}'", other))),
    };

    Ok(Message {
        id: MessageId::new(row.get::<_, String>(0)?),
        chat_id: ChatId::new(row.get::<_, String>(1)?),
        author,
        body: row.get(4)?,
        created_at: timestamp_column(row, 5)?,
    })
}

fn row_to_collaborator(row: &Row) -> rusqlite::Result<Collaborator> {
    Ok(Collaborator {
        chat_id: ChatId::new(row.get::<_, String>(0)?),
        user_id: UserId::new(row.get::<_, String>(1)?),
        permission: permission_column(row, 2)?,
        invitation_id: invitation_id_column(row, 3)?,
        invited_email: row.get(4)?,
        granted_at: timestamp_column(row, 5)?,
    })
}

fn row_to_invitation(row: &Row) -> rusqlite::Result<Invitation> {
    let status: String = row.get(8)?;
    let status = InvitationStatus::parse(&status)
        .ok_or_else(|| invalid_column(8, format!("unknown invitation status '{}'", status)))?;

    Ok(Invitation {
        id: invitation_id_column(row, 0)?,
        token: InvitationToken::new(row.get::<_, String>(1)?),
        chat_id: ChatId::new(row.get::<_, String>(2)?),
        inviter_id: UserId::new(row.get::<_, String>(3)?),
        invitee_email: row.get(4)?,
        permission: permission_column(row, 5)?,
        created_at: timestamp_column(row, 6)?,
        expires_at: timestamp_column(row, 7)?,
        status,
        consumed_by: row.get::<_, Option<String>>(9)?.map(UserId::new),
        consumed_at: row
            .get::<_, Option<i64>>(10)?
            .map(|ms| Timestamp::from_millis(ms.max(0) as u64)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn user(id: &str, email: &str) -> User {
        User {
            id: UserId::new(id),
            email: email.to_string(),
            display_name: id.to_string(),
            created_at: Timestamp::from_millis(1),
            updated_at: Timestamp::from_millis(1),
        }
    }

    /// Store with alice owning chat "c1" and bob registered
    fn seeded() -> ChatSqlStore {
        let store = ChatSqlStore::memory().unwrap();
        store.create_user(&user("alice", "alice@example.com")).unwrap();
        store.create_user(&user("bob", "bob@example.com")).unwrap();
        store
            .create_directory(&Directory {
                id: DirectoryId::new("d1"),
                owner_id: UserId::new("alice"),
                name: "Work".to_string(),
                created_at: Timestamp::from_millis(1),
            })
            .unwrap();
        store
            .create_chat(&Chat {
                id: ChatId::new("c1"),
                directory_id: DirectoryId::new("d1"),
                owner_id: UserId::new("alice"),
                name: "Plans".to_string(),
                created_at: Timestamp::from_millis(2),
            })
            .unwrap();
        store
    }

    fn invitation(email: &str, created: u64) -> Invitation {
        let (created_at, expires_at) =
            Invitation::lifetime(Timestamp::from_millis(created), Duration::from_secs(60));
        Invitation {
            id: InvitationId::generate(),
            token: InvitationToken::new(format!("token-{}", created)),
            chat_id: ChatId::new("c1"),
            inviter_id: UserId::new("alice"),
            invitee_email: email.to_string(),
            permission: PermissionLevel::ReadWrite,
            created_at,
            expires_at,
            status: InvitationStatus::Pending,
            consumed_by: None,
            consumed_at: None,
        }
    }

    fn collaborator_for(inv: &Invitation, user: &str) -> Collaborator {
        Collaborator {
            chat_id: inv.chat_id.clone(),
            user_id: UserId::new(user),
            permission: inv.permission,
            invitation_id: inv.id,
            invited_email: inv.invitee_email.clone(),
            granted_at: Timestamp::from_millis(100),
        }
    }

    #[test]
    fn test_user_round_trip_and_unique_email() {
        let store = seeded();

        let alice = store.get_user(&UserId::new("alice")).unwrap().unwrap();
        assert_eq!(alice.email, "alice@example.com");
        assert_eq!(
            store.find_user_by_email("bob@example.com").unwrap().unwrap().id,
            UserId::new("bob")
        );

        let err = store.create_user(&user("carol", "alice@example.com")).unwrap_err();
        assert!(matches!(err, CollabError::AlreadyExists { entity: "user", .. }));
    }

    #[test]
    fn test_chat_owner_resolved_through_directory() {
        let store = seeded();
        assert_eq!(
            store.chat_owner(&ChatId::new("c1")).unwrap(),
            Some(UserId::new("alice"))
        );
        assert_eq!(store.chat_owner(&ChatId::new("missing")).unwrap(), None);
    }

    #[test]
    fn test_messages_keep_insertion_order() {
        let store = seeded();
        for (i, author) in [
            MessageAuthor::User(UserId::new("alice")),
            MessageAuthor::Assistant,
            MessageAuthor::User(UserId::new("alice")),
        ]
        .into_iter()
        .enumerate()
        {
            store
                .append_message(&Message {
                    id: MessageId::generate(),
                    chat_id: ChatId::new("c1"),
                    author,
                    body: format!("m{}", i),
                    // same timestamp on purpose
                    created_at: Timestamp::from_millis(5),
                })
                .unwrap();
        }

        let bodies: Vec<_> = store
            .list_messages(&ChatId::new("c1"))
            .unwrap()
            .into_iter()
            .map(|m| m.body)
            .collect();
        assert_eq!(bodies, vec!["m0", "m1", "m2"]);
    }

    #[test]
    fn test_insert_invitation_supersedes_pending() {
        let store = seeded();
        let first = invitation("bob@example.com", 10);
        let second = invitation("bob@example.com", 20);

        assert!(store.insert_invitation(&first).unwrap().is_empty());
        assert_eq!(store.insert_invitation(&second).unwrap(), vec![first.id]);

        let first = store.get_invitation(&first.id).unwrap().unwrap();
        assert_eq!(first.status, InvitationStatus::Revoked);

        let pending = store
            .find_pending_invitation(&ChatId::new("c1"), "bob@example.com")
            .unwrap()
            .unwrap();
        assert_eq!(pending.id, second.id);
        assert_eq!(pending.token, second.token);
    }

    #[test]
    fn test_consume_writes_collaborator_once() {
        let store = seeded();
        let inv = invitation("bob@example.com", 10);
        store.insert_invitation(&inv).unwrap();

        let now = Timestamp::from_millis(100);
        assert!(store.consume_invitation(&collaborator_for(&inv, "bob"), now).unwrap());
        assert!(!store.consume_invitation(&collaborator_for(&inv, "bob"), now).unwrap());

        let stored = store.get_invitation(&inv.id).unwrap().unwrap();
        assert_eq!(stored.status, InvitationStatus::Consumed);
        assert_eq!(stored.consumed_by, Some(UserId::new("bob")));
        assert_eq!(stored.consumed_at, Some(now));

        assert_eq!(
            store.get_permission(&ChatId::new("c1"), &UserId::new("bob")).unwrap(),
            Some(PermissionLevel::ReadWrite)
        );
        assert_eq!(store.list_collaborators(&ChatId::new("c1")).unwrap().len(), 1);
    }

    #[test]
    fn test_late_write_rolls_back() {
        let store = seeded();
        let inv = invitation("bob@example.com", 10);
        store.insert_invitation(&inv).unwrap();

        let late = store.with_deadline(Instant::now());
        let err = late
            .consume_invitation(&collaborator_for(&inv, "bob"), Timestamp::from_millis(100))
            .unwrap_err();
        assert!(matches!(err, CollabError::Timeout(_)));
        assert_eq!(
            store.get_invitation(&inv.id).unwrap().unwrap().status,
            InvitationStatus::Pending
        );

        let err = late.insert_invitation(&invitation("bob@example.com", 20)).unwrap_err();
        assert_eq!(err.kind(), "timeout");
        assert_eq!(store.list_invitations(&ChatId::new("c1")).unwrap().len(), 1);

        let early = store.with_deadline(Instant::now() + Duration::from_secs(60));
        assert!(early
            .consume_invitation(&collaborator_for(&inv, "bob"), Timestamp::from_millis(100))
            .unwrap());
    }

    #[test]
    fn test_consume_refuses_lapsed_invitation() {
        let store = seeded();
        let inv = invitation("bob@example.com", 10);
        store.insert_invitation(&inv).unwrap();

        assert!(!store
            .consume_invitation(&collaborator_for(&inv, "bob"), inv.expires_at)
            .unwrap());
        assert_eq!(
            store.get_permission(&ChatId::new("c1"), &UserId::new("bob")).unwrap(),
            None
        );
        assert_eq!(
            store.get_invitation(&inv.id).unwrap().unwrap().status,
            InvitationStatus::Pending
        );
    }

    #[test]
    fn test_set_permission_requires_existing_entry() {
        let store = seeded();
        let err = store
            .set_permission(&ChatId::new("c1"), &UserId::new("bob"), PermissionLevel::ReadOnly)
            .unwrap_err();
        assert!(matches!(err, CollabError::NotFound { entity: "collaborator", .. }));

        let inv = invitation("bob@example.com", 10);
        store.insert_invitation(&inv).unwrap();
        store
            .consume_invitation(&collaborator_for(&inv, "bob"), Timestamp::from_millis(50))
            .unwrap();

        store
            .set_permission(&ChatId::new("c1"), &UserId::new("bob"), PermissionLevel::ReadOnly)
            .unwrap();
        assert_eq!(
            store.get_permission(&ChatId::new("c1"), &UserId::new("bob")).unwrap(),
            Some(PermissionLevel::ReadOnly)
        );

        assert!(store.remove_permission(&ChatId::new("c1"), &UserId::new("bob")).unwrap());
        assert!(!store.remove_permission(&ChatId::new("c1"), &UserId::new("bob")).unwrap());
    }

    #[test]
    fn test_shared_chats_listing() {
        let store = seeded();
        let inv = invitation("bob@example.com", 10);
        store.insert_invitation(&inv).unwrap();
        store
            .consume_invitation(&collaborator_for(&inv, "bob"), Timestamp::from_millis(50))
            .unwrap();

        let shared = store.chats_shared_with(&UserId::new("bob")).unwrap();
        assert_eq!(shared, vec![(ChatId::new("c1"), PermissionLevel::ReadWrite)]);
        assert!(store.chats_shared_with(&UserId::new("alice")).unwrap().is_empty());
    }

    #[test]
    fn test_revoke_and_expire_only_touch_pending() {
        let store = seeded();
        let inv = invitation("bob@example.com", 10);
        store.insert_invitation(&inv).unwrap();

        assert_eq!(
            store.revoke_pending(&ChatId::new("c1"), "bob@example.com").unwrap(),
            Some(inv.id)
        );
        assert_eq!(
            store.revoke_pending(&ChatId::new("c1"), "bob@example.com").unwrap(),
            None
        );
        assert!(!store.mark_expired(&inv.id).unwrap());
        assert_eq!(
            store.get_invitation(&inv.id).unwrap().unwrap().status,
            InvitationStatus::Revoked
        );
    }

    #[test]
    fn test_deleting_collaborator_user_removes_entries() {
        let store = seeded();
        let inv = invitation("bob@example.com", 10);
        store.insert_invitation(&inv).unwrap();
        store
            .consume_invitation(&collaborator_for(&inv, "bob"), Timestamp::from_millis(50))
            .unwrap();

        assert!(store.delete_user(&UserId::new("bob")).unwrap());
        assert!(store.list_collaborators(&ChatId::new("c1")).unwrap().is_empty());

        let stored = store.get_invitation(&inv.id).unwrap().unwrap();
        assert_eq!(stored.status, InvitationStatus::Consumed);
        assert_eq!(stored.consumed_by, None);
    }
}
