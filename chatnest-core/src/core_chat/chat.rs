//! Users, directories, chats and messages

use super::permission::PermissionLevel;
use crate::core_store::model::types::{ChatId, DirectoryId, MessageId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Registered account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,

    /// Normalized (trimmed, lowercase) and unique
    pub email: String,

    pub display_name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A named folder of chats, owned by exactly one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    pub id: DirectoryId,
    pub owner_id: UserId,
    pub name: String,
    pub created_at: Timestamp,
}

/// A conversation inside a directory
///
/// The chat owner is the owner of its directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub directory_id: DirectoryId,
    pub owner_id: UserId,
    pub name: String,
    pub created_at: Timestamp,
}

/// Who wrote a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "user_id", rename_all = "snake_case")]
pub enum MessageAuthor {
    User(UserId),
    Assistant,
}

impl MessageAuthor {
    pub fn role(&self) -> &'static str {
        match self {
            MessageAuthor::User(_) => "user",
            MessageAuthor::Assistant => "assistant",
        }
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            MessageAuthor::User(id) => Some(id),
            MessageAuthor::Assistant => None,
        }
    }
}

/// One turn of a chat's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub author: MessageAuthor,
    pub body: String,
    pub created_at: Timestamp,
}

/// How the caller reaches a chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "access", content = "permission", rename_all = "snake_case")]
pub enum ChatAccess {
    Owner,
    Collaborator(PermissionLevel),
}

impl ChatAccess {
    pub fn can_write(&self) -> bool {
        matches!(
            self,
            ChatAccess::Owner | ChatAccess::Collaborator(PermissionLevel::ReadWrite)
        )
    }
}

/// Chat listing entry for a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub chat: Chat,
    pub access: ChatAccess,
}

/// A chat with its full history, as seen by one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatView {
    pub chat: Chat,
    pub access: ChatAccess,
    pub messages: Vec<Message>,
}

/// Validate a user-supplied name (directory, chat, display name)
pub(crate) fn require_name(field: &str, value: &str) -> super::error::CollabResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(super::error::CollabError::MissingField(field.to_string()));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_access() {
        assert!(ChatAccess::Owner.can_write());
        assert!(ChatAccess::Collaborator(PermissionLevel::ReadWrite).can_write());
        assert!(!ChatAccess::Collaborator(PermissionLevel::ReadOnly).can_write());
    }

    #[test]
    fn test_author_serialization() {
        let user = serde_json::to_value(MessageAuthor::User(UserId::new("bob"))).unwrap();
        assert_eq!(user["role"], "user");
        assert_eq!(user["user_id"], "bob");

        let assistant = serde_json::to_value(MessageAuthor::Assistant).unwrap();
        assert_eq!(assistant["role"], "assistant");
    }

    #[test]
    fn test_require_name_trims() {
        assert_eq!(require_name("name", "  Notes ").unwrap(), "Notes");
        assert!(require_name("name", "   ").is_err());
    }
}
