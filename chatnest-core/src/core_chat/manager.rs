//! Manager traits for chat and collaboration operations

use super::access::{Decision, Operation};
use super::chat::{Chat, ChatSummary, ChatView, Directory, Message, User};
use super::error::CollabResult;
use super::invitation::{Invitation, InvitationId};
use super::permission::{Collaborator, PermissionLevel};
use crate::core_store::model::types::{ChatId, DirectoryId, UserId};
use std::time::Duration;

/// Users, directories, chats and their history
pub trait ChatDirectory {
    /// Register a user with a unique email
    fn register_user(&self, email: &str, display_name: &str) -> CollabResult<User>;

    fn get_user(&self, user_id: &UserId) -> CollabResult<User>;

    fn list_users(&self) -> CollabResult<Vec<User>>;

    /// Change a user's display name
    fn update_user(&self, user_id: &UserId, display_name: &str) -> CollabResult<User>;

    /// Create a directory owned by `owner`
    fn create_directory(&self, owner: &UserId, name: &str) -> CollabResult<Directory>;

    fn list_directories(&self, owner: &UserId) -> CollabResult<Vec<Directory>>;

    /// Create a chat in one of `owner`'s directories
    fn create_chat(&self, owner: &UserId, directory: &DirectoryId, name: &str)
        -> CollabResult<Chat>;

    /// Chats the user owns followed by chats shared with them
    fn list_user_chats(&self, user_id: &UserId) -> CollabResult<Vec<ChatSummary>>;

    /// Read a chat and its history (requires Read)
    fn view_chat(&self, user_id: &UserId, chat_id: &ChatId) -> CollabResult<ChatView>;

    /// Append a user turn (requires Write)
    fn post_message(&self, user_id: &UserId, chat_id: &ChatId, body: &str)
        -> CollabResult<Message>;

    /// Append an assistant turn on behalf of `user_id` (requires Write)
    fn record_assistant_reply(
        &self,
        user_id: &UserId,
        chat_id: &ChatId,
        body: &str,
    ) -> CollabResult<Message>;
}

/// Invitation lifecycle
pub trait InvitationRegistry {
    /// Create an invitation, superseding any pending one for the same email
    ///
    /// Only the chat owner may invite.
    fn create_invitation(
        &self,
        chat_id: &ChatId,
        inviter: &UserId,
        invitee_email: &str,
        permission: PermissionLevel,
        ttl: Duration,
    ) -> CollabResult<Invitation>;

    /// Redeem a token, making `invitee` a collaborator
    fn consume(&self, token: &str, invitee: &UserId) -> CollabResult<Collaborator>;

    /// Revoke the pending invitation for `invitee_email`, if any
    fn revoke(
        &self,
        chat_id: &ChatId,
        invitee_email: &str,
        requesting: &UserId,
    ) -> CollabResult<Option<InvitationId>>;

    /// All invitations of a chat, oldest first (owner only)
    fn list_invitations(&self, chat_id: &ChatId, requesting: &UserId)
        -> CollabResult<Vec<Invitation>>;

    /// The pending, unexpired invitation for `invitee_email` (owner only)
    fn pending_invitation(
        &self,
        chat_id: &ChatId,
        invitee_email: &str,
        requesting: &UserId,
    ) -> CollabResult<Invitation>;
}

/// Collaborator permission entries
///
/// Entries are created by consuming an invitation. `set_permission` only
/// changes the level of an existing entry.
pub trait PermissionStore {
    fn set_permission(
        &self,
        chat_id: &ChatId,
        user_id: &UserId,
        level: PermissionLevel,
    ) -> CollabResult<()>;

    fn get_permission(&self, chat_id: &ChatId, user_id: &UserId)
        -> CollabResult<Option<PermissionLevel>>;

    /// Returns whether an entry was removed
    fn remove_permission(&self, chat_id: &ChatId, user_id: &UserId) -> CollabResult<bool>;

    fn list_collaborators(&self, chat_id: &ChatId) -> CollabResult<Vec<Collaborator>>;

    fn chats_shared_with(&self, user_id: &UserId) -> CollabResult<Vec<(ChatId, PermissionLevel)>>;
}

/// Access checks on chats
pub trait AccessControl {
    /// Decide whether `user_id` may perform `operation` on `chat_id`
    fn authorize(
        &self,
        user_id: &UserId,
        chat_id: &ChatId,
        operation: Operation,
    ) -> CollabResult<Decision>;

    /// Like [`AccessControl::authorize`] but turns a denial into an error
    fn require(&self, user_id: &UserId, chat_id: &ChatId, operation: Operation) -> CollabResult<()> {
        self.authorize(user_id, chat_id, operation)?
            .into_result(user_id, chat_id, operation)
    }
}

/// Owner-facing collaborator management
pub trait CollaboratorManager {
    /// List a chat's collaborators (requires Read)
    fn view_collaborators(&self, requesting: &UserId, chat_id: &ChatId)
        -> CollabResult<Vec<Collaborator>>;

    /// Change an existing collaborator's level (requires ManageCollaborators)
    fn assign_permission(
        &self,
        requesting: &UserId,
        chat_id: &ChatId,
        collaborator: &UserId,
        is_read_only: bool,
    ) -> CollabResult<Collaborator>;

    /// Remove a collaborator (requires ManageCollaborators)
    fn remove_collaborator(
        &self,
        requesting: &UserId,
        chat_id: &ChatId,
        collaborator: &UserId,
    ) -> CollabResult<()>;
}
