//! Manager trait implementations with the collaboration business logic

use super::access::{decide, Decision, DenyReason, Operation};
use super::chat::{
    require_name, Chat, ChatAccess, ChatSummary, ChatView, Directory, Message, MessageAuthor, User,
};
use super::clock::{Clock, SystemClock};
use super::error::{CollabError, CollabResult, ExpiryReason};
use super::invitation::{normalize_email, Invitation, InvitationId, InvitationStatus};
use super::manager::{
    AccessControl, ChatDirectory, CollaboratorManager, InvitationRegistry, PermissionStore,
};
use super::permission::{Collaborator, PermissionLevel};
use super::storage::ChatSqlStore;
use super::token::TokenCodec;
use crate::core_store::model::types::{ChatId, DirectoryId, MessageId, UserId};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Manager implementation over the SQL store
///
/// Holds no mutable state of its own. All coordination between concurrent
/// callers happens in the store's transactions.
pub struct CollabManagerImpl {
    store: ChatSqlStore,
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
}

impl CollabManagerImpl {
    /// Create a manager using the system clock
    pub fn new(store: ChatSqlStore, codec: TokenCodec) -> Self {
        Self::with_clock(store, codec, Arc::new(SystemClock))
    }

    pub fn with_clock(store: ChatSqlStore, codec: TokenCodec, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            codec,
            clock,
        }
    }

    /// The same manager whose write transactions honour `deadline`
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            store: self.store.with_deadline(deadline),
            codec: self.codec.clone(),
            clock: self.clock.clone(),
        }
    }

    pub fn store(&self) -> &ChatSqlStore {
        &self.store
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    fn require_user(&self, user_id: &UserId) -> CollabResult<User> {
        self.store
            .get_user(user_id)?
            .ok_or_else(|| CollabError::not_found("user", user_id))
    }

    fn require_chat(&self, chat_id: &ChatId) -> CollabResult<Chat> {
        self.store
            .get_chat(chat_id)?
            .ok_or_else(|| CollabError::not_found("chat", chat_id))
    }

    /// How `user_id` reaches `chat`, after a Read check
    fn access_for(&self, user_id: &UserId, chat: &Chat) -> CollabResult<ChatAccess> {
        let is_owner = &chat.owner_id == user_id;
        let entry = if is_owner {
            None
        } else {
            self.store.get_permission(&chat.id, user_id)?
        };

        decide(is_owner, entry, Operation::Read).into_result(user_id, &chat.id, Operation::Read)?;

        // only owners are allowed without an entry
        Ok(entry.map_or(ChatAccess::Owner, ChatAccess::Collaborator))
    }

    fn append(
        &self,
        user_id: &UserId,
        chat_id: &ChatId,
        author: MessageAuthor,
        body: &str,
    ) -> CollabResult<Message> {
        if body.trim().is_empty() {
            return Err(CollabError::MissingField("body".to_string()));
        }

        self.require(user_id, chat_id, Operation::Write)?;

        let message = Message {
            id: MessageId::generate(),
            chat_id: chat_id.clone(),
            author,
            body: body.to_string(),
            created_at: self.clock.now(),
        };
        self.store.append_message(&message)?;

        tracing::debug!(chat_id = %chat_id, user_id = %user_id, role = message.author.role(), "Message appended");
        Ok(message)
    }

    /// Explain why a consume lost: re-read the invitation after the
    /// conditional update matched nothing
    fn consume_failure(&self, id: &InvitationId) -> CollabError {
        let reason = match self.store.get_invitation(id) {
            Ok(Some(inv)) => match inv.status {
                InvitationStatus::Consumed => ExpiryReason::AlreadyConsumed,
                InvitationStatus::Revoked => ExpiryReason::Revoked,
                InvitationStatus::Pending | InvitationStatus::Expired => ExpiryReason::Expired,
            },
            Ok(None) => return CollabError::not_found("invitation", id),
            Err(e) => return e,
        };

        CollabError::InvitationExpired {
            invitation: *id,
            reason,
        }
    }
}

impl ChatDirectory for CollabManagerImpl {
    fn register_user(&self, email: &str, display_name: &str) -> CollabResult<User> {
        let email = normalize_email(email)?;
        let display_name = require_name("display_name", display_name)?;
        let now = self.clock.now();

        let user = User {
            id: UserId::generate(),
            email,
            display_name,
            created_at: now,
            updated_at: now,
        };
        self.store.create_user(&user)?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    fn get_user(&self, user_id: &UserId) -> CollabResult<User> {
        self.require_user(user_id)
    }

    fn list_users(&self) -> CollabResult<Vec<User>> {
        self.store.list_users()
    }

    fn update_user(&self, user_id: &UserId, display_name: &str) -> CollabResult<User> {
        let display_name = require_name("display_name", display_name)?;

        if !self
            .store
            .update_user_display_name(user_id, &display_name, self.clock.now())?
        {
            return Err(CollabError::not_found("user", user_id));
        }

        self.require_user(user_id)
    }

    fn create_directory(&self, owner: &UserId, name: &str) -> CollabResult<Directory> {
        let name = require_name("name", name)?;
        self.require_user(owner)?;

        let directory = Directory {
            id: DirectoryId::generate(),
            owner_id: owner.clone(),
            name,
            created_at: self.clock.now(),
        };
        self.store.create_directory(&directory)?;

        tracing::info!(directory_id = %directory.id, user_id = %owner, "Directory created");
        Ok(directory)
    }

    fn list_directories(&self, owner: &UserId) -> CollabResult<Vec<Directory>> {
        self.require_user(owner)?;
        self.store.list_directories(owner)
    }

    fn create_chat(
        &self,
        owner: &UserId,
        directory: &DirectoryId,
        name: &str,
    ) -> CollabResult<Chat> {
        let name = require_name("name", name)?;

        let dir = self
            .store
            .get_directory(directory)?
            .filter(|d| &d.owner_id == owner)
            .ok_or_else(|| CollabError::not_found("directory", directory))?;

        let chat = Chat {
            id: ChatId::generate(),
            directory_id: dir.id,
            owner_id: owner.clone(),
            name,
            created_at: self.clock.now(),
        };
        self.store.create_chat(&chat)?;

        tracing::info!(chat_id = %chat.id, user_id = %owner, "Chat created");
        Ok(chat)
    }

    fn list_user_chats(&self, user_id: &UserId) -> CollabResult<Vec<ChatSummary>> {
        self.require_user(user_id)?;

        let owned = self
            .store
            .list_owned_chats(user_id)?
            .into_iter()
            .map(|chat| ChatSummary {
                chat,
                access: ChatAccess::Owner,
            });

        let shared = self
            .store
            .list_shared_chats(user_id)?
            .into_iter()
            .map(|(chat, level)| ChatSummary {
                chat,
                access: ChatAccess::Collaborator(level),
            });

        Ok(owned.chain(shared).collect())
    }

    fn view_chat(&self, user_id: &UserId, chat_id: &ChatId) -> CollabResult<ChatView> {
        let chat = self.require_chat(chat_id)?;
        let access = self.access_for(user_id, &chat)?;
        let messages = self.store.list_messages(chat_id)?;

        Ok(ChatView {
            chat,
            access,
            messages,
        })
    }

    fn post_message(
        &self,
        user_id: &UserId,
        chat_id: &ChatId,
        body: &str,
    ) -> CollabResult<Message> {
        self.append(user_id, chat_id, MessageAuthor::User(user_id.clone()), body)
    }

    fn record_assistant_reply(
        &self,
        user_id: &UserId,
        chat_id: &ChatId,
        body: &str,
    ) -> CollabResult<Message> {
        self.append(user_id, chat_id, MessageAuthor::Assistant, body)
    }
}

impl AccessControl for CollabManagerImpl {
    fn authorize(
        &self,
        user_id: &UserId,
        chat_id: &ChatId,
        operation: Operation,
    ) -> CollabResult<Decision> {
        let owner = self
            .store
            .chat_owner(chat_id)?
            .ok_or_else(|| CollabError::not_found("chat", chat_id))?;

        if &owner == user_id {
            return Ok(decide(true, None, operation));
        }

        let entry = self.store.get_permission(chat_id, user_id)?;
        Ok(decide(false, entry, operation))
    }
}

impl InvitationRegistry for CollabManagerImpl {
    fn create_invitation(
        &self,
        chat_id: &ChatId,
        inviter: &UserId,
        invitee_email: &str,
        permission: PermissionLevel,
        ttl: Duration,
    ) -> CollabResult<Invitation> {
        let invitee_email = normalize_email(invitee_email)?;

        self.require(inviter, chat_id, Operation::ManageCollaborators)?;

        // The owner is implicitly ReadWrite and never a collaborator
        let owner = self.require_user(inviter)?;
        if owner.email == invitee_email {
            return Err(CollabError::NotAuthorized {
                user: inviter.clone(),
                chat: chat_id.clone(),
                action: "invite themselves to",
                reason: DenyReason::OwnerCannotCollaborate,
            });
        }

        let (created_at, expires_at) = Invitation::lifetime(self.clock.now(), ttl);
        let id = InvitationId::generate();

        let invitation = Invitation {
            id,
            token: self.codec.mint(&id, expires_at),
            chat_id: chat_id.clone(),
            inviter_id: inviter.clone(),
            invitee_email,
            permission,
            created_at,
            expires_at,
            status: InvitationStatus::Pending,
            consumed_by: None,
            consumed_at: None,
        };

        let superseded = self.store.insert_invitation(&invitation)?;

        tracing::info!(
            invitation_id = %invitation.id,
            chat_id = %chat_id,
            permission = %permission,
            expires_at = %expires_at,
            superseded = superseded.len(),
            "Invitation created"
        );

        Ok(invitation)
    }

    fn consume(&self, token: &str, invitee: &UserId) -> CollabResult<Collaborator> {
        let claims = self.codec.parse(token)?;

        let invitation = self
            .store
            .get_invitation(&claims.invitation_id)?
            .ok_or_else(|| CollabError::not_found("invitation", claims.invitation_id))?;

        // Tokens are immutable once issued
        if invitation.token.as_str() != token || invitation.expires_at != claims.expires_at {
            return Err(CollabError::InvalidToken("token does not match invitation"));
        }

        let now = self.clock.now();
        if let Err(reason) = invitation.check_redeemable(now) {
            if reason == ExpiryReason::Expired && invitation.is_pending() {
                self.store.mark_expired(&invitation.id)?;
            }

            tracing::info!(
                invitation_id = %invitation.id,
                user_id = %invitee,
                reason = reason.as_str(),
                "Invitation rejected"
            );
            return Err(CollabError::InvitationExpired {
                invitation: invitation.id,
                reason,
            });
        }

        self.require_user(invitee)?;

        let owner = self
            .store
            .chat_owner(&invitation.chat_id)?
            .ok_or_else(|| CollabError::not_found("chat", &invitation.chat_id))?;
        if &owner == invitee {
            return Err(CollabError::NotAuthorized {
                user: invitee.clone(),
                chat: invitation.chat_id.clone(),
                action: "join",
                reason: DenyReason::OwnerCannotCollaborate,
            });
        }

        let collaborator = Collaborator {
            chat_id: invitation.chat_id.clone(),
            user_id: invitee.clone(),
            permission: invitation.permission,
            invitation_id: invitation.id,
            invited_email: invitation.invitee_email.clone(),
            granted_at: now,
        };

        if !self.store.consume_invitation(&collaborator, now)? {
            return Err(self.consume_failure(&invitation.id));
        }

        tracing::info!(
            invitation_id = %invitation.id,
            chat_id = %collaborator.chat_id,
            user_id = %invitee,
            permission = %collaborator.permission,
            "Invitation consumed"
        );

        Ok(collaborator)
    }

    fn revoke(
        &self,
        chat_id: &ChatId,
        invitee_email: &str,
        requesting: &UserId,
    ) -> CollabResult<Option<InvitationId>> {
        let invitee_email = normalize_email(invitee_email)?;
        self.require(requesting, chat_id, Operation::ManageCollaborators)?;

        let revoked = self.store.revoke_pending(chat_id, &invitee_email)?;
        if let Some(id) = &revoked {
            tracing::info!(invitation_id = %id, chat_id = %chat_id, "Invitation revoked");
        }
        Ok(revoked)
    }

    fn list_invitations(
        &self,
        chat_id: &ChatId,
        requesting: &UserId,
    ) -> CollabResult<Vec<Invitation>> {
        self.require(requesting, chat_id, Operation::ManageCollaborators)?;
        self.store.list_invitations(chat_id)
    }

    fn pending_invitation(
        &self,
        chat_id: &ChatId,
        invitee_email: &str,
        requesting: &UserId,
    ) -> CollabResult<Invitation> {
        let invitee_email = normalize_email(invitee_email)?;
        self.require(requesting, chat_id, Operation::ManageCollaborators)?;

        let invitation = self
            .store
            .find_pending_invitation(chat_id, &invitee_email)?
            .ok_or_else(|| CollabError::not_found("pending invitation", &invitee_email))?;

        if invitation.is_past_expiry(self.clock.now()) {
            self.store.mark_expired(&invitation.id)?;
            return Err(CollabError::InvitationExpired {
                invitation: invitation.id,
                reason: ExpiryReason::Expired,
            });
        }

        Ok(invitation)
    }
}

impl CollaboratorManager for CollabManagerImpl {
    fn view_collaborators(
        &self,
        requesting: &UserId,
        chat_id: &ChatId,
    ) -> CollabResult<Vec<Collaborator>> {
        self.require(requesting, chat_id, Operation::Read)?;
        self.store.list_collaborators(chat_id)
    }

    fn assign_permission(
        &self,
        requesting: &UserId,
        chat_id: &ChatId,
        collaborator: &UserId,
        is_read_only: bool,
    ) -> CollabResult<Collaborator> {
        self.require(requesting, chat_id, Operation::ManageCollaborators)?;

        let level = PermissionLevel::from_read_only(is_read_only);
        self.store.set_permission(chat_id, collaborator, level)?;

        tracing::info!(chat_id = %chat_id, user_id = %collaborator, permission = %level, "Permission changed");

        self.store
            .get_collaborator(chat_id, collaborator)?
            .ok_or_else(|| CollabError::not_found("collaborator", collaborator))
    }

    fn remove_collaborator(
        &self,
        requesting: &UserId,
        chat_id: &ChatId,
        collaborator: &UserId,
    ) -> CollabResult<()> {
        self.require(requesting, chat_id, Operation::ManageCollaborators)?;

        if !self.store.remove_permission(chat_id, collaborator)? {
            return Err(CollabError::not_found("collaborator", collaborator));
        }

        tracing::info!(chat_id = %chat_id, user_id = %collaborator, "Collaborator removed");
        Ok(())
    }
}
