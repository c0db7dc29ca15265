//! Async collaboration service
//!
//! Wraps the synchronous [`CollabManagerImpl`] for use from async handlers
//! and adds invitation delivery through a [`Notifier`]. Storage calls run
//! on tokio's blocking pool.

use super::access::{Decision, Operation};
use super::chat::{Chat, ChatSummary, ChatView, Directory, Message, User};
use super::error::{CollabError, CollabResult};
use super::invitation::{Invitation, InvitationId};
use super::manager::{
    AccessControl, ChatDirectory, CollaboratorManager, InvitationRegistry,
};
use super::manager_impl::CollabManagerImpl;
use super::notify::{DeliveryStatus, Notifier};
use super::permission::{Collaborator, PermissionLevel};
use crate::core_store::model::types::{ChatId, DirectoryId, UserId};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

tokio::task_local! {
    static DEADLINE: Instant;
}

/// Run `fut` with a deadline for the storage work it starts
///
/// Work that has not begun, or whose write lock only frees up after the
/// deadline, fails with [`CollabError::Timeout`] and writes nothing. Work
/// already past that point runs to completion.
pub async fn with_deadline<F: Future>(deadline: Instant, fut: F) -> F::Output {
    DEADLINE.scope(deadline, fut).await
}

/// Invitation lifetime limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvitationPolicy {
    /// TTL used when the caller does not ask for one
    pub default_ttl: Duration,
    /// Longest TTL a caller may ask for
    pub max_ttl: Duration,
}

impl Default for InvitationPolicy {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(7 * 24 * 3600),
            max_ttl: Duration::from_secs(30 * 24 * 3600),
        }
    }
}

/// A created (or resent) invitation and what happened to its delivery
///
/// A failed delivery leaves the invitation pending.
#[derive(Debug, Clone)]
pub struct InvitationReceipt {
    pub invitation: Invitation,
    pub delivery: DeliveryStatus,
}

/// Async collaboration service shared by request handlers
#[derive(Clone)]
pub struct CollabService {
    manager: Arc<CollabManagerImpl>,
    notifier: Arc<dyn Notifier>,
    policy: InvitationPolicy,
}

impl CollabService {
    pub fn new(manager: CollabManagerImpl, notifier: Arc<dyn Notifier>) -> Self {
        Self::with_policy(manager, notifier, InvitationPolicy::default())
    }

    pub fn with_policy(
        manager: CollabManagerImpl,
        notifier: Arc<dyn Notifier>,
        policy: InvitationPolicy,
    ) -> Self {
        Self {
            manager: Arc::new(manager),
            notifier,
            policy,
        }
    }

    /// The underlying synchronous manager
    pub fn manager(&self) -> &Arc<CollabManagerImpl> {
        &self.manager
    }

    pub fn policy(&self) -> InvitationPolicy {
        self.policy
    }

    async fn blocking<T, F>(&self, f: F) -> CollabResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&CollabManagerImpl) -> CollabResult<T> + Send + 'static,
    {
        let manager = match DEADLINE.try_with(|deadline| *deadline) {
            Ok(deadline) if Instant::now() >= deadline => {
                return Err(CollabError::Timeout(
                    "request deadline passed before storage work started".to_string(),
                ));
            }
            Ok(deadline) => Arc::new(self.manager.with_deadline(deadline)),
            Err(_) => self.manager.clone(),
        };
        tokio::task::spawn_blocking(move || f(&manager))
            .await
            .map_err(|e| CollabError::Internal(format!("storage task failed: {}", e)))?
    }

    // ===== Users, directories, chats =====

    pub async fn register_user(&self, email: String, display_name: String) -> CollabResult<User> {
        self.blocking(move |m| m.register_user(&email, &display_name)).await
    }

    pub async fn get_user(&self, user_id: UserId) -> CollabResult<User> {
        self.blocking(move |m| m.get_user(&user_id)).await
    }

    pub async fn list_users(&self) -> CollabResult<Vec<User>> {
        self.blocking(|m| m.list_users()).await
    }

    pub async fn update_user(&self, user_id: UserId, display_name: String) -> CollabResult<User> {
        self.blocking(move |m| m.update_user(&user_id, &display_name)).await
    }

    pub async fn create_directory(&self, owner: UserId, name: String) -> CollabResult<Directory> {
        self.blocking(move |m| m.create_directory(&owner, &name)).await
    }

    pub async fn list_directories(&self, owner: UserId) -> CollabResult<Vec<Directory>> {
        self.blocking(move |m| m.list_directories(&owner)).await
    }

    pub async fn create_chat(
        &self,
        owner: UserId,
        directory: DirectoryId,
        name: String,
    ) -> CollabResult<Chat> {
        self.blocking(move |m| m.create_chat(&owner, &directory, &name)).await
    }

    pub async fn list_user_chats(&self, user_id: UserId) -> CollabResult<Vec<ChatSummary>> {
        self.blocking(move |m| m.list_user_chats(&user_id)).await
    }

    pub async fn view_chat(&self, user_id: UserId, chat_id: ChatId) -> CollabResult<ChatView> {
        self.blocking(move |m| m.view_chat(&user_id, &chat_id)).await
    }

    pub async fn post_message(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        body: String,
    ) -> CollabResult<Message> {
        self.blocking(move |m| m.post_message(&user_id, &chat_id, &body)).await
    }

    pub async fn authorize(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        operation: Operation,
    ) -> CollabResult<Decision> {
        self.blocking(move |m| m.authorize(&user_id, &chat_id, operation)).await
    }

    // ===== Invitations =====

    /// Create an invitation and hand its token to the notifier
    ///
    /// `ttl` defaults to the policy's default and may not exceed its
    /// maximum.
    pub async fn invite(
        &self,
        chat_id: ChatId,
        inviter: UserId,
        invitee_email: String,
        permission: PermissionLevel,
        ttl: Option<Duration>,
    ) -> CollabResult<InvitationReceipt> {
        let ttl = ttl.unwrap_or(self.policy.default_ttl);
        if ttl > self.policy.max_ttl {
            return Err(CollabError::MissingField(format!(
                "ttl exceeds the maximum of {}s",
                self.policy.max_ttl.as_secs()
            )));
        }

        let (invitation, chat_name) = self
            .blocking(move |m| {
                let invitation =
                    m.create_invitation(&chat_id, &inviter, &invitee_email, permission, ttl)?;
                let chat_name = chat_name(m, &invitation.chat_id)?;
                Ok((invitation, chat_name))
            })
            .await?;

        let delivery = self.deliver(&invitation, &chat_name).await;
        Ok(InvitationReceipt {
            invitation,
            delivery,
        })
    }

    /// Redeliver the unchanged token of the pending invitation
    pub async fn resend(
        &self,
        chat_id: ChatId,
        invitee_email: String,
        requesting: UserId,
    ) -> CollabResult<InvitationReceipt> {
        let (invitation, chat_name) = self
            .blocking(move |m| {
                let invitation = m.pending_invitation(&chat_id, &invitee_email, &requesting)?;
                let chat_name = chat_name(m, &invitation.chat_id)?;
                Ok((invitation, chat_name))
            })
            .await?;

        let delivery = self.deliver(&invitation, &chat_name).await;
        Ok(InvitationReceipt {
            invitation,
            delivery,
        })
    }

    pub async fn consume(&self, token: String, invitee: UserId) -> CollabResult<Collaborator> {
        self.blocking(move |m| m.consume(&token, &invitee)).await
    }

    pub async fn revoke(
        &self,
        chat_id: ChatId,
        invitee_email: String,
        requesting: UserId,
    ) -> CollabResult<Option<InvitationId>> {
        self.blocking(move |m| m.revoke(&chat_id, &invitee_email, &requesting)).await
    }

    pub async fn list_invitations(
        &self,
        chat_id: ChatId,
        requesting: UserId,
    ) -> CollabResult<Vec<Invitation>> {
        self.blocking(move |m| m.list_invitations(&chat_id, &requesting)).await
    }

    async fn deliver(&self, invitation: &Invitation, chat_name: &str) -> DeliveryStatus {
        let span = tracing::info_span!(
            "deliver_invitation",
            invitation_id = %invitation.id,
            chat_id = %invitation.chat_id,
        );

        let result = self
            .notifier
            .send(&invitation.invitee_email, &invitation.token, chat_name)
            .instrument(span)
            .await;

        match result {
            Ok(()) => DeliveryStatus::Delivered,
            Err(e) => {
                tracing::warn!(
                    invitation_id = %invitation.id,
                    error = %e,
                    "Invitation delivery failed, invitation stays pending"
                );
                DeliveryStatus::Failed(e.to_string())
            }
        }
    }

    // ===== Collaborators =====

    pub async fn view_collaborators(
        &self,
        requesting: UserId,
        chat_id: ChatId,
    ) -> CollabResult<Vec<Collaborator>> {
        self.blocking(move |m| m.view_collaborators(&requesting, &chat_id)).await
    }

    pub async fn assign_permission(
        &self,
        requesting: UserId,
        chat_id: ChatId,
        collaborator: UserId,
        is_read_only: bool,
    ) -> CollabResult<Collaborator> {
        self.blocking(move |m| {
            m.assign_permission(&requesting, &chat_id, &collaborator, is_read_only)
        })
        .await
    }

    pub async fn remove_collaborator(
        &self,
        requesting: UserId,
        chat_id: ChatId,
        collaborator: UserId,
    ) -> CollabResult<()> {
        self.blocking(move |m| m.remove_collaborator(&requesting, &chat_id, &collaborator))
            .await
    }
}

fn chat_name(manager: &CollabManagerImpl, chat_id: &ChatId) -> CollabResult<String> {
    manager
        .store()
        .get_chat(chat_id)?
        .map(|chat| chat.name)
        .ok_or_else(|| CollabError::not_found("chat", chat_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_chat::error::ExpiryReason;
    use crate::core_chat::notify::OutboxNotifier;
    use crate::core_chat::storage::ChatSqlStore;
    use crate::core_chat::token::{TokenCodec, TokenSecret};

    async fn setup() -> (CollabService, Arc<OutboxNotifier>, UserId, UserId, ChatId) {
        let outbox = Arc::new(OutboxNotifier::new());
        let manager = CollabManagerImpl::new(
            ChatSqlStore::memory().unwrap(),
            TokenCodec::new(TokenSecret::generate()),
        );
        let service = CollabService::new(manager, outbox.clone());

        let alice = service
            .register_user("alice@example.com".into(), "Alice".into())
            .await
            .unwrap()
            .id;
        let bob = service
            .register_user("bob@example.com".into(), "Bob".into())
            .await
            .unwrap()
            .id;
        let dir = service.create_directory(alice.clone(), "Work".into()).await.unwrap();
        let chat = service
            .create_chat(alice.clone(), dir.id, "Roadmap".into())
            .await
            .unwrap()
            .id;

        (service, outbox, alice, bob, chat)
    }

    #[tokio::test]
    async fn test_invite_delivers_token() {
        let (service, outbox, alice, bob, chat) = setup().await;

        let receipt = service
            .invite(chat.clone(), alice, "bob@example.com".into(), PermissionLevel::ReadWrite, None)
            .await
            .unwrap();
        assert!(receipt.delivery.is_delivered());

        let sent = outbox.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_name, "Roadmap");
        assert_eq!(sent[0].token, receipt.invitation.token);

        let collab = service.consume(sent[0].token.as_str().to_string(), bob).await.unwrap();
        assert_eq!(collab.chat_id, chat);
    }

    #[tokio::test]
    async fn test_delivery_failure_keeps_invitation_pending() {
        let (service, outbox, alice, bob, chat) = setup().await;
        outbox.fail_with(Some("mailbox unavailable"));

        let receipt = service
            .invite(chat.clone(), alice.clone(), "bob@example.com".into(), PermissionLevel::ReadOnly, None)
            .await
            .unwrap();
        assert!(matches!(receipt.delivery, DeliveryStatus::Failed(_)));

        outbox.fail_with(None);
        let resent = service
            .resend(chat.clone(), "bob@example.com".into(), alice)
            .await
            .unwrap();
        assert!(resent.delivery.is_delivered());
        assert_eq!(resent.invitation.id, receipt.invitation.id);
        assert_eq!(outbox.last_token_for("bob@example.com"), Some(receipt.invitation.token.clone()));

        service
            .consume(receipt.invitation.token.as_str().to_string(), bob)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ttl_above_maximum_rejected() {
        let (service, _outbox, alice, _bob, chat) = setup().await;
        let too_long = service.policy().max_ttl + Duration::from_secs(1);

        let err = service
            .invite(chat, alice, "bob@example.com".into(), PermissionLevel::ReadOnly, Some(too_long))
            .await
            .unwrap_err();
        assert!(matches!(err, CollabError::MissingField(_)));
    }

    #[tokio::test]
    async fn test_superseded_token_fails() {
        let (service, _outbox, alice, bob, chat) = setup().await;

        let first = service
            .invite(chat.clone(), alice.clone(), "bob@example.com".into(), PermissionLevel::ReadWrite, None)
            .await
            .unwrap();
        let second = service
            .invite(chat.clone(), alice, "bob@example.com".into(), PermissionLevel::ReadOnly, None)
            .await
            .unwrap();

        let err = service
            .consume(first.invitation.token.as_str().to_string(), bob.clone())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CollabError::InvitationExpired { reason: ExpiryReason::Revoked, .. }
        ));

        let collab = service
            .consume(second.invitation.token.as_str().to_string(), bob.clone())
            .await
            .unwrap();
        assert_eq!(collab.permission, PermissionLevel::ReadOnly);
        assert_eq!(
            service.authorize(bob, chat, Operation::Write).await.unwrap(),
            Decision::Deny(crate::core_chat::access::DenyReason::InsufficientPermission)
        );
    }

    #[tokio::test]
    async fn test_passed_deadline_writes_nothing() {
        let (service, outbox, alice, _bob, chat) = setup().await;

        let err = with_deadline(
            Instant::now(),
            service.invite(chat.clone(), alice.clone(), "carol@example.com".into(), PermissionLevel::ReadOnly, None),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "timeout");
        assert!(outbox.sent().is_empty());
        assert!(service.list_invitations(chat.clone(), alice.clone()).await.unwrap().is_empty());

        let receipt = with_deadline(
            Instant::now() + Duration::from_secs(30),
            service.invite(chat, alice, "carol@example.com".into(), PermissionLevel::ReadOnly, None),
        )
        .await
        .unwrap();
        assert!(receipt.delivery.is_delivered());
    }
}
