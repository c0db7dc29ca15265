//! Chat collaboration
//!
//! Owners keep directories of chats and invite collaborators to single
//! chats with a read-only or read-write permission.
//!
//! Key components:
//! - **Token codec**: signed, time-bound invitation tokens
//! - **Invitation registry**: one pending invitation per (chat, email),
//!   atomic consumption
//! - **Permission store**: collaborator entries per chat
//! - **Access decisions**: every chat read or write goes through [`access::decide`]
//! - **Notifier**: delivery of invitation tokens, by SMTP in production
//!
//! # Example
//!
//! ```no_run
//! use chatnest_core::core_chat::{
//!     ChatDirectory, ChatSqlStore, CollabManagerImpl, InvitationRegistry, PermissionLevel,
//!     TokenCodec, TokenSecret,
//! };
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), chatnest_core::core_chat::CollabError> {
//! let manager = CollabManagerImpl::new(
//!     ChatSqlStore::memory()?,
//!     TokenCodec::new(TokenSecret::generate()),
//! );
//!
//! let alice = manager.register_user("alice@example.com", "Alice")?;
//! let bob = manager.register_user("bob@example.com", "Bob")?;
//! let dir = manager.create_directory(&alice.id, "Work")?;
//! let chat = manager.create_chat(&alice.id, &dir.id, "Roadmap")?;
//!
//! let invitation = manager.create_invitation(
//!     &chat.id,
//!     &alice.id,
//!     "bob@example.com",
//!     PermissionLevel::ReadOnly,
//!     Duration::from_secs(3600),
//! )?;
//! manager.consume(invitation.token.as_str(), &bob.id)?;
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod chat;
pub mod clock;
pub mod error;
pub mod invitation;
pub mod manager;
pub mod manager_impl;
pub mod notify;
pub mod permission;
pub mod service;
pub mod smtp;
pub mod storage;
pub mod token;

pub use access::{decide, Decision, DenyReason, Operation};
pub use chat::{Chat, ChatAccess, ChatSummary, ChatView, Directory, Message, MessageAuthor, User};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CollabError, CollabResult, ExpiryReason};
pub use invitation::{normalize_email, Invitation, InvitationId, InvitationStatus};
pub use manager::{
    AccessControl, ChatDirectory, CollaboratorManager, InvitationRegistry, PermissionStore,
};
pub use manager_impl::CollabManagerImpl;
pub use notify::{DeliveryStatus, LogNotifier, Notifier, OutboxEntry, OutboxNotifier};
pub use permission::{Collaborator, PermissionLevel};
pub use service::{with_deadline, CollabService, InvitationPolicy, InvitationReceipt};
pub use smtp::{SmtpNotifier, SmtpSettings};
pub use storage::ChatSqlStore;
pub use token::{InvitationToken, TokenClaims, TokenCodec, TokenError, TokenSecret};
