//! Invitation delivery
//!
//! The registry hands freshly minted tokens to a [`Notifier`]. Delivery is
//! at-least-once from the caller's point of view: a failed send leaves the
//! invitation pending and the owner can resend it.

use super::error::CollabError;
use super::token::InvitationToken;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

/// Delivers invitation tokens to invitees
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `token` for `chat_name` to `to_email`
    ///
    /// Fails with `CollabError::DeliveryFailed`.
    async fn send(
        &self,
        to_email: &str,
        token: &InvitationToken,
        chat_name: &str,
    ) -> Result<(), CollabError>;
}

/// Result of handing an invitation to the notifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Failed(String),
}

impl DeliveryStatus {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered)
    }
}

/// Development fallback that delivers nothing
///
/// Only selected with `notifications.transport = "log"`. The token is not
/// logged, so invitees never receive it; every send is reported as a
/// failed delivery and the owner can resend once a mail transport is
/// configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        to_email: &str,
        _token: &InvitationToken,
        chat_name: &str,
    ) -> Result<(), CollabError> {
        tracing::warn!(
            to = %to_email,
            chat = %chat_name,
            "No mail transport configured, invitation token was NOT delivered"
        );
        Err(CollabError::DeliveryFailed {
            email: to_email.to_string(),
            reason: "no mail transport configured".to_string(),
        })
    }
}

/// A message captured by [`OutboxNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    pub to_email: String,
    pub token: InvitationToken,
    pub chat_name: String,
}

/// In-memory notifier that keeps every sent invitation
#[derive(Debug, Default)]
pub struct OutboxNotifier {
    sent: Mutex<Vec<OutboxEntry>>,
    failure: Mutex<Option<String>>,
}

impl OutboxNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail with `reason`, or succeed again with `None`
    pub fn fail_with(&self, reason: Option<&str>) {
        *lock(&self.failure) = reason.map(str::to_string);
    }

    pub fn sent(&self) -> Vec<OutboxEntry> {
        lock(&self.sent).clone()
    }

    /// Most recent token sent to `email`
    pub fn last_token_for(&self, email: &str) -> Option<InvitationToken> {
        lock(&self.sent)
            .iter()
            .rev()
            .find(|entry| entry.to_email == email)
            .map(|entry| entry.token.clone())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn send(
        &self,
        to_email: &str,
        token: &InvitationToken,
        chat_name: &str,
    ) -> Result<(), CollabError> {
        if let Some(reason) = lock(&self.failure).clone() {
            return Err(CollabError::DeliveryFailed {
                email: to_email.to_string(),
                reason,
            });
        }

        lock(&self.sent).push(OutboxEntry {
            to_email: to_email.to_string(),
            token: token.clone(),
            chat_name: chat_name.to_string(),
        });
        Ok(())
    }
}
