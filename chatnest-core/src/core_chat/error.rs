//! Error types for the chat collaboration subsystem

use super::access::DenyReason;
use super::invitation::InvitationId;
use crate::core_store::model::types::{ChatId, UserId};
use std::fmt;
use thiserror::Error;

/// Result type for collaboration operations
pub type CollabResult<T> = Result<T, CollabError>;

/// Why a stored invitation can no longer be redeemed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    /// `expires_at` has passed (or the status was already set to Expired)
    Expired,
    /// Superseded by a newer invitation or revoked by the owner
    Revoked,
    /// The token was already redeemed
    AlreadyConsumed,
}

impl ExpiryReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpiryReason::Expired => "expired",
            ExpiryReason::Revoked => "revoked",
            ExpiryReason::AlreadyConsumed => "already_consumed",
        }
    }
}

impl fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpiryReason::Expired => write!(f, "invitation has expired"),
            ExpiryReason::Revoked => write!(f, "invitation was revoked"),
            ExpiryReason::AlreadyConsumed => write!(f, "invitation was already consumed"),
        }
    }
}

/// Errors that can occur in collaboration operations
///
/// Messages never include invitation tokens or the signing secret.
#[derive(Error, Debug)]
pub enum CollabError {
    /// A required field is absent or malformed
    #[error("Missing or invalid field: {0}")]
    MissingField(String),

    /// The access decision engine denied the operation
    #[error("Permission denied: {user} cannot {action} on chat {chat} ({reason})")]
    NotAuthorized {
        user: UserId,
        chat: ChatId,
        action: &'static str,
        reason: DenyReason,
    },

    /// Chat, directory, user or invitation is absent
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A unique record (e.g. a user email) already exists
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    /// The token is malformed or its signature does not match
    #[error("Invalid invitation token: {0}")]
    InvalidToken(&'static str),

    /// The invitation exists but can no longer be redeemed
    #[error("Invitation {invitation} cannot be used: {reason}")]
    InvitationExpired {
        invitation: InvitationId,
        reason: ExpiryReason,
    },

    /// The notification gateway could not deliver the invitation
    #[error("Failed to deliver invitation to {email}: {reason}")]
    DeliveryFailed { email: String, reason: String },

    /// The request deadline passed before the work could be committed;
    /// nothing was written
    #[error("Request deadline exceeded: {0}")]
    Timeout(String),

    /// Storage or other internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CollabError {
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        CollabError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable kind, used by the HTTP layer
    pub fn kind(&self) -> &'static str {
        match self {
            CollabError::MissingField(_) => "missing_field",
            CollabError::NotAuthorized { .. } => "not_authorized",
            CollabError::NotFound { .. } => "not_found",
            CollabError::AlreadyExists { .. } => "already_exists",
            CollabError::InvalidToken(_) => "invalid_token",
            CollabError::InvitationExpired { reason, .. } => reason.as_str(),
            CollabError::DeliveryFailed { .. } => "delivery_failed",
            CollabError::Timeout(_) => "timeout",
            CollabError::Internal(_) => "internal",
        }
    }
}

impl From<rusqlite::Error> for CollabError {
    fn from(e: rusqlite::Error) -> Self {
        CollabError::Internal(format!("database error: {}", e))
    }
}

impl From<r2d2::Error> for CollabError {
    fn from(e: r2d2::Error) -> Self {
        CollabError::Internal(format!("connection pool error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_authorized_display_names_context() {
        let err = CollabError::NotAuthorized {
            user: UserId::new("bob"),
            chat: ChatId::new("c1"),
            action: "write",
            reason: DenyReason::InsufficientPermission,
        };
        let msg = err.to_string();
        assert!(msg.contains("bob"));
        assert!(msg.contains("c1"));
        assert!(msg.contains("write"));
        assert_eq!(err.kind(), "not_authorized");
    }

    #[test]
    fn test_expired_kinds_are_distinct() {
        let id = InvitationId::generate();
        let kinds: Vec<_> = [
            ExpiryReason::Expired,
            ExpiryReason::Revoked,
            ExpiryReason::AlreadyConsumed,
        ]
        .into_iter()
        .map(|reason| CollabError::InvitationExpired { invitation: id, reason }.kind())
        .collect();

        assert_eq!(kinds, vec!["expired", "revoked", "already_consumed"]);
    }

    #[test]
    fn test_storage_errors_become_internal() {
        let err: CollabError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, CollabError::Internal(_)));
    }
}
