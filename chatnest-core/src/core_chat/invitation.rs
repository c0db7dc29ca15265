//! Chat invitations

use super::error::{CollabError, CollabResult, ExpiryReason};
use super::permission::PermissionLevel;
use super::token::InvitationToken;
use crate::core_store::model::types::{ChatId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for an invitation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvitationId(pub Uuid);

impl InvitationId {
    pub fn generate() -> Self {
        InvitationId(Uuid::new_v4())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        InvitationId(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn parse(s: &str) -> CollabResult<Self> {
        Uuid::parse_str(s)
            .map(InvitationId)
            .map_err(|_| CollabError::MissingField(format!("invitation id '{}' is not a UUID", s)))
    }
}

impl fmt::Display for InvitationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of an invitation
///
/// `Pending` is the only state from which an invitation can be consumed.
/// The other three states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvitationStatus {
    Pending,
    Consumed,
    Expired,
    Revoked,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "Pending",
            InvitationStatus::Consumed => "Consumed",
            InvitationStatus::Expired => "Expired",
            InvitationStatus::Revoked => "Revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(InvitationStatus::Pending),
            "Consumed" => Some(InvitationStatus::Consumed),
            "Expired" => Some(InvitationStatus::Expired),
            "Revoked" => Some(InvitationStatus::Revoked),
            _ => None,
        }
    }
}

/// A signed, time-limited offer of access to one chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    pub id: InvitationId,

    /// Bearer token sent to the invitee
    pub token: InvitationToken,

    pub chat_id: ChatId,

    /// Owner of the chat at creation time
    pub inviter_id: UserId,

    /// Normalized (trimmed, lowercase) invitee address
    pub invitee_email: String,

    pub permission: PermissionLevel,

    pub created_at: Timestamp,

    /// Always later than `created_at`
    pub expires_at: Timestamp,

    pub status: InvitationStatus,

    /// Set once the invitation is consumed
    pub consumed_by: Option<UserId>,
    pub consumed_at: Option<Timestamp>,
}

/// Timestamps are stored as signed 64-bit milliseconds
const LATEST_STORABLE: Timestamp = Timestamp(i64::MAX as u64);

impl Invitation {
    /// Compute `(created_at, expires_at)` for an invitation issued at `now`
    ///
    /// `expires_at` is capped at the latest instant the store can hold, so
    /// the token carries exactly what gets persisted. A zero TTL yields an
    /// invitation that is already expired: `created_at` is moved one
    /// millisecond back so it stays strictly before `expires_at`, except at
    /// the epoch itself, where `expires_at` moves forward instead.
    pub fn lifetime(now: Timestamp, ttl: Duration) -> (Timestamp, Timestamp) {
        let expires_at = now.saturating_add(ttl).min(LATEST_STORABLE);
        if expires_at > now {
            (now, expires_at)
        } else if expires_at.as_millis() == 0 {
            (expires_at, Timestamp::from_millis(1))
        } else {
            (expires_at.saturating_sub_millis(1), expires_at)
        }
    }

    /// Whether `expires_at` has been reached
    pub fn is_past_expiry(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    pub fn is_pending(&self) -> bool {
        self.status == InvitationStatus::Pending
    }

    /// Check whether the invitation can still be consumed at `now`
    pub fn check_redeemable(&self, now: Timestamp) -> Result<(), ExpiryReason> {
        match self.status {
            InvitationStatus::Consumed => Err(ExpiryReason::AlreadyConsumed),
            InvitationStatus::Revoked => Err(ExpiryReason::Revoked),
            InvitationStatus::Expired => Err(ExpiryReason::Expired),
            InvitationStatus::Pending if self.is_past_expiry(now) => Err(ExpiryReason::Expired),
            InvitationStatus::Pending => Ok(()),
        }
    }
}

/// Normalize an email address for comparison and storage
pub fn normalize_email(email: &str) -> CollabResult<String> {
    let normalized = email.trim().to_lowercase();

    if normalized.is_empty() {
        return Err(CollabError::MissingField("email".to_string()));
    }

    match normalized.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(normalized),
        _ => Err(CollabError::MissingField(format!(
            "email '{}' is not a valid address",
            normalized
        ))),
    }
}
