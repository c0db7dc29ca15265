//! Access decisions for chat operations
//!
//! Every operation that reads or mutates a chat passes through
//! [`decide`]. The table is:
//!
//! | caller                 | Read  | Write | ManageCollaborators |
//! |------------------------|-------|-------|---------------------|
//! | owner                  | allow | allow | allow               |
//! | ReadWrite collaborator | allow | allow | deny                |
//! | ReadOnly collaborator  | allow | deny  | deny                |
//! | anyone else            | deny  | deny  | deny                |
//!
//! Owners are never stored as collaborators, so ownership is an input of
//! its own rather than a permission entry.

use super::error::{CollabError, CollabResult};
use super::permission::PermissionLevel;
use crate::core_store::model::types::{ChatId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of chat operation being authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Read,
    Write,
    ManageCollaborators,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::ManageCollaborators => "manage collaborators of",
        }
    }
}

/// Why a request was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenyReason {
    /// No collaborator entry exists for the caller
    NotACollaborator,
    /// The caller's permission level does not cover the operation
    InsufficientPermission,
    /// The chat owner tried to become a collaborator of their own chat
    OwnerCannotCollaborate,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::NotACollaborator => write!(f, "not a collaborator"),
            DenyReason::InsufficientPermission => write!(f, "insufficient permission"),
            DenyReason::OwnerCannotCollaborate => write!(f, "owner cannot be a collaborator"),
        }
    }
}

/// Outcome of an access check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Convert a denial into `CollabError::NotAuthorized`
    pub fn into_result(self, user: &UserId, chat: &ChatId, operation: Operation) -> CollabResult<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(CollabError::NotAuthorized {
                user: user.clone(),
                chat: chat.clone(),
                action: operation.as_str(),
                reason,
            }),
        }
    }
}

/// Decide whether an operation is allowed
pub fn decide(is_owner: bool, entry: Option<PermissionLevel>, operation: Operation) -> Decision {
    if is_owner {
        return Decision::Allow;
    }

    match (entry, operation) {
        (None, _) => Decision::Deny(DenyReason::NotACollaborator),
        (Some(_), Operation::Read) => Decision::Allow,
        (Some(PermissionLevel::ReadWrite), Operation::Write) => Decision::Allow,
        (Some(PermissionLevel::ReadOnly), Operation::Write) => {
            Decision::Deny(DenyReason::InsufficientPermission)
        }
        (Some(_), Operation::ManageCollaborators) => {
            Decision::Deny(DenyReason::InsufficientPermission)
        }
    }
}
