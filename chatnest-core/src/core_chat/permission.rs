//! Collaborator permissions

use super::invitation::InvitationId;
use crate::core_store::model::types::{ChatId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Access level granted to a collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    /// May view the chat and its history
    ReadOnly,
    /// May also post messages
    ReadWrite,
}

impl PermissionLevel {
    /// Map the `is_read_only` flag used by request bodies
    pub fn from_read_only(is_read_only: bool) -> Self {
        if is_read_only {
            PermissionLevel::ReadOnly
        } else {
            PermissionLevel::ReadWrite
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, PermissionLevel::ReadOnly)
    }

    /// Column value used by the SQL store
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::ReadOnly => "ReadOnly",
            PermissionLevel::ReadWrite => "ReadWrite",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ReadOnly" => Some(PermissionLevel::ReadOnly),
            "ReadWrite" => Some(PermissionLevel::ReadWrite),
            _ => None,
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's permission entry on a chat they do not own
///
/// Entries are only ever created by consuming an invitation, so every
/// collaborator points back at the invitation that admitted them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborator {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub permission: PermissionLevel,

    /// Invitation that created this entry
    pub invitation_id: InvitationId,

    /// Email address the invitation was sent to
    pub invited_email: String,

    pub granted_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_flag_mapping() {
        assert_eq!(PermissionLevel::from_read_only(true), PermissionLevel::ReadOnly);
        assert_eq!(PermissionLevel::from_read_only(false), PermissionLevel::ReadWrite);
        assert!(PermissionLevel::ReadOnly.is_read_only());
        assert!(!PermissionLevel::ReadWrite.is_read_only());
    }

    #[test]
    fn test_column_values_parse_back() {
        for level in [PermissionLevel::ReadOnly, PermissionLevel::ReadWrite] {
            assert_eq!(PermissionLevel::parse(level.as_str()), Some(level));
        }
        assert_eq!(PermissionLevel::parse("Admin"), None);
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&PermissionLevel::ReadWrite).unwrap();
        assert_eq!(json, "\"read_write\"");
    }
}
