//! Request/Response types for the HTTP API
//!
//! Request fields are optional so that absent values surface as
//! `missing_field` errors instead of extractor rejections. Invitation
//! responses never carry the token; it only travels through the notifier.

use crate::core_chat::{
    Chat, ChatAccess, ChatSummary, ChatView, Collaborator, DeliveryStatus, Directory, Invitation,
    InvitationReceipt, InvitationStatus, Message, MessageAuthor, PermissionLevel, User,
};
use crate::core_store::model::types::Timestamp;
use serde::{Deserialize, Serialize};

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub email: Option<String>,
    #[serde(alias = "displayName")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(alias = "displayName")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            user_id: user.id.to_string(),
            email: user.email,
            display_name: user.display_name,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

// ============================================================================
// Directories and chats
// ============================================================================

/// Body for creating a directory or a chat
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NameRequest {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryResponse {
    pub directory_id: String,
    pub owner_id: String,
    pub name: String,
    pub created_at: Timestamp,
}

impl From<Directory> for DirectoryResponse {
    fn from(dir: Directory) -> Self {
        Self {
            directory_id: dir.id.to_string(),
            owner_id: dir.owner_id.to_string(),
            name: dir.name,
            created_at: dir.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub chat_id: String,
    pub directory_id: String,
    pub owner_id: String,
    pub name: String,
    pub created_at: Timestamp,
}

impl From<Chat> for ChatResponse {
    fn from(chat: Chat) -> Self {
        Self {
            chat_id: chat.id.to_string(),
            directory_id: chat.directory_id.to_string(),
            owner_id: chat.owner_id.to_string(),
            name: chat.name,
            created_at: chat.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSummaryResponse {
    pub chat: ChatResponse,
    #[serde(flatten)]
    pub access: ChatAccess,
}

impl From<ChatSummary> for ChatSummaryResponse {
    fn from(summary: ChatSummary) -> Self {
        Self {
            chat: summary.chat.into(),
            access: summary.access,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostMessageRequest {
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message_id: String,
    pub author: MessageAuthor,
    pub body: String,
    pub created_at: Timestamp,
}

impl From<Message> for MessageResponse {
    fn from(msg: Message) -> Self {
        Self {
            message_id: msg.id.to_string(),
            author: msg.author,
            body: msg.body,
            created_at: msg.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatViewResponse {
    pub chat: ChatResponse,
    #[serde(flatten)]
    pub access: ChatAccess,
    pub messages: Vec<MessageResponse>,
}

impl From<ChatView> for ChatViewResponse {
    fn from(view: ChatView) -> Self {
        Self {
            chat: view.chat.into(),
            access: view.access,
            messages: view.messages.into_iter().map(Into::into).collect(),
        }
    }
}

// ============================================================================
// Invitations
// ============================================================================

/// Body for `POST /users/:user_id/chats/:chat_id/invitations`
///
/// The level may be given as `permission` or as the boolean
/// `is_read_only`. `permission` wins when both are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateInvitationRequest {
    #[serde(alias = "email", alias = "inviteeEmail")]
    pub invitee_email: Option<String>,
    pub permission: Option<PermissionLevel>,
    #[serde(alias = "isReadOnly")]
    pub is_read_only: Option<bool>,
    /// Lifetime in seconds, bounded by the configured maximum
    pub ttl_secs: Option<u64>,
}

impl CreateInvitationRequest {
    pub fn permission(&self) -> Option<PermissionLevel> {
        self.permission
            .or_else(|| self.is_read_only.map(PermissionLevel::from_read_only))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationResponse {
    pub invitation_id: String,
    pub chat_id: String,
    pub inviter_id: String,
    pub invitee_email: String,
    pub permission: PermissionLevel,
    pub status: InvitationStatus,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub consumed_by: Option<String>,
    pub consumed_at: Option<Timestamp>,
}

impl From<Invitation> for InvitationResponse {
    fn from(inv: Invitation) -> Self {
        Self {
            invitation_id: inv.id.to_string(),
            chat_id: inv.chat_id.to_string(),
            inviter_id: inv.inviter_id.to_string(),
            invitee_email: inv.invitee_email,
            permission: inv.permission,
            status: inv.status,
            created_at: inv.created_at,
            expires_at: inv.expires_at,
            consumed_by: inv.consumed_by.map(|id| id.to_string()),
            consumed_at: inv.consumed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationReceiptResponse {
    pub invitation: InvitationResponse,
    pub delivery: DeliveryStatus,
}

impl From<InvitationReceipt> for InvitationReceiptResponse {
    fn from(receipt: InvitationReceipt) -> Self {
        Self {
            invitation: receipt.invitation.into(),
            delivery: receipt.delivery,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeResponse {
    /// Id of the revoked invitation, `None` when nothing was pending
    pub revoked: Option<String>,
}

// ============================================================================
// Collaborators
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorResponse {
    pub chat_id: String,
    pub user_id: String,
    pub permission: PermissionLevel,
    pub invited_email: String,
    pub granted_at: Timestamp,
}

impl From<Collaborator> for CollaboratorResponse {
    fn from(c: Collaborator) -> Self {
        Self {
            chat_id: c.chat_id.to_string(),
            user_id: c.user_id.to_string(),
            permission: c.permission,
            invited_email: c.invited_email,
            granted_at: c.granted_at,
        }
    }
}

/// Body for `PUT /users/:user_id/chats/:chat_id/permissions`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignPermissionRequest {
    /// The collaborator whose level changes
    #[serde(alias = "userId")]
    pub collaborator_id: Option<String>,
    #[serde(alias = "isReadOnly")]
    pub is_read_only: Option<bool>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// `"<component> -> <operation>"`
    pub origin: String,
    pub kind: String,
    #[serde(rename = "errorMessage")]
    pub error_message: String,
}
