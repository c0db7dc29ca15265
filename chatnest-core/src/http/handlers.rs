//! HTTP API handlers

use super::state::AppState;
use super::types::*;
use crate::core_chat::{CollabError, CollabResult};
use crate::core_store::model::types::{ChatId, DirectoryId, UserId};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use std::time::Duration;

/// Error returned by handlers, tagged with where it happened
#[derive(Debug)]
pub struct ApiError {
    pub origin: &'static str,
    pub error: CollabError,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.error {
            CollabError::MissingField(_) | CollabError::InvalidToken(_) => StatusCode::BAD_REQUEST,
            CollabError::NotAuthorized { .. } => StatusCode::FORBIDDEN,
            CollabError::NotFound { .. } => StatusCode::NOT_FOUND,
            CollabError::AlreadyExists { .. } => StatusCode::CONFLICT,
            CollabError::InvitationExpired { .. } => StatusCode::GONE,
            CollabError::DeliveryFailed { .. } => StatusCode::BAD_GATEWAY,
            CollabError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            CollabError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal details stay in the log
        let error_message = if status.is_server_error() {
            tracing::error!(origin = self.origin, error = %self.error, "Request failed");
            if matches!(self.error, CollabError::Internal(_)) {
                "internal server error".to_string()
            } else {
                self.error.to_string()
            }
        } else {
            tracing::debug!(origin = self.origin, error = %self.error, "Request rejected");
            self.error.to_string()
        };

        let body = ErrorResponse {
            origin: self.origin.to_string(),
            kind: self.error.kind().to_string(),
            error_message,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Attach an origin tag to a core result
trait Origin<T> {
    fn origin(self, origin: &'static str) -> ApiResult<T>;
}

impl<T> Origin<T> for CollabResult<T> {
    fn origin(self, origin: &'static str) -> ApiResult<T> {
        self.map_err(|error| ApiError { origin, error })
    }
}

/// Turn a body that is not JSON, or not the expected shape, into a field error
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> CollabResult<Json<T>> {
    payload.map_err(|rejection| {
        CollabError::MissingField(format!("request body: {}", rejection.body_text()))
    })
}

fn required(value: Option<String>, field: &str) -> CollabResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| CollabError::MissingField(field.to_string()))
}

// ============================================================================
// Health
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// User Handlers
// ============================================================================

/// POST /users - Register a user
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    const ORIGIN: &str = "userDirectory -> registerUser";
    let Json(req) = json_body(payload).origin(ORIGIN)?;
    let email = required(req.email, "email").origin(ORIGIN)?;
    let display_name = required(req.display_name, "display_name").origin(ORIGIN)?;

    let user = state.service.register_user(email, display_name).await.origin(ORIGIN)?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// GET /users
pub async fn list_users(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<UserResponse>>> {
    let users = state.service.list_users().await.origin("userDirectory -> listUsers")?;
    Ok(Json(users.into_iter().map(Into::into).collect()))
}

/// GET /users/:user_id
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserResponse>> {
    let user = state
        .service
        .get_user(UserId::new(user_id))
        .await
        .origin("userDirectory -> viewProfile")?;
    Ok(Json(user.into()))
}

/// PUT /users/:user_id
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> ApiResult<Json<UserResponse>> {
    const ORIGIN: &str = "userDirectory -> updateProfile";
    let Json(req) = json_body(payload).origin(ORIGIN)?;
    let display_name = required(req.display_name, "display_name").origin(ORIGIN)?;

    let user = state
        .service
        .update_user(UserId::new(user_id), display_name)
        .await
        .origin(ORIGIN)?;
    Ok(Json(user.into()))
}

// ============================================================================
// Directory and Chat Handlers
// ============================================================================

/// POST /users/:user_id/directories
pub async fn create_directory(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    payload: Result<Json<NameRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<DirectoryResponse>)> {
    const ORIGIN: &str = "chatDirectory -> createDirectory";
    let Json(req) = json_body(payload).origin(ORIGIN)?;
    let name = required(req.name, "name").origin(ORIGIN)?;

    let dir = state
        .service
        .create_directory(UserId::new(user_id), name)
        .await
        .origin(ORIGIN)?;
    Ok((StatusCode::CREATED, Json(dir.into())))
}

/// GET /users/:user_id/directories
pub async fn list_directories(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<DirectoryResponse>>> {
    let dirs = state
        .service
        .list_directories(UserId::new(user_id))
        .await
        .origin("chatDirectory -> listDirectories")?;
    Ok(Json(dirs.into_iter().map(Into::into).collect()))
}

/// POST /users/:user_id/directories/:directory_id/chats
pub async fn create_chat(
    State(state): State<Arc<AppState>>,
    Path((user_id, directory_id)): Path<(String, String)>,
    payload: Result<Json<NameRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ChatResponse>)> {
    const ORIGIN: &str = "chatDirectory -> createChat";
    let Json(req) = json_body(payload).origin(ORIGIN)?;
    let name = required(req.name, "name").origin(ORIGIN)?;

    let chat = state
        .service
        .create_chat(UserId::new(user_id), DirectoryId::new(directory_id), name)
        .await
        .origin(ORIGIN)?;
    Ok((StatusCode::CREATED, Json(chat.into())))
}

/// GET /users/:user_id/chats - Owned and shared chats
pub async fn list_chats(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<ChatSummaryResponse>>> {
    let chats = state
        .service
        .list_user_chats(UserId::new(user_id))
        .await
        .origin("chatDirectory -> listChats")?;
    Ok(Json(chats.into_iter().map(Into::into).collect()))
}

/// GET /users/:user_id/chats/:chat_id
pub async fn view_chat(
    State(state): State<Arc<AppState>>,
    Path((user_id, chat_id)): Path<(String, String)>,
) -> ApiResult<Json<ChatViewResponse>> {
    let view = state
        .service
        .view_chat(UserId::new(user_id), ChatId::new(chat_id))
        .await
        .origin("chatDirectory -> viewChat")?;
    Ok(Json(view.into()))
}

/// POST /users/:user_id/chats/:chat_id/messages
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Path((user_id, chat_id)): Path<(String, String)>,
    payload: Result<Json<PostMessageRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    const ORIGIN: &str = "chatDirectory -> postMessage";
    let Json(req) = json_body(payload).origin(ORIGIN)?;
    let body = required(req.body, "body").origin(ORIGIN)?;

    let msg = state
        .service
        .post_message(UserId::new(user_id), ChatId::new(chat_id), body)
        .await
        .origin(ORIGIN)?;
    Ok((StatusCode::CREATED, Json(msg.into())))
}

// ============================================================================
// Invitation Handlers
// ============================================================================

/// POST /users/:user_id/chats/:chat_id/invitations
pub async fn create_invitation(
    State(state): State<Arc<AppState>>,
    Path((user_id, chat_id)): Path<(String, String)>,
    payload: Result<Json<CreateInvitationRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<InvitationReceiptResponse>)> {
    const ORIGIN: &str = "invitationRegistry -> createInvitation";
    let Json(req) = json_body(payload).origin(ORIGIN)?;
    let permission = req
        .permission()
        .ok_or_else(|| CollabError::MissingField("permission".to_string()))
        .origin(ORIGIN)?;
    let email = required(req.invitee_email, "invitee_email").origin(ORIGIN)?;
    let ttl = req.ttl_secs.map(Duration::from_secs);

    let receipt = state
        .service
        .invite(ChatId::new(chat_id), UserId::new(user_id), email, permission, ttl)
        .await
        .origin(ORIGIN)?;
    Ok((StatusCode::CREATED, Json(receipt.into())))
}

/// GET /users/:user_id/chats/:chat_id/invitations
pub async fn list_invitations(
    State(state): State<Arc<AppState>>,
    Path((user_id, chat_id)): Path<(String, String)>,
) -> ApiResult<Json<Vec<InvitationResponse>>> {
    let invitations = state
        .service
        .list_invitations(ChatId::new(chat_id), UserId::new(user_id))
        .await
        .origin("invitationRegistry -> listInvitations")?;
    Ok(Json(invitations.into_iter().map(Into::into).collect()))
}

/// DELETE /users/:user_id/chats/:chat_id/invitations/:email
pub async fn revoke_invitation(
    State(state): State<Arc<AppState>>,
    Path((user_id, chat_id, email)): Path<(String, String, String)>,
) -> ApiResult<Json<RevokeResponse>> {
    let revoked = state
        .service
        .revoke(ChatId::new(chat_id), email, UserId::new(user_id))
        .await
        .origin("invitationRegistry -> revoke")?;
    Ok(Json(RevokeResponse {
        revoked: revoked.map(|id| id.to_string()),
    }))
}

/// POST /users/:user_id/chats/:chat_id/invitations/:email/resend
pub async fn resend_invitation(
    State(state): State<Arc<AppState>>,
    Path((user_id, chat_id, email)): Path<(String, String, String)>,
) -> ApiResult<Json<InvitationReceiptResponse>> {
    let receipt = state
        .service
        .resend(ChatId::new(chat_id), email, UserId::new(user_id))
        .await
        .origin("invitationRegistry -> resend")?;
    Ok(Json(receipt.into()))
}

/// POST /users/:user_id/invitations/:token - Redeem an invitation token
pub async fn consume_invitation(
    State(state): State<Arc<AppState>>,
    Path((user_id, token)): Path<(String, String)>,
) -> ApiResult<Json<CollaboratorResponse>> {
    let collaborator = state
        .service
        .consume(token, UserId::new(user_id))
        .await
        .origin("invitationRegistry -> consume")?;
    Ok(Json(collaborator.into()))
}

// ============================================================================
// Collaborator Handlers
// ============================================================================

/// GET /users/:user_id/chats/:chat_id/collaborators
pub async fn list_collaborators(
    State(state): State<Arc<AppState>>,
    Path((user_id, chat_id)): Path<(String, String)>,
) -> ApiResult<Json<Vec<CollaboratorResponse>>> {
    let collaborators = state
        .service
        .view_collaborators(UserId::new(user_id), ChatId::new(chat_id))
        .await
        .origin("collaboratorManager -> viewCollaborators")?;
    Ok(Json(collaborators.into_iter().map(Into::into).collect()))
}

/// PUT /users/:user_id/chats/:chat_id/permissions
pub async fn assign_permission(
    State(state): State<Arc<AppState>>,
    Path((user_id, chat_id)): Path<(String, String)>,
    payload: Result<Json<AssignPermissionRequest>, JsonRejection>,
) -> ApiResult<Json<CollaboratorResponse>> {
    const ORIGIN: &str = "collaboratorManager -> assignPermission";
    let Json(req) = json_body(payload).origin(ORIGIN)?;
    let collaborator = required(req.collaborator_id, "collaborator_id").origin(ORIGIN)?;
    let is_read_only = req
        .is_read_only
        .ok_or_else(|| CollabError::MissingField("is_read_only".to_string()))
        .origin(ORIGIN)?;

    let updated = state
        .service
        .assign_permission(
            UserId::new(user_id),
            ChatId::new(chat_id),
            UserId::new(collaborator),
            is_read_only,
        )
        .await
        .origin(ORIGIN)?;
    Ok(Json(updated.into()))
}

/// DELETE /users/:user_id/chats/:chat_id/collaborators/:collaborator_id
pub async fn remove_collaborator(
    State(state): State<Arc<AppState>>,
    Path((user_id, chat_id, collaborator_id)): Path<(String, String, String)>,
) -> ApiResult<StatusCode> {
    state
        .service
        .remove_collaborator(
            UserId::new(user_id),
            ChatId::new(chat_id),
            UserId::new(collaborator_id),
        )
        .await
        .origin("collaboratorManager -> removeCollaborator")?;
    Ok(StatusCode::NO_CONTENT)
}
