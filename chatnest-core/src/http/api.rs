//! API routes definition

use super::handlers;
use super::state::AppState;
use super::types::ErrorResponse;
use crate::core_chat::with_deadline;
use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Build the API router with all endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    let timeout = state.request_timeout;

    Router::new()
        .route("/health", get(handlers::health))
        // User routes
        .route("/users", post(handlers::create_user).get(handlers::list_users))
        .route("/users/:user_id", get(handlers::get_user).put(handlers::update_user))
        // Directory and chat routes
        .route(
            "/users/:user_id/directories",
            post(handlers::create_directory).get(handlers::list_directories),
        )
        .route(
            "/users/:user_id/directories/:directory_id/chats",
            post(handlers::create_chat),
        )
        .route("/users/:user_id/chats", get(handlers::list_chats))
        .route("/users/:user_id/chats/:chat_id", get(handlers::view_chat))
        .route("/users/:user_id/chats/:chat_id/messages", post(handlers::post_message))
        // Invitation routes
        .route(
            "/users/:user_id/chats/:chat_id/invitations",
            post(handlers::create_invitation).get(handlers::list_invitations),
        )
        .route(
            "/users/:user_id/chats/:chat_id/invitations/:email",
            delete(handlers::revoke_invitation),
        )
        .route(
            "/users/:user_id/chats/:chat_id/invitations/:email/resend",
            post(handlers::resend_invitation),
        )
        .route("/users/:user_id/invitations/:token", post(handlers::consume_invitation))
        // Collaborator routes
        .route(
            "/users/:user_id/chats/:chat_id/collaborators",
            get(handlers::list_collaborators),
        )
        .route(
            "/users/:user_id/chats/:chat_id/collaborators/:collaborator_id",
            delete(handlers::remove_collaborator),
        )
        .route("/users/:user_id/chats/:chat_id/permissions", put(handlers::assign_permission))
        .layer(middleware::from_fn_with_state(timeout, request_timeout))
        // State
        .with_state(state)
}

/// Bound request time
///
/// Reads are cut off at the timeout. Writes are never abandoned mid-flight:
/// they carry the deadline into the service, and whatever they answer
/// (including a 408) matches what was stored.
async fn request_timeout(State(timeout): State<Duration>, request: Request, next: Next) -> Response {
    let deadline = Instant::now() + timeout;

    if !matches!(*request.method(), Method::GET | Method::HEAD) {
        return with_deadline(deadline, next.run(request)).await;
    }

    let path = request.uri().path().to_string();
    match tokio::time::timeout(timeout, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(path = %path, timeout_ms = timeout.as_millis() as u64, "Request timed out");
            let body = ErrorResponse {
                origin: "http -> request".to_string(),
                kind: "timeout".to_string(),
                error_message: format!("request exceeded {}ms", timeout.as_millis()),
            };
            (StatusCode::REQUEST_TIMEOUT, Json(body)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_chat::{
        ChatSqlStore, CollabManagerImpl, CollabService, OutboxNotifier, TokenCodec, TokenSecret,
    };
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        outbox: Arc<OutboxNotifier>,
    }

    impl TestApp {
        fn new() -> Self {
            let outbox = Arc::new(OutboxNotifier::new());
            let manager = CollabManagerImpl::new(
                ChatSqlStore::memory().unwrap(),
                TokenCodec::new(TokenSecret::generate()),
            );
            let service = CollabService::new(manager, outbox.clone());
            Self {
                router: build_router(Arc::new(AppState::new(service))),
                outbox,
            }
        }

        async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let builder = HttpRequest::builder().method(method).uri(uri);
            let request = match body {
                Some(body) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }

        async fn call_raw(&self, uri: &str, content_type: Option<&str>, body: &str) -> (StatusCode, Value) {
            let mut builder = HttpRequest::builder().method(Method::POST).uri(uri);
            if let Some(content_type) = content_type {
                builder = builder.header("content-type", content_type);
            }
            let request = builder.body(Body::from(body.to_string())).unwrap();

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, serde_json::from_slice(&bytes).unwrap())
        }

        async fn user(&self, email: &str) -> String {
            let (status, body) = self
                .call(Method::POST, "/users", Some(json!({ "email": email, "display_name": email })))
                .await;
            assert_eq!(status, StatusCode::CREATED);
            body["user_id"].as_str().unwrap().to_string()
        }

        async fn chat(&self, owner: &str) -> String {
            let (_, dir) = self
                .call(Method::POST, &format!("/users/{owner}/directories"), Some(json!({ "name": "Work" })))
                .await;
            let dir_id = dir["directory_id"].as_str().unwrap();
            let (status, chat) = self
                .call(
                    Method::POST,
                    &format!("/users/{owner}/directories/{dir_id}/chats"),
                    Some(json!({ "name": "Roadmap" })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
            chat["chat_id"].as_str().unwrap().to_string()
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new();
        let (status, body) = app.call(Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_email_is_bad_request() {
        let app = TestApp::new();
        let (status, body) = app
            .call(Method::POST, "/users", Some(json!({ "display_name": "Alice" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "missing_field");
        assert_eq!(body["origin"], "userDirectory -> registerUser");
        assert!(body["errorMessage"].as_str().unwrap().contains("email"));
    }

    #[tokio::test]
    async fn test_malformed_json_uses_error_envelope() {
        let app = TestApp::new();
        let (status, body) = app.call_raw("/users", Some("application/json"), "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "missing_field");
        assert_eq!(body["origin"], "userDirectory -> registerUser");
        assert!(body["errorMessage"].as_str().unwrap().starts_with("request body"));

        let alice = app.user("alice@example.com").await;
        let chat = app.chat(&alice).await;
        let (status, body) = app
            .call_raw(
                &format!("/users/{alice}/chats/{chat}/invitations"),
                Some("application/json"),
                r#"{"invitee_email": 42}"#,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["origin"], "invitationRegistry -> createInvitation");
    }

    #[tokio::test]
    async fn test_missing_content_type_uses_error_envelope() {
        let app = TestApp::new();
        let (status, body) = app
            .call_raw("/users", None, r#"{"email": "a@example.com", "display_name": "A"}"#)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "missing_field");
        assert_eq!(body["origin"], "userDirectory -> registerUser");

        let (status, body) = app.call_raw("/users", Some("text/plain"), "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "missing_field");
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let app = TestApp::new();
        app.user("alice@example.com").await;
        let (status, body) = app
            .call(
                Method::POST,
                "/users",
                Some(json!({ "email": "Alice@Example.com", "display_name": "Again" })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "already_exists");
    }

    #[tokio::test]
    async fn test_invite_consume_and_toggle() {
        let app = TestApp::new();
        let alice = app.user("alice@example.com").await;
        let bob = app.user("bob@example.com").await;
        let chat = app.chat(&alice).await;

        let (status, receipt) = app
            .call(
                Method::POST,
                &format!("/users/{alice}/chats/{chat}/invitations"),
                Some(json!({ "invitee_email": "bob@example.com", "isReadOnly": true })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(receipt["delivery"]["status"], "delivered");
        assert_eq!(receipt["invitation"]["status"], "Pending");
        assert!(receipt["invitation"].get("token").is_none());

        let token = app.outbox.last_token_for("bob@example.com").unwrap();

        // Not yet a collaborator
        let (status, body) = app.call(Method::GET, &format!("/users/{bob}/chats/{chat}"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["kind"], "not_authorized");

        let (status, collab) = app
            .call(Method::POST, &format!("/users/{bob}/invitations/{}", token.as_str()), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(collab["permission"], "read_only");

        let (status, _) = app.call(Method::GET, &format!("/users/{bob}/chats/{chat}"), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .call(
                Method::POST,
                &format!("/users/{bob}/chats/{chat}/messages"),
                Some(json!({ "body": "hello" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, updated) = app
            .call(
                Method::PUT,
                &format!("/users/{alice}/chats/{chat}/permissions"),
                Some(json!({ "userId": bob, "isReadOnly": false })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["permission"], "read_write");

        let (status, _) = app
            .call(
                Method::POST,
                &format!("/users/{bob}/chats/{chat}/messages"),
                Some(json!({ "body": "hello" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        // Second redemption of the same token
        let (status, body) = app
            .call(Method::POST, &format!("/users/{bob}/invitations/{}", token.as_str()), None)
            .await;
        assert_eq!(status, StatusCode::GONE);
        assert_eq!(body["kind"], "already_consumed");
    }

    #[tokio::test]
    async fn test_garbage_token_is_bad_request() {
        let app = TestApp::new();
        let bob = app.user("bob@example.com").await;
        let (status, body) = app
            .call(Method::POST, &format!("/users/{bob}/invitations/not-a-token"), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_token");
        assert_eq!(body["origin"], "invitationRegistry -> consume");
    }

    #[tokio::test]
    async fn test_revoke_and_remove_collaborator() {
        let app = TestApp::new();
        let alice = app.user("alice@example.com").await;
        let bob = app.user("bob@example.com").await;
        let chat = app.chat(&alice).await;
        let invitations = format!("/users/{alice}/chats/{chat}/invitations");

        app.call(
            Method::POST,
            &invitations,
            Some(json!({ "invitee_email": "bob@example.com", "permission": "read_write" })),
        )
        .await;
        let first = app.outbox.last_token_for("bob@example.com").unwrap();

        let (status, body) = app
            .call(Method::DELETE, &format!("{invitations}/bob%40example.com"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["revoked"].is_string());

        let (status, body) = app
            .call(Method::POST, &format!("/users/{bob}/invitations/{}", first.as_str()), None)
            .await;
        assert_eq!(status, StatusCode::GONE);
        assert_eq!(body["kind"], "revoked");

        app.call(
            Method::POST,
            &invitations,
            Some(json!({ "invitee_email": "bob@example.com", "permission": "read_write" })),
        )
        .await;
        let second = app.outbox.last_token_for("bob@example.com").unwrap();
        let (status, _) = app
            .call(Method::POST, &format!("/users/{bob}/invitations/{}", second.as_str()), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, listed) = app
            .call(Method::GET, &format!("/users/{alice}/chats/{chat}/collaborators"), None)
            .await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let (status, _) = app
            .call(
                Method::DELETE,
                &format!("/users/{alice}/chats/{chat}/collaborators/{bob}"),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = app.call(Method::GET, &format!("/users/{bob}/chats/{chat}"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
