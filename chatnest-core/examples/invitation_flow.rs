//! Walk through an invitation from creation to redemption
//!
//! Run with:
//! ```bash
//! cargo run --example invitation_flow
//! ```

use chatnest_core::core_chat::{
    ChatSqlStore, CollabError, CollabManagerImpl, CollabService, Operation, OutboxNotifier,
    PermissionLevel, TokenCodec, TokenSecret,
};
use chatnest_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging_with_config(LogConfig::new(LogLevel::Debug).with_target(false))?;

    // The outbox stands in for a mailbox so the demo can read the token back
    let outbox = Arc::new(OutboxNotifier::new());
    let manager = CollabManagerImpl::new(
        ChatSqlStore::memory()?,
        TokenCodec::new(TokenSecret::generate()),
    );
    let service = CollabService::new(manager, outbox.clone());

    let alice = service
        .register_user("alice@example.com".into(), "Alice".into())
        .await?;
    let bob = service.register_user("bob@example.com".into(), "Bob".into()).await?;
    let dir = service.create_directory(alice.id.clone(), "Work".into()).await?;
    let chat = service
        .create_chat(alice.id.clone(), dir.id, "Roadmap".into())
        .await?;

    let receipt = service
        .invite(
            chat.id.clone(),
            alice.id.clone(),
            "bob@example.com".into(),
            PermissionLevel::ReadOnly,
            None,
        )
        .await?;
    info!(invitation_id = %receipt.invitation.id, "Invitation sent");

    let token = outbox
        .last_token_for("bob@example.com")
        .ok_or_else(|| anyhow::anyhow!("nothing delivered"))?;
    let collaborator = service.consume(token.as_str().to_string(), bob.id.clone()).await?;
    info!(permission = %collaborator.permission, "Bob joined the chat");

    let write = service
        .authorize(bob.id.clone(), chat.id.clone(), Operation::Write)
        .await?;
    info!(allowed = write.is_allowed(), "Bob asks to write");

    match service.consume(token.as_str().to_string(), bob.id.clone()).await {
        Err(e @ CollabError::InvitationExpired { .. }) => info!(error = %e, "Second redemption refused"),
        other => anyhow::bail!("unexpected second redemption result: {:?}", other),
    }
    Ok(())
}
