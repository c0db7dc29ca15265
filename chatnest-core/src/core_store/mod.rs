/*
    core_store - Shared value types for persisted records

    Holds the identifiers and timestamps that every persisted record
    (users, directories, chats, messages, invitations) is keyed by.
*/

pub mod model;

// Re-export commonly used types
pub use model::{ChatId, DirectoryId, MessageId, Timestamp, UserId};
