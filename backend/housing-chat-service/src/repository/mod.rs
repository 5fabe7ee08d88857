//! Persistence layer for conversations and messages.
//!
//! Every method touches at most one conversation and one message and is
//! atomic for that document; callers never need a cross-document transaction.

use crate::error::AppResult;
use crate::models::{Conversation, Message, ParticipantPair, Reaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryChatStore;
pub use postgres::PgChatStore;

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Insert the conversation unless one already exists for the same
    /// participant pair and property; returns whichever row is stored.
    async fn create_conversation(&self, conversation: Conversation) -> AppResult<Conversation>;

    async fn find_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>>;

    async fn find_conversation_by_key(
        &self,
        participants: ParticipantPair,
        property_id: Uuid,
    ) -> AppResult<Option<Conversation>>;

    /// All conversations `user_id` participates in, most recent activity first.
    async fn list_conversations_for(&self, user_id: Uuid) -> AppResult<Vec<Conversation>>;

    /// Point the conversation at its newest message and bump the recipient's
    /// unread counter by one. The pointer only moves forward in time; the
    /// counter is bumped either way.
    async fn record_send(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
        recipient_id: Uuid,
    ) -> AppResult<()>;

    async fn reset_unread(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<()>;

    async fn insert_message(&self, message: Message) -> AppResult<Message>;

    async fn find_message(&self, id: Uuid) -> AppResult<Option<Message>>;

    async fn find_messages(&self, ids: &[Uuid]) -> AppResult<Vec<Message>>;

    /// One page of messages visible to `viewer`, newest first.
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        viewer: Uuid,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<Message>>;

    /// Add `reader` to `read_by` of every message in the conversation it did
    /// not send. Returns how many messages became read.
    async fn mark_read(&self, conversation_id: Uuid, reader: Uuid) -> AppResult<u64>;

    async fn update_content(&self, message_id: Uuid, content: String) -> AppResult<Message>;

    async fn hide_for(&self, message_id: Uuid, user_id: Uuid) -> AppResult<()>;

    /// Hard delete. Clears the owning conversation's last-message pointer and
    /// reply references if they pointed at this message. Returns whether a row
    /// was removed.
    async fn delete_message(&self, message_id: Uuid) -> AppResult<bool>;

    /// Append a reaction; a repeated (user, emoji) pair is a no-op.
    async fn add_reaction(&self, message_id: Uuid, reaction: Reaction) -> AppResult<Message>;
}
