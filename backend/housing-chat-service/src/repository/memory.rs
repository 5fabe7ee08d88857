use super::ChatStore;
use crate::error::{AppError, AppResult};
use crate::models::conversation::list_order;
use crate::models::message::MessageBody;
use crate::models::{Conversation, Message, ParticipantPair, Reaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    conversations: HashMap<Uuid, Conversation>,
    // (pair, property) -> conversation id
    conversation_keys: HashMap<(ParticipantPair, Uuid), Uuid>,
    messages: HashMap<Uuid, Message>,
}

/// Process-local store. Each call holds the write lock for its whole
/// read-modify-write, which gives the per-document atomicity the services need.
#[derive(Default)]
pub struct InMemoryChatStore {
    inner: RwLock<MemoryState>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn create_conversation(&self, conversation: Conversation) -> AppResult<Conversation> {
        let mut guard = self.inner.write().await;
        let key = (conversation.participants, conversation.property_id);
        if let Some(existing) = guard
            .conversation_keys
            .get(&key)
            .and_then(|id| guard.conversations.get(id))
        {
            return Ok(existing.clone());
        }
        guard.conversation_keys.insert(key, conversation.id);
        guard
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn find_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let guard = self.inner.read().await;
        Ok(guard.conversations.get(&id).cloned())
    }

    async fn find_conversation_by_key(
        &self,
        participants: ParticipantPair,
        property_id: Uuid,
    ) -> AppResult<Option<Conversation>> {
        let guard = self.inner.read().await;
        Ok(guard
            .conversation_keys
            .get(&(participants, property_id))
            .and_then(|id| guard.conversations.get(id))
            .cloned())
    }

    async fn list_conversations_for(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let guard = self.inner.read().await;
        let mut list: Vec<Conversation> = guard
            .conversations
            .values()
            .filter(|c| c.is_participant(user_id))
            .cloned()
            .collect();
        list.sort_by(list_order);
        Ok(list)
    }

    async fn record_send(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
        recipient_id: Uuid,
    ) -> AppResult<()> {
        let mut guard = self.inner.write().await;
        let conversation = guard
            .conversations
            .get_mut(&conversation_id)
            .ok_or(AppError::NotFound)?;
        // a late bump for an older message never moves the pointer back
        if conversation.last_message_at.map_or(true, |last| last <= at) {
            conversation.last_message_id = Some(message_id);
            conversation.last_message_at = Some(at);
        }
        *conversation.unread_count.entry(recipient_id).or_insert(0) += 1;
        Ok(())
    }

    async fn reset_unread(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let mut guard = self.inner.write().await;
        let conversation = guard
            .conversations
            .get_mut(&conversation_id)
            .ok_or(AppError::NotFound)?;
        conversation.unread_count.insert(user_id, 0);
        Ok(())
    }

    async fn insert_message(&self, message: Message) -> AppResult<Message> {
        let mut guard = self.inner.write().await;
        if !guard.conversations.contains_key(&message.conversation_id) {
            return Err(AppError::NotFound);
        }
        guard.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn find_message(&self, id: Uuid) -> AppResult<Option<Message>> {
        let guard = self.inner.read().await;
        Ok(guard.messages.get(&id).cloned())
    }

    async fn find_messages(&self, ids: &[Uuid]) -> AppResult<Vec<Message>> {
        let guard = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| guard.messages.get(id).cloned())
            .collect())
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        viewer: Uuid,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<Message>> {
        let guard = self.inner.read().await;
        let mut visible: Vec<&Message> = guard
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id && m.is_visible_to(viewer))
            .collect();
        visible.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(visible
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, conversation_id: Uuid, reader: Uuid) -> AppResult<u64> {
        let mut guard = self.inner.write().await;
        let mut newly_read = 0;
        for message in guard
            .messages
            .values_mut()
            .filter(|m| m.conversation_id == conversation_id && m.sender_id != reader)
        {
            if message.read_by.insert(reader) {
                newly_read += 1;
            }
        }
        Ok(newly_read)
    }

    async fn update_content(&self, message_id: Uuid, content: String) -> AppResult<Message> {
        let mut guard = self.inner.write().await;
        let message = guard
            .messages
            .get_mut(&message_id)
            .ok_or(AppError::NotFound)?;
        match &mut message.body {
            MessageBody::Text { content: current } => *current = content,
            _ => {
                return Err(AppError::InvalidOperation(
                    "only text messages can be edited".into(),
                ))
            }
        }
        message.is_edited = true;
        Ok(message.clone())
    }

    async fn hide_for(&self, message_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let mut guard = self.inner.write().await;
        let message = guard
            .messages
            .get_mut(&message_id)
            .ok_or(AppError::NotFound)?;
        message.deleted_for.insert(user_id);
        Ok(())
    }

    async fn delete_message(&self, message_id: Uuid) -> AppResult<bool> {
        let mut guard = self.inner.write().await;
        let Some(removed) = guard.messages.remove(&message_id) else {
            return Ok(false);
        };
        if let Some(conversation) = guard.conversations.get_mut(&removed.conversation_id) {
            if conversation.last_message_id == Some(message_id) {
                conversation.last_message_id = None;
            }
        }
        for message in guard
            .messages
            .values_mut()
            .filter(|m| m.reply_to == Some(message_id))
        {
            message.reply_to = None;
        }
        Ok(true)
    }

    async fn add_reaction(&self, message_id: Uuid, reaction: Reaction) -> AppResult<Message> {
        let mut guard = self.inner.write().await;
        let message = guard
            .messages
            .get_mut(&message_id)
            .ok_or(AppError::NotFound)?;
        message.push_reaction(reaction);
        Ok(message.clone())
    }
}
