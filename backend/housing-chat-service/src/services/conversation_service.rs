use super::Page;
use crate::directory::Directory;
use crate::error::{AppError, AppResult};
use crate::models::{Conversation, ConversationView, Message, ParticipantPair};
use crate::repository::ChatStore;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

pub struct ConversationService;

impl ConversationService {
    /// Load a conversation and make sure `user_id` takes part in it.
    pub async fn require_participant(
        store: &dyn ChatStore,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Conversation> {
        let conversation = store
            .find_conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if !conversation.is_participant(user_id) {
            tracing::warn!(
                conversation_id = %conversation_id,
                user_id = %user_id,
                "non-participant tried to access conversation"
            );
            return Err(AppError::Forbidden);
        }
        Ok(conversation)
    }

    /// Conversations of `user_id`, most recent activity first. `page = None`
    /// returns the whole list.
    pub async fn list_for_user(
        store: &dyn ChatStore,
        directory: &dyn Directory,
        user_id: Uuid,
        page: Option<Page>,
    ) -> AppResult<Vec<ConversationView>> {
        let all = store.list_conversations_for(user_id).await?;
        let selected: Vec<Conversation> = match page {
            Some(page) => all
                .into_iter()
                .skip(page.offset() as usize)
                .take(page.limit() as usize)
                .collect(),
            None => all,
        };
        Self::populate(store, directory, selected, user_id).await
    }

    /// Return the conversation between `a` and `b` about `property_id`,
    /// creating it with zeroed unread counters on first contact.
    pub async fn find_or_create(
        store: &dyn ChatStore,
        a: Uuid,
        b: Uuid,
        property_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Conversation> {
        let pair = ParticipantPair::new(a, b)?;
        if let Some(existing) = store.find_conversation_by_key(pair, property_id).await? {
            return Ok(existing);
        }

        // A concurrent creator may win between the lookup and the insert; the
        // store then hands back the stored row instead of ours.
        let conversation = store
            .create_conversation(Conversation::new(pair, property_id, now))
            .await?;
        tracing::info!(
            conversation_id = %conversation.id,
            property_id = %property_id,
            "conversation ready"
        );
        Ok(conversation)
    }

    pub async fn mark_read(
        store: &dyn ChatStore,
        conversation_id: Uuid,
        reader: Uuid,
    ) -> AppResult<Conversation> {
        let conversation = Self::require_participant(store, conversation_id, reader).await?;
        store.reset_unread(conversation.id, reader).await?;
        store
            .find_conversation(conversation.id)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn bump_on_send(
        store: &dyn ChatStore,
        conversation_id: Uuid,
        message_id: Uuid,
        recipient_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        store
            .record_send(conversation_id, message_id, at, recipient_id)
            .await
    }

    /// Populated view of one conversation as `viewer` sees it.
    pub async fn view(
        store: &dyn ChatStore,
        directory: &dyn Directory,
        conversation: Conversation,
        viewer: Uuid,
    ) -> AppResult<ConversationView> {
        let mut views = Self::populate(store, directory, vec![conversation], viewer).await?;
        views.pop().ok_or(AppError::Internal)
    }

    async fn populate(
        store: &dyn ChatStore,
        directory: &dyn Directory,
        conversations: Vec<Conversation>,
        viewer: Uuid,
    ) -> AppResult<Vec<ConversationView>> {
        if conversations.is_empty() {
            return Ok(Vec::new());
        }

        let user_ids: Vec<Uuid> = conversations
            .iter()
            .flat_map(|c| c.participants.as_array())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let users = directory.users(&user_ids).await?;

        let last_ids: Vec<Uuid> = conversations
            .iter()
            .filter_map(|c| c.last_message_id)
            .collect();
        let mut last_messages: HashMap<Uuid, Message> = store
            .find_messages(&last_ids)
            .await?
            .into_iter()
            .filter(|m| m.is_visible_to(viewer))
            .map(|m| (m.id, m))
            .collect();

        let mut properties = HashMap::new();
        for property_id in conversations.iter().map(|c| c.property_id) {
            if !properties.contains_key(&property_id) {
                properties.insert(property_id, directory.property(property_id).await?);
            }
        }

        Ok(conversations
            .into_iter()
            .map(|c| {
                let last = c.last_message_id.and_then(|id| last_messages.remove(&id));
                let property = properties.get(&c.property_id).cloned().flatten();
                ConversationView::new(c, &users, property, last)
            })
            .collect())
    }
}
