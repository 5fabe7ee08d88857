//! Message lifecycle: listing with read bookkeeping, sending, editing,
//! both delete scopes and reactions.
//!
//! Every operation re-checks conversation membership against the store; the
//! caller only supplies the authenticated user id.

use super::{ConversationService, Page};
use crate::directory::Directory;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::message::{validate_emoji, validate_text};
use crate::models::{Message, MessagePayload, MessageView, Reaction, ReplySummary};
use crate::repository::ChatStore;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

pub struct MessageService;

impl MessageService {
    /// One page of the conversation in chronological order. Opening the
    /// conversation marks everything the requester received as read.
    pub async fn list(
        store: &dyn ChatStore,
        directory: &dyn Directory,
        conversation_id: Uuid,
        requester: Uuid,
        page: Page,
    ) -> AppResult<Vec<MessageView>> {
        let conversation =
            ConversationService::require_participant(store, conversation_id, requester).await?;

        let newly_read = store.mark_read(conversation.id, requester).await?;
        store.reset_unread(conversation.id, requester).await?;
        if newly_read > 0 {
            tracing::debug!(
                conversation_id = %conversation.id,
                reader = %requester,
                newly_read,
                "marked messages as read"
            );
        }

        let mut messages = store
            .list_messages(conversation.id, requester, page.offset(), page.limit())
            .await?;
        messages.reverse();
        Self::populate(store, directory, messages).await
    }

    pub async fn send(
        store: &dyn ChatStore,
        directory: &dyn Directory,
        conversation_id: Uuid,
        sender: Uuid,
        payload: MessagePayload,
        now: DateTime<Utc>,
    ) -> AppResult<MessageView> {
        let conversation =
            ConversationService::require_participant(store, conversation_id, sender).await?;
        payload.validate()?;

        if let Some(reply_id) = payload.reply_to {
            let in_conversation = store
                .find_message(reply_id)
                .await?
                .is_some_and(|m| m.conversation_id == conversation.id);
            if !in_conversation {
                return Err(AppError::BadRequest(
                    "reply_to must reference a message in this conversation".into(),
                ));
            }
        }

        let recipient = conversation
            .other_participant(sender)
            .ok_or(AppError::Internal)?;
        let message = store
            .insert_message(Message::new(
                conversation.id,
                sender,
                payload.body,
                payload.reply_to,
                now,
            ))
            .await?;
        ConversationService::bump_on_send(
            store,
            conversation.id,
            message.id,
            recipient,
            message.created_at,
        )
        .await?;

        metrics::MESSAGES_SENT_TOTAL
            .with_label_values(&[message.message_type().as_str()])
            .inc();
        tracing::info!(
            conversation_id = %conversation.id,
            message_id = %message.id,
            message_type = message.message_type().as_str(),
            "message sent"
        );

        Self::populate_one(store, directory, message).await
    }

    /// Replace the text of a message. Only the sender may edit, only text
    /// messages are editable, and only within `edit_window` of creation.
    pub async fn edit(
        store: &dyn ChatStore,
        directory: &dyn Directory,
        message_id: Uuid,
        requester: Uuid,
        content: String,
        edit_window: Duration,
        now: DateTime<Utc>,
    ) -> AppResult<MessageView> {
        let message = store
            .find_message(message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if message.sender_id != requester {
            return Err(AppError::Forbidden);
        }
        if message.body.content().is_none() {
            return Err(AppError::InvalidOperation(
                "only text messages can be edited".into(),
            ));
        }
        if !message.edit_window_open(now, edit_window) {
            return Err(AppError::EditWindowExpired {
                max_edit_minutes: edit_window.num_minutes(),
            });
        }
        validate_text(&content)?;

        let updated = store.update_content(message.id, content).await?;
        tracing::info!(message_id = %updated.id, "message edited");
        Self::populate_one(store, directory, updated).await
    }

    /// Hide a message from the requester only.
    pub async fn delete_for_me(
        store: &dyn ChatStore,
        message_id: Uuid,
        requester: Uuid,
    ) -> AppResult<Message> {
        let message = store
            .find_message(message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        ConversationService::require_participant(store, message.conversation_id, requester)
            .await?;
        store.hide_for(message.id, requester).await?;
        Ok(message)
    }

    /// Remove a message for both participants. Returns the deleted message so
    /// the caller can notify the other side.
    pub async fn delete_for_everyone(
        store: &dyn ChatStore,
        message_id: Uuid,
        requester: Uuid,
    ) -> AppResult<Message> {
        let message = store
            .find_message(message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if message.sender_id != requester {
            return Err(AppError::Forbidden);
        }
        if !store.delete_message(message.id).await? {
            return Err(AppError::NotFound);
        }
        tracing::info!(
            conversation_id = %message.conversation_id,
            message_id = %message.id,
            "message deleted for everyone"
        );
        Ok(message)
    }

    pub async fn react(
        store: &dyn ChatStore,
        directory: &dyn Directory,
        message_id: Uuid,
        user_id: Uuid,
        emoji: String,
    ) -> AppResult<MessageView> {
        let message = store
            .find_message(message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        ConversationService::require_participant(store, message.conversation_id, user_id)
            .await?;
        validate_emoji(&emoji)?;

        let updated = store
            .add_reaction(message.id, Reaction { emoji, user_id })
            .await?;
        Self::populate_one(store, directory, updated).await
    }

    pub async fn find(
        store: &dyn ChatStore,
        directory: &dyn Directory,
        message_id: Uuid,
        requester: Uuid,
    ) -> AppResult<MessageView> {
        let message = store
            .find_message(message_id)
            .await?
            .filter(|m| m.is_visible_to(requester))
            .ok_or(AppError::NotFound)?;
        ConversationService::require_participant(store, message.conversation_id, requester)
            .await?;
        Self::populate_one(store, directory, message).await
    }

    async fn populate_one(
        store: &dyn ChatStore,
        directory: &dyn Directory,
        message: Message,
    ) -> AppResult<MessageView> {
        Self::populate(store, directory, vec![message])
            .await?
            .pop()
            .ok_or(AppError::Internal)
    }

    /// Attach sender and quoted-message summaries, preserving input order.
    async fn populate(
        store: &dyn ChatStore,
        directory: &dyn Directory,
        messages: Vec<Message>,
    ) -> AppResult<Vec<MessageView>> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let sender_ids: Vec<Uuid> = messages
            .iter()
            .map(|m| m.sender_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let senders = directory.users(&sender_ids).await?;

        let reply_ids: Vec<Uuid> = messages
            .iter()
            .filter_map(|m| m.reply_to)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let replies: HashMap<Uuid, ReplySummary> = store
            .find_messages(&reply_ids)
            .await?
            .iter()
            .map(|m| (m.id, ReplySummary::from(m)))
            .collect();

        Ok(messages
            .into_iter()
            .map(|m| {
                let sender = senders.get(&m.sender_id).cloned();
                let reply = m.reply_to.and_then(|id| replies.get(&id).cloned());
                MessageView::new(m, sender, reply)
            })
            .collect())
    }
}
