//! Realtime protocol logic, kept apart from the actix actor so it can be
//! driven directly in tests.

use super::message_types::WsOutboundEvent;
use super::{ConnectionId, DeliveryError, PresenceRegistry};
use crate::directory::Directory;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::Conversation;
use crate::repository::ChatStore;
use crate::services::{ConversationService, MessageService};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Who hears about a user going online or offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresenceScope {
    /// Every connected user.
    #[default]
    All,
    /// Only users sharing a conversation with them.
    Contacts,
}

impl FromStr for PresenceScope {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(PresenceScope::All),
            "contacts" => Ok(PresenceScope::Contacts),
            other => Err(AppError::Config(format!(
                "PRESENCE_SCOPE must be 'all' or 'contacts', got '{other}'"
            ))),
        }
    }
}

/// Outcome of a best-effort push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Dropped,
}

#[derive(Clone)]
pub struct RealtimeHub {
    registry: PresenceRegistry,
    store: Arc<dyn ChatStore>,
    directory: Arc<dyn Directory>,
    scope: PresenceScope,
}

impl RealtimeHub {
    pub fn new(
        store: Arc<dyn ChatStore>,
        directory: Arc<dyn Directory>,
        scope: PresenceScope,
    ) -> Self {
        Self {
            registry: PresenceRegistry::new(),
            store,
            directory,
            scope,
        }
    }

    pub fn registry(&self) -> &PresenceRegistry {
        &self.registry
    }

    /// Bind `user_id` to this connection and announce them as online.
    pub async fn join(
        &self,
        user_id: Uuid,
        connection: ConnectionId,
        sender: UnboundedSender<String>,
    ) {
        self.registry.register(user_id, connection, sender).await;
        tracing::info!(user_id = %user_id, "user joined realtime channel");

        let event = WsOutboundEvent::UserStatus {
            user_id,
            online: true,
            last_seen: None,
        };
        self.announce_presence(user_id, &event).await;
    }

    /// Forget the connection and, if it was the user's live one, announce
    /// them as offline with `at` as last-seen.
    pub async fn disconnect(&self, user_id: Uuid, connection: ConnectionId, at: DateTime<Utc>) {
        if !self.registry.unregister(user_id, connection, at).await {
            return;
        }
        tracing::info!(user_id = %user_id, "user left realtime channel");

        let event = WsOutboundEvent::UserStatus {
            user_id,
            online: false,
            last_seen: Some(at),
        };
        self.announce_presence(user_id, &event).await;
    }

    /// Forward a persisted message to the recipient's connection. The message
    /// must already exist in the conversation and belong to `sender`.
    pub async fn relay_message(
        &self,
        sender: Uuid,
        conversation_id: Uuid,
        recipient: Uuid,
        message_id: Uuid,
    ) -> AppResult<Delivery> {
        let conversation = self
            .participants_check(sender, conversation_id, recipient)
            .await?;

        let view = MessageService::find(
            self.store.as_ref(),
            self.directory.as_ref(),
            message_id,
            sender,
        )
        .await?;
        if view.message.conversation_id != conversation.id || view.message.sender_id != sender {
            return Err(AppError::Forbidden);
        }

        let event = WsOutboundEvent::ReceiveMessage {
            conversation_id: conversation.id,
            message: view,
        };
        Ok(self.notify(recipient, &event).await)
    }

    pub async fn relay_typing(
        &self,
        sender: Uuid,
        conversation_id: Uuid,
        recipient: Uuid,
        is_typing: bool,
    ) -> AppResult<Delivery> {
        let conversation = self
            .participants_check(sender, conversation_id, recipient)
            .await?;
        let event = WsOutboundEvent::UserTyping {
            conversation_id: conversation.id,
            user_id: sender,
            is_typing,
        };
        Ok(self.notify(recipient, &event).await)
    }

    pub async fn status(&self, user_id: Uuid) -> WsOutboundEvent {
        let online = self.registry.is_online(user_id).await;
        let last_seen = if online {
            None
        } else {
            self.registry.last_seen(user_id).await
        };
        WsOutboundEvent::UserStatus {
            user_id,
            online,
            last_seen,
        }
    }

    /// Best-effort push to one user. An offline recipient is not an error.
    pub async fn notify(&self, recipient: Uuid, event: &WsOutboundEvent) -> Delivery {
        match self.registry.send_to(recipient, event.to_frame()).await {
            Ok(()) => {
                metrics::record_event(event.name(), "delivered");
                Delivery::Delivered
            }
            Err(DeliveryError::TransportUnavailable(user)) => {
                tracing::debug!(
                    recipient = %user,
                    event = event.name(),
                    "recipient offline, event dropped"
                );
                metrics::record_event(event.name(), "dropped");
                Delivery::Dropped
            }
        }
    }

    /// Push to the participant of `conversation` who is not `actor`.
    pub async fn notify_peer(
        &self,
        conversation: &Conversation,
        actor: Uuid,
        event: &WsOutboundEvent,
    ) -> Delivery {
        match conversation.other_participant(actor) {
            Some(peer) => self.notify(peer, event).await,
            None => Delivery::Dropped,
        }
    }

    async fn participants_check(
        &self,
        sender: Uuid,
        conversation_id: Uuid,
        recipient: Uuid,
    ) -> AppResult<Conversation> {
        let conversation =
            ConversationService::require_participant(self.store.as_ref(), conversation_id, sender)
                .await?;
        if conversation.other_participant(sender) != Some(recipient) {
            return Err(AppError::BadRequest(
                "recipient is not the other participant of this conversation".into(),
            ));
        }
        Ok(conversation)
    }

    async fn announce_presence(&self, user_id: Uuid, event: &WsOutboundEvent) {
        let frame = event.to_frame();
        let reached = match self.scope {
            PresenceScope::All => self.registry.broadcast(&frame, user_id).await,
            PresenceScope::Contacts => match self.contacts_of(user_id).await {
                Ok(contacts) => self.registry.send_to_many(&contacts, &frame).await,
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "could not load contacts for presence");
                    0
                }
            },
        };
        metrics::record_event(event.name(), if reached > 0 { "delivered" } else { "dropped" });
    }

    async fn contacts_of(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let conversations = self.store.list_conversations_for(user_id).await?;
        Ok(conversations
            .iter()
            .filter_map(|c| c.other_participant(user_id))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_scope_parses() {
        assert_eq!("all".parse::<PresenceScope>().unwrap(), PresenceScope::All);
        assert_eq!(
            " Contacts ".parse::<PresenceScope>().unwrap(),
            PresenceScope::Contacts
        );
        assert!("everyone".parse::<PresenceScope>().is_err());
    }
}
