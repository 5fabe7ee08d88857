use super::{ChatApi, ClientError, RealtimeLink};
use crate::models::{MessageBody, MessagePayload, MessageView};
use crate::websocket::message_types::MessageRef;
use crate::websocket::{WsInboundEvent, WsOutboundEvent};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Idle time after the last keystroke before `typing{false}` goes out.
pub const TYPING_IDLE: Duration = Duration::from_secs(1);

/// State of one open conversation screen.
///
/// Messages are persisted over HTTP first and only then announced on the
/// realtime link, so the peer never hears about a message the server lacks.
pub struct ChatSession<A: ChatApi, L: RealtimeLink> {
    api: A,
    link: L,
    user_id: Uuid,
    peer_id: Uuid,
    conversation_id: Uuid,
    page_limit: u32,
    messages: Vec<MessageView>,
    draft: String,
    last_error: Option<String>,
    peer_typing: bool,
    peer_online: bool,
    peer_last_seen: Option<DateTime<Utc>>,
    typing_since: Option<Instant>,
}

impl<A: ChatApi, L: RealtimeLink> ChatSession<A, L> {
    pub fn new(api: A, link: L, user_id: Uuid, peer_id: Uuid, conversation_id: Uuid) -> Self {
        Self {
            api,
            link,
            user_id,
            peer_id,
            conversation_id,
            page_limit: 50,
            messages: Vec::new(),
            draft: String::new(),
            last_error: None,
            peer_typing: false,
            peer_online: false,
            peer_last_seen: None,
            typing_since: None,
        }
    }

    pub fn with_page_limit(mut self, limit: u32) -> Self {
        self.page_limit = limit.max(1);
        self
    }

    /// Identify on the realtime link, load the first page and ask whether the
    /// peer is online.
    pub async fn mount(&mut self) -> Result<(), ClientError> {
        self.emit(WsInboundEvent::Join {
            user_id: self.user_id,
        })
        .await;

        match self
            .api
            .list_messages(self.conversation_id, 1, self.page_limit)
            .await
        {
            Ok(messages) => self.messages = messages,
            Err(e) => {
                self.last_error = Some(e.to_string());
                return Err(e);
            }
        }

        self.emit(WsInboundEvent::RequestStatus {
            user_id: self.peer_id,
        })
        .await;
        Ok(())
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Record a keystroke. The first one after idle announces typing.
    pub async fn on_input(&mut self, text: impl Into<String>, now: Instant) {
        self.draft = text.into();
        let was_typing = self.typing_since.is_some();
        self.typing_since = Some(now);
        if !was_typing {
            self.emit_typing(true).await;
        }
    }

    /// Drive the typing debounce; call periodically.
    pub async fn tick(&mut self, now: Instant) {
        if let Some(last) = self.typing_since {
            if now.duration_since(last) >= TYPING_IDLE {
                self.stop_typing().await;
            }
        }
    }

    /// Send the current draft as a text message. An empty draft is a no-op.
    pub async fn send(&mut self) -> Result<Option<MessageView>, ClientError> {
        if self.draft.trim().is_empty() {
            return Ok(None);
        }
        let draft = std::mem::take(&mut self.draft);
        let payload = MessagePayload::text(draft.clone());

        match self.send_payload(payload).await {
            Ok(view) => Ok(Some(view)),
            Err(e) => {
                self.draft = draft;
                Err(e)
            }
        }
    }

    /// Send an already uploaded attachment.
    pub async fn send_attachment(
        &mut self,
        body: MessageBody,
        reply_to: Option<Uuid>,
    ) -> Result<MessageView, ClientError> {
        self.send_payload(MessagePayload { body, reply_to }).await
    }

    async fn send_payload(&mut self, payload: MessagePayload) -> Result<MessageView, ClientError> {
        self.stop_typing().await;

        let view = match self.api.send_message(self.conversation_id, &payload).await {
            Ok(view) => view,
            Err(e) => {
                tracing::warn!(error = %e, "message send failed");
                self.last_error = Some(e.to_string());
                return Err(e);
            }
        };
        self.last_error = None;
        self.append(view.clone());

        self.emit(WsInboundEvent::SendMessage {
            conversation_id: self.conversation_id,
            recipient_id: self.peer_id,
            message: MessageRef { id: view.id() },
        })
        .await;
        Ok(view)
    }

    /// Reconcile one server event with local state.
    pub fn handle_event(&mut self, event: WsOutboundEvent) {
        match event {
            WsOutboundEvent::ReceiveMessage {
                conversation_id,
                message,
            } if conversation_id == self.conversation_id => {
                if message.message.sender_id == self.peer_id {
                    self.peer_typing = false;
                }
                self.append(message);
            }
            WsOutboundEvent::UserTyping {
                conversation_id,
                user_id,
                is_typing,
            } if conversation_id == self.conversation_id && user_id == self.peer_id => {
                self.peer_typing = is_typing;
            }
            WsOutboundEvent::UserStatus {
                user_id,
                online,
                last_seen,
            } if user_id == self.peer_id => {
                self.peer_online = online;
                if last_seen.is_some() {
                    self.peer_last_seen = last_seen;
                }
                if !online {
                    self.peer_typing = false;
                }
            }
            WsOutboundEvent::MessageEdited {
                conversation_id,
                message,
            } if conversation_id == self.conversation_id => {
                if let Some(slot) = self.messages.iter_mut().find(|m| m.id() == message.id()) {
                    *slot = message;
                }
            }
            WsOutboundEvent::MessageDeleted {
                conversation_id,
                message_id,
            } if conversation_id == self.conversation_id => {
                self.messages.retain(|m| m.id() != message_id);
            }
            WsOutboundEvent::ReactionAdded {
                conversation_id,
                message_id,
                reactions,
            } if conversation_id == self.conversation_id => {
                if let Some(slot) = self.messages.iter_mut().find(|m| m.id() == message_id) {
                    let mut message = slot.message.clone();
                    message.reactions = reactions;
                    *slot = MessageView::new(
                        message,
                        slot.sender.clone(),
                        slot.reply_to_message.clone(),
                    );
                }
            }
            WsOutboundEvent::Error { code, message } => {
                tracing::warn!(code = %code, message = %message, "server reported realtime error");
                self.last_error = Some(message);
            }
            _ => {}
        }
    }

    pub fn messages(&self) -> &[MessageView] {
        &self.messages
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn peer_typing(&self) -> bool {
        self.peer_typing
    }

    pub fn peer_online(&self) -> bool {
        self.peer_online
    }

    pub fn peer_last_seen(&self) -> Option<DateTime<Utc>> {
        self.peer_last_seen
    }

    pub fn is_typing(&self) -> bool {
        self.typing_since.is_some()
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    fn append(&mut self, view: MessageView) {
        if self.messages.iter().any(|m| m.id() == view.id()) {
            return;
        }
        self.messages.push(view);
    }

    async fn stop_typing(&mut self) {
        if self.typing_since.take().is_some() {
            self.emit_typing(false).await;
        }
    }

    async fn emit_typing(&self, is_typing: bool) {
        self.emit(WsInboundEvent::Typing {
            conversation_id: self.conversation_id,
            recipient_id: self.peer_id,
            is_typing,
        })
        .await;
    }

    /// Realtime emits are best effort; failures are logged, never surfaced.
    async fn emit(&self, event: WsInboundEvent) {
        let name = event.name();
        if let Err(e) = self.link.emit(event).await {
            tracing::debug!(event = name, error = %e, "realtime emit failed");
        }
    }
}
