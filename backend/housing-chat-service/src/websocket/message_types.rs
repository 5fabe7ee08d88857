use crate::error::AppError;
use crate::middleware::error_handling::{self, error_codes};
use crate::models::{MessageView, Reaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference to an already persisted message. Clients usually send the
/// whole message object; only the id is trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub id: Uuid,
}

/// Inbound WebSocket events from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsInboundEvent {
    Join {
        user_id: Uuid,
    },
    SendMessage {
        conversation_id: Uuid,
        recipient_id: Uuid,
        message: MessageRef,
    },
    Typing {
        conversation_id: Uuid,
        recipient_id: Uuid,
        is_typing: bool,
    },
    RequestStatus {
        user_id: Uuid,
    },
}

impl WsInboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WsInboundEvent::Join { .. } => "join",
            WsInboundEvent::SendMessage { .. } => "send_message",
            WsInboundEvent::Typing { .. } => "typing",
            WsInboundEvent::RequestStatus { .. } => "request_status",
        }
    }
}

/// Outbound WebSocket events from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsOutboundEvent {
    ReceiveMessage {
        conversation_id: Uuid,
        message: MessageView,
    },
    UserTyping {
        conversation_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },
    UserStatus {
        user_id: Uuid,
        online: bool,
        last_seen: Option<DateTime<Utc>>,
    },
    MessageEdited {
        conversation_id: Uuid,
        message: MessageView,
    },
    MessageDeleted {
        conversation_id: Uuid,
        message_id: Uuid,
    },
    ReactionAdded {
        conversation_id: Uuid,
        message_id: Uuid,
        reactions: Vec<Reaction>,
    },
    Error {
        code: String,
        message: String,
    },
}

impl WsOutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WsOutboundEvent::ReceiveMessage { .. } => "receive_message",
            WsOutboundEvent::UserTyping { .. } => "user_typing",
            WsOutboundEvent::UserStatus { .. } => "user_status",
            WsOutboundEvent::MessageEdited { .. } => "message_edited",
            WsOutboundEvent::MessageDeleted { .. } => "message_deleted",
            WsOutboundEvent::ReactionAdded { .. } => "reaction_added",
            WsOutboundEvent::Error { .. } => "error",
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        WsOutboundEvent::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_frame(reason: impl std::fmt::Display) -> Self {
        Self::error(error_codes::INVALID_REQUEST, format!("malformed event: {reason}"))
    }

    pub fn not_joined() -> Self {
        Self::error(error_codes::UNAUTHENTICATED, "send join before other events")
    }

    pub fn identity_mismatch() -> Self {
        Self::error(error_codes::FORBIDDEN, "join user_id does not match token")
    }

    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, event = self.name(), "failed to encode outbound event");
            r#"{"type":"error","code":"INTERNAL_SERVER_ERROR","message":"encoding failed"}"#
                .to_string()
        })
    }
}

impl From<&AppError> for WsOutboundEvent {
    fn from(err: &AppError) -> Self {
        let (_, body) = error_handling::map_error(err);
        WsOutboundEvent::Error {
            code: body.code,
            message: body.message,
        }
    }
}
