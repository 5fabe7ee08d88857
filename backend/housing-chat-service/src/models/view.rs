//! Populated read models returned to clients.

use super::conversation::Conversation;
use super::message::{aggregate_reactions, Message, ReactionCount, ReplySummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySummary {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub sender: Option<UserSummary>,
    pub reply_to_message: Option<ReplySummary>,
    #[serde(default)]
    pub reaction_counts: Vec<ReactionCount>,
}

impl MessageView {
    pub fn new(
        message: Message,
        sender: Option<UserSummary>,
        reply_to_message: Option<ReplySummary>,
    ) -> Self {
        let reaction_counts = aggregate_reactions(&message.reactions);
        Self {
            message,
            sender,
            reply_to_message,
            reaction_counts,
        }
    }

    pub fn id(&self) -> Uuid {
        self.message.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationView {
    pub id: Uuid,
    pub participants: Vec<Uuid>,
    pub participant_summaries: Vec<UserSummary>,
    pub property_id: Uuid,
    pub property: Option<PropertySummary>,
    pub last_message: Option<Message>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: HashMap<Uuid, u32>,
    pub created_at: DateTime<Utc>,
}

impl ConversationView {
    pub fn new(
        conversation: Conversation,
        users: &HashMap<Uuid, UserSummary>,
        property: Option<PropertySummary>,
        last_message: Option<Message>,
    ) -> Self {
        let participants = conversation.participants.as_array().to_vec();
        let participant_summaries = participants
            .iter()
            .filter_map(|id| users.get(id).cloned())
            .collect();
        Self {
            id: conversation.id,
            participants,
            participant_summaries,
            property_id: conversation.property_id,
            property,
            last_message,
            last_message_at: conversation.last_message_at,
            unread_count: conversation.unread_count,
            created_at: conversation.created_at,
        }
    }
}
