use crate::error::{AppError, AppResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

pub const MAX_TEXT_LEN: usize = 4000;
pub const MAX_EMOJI_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Voice,
    File,
    Gif,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Voice => "voice",
            MessageType::File => "file",
            MessageType::Gif => "gif",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "text" => Some(MessageType::Text),
            "image" => Some(MessageType::Image),
            "voice" => Some(MessageType::Voice),
            "file" => Some(MessageType::File),
            "gif" => Some(MessageType::Gif),
            _ => None,
        }
    }
}

/// Type-specific message payload. The tag doubles as the wire `message_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "lowercase")]
pub enum MessageBody {
    Text {
        content: String,
    },
    Image {
        file_url: String,
        file_public_id: String,
    },
    Voice {
        file_url: String,
        file_public_id: String,
        /// Whole seconds
        duration: u32,
    },
    File {
        file_url: String,
        file_public_id: String,
        file_name: String,
        file_size: u64,
    },
    Gif {
        file_url: String,
        file_public_id: String,
    },
}

impl MessageBody {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageBody::Text { .. } => MessageType::Text,
            MessageBody::Image { .. } => MessageType::Image,
            MessageBody::Voice { .. } => MessageType::Voice,
            MessageBody::File { .. } => MessageType::File,
            MessageBody::Gif { .. } => MessageType::Gif,
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            MessageBody::Text { content } => Some(content),
            _ => None,
        }
    }

    pub fn file_url(&self) -> Option<&str> {
        match self {
            MessageBody::Text { .. } => None,
            MessageBody::Image { file_url, .. }
            | MessageBody::Voice { file_url, .. }
            | MessageBody::File { file_url, .. }
            | MessageBody::Gif { file_url, .. } => Some(file_url),
        }
    }

    pub fn file_public_id(&self) -> Option<&str> {
        match self {
            MessageBody::Text { .. } => None,
            MessageBody::Image { file_public_id, .. }
            | MessageBody::Voice { file_public_id, .. }
            | MessageBody::File { file_public_id, .. }
            | MessageBody::Gif { file_public_id, .. } => Some(file_public_id),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        match self {
            MessageBody::Text { content } => validate_text(content),
            MessageBody::Image {
                file_url,
                file_public_id,
            }
            | MessageBody::Gif {
                file_url,
                file_public_id,
            } => validate_file_ref(file_url, file_public_id),
            MessageBody::Voice {
                file_url,
                file_public_id,
                duration,
            } => {
                validate_file_ref(file_url, file_public_id)?;
                if *duration == 0 {
                    return Err(AppError::BadRequest(
                        "voice messages need a positive duration".into(),
                    ));
                }
                Ok(())
            }
            MessageBody::File {
                file_url,
                file_public_id,
                file_name,
                ..
            } => {
                validate_file_ref(file_url, file_public_id)?;
                if file_name.trim().is_empty() {
                    return Err(AppError::BadRequest("file_name is required".into()));
                }
                Ok(())
            }
        }
    }
}

pub fn validate_text(content: &str) -> AppResult<()> {
    if content.trim().is_empty() {
        return Err(AppError::BadRequest("message content cannot be empty".into()));
    }
    if content.chars().count() > MAX_TEXT_LEN {
        return Err(AppError::BadRequest(format!(
            "message content exceeds {MAX_TEXT_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_file_ref(file_url: &str, file_public_id: &str) -> AppResult<()> {
    let url = file_url.trim();
    if !(url.starts_with("https://") || url.starts_with("http://")) || url.len() <= "https://".len()
    {
        return Err(AppError::BadRequest("file_url must be an http(s) URL".into()));
    }
    if file_public_id.trim().is_empty() {
        return Err(AppError::BadRequest("file_public_id is required".into()));
    }
    Ok(())
}

pub fn validate_emoji(emoji: &str) -> AppResult<()> {
    if emoji.trim().is_empty() || emoji.len() > MAX_EMOJI_BYTES {
        return Err(AppError::BadRequest("Invalid emoji".into()));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub user_id: Uuid,
}

/// Stored message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    #[serde(flatten)]
    pub body: MessageBody,
    pub reply_to: Option<Uuid>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub read_by: BTreeSet<Uuid>,
    // Per-user visibility is private to each participant.
    #[serde(default, skip_serializing)]
    pub deleted_for: BTreeSet<Uuid>,
    #[serde(default)]
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        conversation_id: Uuid,
        sender_id: Uuid,
        body: MessageBody,
        reply_to: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            body,
            reply_to,
            reactions: Vec::new(),
            read_by: BTreeSet::from([sender_id]),
            deleted_for: BTreeSet::new(),
            is_edited: false,
            created_at: now,
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }

    pub fn is_visible_to(&self, user_id: Uuid) -> bool {
        !self.deleted_for.contains(&user_id)
    }

    /// Edits are accepted up to and including `created_at + window`.
    pub fn edit_window_open(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.created_at <= window
    }

    /// Append a reaction unless this user already reacted with the same emoji.
    /// Returns whether the reaction was added.
    pub fn push_reaction(&mut self, reaction: Reaction) -> bool {
        if self.reactions.contains(&reaction) {
            return false;
        }
        self.reactions.push(reaction);
        true
    }
}

/// Body of `POST /conversations/{id}/messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(flatten)]
    pub body: MessageBody,
    #[serde(default)]
    pub reply_to: Option<Uuid>,
}

impl MessagePayload {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            body: MessageBody::Text {
                content: content.into(),
            },
            reply_to: None,
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        self.body.validate()
    }
}

/// Compact rendering of a quoted message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplySummary {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub message_type: MessageType,
    pub content: Option<String>,
}

impl From<&Message> for ReplySummary {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id,
            sender_id: m.sender_id,
            message_type: m.message_type(),
            content: m.body.content().map(str::to_string),
        }
    }
}

/// Reactions grouped by emoji, in order of first use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionCount {
    pub emoji: String,
    pub count: usize,
    pub user_ids: Vec<Uuid>,
}

pub fn aggregate_reactions(reactions: &[Reaction]) -> Vec<ReactionCount> {
    let mut out: Vec<ReactionCount> = Vec::new();
    for r in reactions {
        match out.iter_mut().find(|c| c.emoji == r.emoji) {
            Some(entry) => {
                entry.count += 1;
                entry.user_ids.push(r.user_id);
            }
            None => out.push(ReactionCount {
                emoji: r.emoji.clone(),
                count: 1,
                user_ids: vec![r.user_id],
            }),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_parses_type_specific_fields() {
        let voice: MessagePayload = serde_json::from_value(json!({
            "message_type": "voice",
            "file_url": "https://cdn.example.com/v/1.webm",
            "file_public_id": "v/1",
            "duration": 12
        }))
        .unwrap();
        assert_eq!(voice.body.message_type(), MessageType::Voice);
        assert!(voice.validate().is_ok());
        assert_eq!(voice.reply_to, None);

        let text: MessagePayload = serde_json::from_value(json!({
            "message_type": "text",
            "content": "Is the room still available?",
            "reply_to": "7d6f0a1e-3f38-4f6e-9d8a-4d1c1f6c2b11"
        }))
        .unwrap();
        assert_eq!(text.body.content(), Some("Is the room still available?"));
        assert!(text.reply_to.is_some());
    }

    #[test]
    fn payload_rejects_missing_type_fields() {
        let missing_url = serde_json::from_value::<MessagePayload>(json!({
            "message_type": "image",
            "content": "not an image"
        }));
        assert!(missing_url.is_err());

        let unknown_type = serde_json::from_value::<MessagePayload>(json!({
            "message_type": "sticker",
            "file_url": "https://cdn.example.com/s.png"
        }));
        assert!(unknown_type.is_err());
    }

    #[test]
    fn validation_closes_gaps_the_shape_allows() {
        assert!(MessagePayload::text("   ").validate().is_err());
        assert!(MessagePayload::text("x".repeat(MAX_TEXT_LEN + 1))
            .validate()
            .is_err());

        let bad_url = MessageBody::Gif {
            file_url: "ftp://files/x.gif".into(),
            file_public_id: "x".into(),
        };
        assert!(bad_url.validate().is_err());

        let zero_duration = MessageBody::Voice {
            file_url: "https://cdn.example.com/v.webm".into(),
            file_public_id: "v".into(),
            duration: 0,
        };
        assert!(zero_duration.validate().is_err());

        let nameless = MessageBody::File {
            file_url: "https://cdn.example.com/lease.pdf".into(),
            file_public_id: "lease".into(),
            file_name: " ".into(),
            file_size: 1024,
        };
        assert!(nameless.validate().is_err());
    }

    #[test]
    fn message_serializes_flat_and_hides_deleted_for() {
        let sender = Uuid::new_v4();
        let mut msg = Message::new(
            Uuid::new_v4(),
            sender,
            MessageBody::Text {
                content: "Hi".into(),
            },
            None,
            Utc::now(),
        );
        msg.deleted_for.insert(sender);

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["message_type"], "text");
        assert_eq!(value["content"], "Hi");
        assert!(value.get("deleted_for").is_none());
        assert_eq!(value["read_by"], json!([sender]));
    }

    #[test]
    fn edit_window_boundary_is_inclusive() {
        let created = Utc::now();
        let msg = Message::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            MessageBody::Text {
                content: "Hi".into(),
            },
            None,
            created,
        );
        let window = Duration::minutes(15);
        assert!(msg.edit_window_open(created + window, window));
        assert!(!msg.edit_window_open(created + window + Duration::seconds(1), window));
    }

    #[test]
    fn reactions_are_unique_per_user_and_emoji() {
        let mut msg = Message::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            MessageBody::Text {
                content: "Hi".into(),
            },
            None,
            Utc::now(),
        );
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        assert!(msg.push_reaction(Reaction { emoji: "👍".into(), user_id: alice }));
        assert!(!msg.push_reaction(Reaction { emoji: "👍".into(), user_id: alice }));
        assert!(msg.push_reaction(Reaction { emoji: "👍".into(), user_id: bob }));
        assert!(msg.push_reaction(Reaction { emoji: "❤️".into(), user_id: alice }));

        let counts = aggregate_reactions(&msg.reactions);
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].emoji, "👍");
        assert_eq!(counts[0].count, 2);
        assert_eq!(counts[1].user_ids, vec![alice]);
    }
}
