use super::ChatStore;
use crate::error::{AppError, AppResult};
use crate::models::{
    Conversation, Message, MessageBody, MessageType, ParticipantPair, Reaction,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

/// Message columns plus the read/hidden/reaction side tables folded into
/// arrays, so one row is one complete message.
const MESSAGE_SELECT: &str = r#"
    SELECT
        m.id,
        m.conversation_id,
        m.sender_id,
        m.message_type,
        m.content,
        m.file_url,
        m.file_public_id,
        m.file_name,
        m.file_size,
        m.duration_secs,
        m.reply_to,
        m.is_edited,
        m.created_at,
        COALESCE(
            (SELECT array_agg(r.user_id ORDER BY r.read_at, r.user_id)
             FROM message_reads r WHERE r.message_id = m.id),
            '{}'::uuid[]
        ) AS read_by,
        COALESCE(
            (SELECT array_agg(h.user_id)
             FROM message_hidden h WHERE h.message_id = m.id),
            '{}'::uuid[]
        ) AS deleted_for,
        COALESCE(
            (SELECT json_agg(json_build_object('emoji', x.emoji, 'user_id', x.user_id)
                             ORDER BY x.created_at, x.user_id)
             FROM message_reactions x WHERE x.message_id = m.id),
            '[]'::json
        ) AS reactions
    FROM messages m
"#;

const CONVERSATION_SELECT: &str = r#"
    SELECT id, participant_low, participant_high, property_id,
           last_message_id, last_message_at, created_at
    FROM conversations
"#;

#[derive(Debug, FromRow)]
struct ConversationRecord {
    id: Uuid,
    participant_low: Uuid,
    participant_high: Uuid,
    property_id: Uuid,
    last_message_id: Option<Uuid>,
    last_message_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct UnreadRecord {
    conversation_id: Uuid,
    user_id: Uuid,
    unread_count: i32,
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    message_type: String,
    content: Option<String>,
    file_url: Option<String>,
    file_public_id: Option<String>,
    file_name: Option<String>,
    file_size: Option<i64>,
    duration_secs: Option<i32>,
    reply_to: Option<Uuid>,
    is_edited: bool,
    created_at: DateTime<Utc>,
    read_by: Vec<Uuid>,
    deleted_for: Vec<Uuid>,
    reactions: Json<Vec<Reaction>>,
}

fn corrupt(id: Uuid, what: &str) -> AppError {
    AppError::Database(format!("message {id} has inconsistent row: {what}"))
}

impl TryFrom<MessageRecord> for Message {
    type Error = AppError;

    fn try_from(r: MessageRecord) -> AppResult<Self> {
        let id = r.id;
        let kind = MessageType::from_db(&r.message_type)
            .ok_or_else(|| corrupt(id, "unknown message_type"))?;
        let file_url = || r.file_url.clone().ok_or_else(|| corrupt(id, "missing file_url"));
        let file_public_id = r.file_public_id.clone().unwrap_or_default();

        let body = match kind {
            MessageType::Text => MessageBody::Text {
                content: r.content.clone().ok_or_else(|| corrupt(id, "missing content"))?,
            },
            MessageType::Image => MessageBody::Image {
                file_url: file_url()?,
                file_public_id,
            },
            MessageType::Gif => MessageBody::Gif {
                file_url: file_url()?,
                file_public_id,
            },
            MessageType::Voice => MessageBody::Voice {
                file_url: file_url()?,
                file_public_id,
                duration: r.duration_secs.unwrap_or(0).max(0) as u32,
            },
            MessageType::File => MessageBody::File {
                file_url: file_url()?,
                file_public_id,
                file_name: r.file_name.clone().unwrap_or_default(),
                file_size: r.file_size.unwrap_or(0).max(0) as u64,
            },
        };

        Ok(Message {
            id,
            conversation_id: r.conversation_id,
            sender_id: r.sender_id,
            body,
            reply_to: r.reply_to,
            reactions: r.reactions.0,
            read_by: r.read_by.into_iter().collect(),
            deleted_for: r.deleted_for.into_iter().collect(),
            is_edited: r.is_edited,
            created_at: r.created_at,
        })
    }
}

struct BodyColumns {
    content: Option<String>,
    file_url: Option<String>,
    file_public_id: Option<String>,
    file_name: Option<String>,
    file_size: Option<i64>,
    duration_secs: Option<i32>,
}

impl From<&MessageBody> for BodyColumns {
    fn from(body: &MessageBody) -> Self {
        let mut cols = BodyColumns {
            content: body.content().map(str::to_string),
            file_url: body.file_url().map(str::to_string),
            file_public_id: body.file_public_id().map(str::to_string),
            file_name: None,
            file_size: None,
            duration_secs: None,
        };
        match body {
            MessageBody::Voice { duration, .. } => {
                cols.duration_secs = Some(i32::try_from(*duration).unwrap_or(i32::MAX));
            }
            MessageBody::File {
                file_name,
                file_size,
                ..
            } => {
                cols.file_name = Some(file_name.clone());
                cols.file_size = Some(i64::try_from(*file_size).unwrap_or(i64::MAX));
            }
            _ => {}
        }
        cols
    }
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgChatStore {
    pool: PgPool,
}

impl PgChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn attach_unread(&self, records: Vec<ConversationRecord>) -> AppResult<Vec<Conversation>> {
        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let unread_rows: Vec<UnreadRecord> = sqlx::query_as(
            "SELECT conversation_id, user_id, unread_count FROM conversation_unread WHERE conversation_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut unread: HashMap<Uuid, HashMap<Uuid, u32>> = HashMap::new();
        for row in unread_rows {
            unread
                .entry(row.conversation_id)
                .or_default()
                .insert(row.user_id, row.unread_count.max(0) as u32);
        }

        records
            .into_iter()
            .map(|r| {
                let participants = ParticipantPair::new(r.participant_low, r.participant_high)
                    .map_err(|_| {
                        AppError::Database(format!("conversation {} has one participant", r.id))
                    })?;
                let mut unread_count = unread.remove(&r.id).unwrap_or_default();
                for user in participants.as_array() {
                    unread_count.entry(user).or_insert(0);
                }
                Ok(Conversation {
                    id: r.id,
                    participants,
                    property_id: r.property_id,
                    last_message_id: r.last_message_id,
                    last_message_at: r.last_message_at,
                    unread_count,
                    created_at: r.created_at,
                })
            })
            .collect()
    }

    async fn fetch_conversations(
        &self,
        query: sqlx::query::QueryAs<'_, sqlx::Postgres, ConversationRecord, sqlx::postgres::PgArguments>,
    ) -> AppResult<Vec<Conversation>> {
        let records = query.fetch_all(&self.pool).await?;
        if records.is_empty() {
            return Ok(Vec::new());
        }
        self.attach_unread(records).await
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn create_conversation(&self, conversation: Conversation) -> AppResult<Conversation> {
        let pair = conversation.participants;
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO conversations (id, participant_low, participant_high, property_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (participant_low, participant_high, property_id) DO NOTHING
            "#,
        )
        .bind(conversation.id)
        .bind(pair.low())
        .bind(pair.high())
        .bind(conversation.property_id)
        .bind(conversation.created_at)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 1 {
            sqlx::query(
                r#"
                INSERT INTO conversation_unread (conversation_id, user_id, unread_count)
                VALUES ($1, $2, 0), ($1, $3, 0)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(conversation.id)
            .bind(pair.low())
            .bind(pair.high())
            .execute(&mut *tx)
            .await?;
        } else {
            tracing::debug!(
                property_id = %conversation.property_id,
                "conversation already exists for participant pair, reusing"
            );
        }
        tx.commit().await?;

        self.find_conversation_by_key(pair, conversation.property_id)
            .await?
            .ok_or(AppError::Internal)
    }

    async fn find_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let sql = format!("{CONVERSATION_SELECT} WHERE id = $1");
        let mut list = self
            .fetch_conversations(sqlx::query_as(&sql).bind(id))
            .await?;
        Ok(list.pop())
    }

    async fn find_conversation_by_key(
        &self,
        participants: ParticipantPair,
        property_id: Uuid,
    ) -> AppResult<Option<Conversation>> {
        let sql = format!(
            "{CONVERSATION_SELECT} WHERE participant_low = $1 AND participant_high = $2 AND property_id = $3"
        );
        let mut list = self
            .fetch_conversations(
                sqlx::query_as(&sql)
                    .bind(participants.low())
                    .bind(participants.high())
                    .bind(property_id),
            )
            .await?;
        Ok(list.pop())
    }

    async fn list_conversations_for(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let sql = format!(
            r#"{CONVERSATION_SELECT}
            WHERE participant_low = $1 OR participant_high = $1
            ORDER BY last_message_at DESC NULLS LAST, created_at DESC, id ASC"#
        );
        self.fetch_conversations(sqlx::query_as(&sql).bind(user_id))
            .await
    }

    async fn record_send(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
        recipient_id: Uuid,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            WITH bumped AS (
                UPDATE conversations
                SET last_message_id = CASE
                        WHEN last_message_at IS NULL OR last_message_at <= $3 THEN $2
                        ELSE last_message_id
                    END,
                    last_message_at = GREATEST(last_message_at, $3)
                WHERE id = $1
                RETURNING id
            )
            INSERT INTO conversation_unread (conversation_id, user_id, unread_count)
            SELECT id, $4, 1 FROM bumped
            ON CONFLICT (conversation_id, user_id)
            DO UPDATE SET unread_count = conversation_unread.unread_count + 1
            "#,
        )
        .bind(conversation_id)
        .bind(message_id)
        .bind(at)
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn reset_unread(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE conversation_unread SET unread_count = 0
            WHERE conversation_id = $1 AND user_id = $2
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_message(&self, message: Message) -> AppResult<Message> {
        let cols = BodyColumns::from(&message.body);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO messages (
                id, conversation_id, sender_id, message_type,
                content, file_url, file_public_id, file_name, file_size, duration_secs,
                reply_to, is_edited, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .bind(message.message_type().as_str())
        .bind(cols.content)
        .bind(cols.file_url)
        .bind(cols.file_public_id)
        .bind(cols.file_name)
        .bind(cols.file_size)
        .bind(cols.duration_secs)
        .bind(message.reply_to)
        .bind(message.is_edited)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;

        let readers: Vec<Uuid> = message.read_by.iter().copied().collect();
        sqlx::query(
            r#"
            INSERT INTO message_reads (message_id, user_id, read_at)
            SELECT $1, reader, $3 FROM UNNEST($2::uuid[]) AS reader
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(message.id)
        .bind(&readers)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(message)
    }

    async fn find_message(&self, id: Uuid) -> AppResult<Option<Message>> {
        let sql = format!("{MESSAGE_SELECT} WHERE m.id = $1");
        let record: Option<MessageRecord> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        record.map(Message::try_from).transpose()
    }

    async fn find_messages(&self, ids: &[Uuid]) -> AppResult<Vec<Message>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("{MESSAGE_SELECT} WHERE m.id = ANY($1)");
        let records: Vec<MessageRecord> = sqlx::query_as(&sql)
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await?;
        records.into_iter().map(Message::try_from).collect()
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        viewer: Uuid,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<Message>> {
        let sql = format!(
            r#"{MESSAGE_SELECT}
            WHERE m.conversation_id = $1
              AND NOT EXISTS (
                  SELECT 1 FROM message_hidden h
                  WHERE h.message_id = m.id AND h.user_id = $2
              )
            ORDER BY m.created_at DESC, m.id DESC
            OFFSET $3 LIMIT $4"#
        );
        let records: Vec<MessageRecord> = sqlx::query_as(&sql)
            .bind(conversation_id)
            .bind(viewer)
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        records.into_iter().map(Message::try_from).collect()
    }

    async fn mark_read(&self, conversation_id: Uuid, reader: Uuid) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO message_reads (message_id, user_id)
            SELECT id, $2 FROM messages
            WHERE conversation_id = $1 AND sender_id <> $2
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(conversation_id)
        .bind(reader)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn update_content(&self, message_id: Uuid, content: String) -> AppResult<Message> {
        let result = sqlx::query(
            "UPDATE messages SET content = $2, is_edited = TRUE WHERE id = $1 AND message_type = 'text'",
        )
        .bind(message_id)
        .bind(&content)
        .execute(&self.pool)
        .await?;

        let message = self
            .find_message(message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if result.rows_affected() == 0 {
            return Err(AppError::InvalidOperation(
                "only text messages can be edited".into(),
            ));
        }
        Ok(message)
    }

    async fn hide_for(&self, message_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO message_hidden (message_id, user_id)
            SELECT id, $2 FROM messages WHERE id = $1
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(message_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 && self.find_message(message_id).await?.is_none() {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn delete_message(&self, message_id: Uuid) -> AppResult<bool> {
        // conversations.last_message_id and messages.reply_to are ON DELETE SET NULL
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_reaction(&self, message_id: Uuid, reaction: Reaction) -> AppResult<Message> {
        sqlx::query(
            r#"
            INSERT INTO message_reactions (message_id, user_id, emoji)
            SELECT id, $2, $3 FROM messages WHERE id = $1
            ON CONFLICT (message_id, user_id, emoji) DO NOTHING
            "#,
        )
        .bind(message_id)
        .bind(reaction.user_id)
        .bind(&reaction.emoji)
        .execute(&self.pool)
        .await?;

        self.find_message(message_id)
            .await?
            .ok_or(AppError::NotFound)
    }
}
