use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// The two participants of a conversation, stored low id first so that
/// `{a, b}` and `{b, a}` are the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantPair([Uuid; 2]);

impl ParticipantPair {
    pub fn new(a: Uuid, b: Uuid) -> AppResult<Self> {
        if a == b {
            return Err(AppError::BadRequest(
                "a conversation needs two distinct participants".into(),
            ));
        }
        Ok(if a < b { Self([a, b]) } else { Self([b, a]) })
    }

    pub fn low(&self) -> Uuid {
        self.0[0]
    }

    pub fn high(&self) -> Uuid {
        self.0[1]
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.0.contains(&user_id)
    }

    pub fn other(&self, user_id: Uuid) -> Option<Uuid> {
        match self.0 {
            [a, b] if a == user_id => Some(b),
            [a, b] if b == user_id => Some(a),
            _ => None,
        }
    }

    pub fn as_array(&self) -> [Uuid; 2] {
        self.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub participants: ParticipantPair,
    pub property_id: Uuid,
    pub last_message_id: Option<Uuid>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: HashMap<Uuid, u32>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(participants: ParticipantPair, property_id: Uuid, now: DateTime<Utc>) -> Self {
        let unread_count = participants.as_array().into_iter().map(|u| (u, 0)).collect();
        Self {
            id: Uuid::new_v4(),
            participants,
            property_id,
            last_message_id: None,
            last_message_at: None,
            unread_count,
            created_at: now,
        }
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(user_id)
    }

    pub fn other_participant(&self, user_id: Uuid) -> Option<Uuid> {
        self.participants.other(user_id)
    }

    pub fn unread_for(&self, user_id: Uuid) -> u32 {
        self.unread_count.get(&user_id).copied().unwrap_or(0)
    }
}

/// Conversation-list ordering: most recent activity first, never-messaged
/// conversations last, newer conversations first among equals.
pub fn list_order(a: &Conversation, b: &Conversation) -> std::cmp::Ordering {
    b.last_message_at
        .cmp(&a.last_message_at)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn pair_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(
            ParticipantPair::new(a, b).unwrap(),
            ParticipantPair::new(b, a).unwrap()
        );
        assert!(ParticipantPair::new(a, a).is_err());
    }

    #[test]
    fn other_participant() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let pair = ParticipantPair::new(a, b).unwrap();
        assert_eq!(pair.other(a), Some(b));
        assert_eq!(pair.other(b), Some(a));
        assert_eq!(pair.other(Uuid::new_v4()), None);
    }

    #[test]
    fn new_conversation_starts_with_zero_unread() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let conv = Conversation::new(ParticipantPair::new(a, b).unwrap(), Uuid::new_v4(), Utc::now());
        assert_eq!(conv.unread_count.len(), 2);
        assert_eq!(conv.unread_for(a), 0);
        assert_eq!(conv.unread_for(b), 0);
    }

    #[test]
    fn never_messaged_conversations_sort_last() {
        let now = Utc::now();
        let pair = ParticipantPair::new(Uuid::new_v4(), Uuid::new_v4()).unwrap();
        let mut old_active = Conversation::new(pair, Uuid::new_v4(), now - Duration::days(3));
        old_active.last_message_at = Some(now - Duration::hours(1));
        let mut recent_active = Conversation::new(pair, Uuid::new_v4(), now - Duration::days(2));
        recent_active.last_message_at = Some(now);
        let silent_newest = Conversation::new(pair, Uuid::new_v4(), now);
        let silent_older = Conversation::new(pair, Uuid::new_v4(), now - Duration::days(1));

        let mut list = vec![
            silent_older.clone(),
            old_active.clone(),
            silent_newest.clone(),
            recent_active.clone(),
        ];
        list.sort_by(list_order);
        let ids: Vec<Uuid> = list.iter().map(|c| c.id).collect();
        assert_eq!(
            ids,
            vec![recent_active.id, old_active.id, silent_newest.id, silent_older.id]
        );
    }
}
