use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The message thread bound to one match (exactly one per active match).
/// Created lazily on first use; carries the most-recent-message pointer and
/// one unread counter per participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub match_id: Uuid,
    pub user_a: Uuid,
    pub user_b: Uuid,
    pub last_message_id: Option<Uuid>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_a: i64,
    pub unread_b: i64,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn for_match(match_id: Uuid, user_a: Uuid, user_b: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            match_id,
            user_a,
            user_b,
            last_message_id: None,
            last_message_at: None,
            unread_a: 0,
            unread_b: 0,
            created_at: Utc::now(),
        }
    }

    pub fn participants(&self) -> [Uuid; 2] {
        [self.user_a, self.user_b]
    }

    pub fn involves(&self, user_id: Uuid) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }

    pub fn other_participant(&self, user_id: Uuid) -> Option<Uuid> {
        if self.user_a == user_id {
            Some(self.user_b)
        } else if self.user_b == user_id {
            Some(self.user_a)
        } else {
            None
        }
    }

    pub fn unread_for(&self, user_id: Uuid) -> i64 {
        if self.user_a == user_id {
            self.unread_a
        } else if self.user_b == user_id {
            self.unread_b
        } else {
            0
        }
    }
}
