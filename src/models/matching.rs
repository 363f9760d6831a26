use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A mutual-like relationship between two users. The level gates which
/// message and call types the pair may use; it only ever increases.
/// Unmatching flips `is_active` off; the row is never hard-deleted while
/// messages still reference it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: Uuid,
    pub user_a: Uuid,
    pub user_b: Uuid,
    pub level: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Match {
    pub fn new(user_a: Uuid, user_b: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_a,
            user_b,
            level: 1,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    pub fn participants(&self) -> [Uuid; 2] {
        [self.user_a, self.user_b]
    }

    pub fn involves(&self, user_id: Uuid) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }

    /// The other side of the match, if `user_id` is a participant.
    pub fn other_participant(&self, user_id: Uuid) -> Option<Uuid> {
        if self.user_a == user_id {
            Some(self.user_b)
        } else if self.user_b == user_id {
            Some(self.user_a)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_match_starts_active_at_level_one() {
        let m = Match::new(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(m.level, 1);
        assert!(m.is_active);
    }

    #[test]
    fn other_participant_resolves_both_sides() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let m = Match::new(a, b);
        assert_eq!(m.other_participant(a), Some(b));
        assert_eq!(m.other_participant(b), Some(a));
        assert_eq!(m.other_participant(Uuid::new_v4()), None);
    }
}
