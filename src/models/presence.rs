use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Ephemeral per-(conversation, user) typing flag. Consumers must treat any
/// indicator older than the TTL as not-typing, so a crashed sender cannot
/// leave a stuck indicator behind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingIndicator {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub is_typing: bool,
    pub updated_at: DateTime<Utc>,
}

impl TypingIndicator {
    pub fn effective_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        if !self.is_typing {
            return false;
        }
        let age = now - self.updated_at;
        age.num_milliseconds() >= 0 && age.to_std().map(|a| a <= ttl).unwrap_or(false)
    }
}

/// Online flag plus last-seen. Last-seen is null while online and stamped on
/// the transition to offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: Uuid,
    pub online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn fresh_indicator_is_effective() {
        let t = TypingIndicator {
            conversation_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            is_typing: true,
            updated_at: Utc::now(),
        };
        assert!(t.effective_at(Utc::now(), Duration::from_secs(10)));
    }

    #[test]
    fn stale_indicator_reads_as_not_typing_even_if_true() {
        let t = TypingIndicator {
            conversation_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            is_typing: true,
            updated_at: Utc::now() - TimeDelta::seconds(30),
        };
        assert!(!t.effective_at(Utc::now(), Duration::from_secs(10)));
    }

    #[test]
    fn false_indicator_is_never_effective() {
        let t = TypingIndicator {
            conversation_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            is_typing: false,
            updated_at: Utc::now(),
        };
        assert!(!t.effective_at(Utc::now(), Duration::from_secs(10)));
    }
}
