//! Typing indicators and online presence.

use chrono::Utc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::events::ChatEvent;
use crate::models::{PresenceRecord, TypingIndicator};
use crate::pubsub::{presence_channel, typing_channel};
use crate::state::AppState;

pub struct PresenceService;

impl PresenceService {
    /// Upserts the typing flag and broadcasts it. Indicators expire by TTL
    /// on read; clients are not required to send an explicit "stopped".
    pub async fn set_typing(
        state: &AppState,
        conversation_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    ) -> AppResult<()> {
        let conversation = state
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if !conversation.involves(user_id) {
            return Err(AppError::Forbidden(
                "not a participant in this conversation".into(),
            ));
        }
        state
            .store
            .upsert_typing(&TypingIndicator {
                conversation_id,
                user_id,
                is_typing,
                updated_at: Utc::now(),
            })
            .await?;
        state
            .channels
            .publish(
                &typing_channel(conversation_id),
                &ChatEvent::TypingUpdated {
                    conversation_id,
                    user_id,
                    is_typing,
                },
            )
            .await;
        Ok(())
    }

    /// Current indicators with the TTL applied: a stale "typing" reads as
    /// not typing.
    pub async fn typing_in_conversation(
        state: &AppState,
        conversation_id: Uuid,
    ) -> AppResult<Vec<TypingIndicator>> {
        let now = Utc::now();
        let ttl = state.config.typing_ttl;
        let indicators = state.store.typing_for_conversation(conversation_id).await?;
        Ok(indicators
            .into_iter()
            .map(|mut i| {
                i.is_typing = i.effective_at(now, ttl);
                i
            })
            .collect())
    }

    /// Going online clears last_seen; going offline stamps it.
    pub async fn set_online(state: &AppState, user_id: Uuid, online: bool) -> AppResult<PresenceRecord> {
        let record = PresenceRecord {
            user_id,
            online,
            last_seen: if online { None } else { Some(Utc::now()) },
        };
        state.store.set_presence(&record).await?;
        state
            .channels
            .publish(
                &presence_channel(user_id),
                &ChatEvent::PresenceUpdated {
                    user_id,
                    online,
                    last_seen: record.last_seen.map(|t| t.to_rfc3339()),
                },
            )
            .await;
        Ok(record)
    }

    /// Users with no presence row have simply never connected.
    pub async fn get_presence(state: &AppState, user_id: Uuid) -> AppResult<PresenceRecord> {
        Ok(state
            .store
            .get_presence(user_id)
            .await?
            .unwrap_or(PresenceRecord {
                user_id,
                online: false,
                last_seen: None,
            }))
    }
}
