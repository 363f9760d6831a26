//! Conversation access and conversation-level read receipts.

use chrono::Utc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::events::ChatEvent;
use crate::models::{Conversation, DeliveryState};
use crate::pubsub::messages_channel;
use crate::state::AppState;

pub struct ConversationService;

impl ConversationService {
    /// Conversations are created lazily, one per match, when first resolved.
    pub async fn resolve_for_match(state: &AppState, match_id: Uuid) -> AppResult<Conversation> {
        let m = state
            .store
            .get_match(match_id)
            .await?
            .ok_or(AppError::NotFound)?;
        state.store.get_or_create_conversation(&m).await
    }

    pub async fn get(state: &AppState, conversation_id: Uuid) -> AppResult<Conversation> {
        state
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Most recently active first.
    pub async fn list_for_user(state: &AppState, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        state.store.list_conversations(user_id).await
    }

    /// Marks every unread message in the conversation read for `reader_id`,
    /// resets their unread counter and publishes one receipt per message.
    /// Idempotent: a second call finds nothing unread.
    pub async fn mark_read(
        state: &AppState,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) -> AppResult<u64> {
        let conversation = Self::get(state, conversation_id).await?;
        if !conversation.involves(reader_id) {
            return Err(AppError::Forbidden(
                "not a participant in this conversation".into(),
            ));
        }

        let unread = state
            .store
            .unread_message_ids(conversation_id, reader_id)
            .await?;
        let now = Utc::now();
        let mut advanced = 0u64;
        for message_id in unread {
            if !state
                .store
                .advance_status(message_id, reader_id, DeliveryState::Read, now)
                .await?
            {
                continue;
            }
            advanced += 1;
            let all_read = state
                .store
                .statuses_for_message(message_id)
                .await?
                .iter()
                .all(|s| s.state == DeliveryState::Read);
            if all_read {
                state.store.set_message_read(message_id).await?;
            }
            state
                .channels
                .publish(
                    &messages_channel(conversation_id),
                    &ChatEvent::MessageRead {
                        message_id,
                        conversation_id,
                        reader_id,
                        all_read,
                    },
                )
                .await;
        }
        state.store.reset_unread(conversation_id, reader_id).await?;
        Ok(advanced)
    }
}
