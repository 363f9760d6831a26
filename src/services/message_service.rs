//! Message pipeline: validate, gate on match level, persist, fan out.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::events::ChatEvent;
use crate::metrics::{CAPABILITY_DENIED_TOTAL, MESSAGES_SENT_TOTAL, PUSH_FAILURES_TOTAL};
use crate::models::{DeliveryState, Message, MessagePayload, MessageStatus, MessageType};
use crate::pubsub::messages_channel;
use crate::services::push::PushNotification;
use crate::state::AppState;
use crate::store::MessageQuery;

pub struct MessageService;

impl MessageService {
    /// The send pipeline. Nothing is written until the payload validates and
    /// the match level unlocks the message type, so a denied send leaves no
    /// trace. Broadcast and push run after the row is durable and never fail
    /// the send.
    pub async fn send(
        state: &AppState,
        conversation_id: Uuid,
        sender_id: Uuid,
        message_type: MessageType,
        payload: MessagePayload,
    ) -> AppResult<Message> {
        let conversation = state
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if !conversation.involves(sender_id) {
            return Err(AppError::Forbidden(
                "not a participant in this conversation".into(),
            ));
        }
        let m = state
            .store
            .get_match(conversation.match_id)
            .await?
            .ok_or(AppError::NotFound)?;
        // An inactive match is not addressable for new writes
        if !m.is_active {
            return Err(AppError::NotFound);
        }

        payload.validate(message_type)?;
        if let Err(denied) = state.capabilities.check_send(m.level, message_type) {
            CAPABILITY_DENIED_TOTAL.inc();
            return Err(denied);
        }

        let recipient_id = conversation
            .other_participant(sender_id)
            .ok_or(AppError::NotFound)?;
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            message_type,
            payload,
            is_read: false,
            created_at: Utc::now(),
            deleted_at: None,
        };
        state.store.insert_message(&message).await?;
        state
            .store
            .insert_statuses(&[MessageStatus {
                message_id: message.id,
                recipient_id,
                state: DeliveryState::Sent,
                updated_at: message.created_at,
            }])
            .await?;
        state
            .store
            .record_last_message(conversation_id, message.id, message.created_at, recipient_id)
            .await?;
        MESSAGES_SENT_TOTAL
            .with_label_values(&[message_type.as_str()])
            .inc();

        state
            .channels
            .publish(
                &messages_channel(conversation_id),
                &ChatEvent::MessageNew {
                    message_id: message.id,
                    conversation_id,
                    sender_id,
                    message_type,
                    payload: message.payload.clone(),
                    created_at: message.created_at.to_rfc3339(),
                },
            )
            .await;

        // Push must not hold up the send response
        let push_state = state.clone();
        let push_message = message.clone();
        tokio::spawn(async move {
            Self::notify_recipient(&push_state, &push_message, recipient_id).await;
        });
        Ok(message)
    }

    async fn notify_recipient(state: &AppState, message: &Message, recipient_id: Uuid) {
        let Some(push) = state.push.as_ref() else {
            return;
        };
        let title = match state.profiles.as_ref() {
            Some(profiles) => profiles
                .display_name(message.sender_id)
                .await
                .unwrap_or_else(|| "New message".to_string()),
            None => "New message".to_string(),
        };
        let body = match &message.payload {
            MessagePayload::Text { body } => body.chars().take(80).collect(),
            MessagePayload::Media { .. } => match message.message_type {
                MessageType::Photo => "Sent a photo".to_string(),
                MessageType::Gif => "Sent a GIF".to_string(),
                _ => "Sent a sticker".to_string(),
            },
            MessagePayload::Voice { .. } => "Sent a voice message".to_string(),
            MessagePayload::Location { .. } => "Shared a location".to_string(),
        };
        let notification = PushNotification {
            recipient_ids: vec![recipient_id],
            title,
            body,
            data: json!({
                "conversation_id": message.conversation_id,
                "message_id": message.id,
            }),
        };
        if let Err(e) = push.send(&notification).await {
            PUSH_FAILURES_TOTAL.inc();
            tracing::warn!(message_id = %message.id, error = %e, "push delivery failed");
        }
    }

    /// Per-message read receipt. Idempotent: re-reading an already-read
    /// message changes nothing and publishes nothing.
    pub async fn mark_read(state: &AppState, message_id: Uuid, reader_id: Uuid) -> AppResult<bool> {
        Self::advance(state, message_id, reader_id, DeliveryState::Read).await
    }

    pub async fn mark_delivered(
        state: &AppState,
        message_id: Uuid,
        recipient_id: Uuid,
    ) -> AppResult<bool> {
        Self::advance(state, message_id, recipient_id, DeliveryState::Delivered).await
    }

    async fn advance(
        state: &AppState,
        message_id: Uuid,
        recipient_id: Uuid,
        to: DeliveryState,
    ) -> AppResult<bool> {
        let message = state
            .store
            .get_message(message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if message.sender_id == recipient_id {
            return Err(AppError::Forbidden(
                "sender cannot acknowledge their own message".into(),
            ));
        }
        state
            .store
            .get_status(message_id, recipient_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if !state
            .store
            .advance_status(message_id, recipient_id, to, Utc::now())
            .await?
        {
            return Ok(false);
        }
        if to == DeliveryState::Read {
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
                    &messages_channel(message.conversation_id),
                    &ChatEvent::MessageRead {
                        message_id,
                        conversation_id: message.conversation_id,
                        reader_id: recipient_id,
                        all_read,
                    },
                )
                .await;
        }
        Ok(true)
    }

    /// Soft delete, sender only. The row survives for audit; readers just
    /// stop seeing it.
    pub async fn delete(state: &AppState, message_id: Uuid, requester_id: Uuid) -> AppResult<()> {
        let message = state
            .store
            .get_message(message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if message.sender_id != requester_id {
            return Err(AppError::Forbidden(
                "only the sender can delete a message".into(),
            ));
        }
        if message.deleted_at.is_some() {
            return Ok(());
        }
        state.store.soft_delete_message(message_id, Utc::now()).await?;
        state
            .channels
            .publish(
                &messages_channel(message.conversation_id),
                &ChatEvent::MessageDeleted {
                    message_id,
                    conversation_id: message.conversation_id,
                },
            )
            .await;
        Ok(())
    }

    pub async fn history(
        state: &AppState,
        conversation_id: Uuid,
        query: &MessageQuery,
    ) -> AppResult<Vec<Message>> {
        state
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound)?;
        state.store.list_messages(conversation_id, query).await
    }
}
