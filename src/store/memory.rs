//! In-memory store: `Arc<RwLock<HashMap>>` per relation. Backs tests and
//! DATABASE_URL-less dev mode. Cross-row invariants (one non-terminal call
//! per match, conversation get-or-create) hold the relevant write lock for
//! the whole check-then-insert.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    Call, CallStatus, CandidateSide, ConnectivityCandidate, Conversation, DeliveryState, Match,
    Message, MessageStatus, PresenceRecord, TypingIndicator,
};
use crate::store::{ChatStore, MessageQuery};

#[derive(Default)]
pub struct MemoryStore {
    likes: RwLock<HashSet<(Uuid, Uuid)>>,
    matches: RwLock<HashMap<Uuid, Match>>,
    conversations: RwLock<HashMap<Uuid, Conversation>>,
    messages: RwLock<HashMap<Uuid, Message>>,
    statuses: RwLock<HashMap<(Uuid, Uuid), MessageStatus>>,
    calls: RwLock<HashMap<Uuid, Call>>,
    candidates: RwLock<HashMap<Uuid, Vec<ConnectivityCandidate>>>,
    typing: RwLock<HashMap<(Uuid, Uuid), TypingIndicator>>,
    presence: RwLock<HashMap<Uuid, PresenceRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn insert_like(&self, from_user: Uuid, to_user: Uuid) -> AppResult<bool> {
        Ok(self.likes.write().await.insert((from_user, to_user)))
    }

    async fn has_like(&self, from_user: Uuid, to_user: Uuid) -> AppResult<bool> {
        Ok(self.likes.read().await.contains(&(from_user, to_user)))
    }

    async fn create_match(&self, m: &Match) -> AppResult<()> {
        self.matches.write().await.insert(m.id, m.clone());
        Ok(())
    }

    async fn get_match(&self, id: Uuid) -> AppResult<Option<Match>> {
        Ok(self.matches.read().await.get(&id).cloned())
    }

    async fn find_match_between(&self, a: Uuid, b: Uuid) -> AppResult<Option<Match>> {
        Ok(self
            .matches
            .read()
            .await
            .values()
            .find(|m| {
                (m.user_a == a && m.user_b == b) || (m.user_a == b && m.user_b == a)
            })
            .cloned())
    }

    async fn set_match_level(&self, id: Uuid, level: i32) -> AppResult<()> {
        if let Some(m) = self.matches.write().await.get_mut(&id) {
            m.level = level;
        }
        Ok(())
    }

    async fn deactivate_match(&self, id: Uuid) -> AppResult<()> {
        if let Some(m) = self.matches.write().await.get_mut(&id) {
            m.is_active = false;
        }
        Ok(())
    }

    async fn get_or_create_conversation(&self, m: &Match) -> AppResult<Conversation> {
        let mut guard = self.conversations.write().await;
        if let Some(existing) = guard.values().find(|c| c.match_id == m.id) {
            return Ok(existing.clone());
        }
        let conversation = Conversation::for_match(m.id, m.user_a, m.user_b);
        guard.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        Ok(self.conversations.read().await.get(&id).cloned())
    }

    async fn conversation_for_match(&self, match_id: Uuid) -> AppResult<Option<Conversation>> {
        Ok(self
            .conversations
            .read()
            .await
            .values()
            .find(|c| c.match_id == match_id)
            .cloned())
    }

    async fn list_conversations(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let mut out: Vec<Conversation> = self
            .conversations
            .read()
            .await
            .values()
            .filter(|c| c.involves(user_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.last_message_at
                .unwrap_or(b.created_at)
                .cmp(&a.last_message_at.unwrap_or(a.created_at))
        });
        Ok(out)
    }

    async fn record_last_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
        recipient_id: Uuid,
    ) -> AppResult<()> {
        if let Some(c) = self.conversations.write().await.get_mut(&conversation_id) {
            c.last_message_id = Some(message_id);
            c.last_message_at = Some(at);
            if c.user_a == recipient_id {
                c.unread_a += 1;
            } else if c.user_b == recipient_id {
                c.unread_b += 1;
            }
        }
        Ok(())
    }

    async fn reset_unread(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<()> {
        if let Some(c) = self.conversations.write().await.get_mut(&conversation_id) {
            if c.user_a == user_id {
                c.unread_a = 0;
            } else if c.user_b == user_id {
                c.unread_b = 0;
            }
        }
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> AppResult<()> {
        self.messages
            .write()
            .await
            .insert(message.id, message.clone());
        Ok(())
    }

    async fn get_message(&self, id: Uuid) -> AppResult<Option<Message>> {
        Ok(self.messages.read().await.get(&id).cloned())
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        query: &MessageQuery,
    ) -> AppResult<Vec<Message>> {
        let mut out: Vec<Message> = self
            .messages
            .read()
            .await
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .filter(|m| query.include_deleted || m.deleted_at.is_none())
            .filter(|m| query.before.map(|b| m.created_at < b).unwrap_or(true))
            .filter(|m| query.after.map(|a| m.created_at > a).unwrap_or(true))
            .filter(|m| {
                query
                    .message_type
                    .map(|t| m.message_type == t)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        // Stable order for identical timestamps
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        if query.newest_first {
            out.reverse();
        }
        out.truncate(query.limit.max(0) as usize);
        Ok(out)
    }

    async fn soft_delete_message(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        if let Some(m) = self.messages.write().await.get_mut(&id) {
            m.deleted_at.get_or_insert(at);
        }
        Ok(())
    }

    async fn set_message_read(&self, id: Uuid) -> AppResult<()> {
        if let Some(m) = self.messages.write().await.get_mut(&id) {
            m.is_read = true;
        }
        Ok(())
    }

    async fn insert_statuses(&self, statuses: &[MessageStatus]) -> AppResult<()> {
        let mut guard = self.statuses.write().await;
        for status in statuses {
            guard.insert((status.message_id, status.recipient_id), status.clone());
        }
        Ok(())
    }

    async fn get_status(
        &self,
        message_id: Uuid,
        recipient_id: Uuid,
    ) -> AppResult<Option<MessageStatus>> {
        Ok(self
            .statuses
            .read()
            .await
            .get(&(message_id, recipient_id))
            .cloned())
    }

    async fn advance_status(
        &self,
        message_id: Uuid,
        recipient_id: Uuid,
        to: DeliveryState,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut guard = self.statuses.write().await;
        match guard.get_mut(&(message_id, recipient_id)) {
            Some(status) if status.state.can_advance_to(to) => {
                status.state = to;
                status.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn statuses_for_message(&self, message_id: Uuid) -> AppResult<Vec<MessageStatus>> {
        Ok(self
            .statuses
            .read()
            .await
            .values()
            .filter(|s| s.message_id == message_id)
            .cloned()
            .collect())
    }

    async fn unread_message_ids(
        &self,
        conversation_id: Uuid,
        recipient_id: Uuid,
    ) -> AppResult<Vec<Uuid>> {
        let messages = self.messages.read().await;
        Ok(self
            .statuses
            .read()
            .await
            .values()
            .filter(|s| s.recipient_id == recipient_id && s.state != DeliveryState::Read)
            .filter(|s| {
                messages
                    .get(&s.message_id)
                    .map(|m| m.conversation_id == conversation_id && m.deleted_at.is_none())
                    .unwrap_or(false)
            })
            .map(|s| s.message_id)
            .collect())
    }

    async fn try_insert_call(&self, call: &Call) -> AppResult<bool> {
        let mut guard = self.calls.write().await;
        let busy = guard
            .values()
            .any(|c| c.match_id == call.match_id && !c.status.is_terminal());
        if busy {
            return Ok(false);
        }
        guard.insert(call.id, call.clone());
        Ok(true)
    }

    async fn get_call(&self, id: Uuid) -> AppResult<Option<Call>> {
        Ok(self.calls.read().await.get(&id).cloned())
    }

    async fn active_call_for_match(&self, match_id: Uuid) -> AppResult<Option<Call>> {
        Ok(self
            .calls
            .read()
            .await
            .values()
            .find(|c| c.match_id == match_id && !c.status.is_terminal())
            .cloned())
    }

    async fn compare_and_set_call(&self, updated: &Call, expected: CallStatus) -> AppResult<bool> {
        let mut guard = self.calls.write().await;
        match guard.get_mut(&updated.id) {
            Some(current) if current.status == expected => {
                *current = updated.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn pending_calls_for_user(&self, user_id: Uuid) -> AppResult<Vec<Call>> {
        let mut out: Vec<Call> = self
            .calls
            .read()
            .await
            .values()
            .filter(|c| c.receiver_id == user_id && !c.status.is_terminal())
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    async fn call_history_for_user(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<Call>> {
        let mut out: Vec<Call> = self
            .calls
            .read()
            .await
            .values()
            .filter(|c| c.involves(user_id) && c.status.is_terminal())
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }

    async fn append_candidate(
        &self,
        call_id: Uuid,
        side: CandidateSide,
        candidate: String,
        sdp_mid: Option<String>,
        sdp_mline_index: Option<i32>,
    ) -> AppResult<ConnectivityCandidate> {
        let mut guard = self.candidates.write().await;
        let list = guard.entry(call_id).or_default();
        let record = ConnectivityCandidate {
            id: Uuid::new_v4(),
            call_id,
            side,
            candidate,
            sdp_mid,
            sdp_mline_index,
            seq: list.len() as i64 + 1,
            created_at: Utc::now(),
        };
        list.push(record.clone());
        Ok(record)
    }

    async fn candidates_for_call(
        &self,
        call_id: Uuid,
        side: Option<CandidateSide>,
    ) -> AppResult<Vec<ConnectivityCandidate>> {
        Ok(self
            .candidates
            .read()
            .await
            .get(&call_id)
            .map(|list| {
                list.iter()
                    .filter(|c| side.map(|s| c.side == s).unwrap_or(true))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert_typing(&self, indicator: &TypingIndicator) -> AppResult<()> {
        self.typing.write().await.insert(
            (indicator.conversation_id, indicator.user_id),
            indicator.clone(),
        );
        Ok(())
    }

    async fn typing_for_conversation(
        &self,
        conversation_id: Uuid,
    ) -> AppResult<Vec<TypingIndicator>> {
        Ok(self
            .typing
            .read()
            .await
            .values()
            .filter(|t| t.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn set_presence(&self, record: &PresenceRecord) -> AppResult<()> {
        self.presence
            .write()
            .await
            .insert(record.user_id, record.clone());
        Ok(())
    }

    async fn get_presence(&self, user_id: Uuid) -> AppResult<Option<PresenceRecord>> {
        Ok(self.presence.read().await.get(&user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessagePayload, MessageType};

    fn message(conversation_id: Uuid, ty: MessageType, at: DateTime<Utc>) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: Uuid::new_v4(),
            message_type: ty,
            payload: MessagePayload::Text { body: "hi".into() },
            is_read: false,
            created_at: at,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn conversation_get_or_create_is_idempotent() {
        let store = MemoryStore::new();
        let m = Match::new(Uuid::new_v4(), Uuid::new_v4());
        let first = store.get_or_create_conversation(&m).await.unwrap();
        let second = store.get_or_create_conversation(&m).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn list_messages_orders_and_filters() {
        let store = MemoryStore::new();
        let conversation_id = Uuid::new_v4();
        let base = Utc::now();
        let m1 = message(conversation_id, MessageType::Text, base);
        let m2 = message(
            conversation_id,
            MessageType::Photo,
            base + chrono::TimeDelta::seconds(1),
        );
        let mut m3 = message(
            conversation_id,
            MessageType::Text,
            base + chrono::TimeDelta::seconds(2),
        );
        m3.deleted_at = Some(Utc::now());
        for m in [&m1, &m2, &m3] {
            store.insert_message(m).await.unwrap();
        }

        let all = store
            .list_messages(conversation_id, &MessageQuery::default())
            .await
            .unwrap();
        assert_eq!(
            all.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![m1.id, m2.id],
            "ascending creation time, deleted excluded"
        );

        let photos = store
            .list_messages(
                conversation_id,
                &MessageQuery {
                    message_type: Some(MessageType::Photo),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].id, m2.id);

        let before = store
            .list_messages(
                conversation_id,
                &MessageQuery {
                    before: Some(base + chrono::TimeDelta::milliseconds(500)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].id, m1.id);
    }

    #[tokio::test]
    async fn second_active_call_for_match_is_refused() {
        let store = MemoryStore::new();
        let match_id = Uuid::new_v4();
        let conv = Uuid::new_v4();
        let a = Call::new(match_id, conv, Uuid::new_v4(), Uuid::new_v4(), "v=0".into());
        let b = Call::new(match_id, conv, Uuid::new_v4(), Uuid::new_v4(), "v=0".into());
        assert!(store.try_insert_call(&a).await.unwrap());
        assert!(!store.try_insert_call(&b).await.unwrap());

        // Terminal call frees the slot
        let mut ended = a.clone();
        ended.status = CallStatus::Ended;
        assert!(store
            .compare_and_set_call(&ended, CallStatus::Initiated)
            .await
            .unwrap());
        assert!(store.try_insert_call(&b).await.unwrap());
    }

    #[tokio::test]
    async fn advance_status_refuses_backward_moves() {
        let store = MemoryStore::new();
        let message_id = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        store
            .insert_statuses(&[MessageStatus {
                message_id,
                recipient_id: recipient,
                state: DeliveryState::Sent,
                updated_at: Utc::now(),
            }])
            .await
            .unwrap();

        assert!(store
            .advance_status(message_id, recipient, DeliveryState::Read, Utc::now())
            .await
            .unwrap());
        assert!(!store
            .advance_status(message_id, recipient, DeliveryState::Delivered, Utc::now())
            .await
            .unwrap());
        let status = store.get_status(message_id, recipient).await.unwrap().unwrap();
        assert_eq!(status.state, DeliveryState::Read);
    }
}
