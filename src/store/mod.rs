//! Persistence behind one trait so the same pipelines run against Postgres
//! in production and the in-memory store in tests and DATABASE_URL-less dev.
//! Every method is a single-entity atomic update; invariants that span a
//! check-then-write (one non-terminal call per match, forward-only delivery
//! states) are expressed as atomic store operations so races surface as a
//! `false` return, never as corrupted state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    Call, CallStatus, CandidateSide, ConnectivityCandidate, Conversation, DeliveryState, Match,
    Message, MessageStatus, MessageType, PresenceRecord, TypingIndicator,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Time-boundary pagination and type filtering for message listings.
#[derive(Debug, Clone)]
pub struct MessageQuery {
    pub before: Option<DateTime<Utc>>,
    pub after: Option<DateTime<Utc>>,
    pub message_type: Option<MessageType>,
    pub limit: i64,
    /// Retrieval order is ascending creation time; "most recent first"
    /// listings flip this.
    pub newest_first: bool,
    pub include_deleted: bool,
}

impl Default for MessageQuery {
    fn default() -> Self {
        Self {
            before: None,
            after: None,
            message_type: None,
            limit: 50,
            newest_first: false,
            include_deleted: false,
        }
    }
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    // -- likes & matches -----------------------------------------------------

    /// Idempotent; returns true when the like row is new.
    async fn insert_like(&self, from_user: Uuid, to_user: Uuid) -> AppResult<bool>;
    async fn has_like(&self, from_user: Uuid, to_user: Uuid) -> AppResult<bool>;
    async fn create_match(&self, m: &Match) -> AppResult<()>;
    async fn get_match(&self, id: Uuid) -> AppResult<Option<Match>>;
    /// Either orientation of the pair.
    async fn find_match_between(&self, a: Uuid, b: Uuid) -> AppResult<Option<Match>>;
    async fn set_match_level(&self, id: Uuid, level: i32) -> AppResult<()>;
    async fn deactivate_match(&self, id: Uuid) -> AppResult<()>;

    // -- conversations -------------------------------------------------------

    /// Idempotent get-or-create keyed by match id.
    async fn get_or_create_conversation(&self, m: &Match) -> AppResult<Conversation>;
    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>>;
    async fn conversation_for_match(&self, match_id: Uuid) -> AppResult<Option<Conversation>>;
    /// Most recent activity first.
    async fn list_conversations(&self, user_id: Uuid) -> AppResult<Vec<Conversation>>;
    /// Advance the last-message pointer and bump the recipient's unread count.
    async fn record_last_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
        recipient_id: Uuid,
    ) -> AppResult<()>;
    async fn reset_unread(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<()>;

    // -- messages ------------------------------------------------------------

    async fn insert_message(&self, message: &Message) -> AppResult<()>;
    async fn get_message(&self, id: Uuid) -> AppResult<Option<Message>>;
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        query: &MessageQuery,
    ) -> AppResult<Vec<Message>>;
    async fn soft_delete_message(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()>;
    async fn set_message_read(&self, id: Uuid) -> AppResult<()>;

    // -- delivery statuses ---------------------------------------------------

    async fn insert_statuses(&self, statuses: &[MessageStatus]) -> AppResult<()>;
    async fn get_status(
        &self,
        message_id: Uuid,
        recipient_id: Uuid,
    ) -> AppResult<Option<MessageStatus>>;
    /// Applies the transition only when it is forward per
    /// `DeliveryState::can_advance_to`; returns whether anything changed.
    async fn advance_status(
        &self,
        message_id: Uuid,
        recipient_id: Uuid,
        to: DeliveryState,
        at: DateTime<Utc>,
    ) -> AppResult<bool>;
    async fn statuses_for_message(&self, message_id: Uuid) -> AppResult<Vec<MessageStatus>>;
    /// Message ids in the conversation the recipient has not read yet.
    async fn unread_message_ids(
        &self,
        conversation_id: Uuid,
        recipient_id: Uuid,
    ) -> AppResult<Vec<Uuid>>;

    // -- calls ---------------------------------------------------------------

    /// Inserts only when the match has no other non-terminal call; the check
    /// and insert are atomic so exactly one of two concurrent initiates wins.
    async fn try_insert_call(&self, call: &Call) -> AppResult<bool>;
    async fn get_call(&self, id: Uuid) -> AppResult<Option<Call>>;
    async fn active_call_for_match(&self, match_id: Uuid) -> AppResult<Option<Call>>;
    /// Single-row CAS on status: writes `updated` only while the stored row
    /// is still in `expected`; returns whether the write happened.
    async fn compare_and_set_call(&self, updated: &Call, expected: CallStatus) -> AppResult<bool>;
    /// Non-terminal calls addressed to the user (crash/reconnect recovery).
    async fn pending_calls_for_user(&self, user_id: Uuid) -> AppResult<Vec<Call>>;
    /// Terminal calls involving the user, most recent first.
    async fn call_history_for_user(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<Call>>;
    /// Append-only; the store assigns the per-call sequence number.
    async fn append_candidate(
        &self,
        call_id: Uuid,
        side: CandidateSide,
        candidate: String,
        sdp_mid: Option<String>,
        sdp_mline_index: Option<i32>,
    ) -> AppResult<ConnectivityCandidate>;
    async fn candidates_for_call(
        &self,
        call_id: Uuid,
        side: Option<CandidateSide>,
    ) -> AppResult<Vec<ConnectivityCandidate>>;

    // -- typing & presence ---------------------------------------------------

    async fn upsert_typing(&self, indicator: &TypingIndicator) -> AppResult<()>;
    async fn typing_for_conversation(
        &self,
        conversation_id: Uuid,
    ) -> AppResult<Vec<TypingIndicator>>;
    async fn set_presence(&self, record: &PresenceRecord) -> AppResult<()>;
    async fn get_presence(&self, user_id: Uuid) -> AppResult<Option<PresenceRecord>>;
}
