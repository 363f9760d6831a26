//! Postgres-backed store. Runtime-bound queries; cross-row invariants lean
//! on the schema: a partial unique index keeps one non-terminal call per
//! match, and `ON CONFLICT` makes conversation creation idempotent.

use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use async_trait::async_trait;

use crate::error::{AppError, AppResult};
use crate::models::{
    Call, CallStatus, CandidateSide, ConnectivityCandidate, Conversation, DeliveryState, Match,
    Message, MessagePayload, MessageStatus, MessageType, PresenceRecord, TypingIndicator,
};
use crate::store::{ChatStore, MessageQuery};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Embedded migrations, idempotent; schema drift is fatal at startup.
    pub async fn run_migrations(&self) -> AppResult<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| AppError::StartServer(format!("database migrations failed: {e}")))
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

fn match_from_row(row: &PgRow) -> AppResult<Match> {
    Ok(Match {
        id: row.get("id"),
        user_a: row.get("user_a"),
        user_b: row.get("user_b"),
        level: row.get("level"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
    })
}

fn conversation_from_row(row: &PgRow) -> AppResult<Conversation> {
    Ok(Conversation {
        id: row.get("id"),
        match_id: row.get("match_id"),
        user_a: row.get("user_a"),
        user_b: row.get("user_b"),
        last_message_id: row.get("last_message_id"),
        last_message_at: row.get("last_message_at"),
        unread_a: row.get("unread_a"),
        unread_b: row.get("unread_b"),
        created_at: row.get("created_at"),
    })
}

fn message_from_row(row: &PgRow) -> AppResult<Message> {
    let message_type: String = row.get("message_type");
    let payload: String = row.get("payload");
    let payload: MessagePayload = serde_json::from_str(&payload)
        .map_err(|e| AppError::Validation(format!("stored payload invalid: {e}")))?;
    Ok(Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        sender_id: row.get("sender_id"),
        message_type: MessageType::parse(&message_type)?,
        payload,
        is_read: row.get("is_read"),
        created_at: row.get("created_at"),
        deleted_at: row.get("deleted_at"),
    })
}

fn status_from_row(row: &PgRow) -> AppResult<MessageStatus> {
    let state: String = row.get("state");
    Ok(MessageStatus {
        message_id: row.get("message_id"),
        recipient_id: row.get("recipient_id"),
        state: DeliveryState::parse(&state)?,
        updated_at: row.get("updated_at"),
    })
}

fn call_from_row(row: &PgRow) -> AppResult<Call> {
    let status: String = row.get("status");
    Ok(Call {
        id: row.get("id"),
        match_id: row.get("match_id"),
        conversation_id: row.get("conversation_id"),
        caller_id: row.get("caller_id"),
        receiver_id: row.get("receiver_id"),
        status: CallStatus::parse(&status)?,
        offer_sdp: row.get("offer_sdp"),
        answer_sdp: row.get("answer_sdp"),
        created_at: row.get("created_at"),
        started_at: row.get("started_at"),
        ended_at: row.get("ended_at"),
        duration_ms: row.get("duration_ms"),
    })
}

fn candidate_from_row(row: &PgRow) -> AppResult<ConnectivityCandidate> {
    let side: String = row.get("side");
    Ok(ConnectivityCandidate {
        id: row.get("id"),
        call_id: row.get("call_id"),
        side: CandidateSide::parse(&side)?,
        candidate: row.get("candidate"),
        sdp_mid: row.get("sdp_mid"),
        sdp_mline_index: row.get("sdp_mline_index"),
        seq: row.get("seq"),
        created_at: row.get("created_at"),
    })
}

const TERMINAL_STATUSES: &str = "('ended','failed','missed','rejected')";

#[async_trait]
impl ChatStore for PgStore {
    async fn insert_like(&self, from_user: Uuid, to_user: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO likes (from_user_id, to_user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(from_user)
        .bind(to_user)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn has_like(&self, from_user: Uuid, to_user: Uuid) -> AppResult<bool> {
        let row =
            sqlx::query("SELECT 1 FROM likes WHERE from_user_id = $1 AND to_user_id = $2 LIMIT 1")
                .bind(from_user)
                .bind(to_user)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn create_match(&self, m: &Match) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO matches (id, user_a, user_b, level, is_active, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(m.id)
        .bind(m.user_a)
        .bind(m.user_b)
        .bind(m.level)
        .bind(m.is_active)
        .bind(m.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_match(&self, id: Uuid) -> AppResult<Option<Match>> {
        let row = sqlx::query("SELECT * FROM matches WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(match_from_row).transpose()
    }

    async fn find_match_between(&self, a: Uuid, b: Uuid) -> AppResult<Option<Match>> {
        let row = sqlx::query(
            "SELECT * FROM matches WHERE (user_a = $1 AND user_b = $2) \
             OR (user_a = $2 AND user_b = $1) LIMIT 1",
        )
        .bind(a)
        .bind(b)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(match_from_row).transpose()
    }

    async fn set_match_level(&self, id: Uuid, level: i32) -> AppResult<()> {
        sqlx::query("UPDATE matches SET level = $2 WHERE id = $1")
            .bind(id)
            .bind(level)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn deactivate_match(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE matches SET is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_or_create_conversation(&self, m: &Match) -> AppResult<Conversation> {
        let fresh = Conversation::for_match(m.id, m.user_a, m.user_b);
        sqlx::query(
            "INSERT INTO conversations (id, match_id, user_a, user_b, created_at) \
             VALUES ($1, $2, $3, $4, $5) ON CONFLICT (match_id) DO NOTHING",
        )
        .bind(fresh.id)
        .bind(fresh.match_id)
        .bind(fresh.user_a)
        .bind(fresh.user_b)
        .bind(fresh.created_at)
        .execute(&self.pool)
        .await?;
        self.conversation_for_match(m.id)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(conversation_from_row).transpose()
    }

    async fn conversation_for_match(&self, match_id: Uuid) -> AppResult<Option<Conversation>> {
        let row = sqlx::query("SELECT * FROM conversations WHERE match_id = $1")
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(conversation_from_row).transpose()
    }

    async fn list_conversations(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let rows = sqlx::query(
            "SELECT * FROM conversations WHERE user_a = $1 OR user_b = $1 \
             ORDER BY COALESCE(last_message_at, created_at) DESC LIMIT 100",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(conversation_from_row).collect()
    }

    async fn record_last_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
        recipient_id: Uuid,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE conversations SET last_message_id = $2, last_message_at = $3, \
             unread_a = unread_a + CASE WHEN user_a = $4 THEN 1 ELSE 0 END, \
             unread_b = unread_b + CASE WHEN user_b = $4 THEN 1 ELSE 0 END \
             WHERE id = $1",
        )
        .bind(conversation_id)
        .bind(message_id)
        .bind(at)
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset_unread(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<()> {
        sqlx::query(
            "UPDATE conversations SET \
             unread_a = CASE WHEN user_a = $2 THEN 0 ELSE unread_a END, \
             unread_b = CASE WHEN user_b = $2 THEN 0 ELSE unread_b END \
             WHERE id = $1",
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_message(&self, message: &Message) -> AppResult<()> {
        let payload = serde_json::to_string(&message.payload)
            .map_err(|e| AppError::Validation(format!("payload serialization: {e}")))?;
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender_id, message_type, payload, \
             is_read, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .bind(message.message_type.as_str())
        .bind(payload)
        .bind(message.is_read)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_message(&self, id: Uuid) -> AppResult<Option<Message>> {
        let row = sqlx::query("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(message_from_row).transpose()
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        query: &MessageQuery,
    ) -> AppResult<Vec<Message>> {
        let mut sql = String::from("SELECT * FROM messages WHERE conversation_id = $1");
        if !query.include_deleted {
            sql.push_str(" AND deleted_at IS NULL");
        }
        if query.before.is_some() {
            sql.push_str(" AND created_at < $2");
        }
        if query.after.is_some() {
            sql.push_str(if query.before.is_some() {
                " AND created_at > $3"
            } else {
                " AND created_at > $2"
            });
        }
        if query.message_type.is_some() {
            let n = 2 + query.before.is_some() as usize + query.after.is_some() as usize;
            sql.push_str(&format!(" AND message_type = ${n}"));
        }
        sql.push_str(if query.newest_first {
            " ORDER BY created_at DESC, id DESC"
        } else {
            " ORDER BY created_at ASC, id ASC"
        });
        let limit_n =
            2 + query.before.is_some() as usize
                + query.after.is_some() as usize
                + query.message_type.is_some() as usize;
        sql.push_str(&format!(" LIMIT ${limit_n}"));

        let mut q = sqlx::query(&sql).bind(conversation_id);
        if let Some(before) = query.before {
            q = q.bind(before);
        }
        if let Some(after) = query.after {
            q = q.bind(after);
        }
        if let Some(ty) = query.message_type {
            q = q.bind(ty.as_str());
        }
        q = q.bind(query.limit.clamp(0, 200));

        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(message_from_row).collect()
    }

    async fn soft_delete_message(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query("UPDATE messages SET deleted_at = $2 WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_message_read(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE messages SET is_read = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_statuses(&self, statuses: &[MessageStatus]) -> AppResult<()> {
        for status in statuses {
            sqlx::query(
                "INSERT INTO message_statuses (message_id, recipient_id, state, updated_at) \
                 VALUES ($1, $2, $3, $4) ON CONFLICT (message_id, recipient_id) DO NOTHING",
            )
            .bind(status.message_id)
            .bind(status.recipient_id)
            .bind(status.state.as_str())
            .bind(status.updated_at)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn get_status(
        &self,
        message_id: Uuid,
        recipient_id: Uuid,
    ) -> AppResult<Option<MessageStatus>> {
        let row = sqlx::query(
            "SELECT * FROM message_statuses WHERE message_id = $1 AND recipient_id = $2",
        )
        .bind(message_id)
        .bind(recipient_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(status_from_row).transpose()
    }

    async fn advance_status(
        &self,
        message_id: Uuid,
        recipient_id: Uuid,
        to: DeliveryState,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let Some(current) = self.get_status(message_id, recipient_id).await? else {
            return Ok(false);
        };
        if !current.state.can_advance_to(to) {
            return Ok(false);
        }
        // CAS on the previous state keeps the transition forward under races
        let result = sqlx::query(
            "UPDATE message_statuses SET state = $3, updated_at = $4 \
             WHERE message_id = $1 AND recipient_id = $2 AND state = $5",
        )
        .bind(message_id)
        .bind(recipient_id)
        .bind(to.as_str())
        .bind(at)
        .bind(current.state.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn statuses_for_message(&self, message_id: Uuid) -> AppResult<Vec<MessageStatus>> {
        let rows = sqlx::query("SELECT * FROM message_statuses WHERE message_id = $1")
            .bind(message_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(status_from_row).collect()
    }

    async fn unread_message_ids(
        &self,
        conversation_id: Uuid,
        recipient_id: Uuid,
    ) -> AppResult<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT ms.message_id FROM message_statuses ms \
             JOIN messages m ON m.id = ms.message_id \
             WHERE m.conversation_id = $1 AND ms.recipient_id = $2 \
               AND ms.state <> 'read' AND m.deleted_at IS NULL",
        )
        .bind(conversation_id)
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get("message_id")).collect())
    }

    async fn try_insert_call(&self, call: &Call) -> AppResult<bool> {
        // calls_one_active_per_match (partial unique index) turns a lost
        // race into a no-op insert instead of a second active call
        let result = sqlx::query(
            "INSERT INTO calls (id, match_id, conversation_id, caller_id, receiver_id, status, \
             offer_sdp, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (match_id) WHERE status NOT IN ('ended','failed','missed','rejected') \
             DO NOTHING",
        )
        .bind(call.id)
        .bind(call.match_id)
        .bind(call.conversation_id)
        .bind(call.caller_id)
        .bind(call.receiver_id)
        .bind(call.status.as_str())
        .bind(&call.offer_sdp)
        .bind(call.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_call(&self, id: Uuid) -> AppResult<Option<Call>> {
        let row = sqlx::query("SELECT * FROM calls WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(call_from_row).transpose()
    }

    async fn active_call_for_match(&self, match_id: Uuid) -> AppResult<Option<Call>> {
        let sql = format!(
            "SELECT * FROM calls WHERE match_id = $1 AND status NOT IN {TERMINAL_STATUSES} LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(call_from_row).transpose()
    }

    async fn compare_and_set_call(&self, updated: &Call, expected: CallStatus) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE calls SET status = $3, answer_sdp = $4, started_at = $5, ended_at = $6, \
             duration_ms = $7 WHERE id = $1 AND status = $2",
        )
        .bind(updated.id)
        .bind(expected.as_str())
        .bind(updated.status.as_str())
        .bind(&updated.answer_sdp)
        .bind(updated.started_at)
        .bind(updated.ended_at)
        .bind(updated.duration_ms)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn pending_calls_for_user(&self, user_id: Uuid) -> AppResult<Vec<Call>> {
        let sql = format!(
            "SELECT * FROM calls WHERE receiver_id = $1 AND status NOT IN {TERMINAL_STATUSES} \
             ORDER BY created_at ASC"
        );
        let rows = sqlx::query(&sql).bind(user_id).fetch_all(&self.pool).await?;
        rows.iter().map(call_from_row).collect()
    }

    async fn call_history_for_user(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<Call>> {
        let sql = format!(
            "SELECT * FROM calls WHERE (caller_id = $1 OR receiver_id = $1) \
             AND status IN {TERMINAL_STATUSES} ORDER BY created_at DESC LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(limit.clamp(0, 100))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(call_from_row).collect()
    }

    async fn append_candidate(
        &self,
        call_id: Uuid,
        side: CandidateSide,
        candidate: String,
        sdp_mid: Option<String>,
        sdp_mline_index: Option<i32>,
    ) -> AppResult<ConnectivityCandidate> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            "INSERT INTO call_candidates (id, call_id, side, candidate, sdp_mid, sdp_mline_index) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING seq, created_at",
        )
        .bind(id)
        .bind(call_id)
        .bind(side.as_str())
        .bind(&candidate)
        .bind(&sdp_mid)
        .bind(sdp_mline_index)
        .fetch_one(&self.pool)
        .await?;
        Ok(ConnectivityCandidate {
            id,
            call_id,
            side,
            candidate,
            sdp_mid,
            sdp_mline_index,
            seq: row.get("seq"),
            created_at: row.get("created_at"),
        })
    }

    async fn candidates_for_call(
        &self,
        call_id: Uuid,
        side: Option<CandidateSide>,
    ) -> AppResult<Vec<ConnectivityCandidate>> {
        let rows = match side {
            Some(side) => {
                sqlx::query(
                    "SELECT * FROM call_candidates WHERE call_id = $1 AND side = $2 \
                     ORDER BY seq ASC",
                )
                .bind(call_id)
                .bind(side.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM call_candidates WHERE call_id = $1 ORDER BY seq ASC")
                    .bind(call_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(candidate_from_row).collect()
    }

    async fn upsert_typing(&self, indicator: &TypingIndicator) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO typing_indicators (conversation_id, user_id, is_typing, updated_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (conversation_id, user_id) \
             DO UPDATE SET is_typing = EXCLUDED.is_typing, updated_at = EXCLUDED.updated_at",
        )
        .bind(indicator.conversation_id)
        .bind(indicator.user_id)
        .bind(indicator.is_typing)
        .bind(indicator.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn typing_for_conversation(
        &self,
        conversation_id: Uuid,
    ) -> AppResult<Vec<TypingIndicator>> {
        let rows = sqlx::query("SELECT * FROM typing_indicators WHERE conversation_id = $1")
            .bind(conversation_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| TypingIndicator {
                conversation_id: r.get("conversation_id"),
                user_id: r.get("user_id"),
                is_typing: r.get("is_typing"),
                updated_at: r.get("updated_at"),
            })
            .collect())
    }

    async fn set_presence(&self, record: &PresenceRecord) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO presence (user_id, online, last_seen) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id) \
             DO UPDATE SET online = EXCLUDED.online, last_seen = EXCLUDED.last_seen",
        )
        .bind(record.user_id)
        .bind(record.online)
        .bind(record.last_seen)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_presence(&self, user_id: Uuid) -> AppResult<Option<PresenceRecord>> {
        let row = sqlx::query("SELECT * FROM presence WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| PresenceRecord {
            user_id: r.get("user_id"),
            online: r.get("online"),
            last_seen: r.get("last_seen"),
        }))
    }
}
