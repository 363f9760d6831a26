//! Realtime event payloads.
//!
//! Every event serializes to a flat JSON object with a `type` field using
//! the "object.action" convention plus a server timestamp. Delivery is
//! at-least-once with no cross-channel ordering guarantee, so payloads carry
//! enough row state for consumers to re-derive their view from the latest
//! event rather than from stream order.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{CandidateSide, MessagePayload, MessageType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChatEvent {
    /// New message persisted and fanned out to the conversation channel.
    #[serde(rename = "message.new")]
    MessageNew {
        message_id: Uuid,
        conversation_id: Uuid,
        sender_id: Uuid,
        message_type: MessageType,
        payload: MessagePayload,
        created_at: String,
    },

    /// A recipient's read receipt; `all_read` mirrors the aggregate flag.
    #[serde(rename = "message.read")]
    MessageRead {
        message_id: Uuid,
        conversation_id: Uuid,
        reader_id: Uuid,
        all_read: bool,
    },

    #[serde(rename = "message.deleted")]
    MessageDeleted {
        message_id: Uuid,
        conversation_id: Uuid,
    },

    /// Match level advanced (external progression rule fired).
    #[serde(rename = "match.level")]
    MatchLevel {
        match_id: Uuid,
        conversation_id: Option<Uuid>,
        level: i32,
    },

    #[serde(rename = "typing.updated")]
    TypingUpdated {
        conversation_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },

    #[serde(rename = "presence.updated")]
    PresenceUpdated {
        user_id: Uuid,
        online: bool,
        last_seen: Option<String>,
    },

    /// Session-description offer; published only after the call row is
    /// durably persisted, so a crashed receiver can recover it by polling.
    #[serde(rename = "call.offer")]
    CallOffer {
        call_id: Uuid,
        conversation_id: Uuid,
        caller_id: Uuid,
        receiver_id: Uuid,
        sdp: String,
    },

    #[serde(rename = "call.ringing")]
    CallRinging { call_id: Uuid },

    #[serde(rename = "call.answer")]
    CallAnswer { call_id: Uuid, sdp: String },

    #[serde(rename = "call.candidate")]
    CallCandidate {
        call_id: Uuid,
        side: CandidateSide,
        candidate: String,
        sdp_mid: Option<String>,
        sdp_mline_index: Option<i32>,
    },

    #[serde(rename = "call.connected")]
    CallConnected { call_id: Uuid, started_at: String },

    /// Any terminal transition: ended, failed, missed or rejected.
    #[serde(rename = "call.ended")]
    CallEnded {
        call_id: Uuid,
        status: String,
        duration_ms: i64,
    },
}

impl ChatEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MessageNew { .. } => "message.new",
            Self::MessageRead { .. } => "message.read",
            Self::MessageDeleted { .. } => "message.deleted",
            Self::MatchLevel { .. } => "match.level",
            Self::TypingUpdated { .. } => "typing.updated",
            Self::PresenceUpdated { .. } => "presence.updated",
            Self::CallOffer { .. } => "call.offer",
            Self::CallRinging { .. } => "call.ringing",
            Self::CallAnswer { .. } => "call.answer",
            Self::CallCandidate { .. } => "call.candidate",
            Self::CallConnected { .. } => "call.connected",
            Self::CallEnded { .. } => "call.ended",
        }
    }

    /// Flat broadcast payload: `type` + `timestamp` + the event's fields at
    /// the top level. This is the only place event serialization happens.
    pub fn to_broadcast_payload(&self) -> Result<String, serde_json::Error> {
        let mut payload = serde_json::json!({
            "type": self.event_type(),
            "timestamp": Utc::now().to_rfc3339(),
        });
        let fields = serde_json::to_value(self)?;
        // Externally tagged enum: single-key map of variant name -> fields
        if let Value::Object(outer) = fields {
            for (_, inner) in outer {
                if let Value::Object(map) = inner {
                    for (key, value) in map {
                        payload[key] = value;
                    }
                }
            }
        }
        serde_json::to_string(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_flat_and_typed() {
        let conversation_id = Uuid::new_v4();
        let event = ChatEvent::TypingUpdated {
            conversation_id,
            user_id: Uuid::new_v4(),
            is_typing: true,
        };
        let payload = event.to_broadcast_payload().unwrap();
        let parsed: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed["type"], "typing.updated");
        assert_eq!(parsed["conversation_id"], conversation_id.to_string());
        assert_eq!(parsed["is_typing"], true);
        assert!(parsed["timestamp"].is_string());
    }

    #[test]
    fn message_new_carries_row_state() {
        let event = ChatEvent::MessageNew {
            message_id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            message_type: MessageType::Voice,
            payload: MessagePayload::Voice {
                url: "https://cdn.example/v.ogg".into(),
                duration_ms: 900,
            },
            created_at: Utc::now().to_rfc3339(),
        };
        let parsed: Value =
            serde_json::from_str(&event.to_broadcast_payload().unwrap()).unwrap();
        assert_eq!(parsed["type"], "message.new");
        assert_eq!(parsed["message_type"], "voice");
        assert_eq!(parsed["payload"]["kind"], "voice");
        assert_eq!(parsed["payload"]["duration_ms"], 900);
    }

    #[test]
    fn call_ended_names_the_terminal_status() {
        let event = ChatEvent::CallEnded {
            call_id: Uuid::new_v4(),
            status: "missed".into(),
            duration_ms: 0,
        };
        let parsed: Value =
            serde_json::from_str(&event.to_broadcast_payload().unwrap()).unwrap();
        assert_eq!(parsed["type"], "call.ended");
        assert_eq!(parsed["status"], "missed");
        assert_eq!(parsed["duration_ms"], 0);
    }
}
