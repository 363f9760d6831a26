use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Photo,
    Voice,
    Location,
    Sticker,
    Gif,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Photo => "photo",
            Self::Voice => "voice",
            Self::Location => "location",
            Self::Sticker => "sticker",
            Self::Gif => "gif",
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "text" => Ok(Self::Text),
            "photo" => Ok(Self::Photo),
            "voice" => Ok(Self::Voice),
            "location" => Ok(Self::Location),
            "sticker" => Ok(Self::Sticker),
            "gif" => Ok(Self::Gif),
            other => Err(AppError::Validation(format!(
                "unknown message type: {other}"
            ))),
        }
    }
}

/// Content of a message. Media bytes live in the external storage service;
/// we only ever carry the already-uploaded asset URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MessagePayload {
    Text {
        body: String,
    },
    /// photo | sticker | gif
    Media {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Voice {
        url: String,
        duration_ms: u32,
    },
    Location {
        latitude: f64,
        longitude: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
}

impl MessagePayload {
    /// Rejects malformed input before any write, and enforces that the
    /// payload shape matches the declared message type.
    pub fn validate(&self, ty: MessageType) -> AppResult<()> {
        let mismatch = || {
            AppError::Validation(format!(
                "payload does not match message type '{}'",
                ty.as_str()
            ))
        };
        match self {
            MessagePayload::Text { body } => {
                if ty != MessageType::Text {
                    return Err(mismatch());
                }
                if body.trim().is_empty() {
                    return Err(AppError::Validation("message body cannot be empty".into()));
                }
                if body.len() > 4000 {
                    return Err(AppError::Validation("message body too long (max 4000)".into()));
                }
            }
            MessagePayload::Media { url, .. } => {
                if !matches!(
                    ty,
                    MessageType::Photo | MessageType::Sticker | MessageType::Gif
                ) {
                    return Err(mismatch());
                }
                if url.trim().is_empty() {
                    return Err(AppError::Validation("media url cannot be empty".into()));
                }
            }
            MessagePayload::Voice { url, duration_ms } => {
                if ty != MessageType::Voice {
                    return Err(mismatch());
                }
                if url.trim().is_empty() {
                    return Err(AppError::Validation("voice url cannot be empty".into()));
                }
                if *duration_ms == 0 {
                    return Err(AppError::Validation("voice duration must be > 0".into()));
                }
            }
            MessagePayload::Location {
                latitude,
                longitude,
                ..
            } => {
                if ty != MessageType::Location {
                    return Err(mismatch());
                }
                if !(-90.0..=90.0).contains(latitude) || !(-180.0..=180.0).contains(longitude) {
                    return Err(AppError::Validation("coordinates out of range".into()));
                }
            }
        }
        Ok(())
    }
}

/// Immutable once created, except for the aggregate read flag and the soft
/// delete timestamp. Only the sender may delete their own message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub message_type: MessageType,
    pub payload: MessagePayload,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Per-recipient delivery/read state. Transitions are forward-only:
/// sent -> delivered -> read; failed is terminal for undeliverable fanout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "read" => Ok(Self::Read),
            "failed" => Ok(Self::Failed),
            other => Err(AppError::Validation(format!(
                "unknown delivery state: {other}"
            ))),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Sent => 0,
            Self::Delivered => 1,
            Self::Read => 2,
            Self::Failed => 3,
        }
    }

    /// Monotonic forward transitions only; no read -> sent. Failed never
    /// recovers, and a read receipt never regresses to delivered.
    pub fn can_advance_to(&self, next: DeliveryState) -> bool {
        if *self == Self::Failed || next == Self::Failed {
            return *self != Self::Failed && next == Self::Failed;
        }
        next.rank() > self.rank()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageStatus {
    pub message_id: Uuid,
    pub recipient_id: Uuid,
    pub state: DeliveryState,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_state_is_forward_only() {
        assert!(DeliveryState::Sent.can_advance_to(DeliveryState::Delivered));
        assert!(DeliveryState::Sent.can_advance_to(DeliveryState::Read));
        assert!(DeliveryState::Delivered.can_advance_to(DeliveryState::Read));
        assert!(!DeliveryState::Read.can_advance_to(DeliveryState::Sent));
        assert!(!DeliveryState::Read.can_advance_to(DeliveryState::Delivered));
        assert!(!DeliveryState::Read.can_advance_to(DeliveryState::Read));
        assert!(!DeliveryState::Failed.can_advance_to(DeliveryState::Sent));
    }

    #[test]
    fn payload_must_match_declared_type() {
        let text = MessagePayload::Text { body: "hey".into() };
        assert!(text.validate(MessageType::Text).is_ok());
        assert!(text.validate(MessageType::Voice).is_err());

        let voice = MessagePayload::Voice {
            url: "https://cdn.example/v.ogg".into(),
            duration_ms: 1200,
        };
        assert!(voice.validate(MessageType::Voice).is_ok());
        assert!(voice.validate(MessageType::Text).is_err());

        let media = MessagePayload::Media {
            url: "https://cdn.example/p.jpg".into(),
            caption: None,
        };
        assert!(media.validate(MessageType::Photo).is_ok());
        assert!(media.validate(MessageType::Gif).is_ok());
        assert!(media.validate(MessageType::Location).is_err());
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(MessagePayload::Text { body: "  ".into() }
            .validate(MessageType::Text)
            .is_err());
        assert!(MessagePayload::Voice {
            url: "https://cdn.example/v.ogg".into(),
            duration_ms: 0
        }
        .validate(MessageType::Voice)
        .is_err());
        assert!(MessagePayload::Location {
            latitude: 91.0,
            longitude: 0.0,
            label: None
        }
        .validate(MessageType::Location)
        .is_err());
    }
}
