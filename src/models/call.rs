use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Lifecycle of a peer-to-peer call. At most one non-terminal call exists
/// per match at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Initiated,
    Ringing,
    Connecting,
    Connected,
    Ended,
    Failed,
    Missed,
    Rejected,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Ringing => "ringing",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Ended => "ended",
            Self::Failed => "failed",
            Self::Missed => "missed",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "initiated" => Ok(Self::Initiated),
            "ringing" => Ok(Self::Ringing),
            "connecting" => Ok(Self::Connecting),
            "connected" => Ok(Self::Connected),
            "ended" => Ok(Self::Ended),
            "failed" => Ok(Self::Failed),
            "missed" => Ok(Self::Missed),
            "rejected" => Ok(Self::Rejected),
            other => Err(AppError::Validation(format!("unknown call status: {other}"))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Failed | Self::Missed | Self::Rejected)
    }

    /// The signaling transition table. Candidates are accepted in any
    /// non-terminal state once an offer exists; this governs status moves.
    pub fn can_transition_to(&self, next: CallStatus) -> bool {
        use CallStatus::*;
        matches!(
            (self, next),
            (Initiated, Ringing)
                | (Ringing, Connecting)
                | (Connecting, Connected)
                | (Initiated, Failed)
                | (Ringing, Failed)
                | (Connecting, Failed)
                | (Ringing, Missed)
                | (Ringing, Rejected)
                | (Initiated, Ended)
                | (Ringing, Ended)
                | (Connecting, Ended)
                | (Connected, Ended)
        )
    }
}

/// Which endpoint of the call produced a signaling artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSide {
    Caller,
    Receiver,
}

impl CandidateSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Caller => "caller",
            Self::Receiver => "receiver",
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "caller" => Ok(Self::Caller),
            "receiver" => Ok(Self::Receiver),
            other => Err(AppError::Validation(format!(
                "unknown candidate side: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub id: Uuid,
    pub match_id: Uuid,
    pub conversation_id: Uuid,
    pub caller_id: Uuid,
    pub receiver_id: Uuid,
    pub status: CallStatus,
    /// Session description the caller produced at initiation. Exactly one
    /// offer/answer round is bound to this row; a new round is a new call.
    pub offer_sdp: String,
    pub answer_sdp: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl Call {
    pub fn new(
        match_id: Uuid,
        conversation_id: Uuid,
        caller_id: Uuid,
        receiver_id: Uuid,
        offer_sdp: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            match_id,
            conversation_id,
            caller_id,
            receiver_id,
            status: CallStatus::Initiated,
            offer_sdp,
            answer_sdp: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            duration_ms: None,
        }
    }

    pub fn involves(&self, user_id: Uuid) -> bool {
        self.caller_id == user_id || self.receiver_id == user_id
    }

    /// Duration from connect to teardown; zero when the call never connected.
    pub fn computed_duration_ms(&self, ended_at: DateTime<Utc>) -> i64 {
        match self.started_at {
            Some(start) => (ended_at - start).num_milliseconds().max(0),
            None => 0,
        }
    }
}

/// One proposed network path, exchanged during connection negotiation.
/// Append-only; `seq` preserves insertion order within a side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityCandidate {
    pub id: Uuid,
    pub call_id: Uuid,
    pub side: CandidateSide,
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<i32>,
    pub seq: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_terminal() {
        for s in [
            CallStatus::Ended,
            CallStatus::Failed,
            CallStatus::Missed,
            CallStatus::Rejected,
        ] {
            assert!(s.is_terminal());
            assert!(!s.can_transition_to(CallStatus::Connected));
            assert!(!s.can_transition_to(CallStatus::Ringing));
        }
    }

    #[test]
    fn happy_path_transitions() {
        assert!(CallStatus::Initiated.can_transition_to(CallStatus::Ringing));
        assert!(CallStatus::Ringing.can_transition_to(CallStatus::Connecting));
        assert!(CallStatus::Connecting.can_transition_to(CallStatus::Connected));
        assert!(CallStatus::Connected.can_transition_to(CallStatus::Ended));
    }

    #[test]
    fn missed_and_rejected_only_from_ringing() {
        assert!(CallStatus::Ringing.can_transition_to(CallStatus::Missed));
        assert!(CallStatus::Ringing.can_transition_to(CallStatus::Rejected));
        assert!(!CallStatus::Initiated.can_transition_to(CallStatus::Missed));
        assert!(!CallStatus::Connecting.can_transition_to(CallStatus::Rejected));
        assert!(!CallStatus::Connected.can_transition_to(CallStatus::Failed));
    }

    #[test]
    fn duration_is_zero_when_never_connected() {
        let call = Call::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "v=0".into(),
        );
        assert_eq!(call.computed_duration_ms(Utc::now()), 0);
    }
}
