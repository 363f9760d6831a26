//! Call signaling. Every transition is a compare-and-set on the persisted
//! status, so a lost race surfaces as Conflict instead of a double
//! transition. The offer/answer round is bound to the call row: a new round
//! requires a new call.

use chrono::Utc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::events::ChatEvent;
use crate::metrics::{CALLS_INITIATED_TOTAL, CALLS_TERMINAL_TOTAL};
use crate::models::{Call, CallStatus, CandidateSide, ConnectivityCandidate};
use crate::pubsub::{call_channel, messages_channel};
use crate::state::AppState;

pub struct CallService;

impl CallService {
    /// Initiates a call on a match. The row is persisted before the offer is
    /// broadcast, so a receiver that missed the event can still find the
    /// pending call by polling. At most one non-terminal call may exist per
    /// match; a concurrent or repeated initiate gets Conflict.
    pub async fn initiate(
        state: &AppState,
        match_id: Uuid,
        caller_id: Uuid,
        offer_sdp: String,
    ) -> AppResult<Call> {
        if offer_sdp.trim().is_empty() {
            return Err(AppError::Validation("offer sdp cannot be empty".into()));
        }
        let m = state
            .store
            .get_match(match_id)
            .await?
            .ok_or(AppError::NotFound)?;
        // An inactive match is not addressable for new calls
        if !m.is_active {
            return Err(AppError::NotFound);
        }
        let receiver_id = m
            .other_participant(caller_id)
            .ok_or_else(|| AppError::Forbidden("not a participant in this match".into()))?;
        state.capabilities.check_call(m.level)?;

        let conversation = state.store.get_or_create_conversation(&m).await?;
        let call = Call::new(match_id, conversation.id, caller_id, receiver_id, offer_sdp);
        if !state.store.try_insert_call(&call).await? {
            return Err(AppError::Conflict("a call is already in progress".into()));
        }
        CALLS_INITIATED_TOTAL.inc();
        tracing::info!(call_id = %call.id, %match_id, "call initiated");

        let offer = ChatEvent::CallOffer {
            call_id: call.id,
            conversation_id: conversation.id,
            caller_id,
            receiver_id,
            sdp: call.offer_sdp.clone(),
        };
        state
            .channels
            .publish(&messages_channel(conversation.id), &offer)
            .await;
        state.channels.publish(&call_channel(call.id), &offer).await;
        Ok(call)
    }

    pub async fn get(state: &AppState, call_id: Uuid) -> AppResult<Call> {
        state.store.get_call(call_id).await?.ok_or(AppError::NotFound)
    }

    /// Receiver acknowledges the offer. Starts the ring timeout: if no
    /// answer arrives within the configured window the call goes to Missed.
    pub async fn ring(state: &AppState, call_id: Uuid, user_id: Uuid) -> AppResult<Call> {
        let mut call = Self::get(state, call_id).await?;
        if call.receiver_id != user_id {
            return Err(AppError::Forbidden("only the receiver can ring".into()));
        }
        if call.status != CallStatus::Initiated {
            return Err(AppError::Conflict(format!(
                "cannot ring a call in status '{}'",
                call.status.as_str()
            )));
        }
        call.status = CallStatus::Ringing;
        if !state
            .store
            .compare_and_set_call(&call, CallStatus::Initiated)
            .await?
        {
            return Err(AppError::Conflict("call state changed concurrently".into()));
        }
        state
            .channels
            .publish(&call_channel(call_id), &ChatEvent::CallRinging { call_id })
            .await;
        Self::spawn_ring_watchdog(state.clone(), call_id);
        Ok(call)
    }

    /// Background timer that turns an unanswered Ringing call into Missed.
    /// The compare-and-set makes it harmless if the call was answered or
    /// ended in the meantime.
    fn spawn_ring_watchdog(state: AppState, call_id: Uuid) {
        let timeout = state.config.ring_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let call = match state.store.get_call(call_id).await {
                Ok(Some(call)) => call,
                Ok(None) => return,
                Err(e) => {
                    tracing::error!(%call_id, error = %e, "ring watchdog lookup failed");
                    return;
                }
            };
            if call.status != CallStatus::Ringing {
                return;
            }
            if let Err(e) =
                Self::finish(&state, call, CallStatus::Missed, CallStatus::Ringing).await
            {
                // Lost the race to answer/end; nothing to do
                tracing::debug!(%call_id, error = %e, "ring watchdog transition skipped");
            }
        });
    }

    /// Receiver accepts with their session description. Only valid from
    /// Ringing; answering twice, or answering an expired call, is Conflict.
    pub async fn answer(
        state: &AppState,
        call_id: Uuid,
        user_id: Uuid,
        answer_sdp: String,
    ) -> AppResult<Call> {
        if answer_sdp.trim().is_empty() {
            return Err(AppError::Validation("answer sdp cannot be empty".into()));
        }
        let mut call = Self::get(state, call_id).await?;
        if call.receiver_id != user_id {
            return Err(AppError::Forbidden("only the receiver can answer".into()));
        }
        if call.status != CallStatus::Ringing {
            return Err(AppError::Conflict(format!(
                "cannot answer a call in status '{}'",
                call.status.as_str()
            )));
        }
        call.status = CallStatus::Connecting;
        call.answer_sdp = Some(answer_sdp.clone());
        if !state
            .store
            .compare_and_set_call(&call, CallStatus::Ringing)
            .await?
        {
            return Err(AppError::Conflict("call state changed concurrently".into()));
        }
        state
            .channels
            .publish(
                &call_channel(call_id),
                &ChatEvent::CallAnswer {
                    call_id,
                    sdp: answer_sdp,
                },
            )
            .await;
        Ok(call)
    }

    /// Appends a connectivity candidate from either side. A malformed
    /// (empty) candidate is a signaling violation and fails the whole call.
    pub async fn add_candidate(
        state: &AppState,
        call_id: Uuid,
        user_id: Uuid,
        candidate: String,
        sdp_mid: Option<String>,
        sdp_mline_index: Option<i32>,
    ) -> AppResult<ConnectivityCandidate> {
        let call = Self::get(state, call_id).await?;
        let side = if call.caller_id == user_id {
            CandidateSide::Caller
        } else if call.receiver_id == user_id {
            CandidateSide::Receiver
        } else {
            return Err(AppError::Forbidden("not a participant in this call".into()));
        };
        if call.status.is_terminal() {
            return Err(AppError::Signaling(format!(
                "call already terminal ({})",
                call.status.as_str()
            )));
        }
        if candidate.trim().is_empty() {
            let expected = call.status;
            let _ = Self::finish(state, call, CallStatus::Failed, expected).await;
            return Err(AppError::Signaling("empty connectivity candidate".into()));
        }

        let stored = state
            .store
            .append_candidate(call_id, side, candidate, sdp_mid, sdp_mline_index)
            .await?;
        state
            .channels
            .publish(
                &call_channel(call_id),
                &ChatEvent::CallCandidate {
                    call_id,
                    side,
                    candidate: stored.candidate.clone(),
                    sdp_mid: stored.sdp_mid.clone(),
                    sdp_mline_index: stored.sdp_mline_index,
                },
            )
            .await;
        Ok(stored)
    }

    /// Media transport is up: Connecting -> Connected, stamping the start of
    /// billable duration.
    pub async fn transport_connected(state: &AppState, call_id: Uuid) -> AppResult<Call> {
        let mut call = Self::get(state, call_id).await?;
        if call.status != CallStatus::Connecting {
            return Err(AppError::Conflict(format!(
                "cannot connect a call in status '{}'",
                call.status.as_str()
            )));
        }
        let started_at = Utc::now();
        call.status = CallStatus::Connected;
        call.started_at = Some(started_at);
        if !state
            .store
            .compare_and_set_call(&call, CallStatus::Connecting)
            .await?
        {
            return Err(AppError::Conflict("call state changed concurrently".into()));
        }
        state
            .channels
            .publish(
                &call_channel(call_id),
                &ChatEvent::CallConnected {
                    call_id,
                    started_at: started_at.to_rfc3339(),
                },
            )
            .await;
        Ok(call)
    }

    /// Either participant hangs up.
    pub async fn end(state: &AppState, call_id: Uuid, user_id: Uuid) -> AppResult<Call> {
        let call = Self::get(state, call_id).await?;
        if !call.involves(user_id) {
            return Err(AppError::Forbidden("not a participant in this call".into()));
        }
        let expected = call.status;
        Self::finish(state, call, CallStatus::Ended, expected).await
    }

    /// Receiver declines. Only valid while Ringing.
    pub async fn reject(state: &AppState, call_id: Uuid, user_id: Uuid) -> AppResult<Call> {
        let call = Self::get(state, call_id).await?;
        if call.receiver_id != user_id {
            return Err(AppError::Forbidden("only the receiver can reject".into()));
        }
        if call.status != CallStatus::Ringing {
            return Err(AppError::Conflict(format!(
                "cannot reject a call in status '{}'",
                call.status.as_str()
            )));
        }
        Self::finish(state, call, CallStatus::Rejected, CallStatus::Ringing).await
    }

    /// Single terminal path: stamps ended_at and duration, CASes the status,
    /// broadcasts call.ended to both channels and tears the call channel
    /// down. The freed partial-unique slot lets the match start a new call.
    async fn finish(
        state: &AppState,
        mut call: Call,
        to: CallStatus,
        expected: CallStatus,
    ) -> AppResult<Call> {
        if !call.status.can_transition_to(to) {
            return Err(AppError::Conflict(format!(
                "cannot move call from '{}' to '{}'",
                call.status.as_str(),
                to.as_str()
            )));
        }
        let ended_at = Utc::now();
        let duration_ms = call.computed_duration_ms(ended_at);
        call.status = to;
        call.ended_at = Some(ended_at);
        call.duration_ms = Some(duration_ms);
        if !state.store.compare_and_set_call(&call, expected).await? {
            return Err(AppError::Conflict("call state changed concurrently".into()));
        }
        CALLS_TERMINAL_TOTAL.with_label_values(&[to.as_str()]).inc();
        tracing::info!(call_id = %call.id, status = to.as_str(), duration_ms, "call finished");

        let event = ChatEvent::CallEnded {
            call_id: call.id,
            status: to.as_str().to_string(),
            duration_ms,
        };
        state
            .channels
            .publish(&messages_channel(call.conversation_id), &event)
            .await;
        state.channels.publish(&call_channel(call.id), &event).await;
        state.channels.drop_channel(&call_channel(call.id)).await;
        Ok(call)
    }

    /// Non-terminal calls addressed to the user; lets a reconnecting client
    /// recover an offer it missed while offline.
    pub async fn pending_for_user(state: &AppState, user_id: Uuid) -> AppResult<Vec<Call>> {
        state.store.pending_calls_for_user(user_id).await
    }

    pub async fn history_for_user(
        state: &AppState,
        user_id: Uuid,
        limit: i64,
    ) -> AppResult<Vec<Call>> {
        state.store.call_history_for_user(user_id, limit).await
    }

    pub async fn candidates(
        state: &AppState,
        call_id: Uuid,
        side: Option<CandidateSide>,
    ) -> AppResult<Vec<ConnectivityCandidate>> {
        Self::get(state, call_id).await?;
        state.store.candidates_for_call(call_id, side).await
    }
}
