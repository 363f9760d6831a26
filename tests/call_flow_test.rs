use std::time::Duration;

use uuid::Uuid;

use chat_service::config::Config;
use chat_service::error::AppError;
use chat_service::models::{CallStatus, CandidateSide, Match};
use chat_service::services::{CallService, MatchService};
use chat_service::state::AppState;

const OFFER: &str = "v=0 offer";
const ANSWER: &str = "v=0 answer";

async fn callable_match(state: &AppState) -> (Uuid, Uuid, Match) {
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    MatchService::like(state, alice, bob).await.unwrap();
    let outcome = MatchService::like(state, bob, alice).await.unwrap();
    let m = outcome.match_record.unwrap();
    let m = MatchService::advance_level(state, m.id, 3).await.unwrap();
    (alice, bob, m)
}

#[tokio::test]
async fn calls_are_gated_on_match_level() {
    let state = AppState::in_memory(Config::test_defaults());
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    MatchService::like(&state, alice, bob).await.unwrap();
    let m = MatchService::like(&state, bob, alice)
        .await
        .unwrap()
        .match_record
        .unwrap();

    let result = CallService::initiate(&state, m.id, alice, OFFER.into()).await;
    match result {
        Err(AppError::CapabilityDenied { required, level }) => {
            assert_eq!(required, 3);
            assert_eq!(level, 1);
        }
        other => panic!("expected CapabilityDenied, got {other:?}"),
    }
}

#[tokio::test]
async fn full_call_lifecycle() {
    let state = AppState::in_memory(Config::test_defaults());
    let (alice, bob, m) = callable_match(&state).await;

    let call = CallService::initiate(&state, m.id, alice, OFFER.into())
        .await
        .unwrap();
    assert_eq!(call.status, CallStatus::Initiated);
    assert_eq!(call.receiver_id, bob);

    let ringing = CallService::ring(&state, call.id, bob).await.unwrap();
    assert_eq!(ringing.status, CallStatus::Ringing);

    let connecting = CallService::answer(&state, call.id, bob, ANSWER.into())
        .await
        .unwrap();
    assert_eq!(connecting.status, CallStatus::Connecting);
    assert_eq!(connecting.answer_sdp.as_deref(), Some(ANSWER));

    let connected = CallService::transport_connected(&state, call.id).await.unwrap();
    assert_eq!(connected.status, CallStatus::Connected);
    assert!(connected.started_at.is_some());

    let ended = CallService::end(&state, call.id, alice).await.unwrap();
    assert_eq!(ended.status, CallStatus::Ended);
    assert!(ended.duration_ms.unwrap() >= 0);
    assert!(ended.ended_at.is_some());
}

#[tokio::test]
async fn one_active_call_per_match() {
    let state = AppState::in_memory(Config::test_defaults());
    let (alice, bob, m) = callable_match(&state).await;

    let call = CallService::initiate(&state, m.id, alice, OFFER.into())
        .await
        .unwrap();
    let second = CallService::initiate(&state, m.id, bob, OFFER.into()).await;
    assert!(matches!(second, Err(AppError::Conflict(_))));
    let active = state.store.active_call_for_match(m.id).await.unwrap();
    assert_eq!(active.unwrap().id, call.id);

    // A terminal call frees the slot
    CallService::end(&state, call.id, alice).await.unwrap();
    assert!(state
        .store
        .active_call_for_match(m.id)
        .await
        .unwrap()
        .is_none());
    CallService::initiate(&state, m.id, bob, OFFER.into())
        .await
        .unwrap();
}

#[tokio::test]
async fn concurrent_initiates_have_exactly_one_winner() {
    let state = AppState::in_memory(Config::test_defaults());
    let (alice, bob, m) = callable_match(&state).await;

    let (a, b) = tokio::join!(
        CallService::initiate(&state, m.id, alice, OFFER.into()),
        CallService::initiate(&state, m.id, bob, OFFER.into()),
    );
    let winners = [a.is_ok(), b.is_ok()].iter().filter(|w| **w).count();
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn answer_requires_ringing() {
    let state = AppState::in_memory(Config::test_defaults());
    let (alice, bob, m) = callable_match(&state).await;
    let call = CallService::initiate(&state, m.id, alice, OFFER.into())
        .await
        .unwrap();

    let early = CallService::answer(&state, call.id, bob, ANSWER.into()).await;
    assert!(matches!(early, Err(AppError::Conflict(_))));

    CallService::ring(&state, call.id, bob).await.unwrap();
    CallService::answer(&state, call.id, bob, ANSWER.into())
        .await
        .unwrap();

    // The offer/answer round is spent; answering again is a protocol error
    let again = CallService::answer(&state, call.id, bob, ANSWER.into()).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn only_the_receiver_answers_or_rejects() {
    let state = AppState::in_memory(Config::test_defaults());
    let (alice, bob, m) = callable_match(&state).await;
    let call = CallService::initiate(&state, m.id, alice, OFFER.into())
        .await
        .unwrap();
    CallService::ring(&state, call.id, bob).await.unwrap();

    let wrong_answer = CallService::answer(&state, call.id, alice, ANSWER.into()).await;
    assert!(matches!(wrong_answer, Err(AppError::Forbidden(_))));
    let wrong_reject = CallService::reject(&state, call.id, alice).await;
    assert!(matches!(wrong_reject, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn reject_is_only_valid_while_ringing() {
    let state = AppState::in_memory(Config::test_defaults());
    let (alice, bob, m) = callable_match(&state).await;
    let call = CallService::initiate(&state, m.id, alice, OFFER.into())
        .await
        .unwrap();

    let early = CallService::reject(&state, call.id, bob).await;
    assert!(matches!(early, Err(AppError::Conflict(_))));

    CallService::ring(&state, call.id, bob).await.unwrap();
    let rejected = CallService::reject(&state, call.id, bob).await.unwrap();
    assert_eq!(rejected.status, CallStatus::Rejected);
    assert_eq!(rejected.duration_ms, Some(0));
}

#[tokio::test]
async fn unanswered_ring_times_out_to_missed() {
    // test config rings for 50ms
    let state = AppState::in_memory(Config::test_defaults());
    let (alice, bob, m) = callable_match(&state).await;
    let call = CallService::initiate(&state, m.id, alice, OFFER.into())
        .await
        .unwrap();
    CallService::ring(&state, call.id, bob).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    let missed = CallService::get(&state, call.id).await.unwrap();
    assert_eq!(missed.status, CallStatus::Missed);
    assert_eq!(missed.duration_ms, Some(0));
}

#[tokio::test]
async fn answering_beats_the_ring_timeout() {
    let state = AppState::in_memory(Config::test_defaults());
    let (alice, bob, m) = callable_match(&state).await;
    let call = CallService::initiate(&state, m.id, alice, OFFER.into())
        .await
        .unwrap();
    CallService::ring(&state, call.id, bob).await.unwrap();
    CallService::answer(&state, call.id, bob, ANSWER.into())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    let still = CallService::get(&state, call.id).await.unwrap();
    assert_eq!(still.status, CallStatus::Connecting);
}

#[tokio::test]
async fn candidates_keep_arrival_order_per_side() {
    let state = AppState::in_memory(Config::test_defaults());
    let (alice, bob, m) = callable_match(&state).await;
    let call = CallService::initiate(&state, m.id, alice, OFFER.into())
        .await
        .unwrap();

    for c in ["candidate:1 udp", "candidate:2 tcp"] {
        CallService::add_candidate(&state, call.id, alice, c.into(), Some("0".into()), Some(0))
            .await
            .unwrap();
    }
    CallService::add_candidate(&state, call.id, bob, "candidate:3 udp".into(), None, None)
        .await
        .unwrap();

    let caller_side = CallService::candidates(&state, call.id, Some(CandidateSide::Caller))
        .await
        .unwrap();
    assert_eq!(caller_side.len(), 2);
    assert!(caller_side[0].seq < caller_side[1].seq);
    assert_eq!(caller_side[0].candidate, "candidate:1 udp");

    let all = CallService::candidates(&state, call.id, None).await.unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn empty_candidate_fails_the_call() {
    let state = AppState::in_memory(Config::test_defaults());
    let (alice, bob, m) = callable_match(&state).await;
    let call = CallService::initiate(&state, m.id, alice, OFFER.into())
        .await
        .unwrap();
    CallService::ring(&state, call.id, bob).await.unwrap();

    let result = CallService::add_candidate(&state, call.id, alice, "  ".into(), None, None).await;
    assert!(matches!(result, Err(AppError::Signaling(_))));

    let failed = CallService::get(&state, call.id).await.unwrap();
    assert_eq!(failed.status, CallStatus::Failed);

    // Terminal call refuses further signaling
    let late =
        CallService::add_candidate(&state, call.id, bob, "candidate:9".into(), None, None).await;
    assert!(matches!(late, Err(AppError::Signaling(_))));
}

#[tokio::test]
async fn receiver_can_recover_a_pending_offer() {
    let state = AppState::in_memory(Config::test_defaults());
    let (alice, bob, m) = callable_match(&state).await;
    let call = CallService::initiate(&state, m.id, alice, OFFER.into())
        .await
        .unwrap();

    let pending = CallService::pending_for_user(&state, bob).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, call.id);
    assert_eq!(pending[0].offer_sdp, OFFER);

    CallService::end(&state, call.id, bob).await.unwrap();
    assert!(CallService::pending_for_user(&state, bob)
        .await
        .unwrap()
        .is_empty());

    let history = CallService::history_for_user(&state, bob, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, CallStatus::Ended);
}

#[tokio::test]
async fn unmatched_pairs_cannot_call() {
    let state = AppState::in_memory(Config::test_defaults());
    let (alice, _, m) = callable_match(&state).await;
    MatchService::unmatch(&state, m.id).await.unwrap();

    let result = CallService::initiate(&state, m.id, alice, OFFER.into()).await;
    assert!(matches!(result, Err(AppError::NotFound)));
}
