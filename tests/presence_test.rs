use uuid::Uuid;

use chat_service::config::Config;
use chat_service::error::AppError;
use chat_service::pubsub::typing_channel;
use chat_service::services::{ConversationService, MatchService, PresenceService};
use chat_service::state::AppState;

async fn conversation_pair(state: &AppState) -> (Uuid, Uuid, Uuid) {
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    MatchService::like(state, alice, bob).await.unwrap();
    let m = MatchService::like(state, bob, alice)
        .await
        .unwrap()
        .match_record
        .unwrap();
    let conversation = ConversationService::resolve_for_match(state, m.id)
        .await
        .unwrap();
    (alice, bob, conversation.id)
}

#[tokio::test]
async fn typing_is_broadcast_and_visible() {
    let state = AppState::in_memory(Config::test_defaults());
    let (alice, _, conversation_id) = conversation_pair(&state).await;
    let mut sub = state
        .channels
        .subscribe(&typing_channel(conversation_id))
        .await;

    PresenceService::set_typing(&state, conversation_id, alice, true)
        .await
        .unwrap();

    let raw = sub.rx.recv().await.unwrap();
    let event: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(event["type"], "typing.updated");
    assert_eq!(event["is_typing"], true);

    let indicators = PresenceService::typing_in_conversation(&state, conversation_id)
        .await
        .unwrap();
    let alice_typing = indicators.iter().find(|i| i.user_id == alice).unwrap();
    assert!(alice_typing.is_typing);
}

#[tokio::test]
async fn stale_typing_expires_on_read() {
    let mut config = Config::test_defaults();
    config.typing_ttl = std::time::Duration::from_millis(30);
    let state = AppState::in_memory(config);
    let (alice, _, conversation_id) = conversation_pair(&state).await;

    PresenceService::set_typing(&state, conversation_id, alice, true)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(80)).await;

    let indicators = PresenceService::typing_in_conversation(&state, conversation_id)
        .await
        .unwrap();
    let alice_typing = indicators.iter().find(|i| i.user_id == alice).unwrap();
    assert!(!alice_typing.is_typing);
}

#[tokio::test]
async fn outsiders_cannot_signal_typing() {
    let state = AppState::in_memory(Config::test_defaults());
    let (_, _, conversation_id) = conversation_pair(&state).await;
    let stranger = Uuid::new_v4();
    let result = PresenceService::set_typing(&state, conversation_id, stranger, true).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn presence_transitions_stamp_last_seen() {
    let state = AppState::in_memory(Config::test_defaults());
    let user = Uuid::new_v4();

    // Never connected reads as offline
    let unknown = PresenceService::get_presence(&state, user).await.unwrap();
    assert!(!unknown.online);
    assert!(unknown.last_seen.is_none());

    let online = PresenceService::set_online(&state, user, true).await.unwrap();
    assert!(online.online);
    assert!(online.last_seen.is_none());

    let offline = PresenceService::set_online(&state, user, false).await.unwrap();
    assert!(!offline.online);
    assert!(offline.last_seen.is_some());

    let read_back = PresenceService::get_presence(&state, user).await.unwrap();
    assert!(!read_back.online);
    assert!(read_back.last_seen.is_some());
}
