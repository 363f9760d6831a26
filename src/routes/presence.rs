use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{PresenceRecord, TypingIndicator};
use crate::services::PresenceService;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TypingRequest {
    pub user_id: Uuid,
    pub is_typing: bool,
}

pub async fn set_typing(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Json(request): Json<TypingRequest>,
) -> AppResult<Json<Value>> {
    PresenceService::set_typing(&state, conversation_id, request.user_id, request.is_typing)
        .await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn get_typing(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<Vec<TypingIndicator>>> {
    Ok(Json(
        PresenceService::typing_in_conversation(&state, conversation_id).await?,
    ))
}

#[derive(Deserialize)]
pub struct PresenceRequest {
    pub online: bool,
}

pub async fn set_presence(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<PresenceRequest>,
) -> AppResult<Json<PresenceRecord>> {
    Ok(Json(
        PresenceService::set_online(&state, user_id, request.online).await?,
    ))
}

pub async fn get_presence(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<PresenceRecord>> {
    Ok(Json(PresenceService::get_presence(&state, user_id).await?))
}
