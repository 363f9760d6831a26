use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::Conversation;
use crate::services::ConversationService;
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<Conversation>>> {
    Ok(Json(ConversationService::list_for_user(&state, user_id).await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<Json<Conversation>> {
    Ok(Json(ConversationService::get(&state, conversation_id).await?))
}

#[derive(Deserialize)]
pub struct MarkReadRequest {
    pub reader_id: Uuid,
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Json(request): Json<MarkReadRequest>,
) -> AppResult<Json<Value>> {
    let marked =
        ConversationService::mark_read(&state, conversation_id, request.reader_id).await?;
    Ok(Json(json!({ "marked_read": marked })))
}
