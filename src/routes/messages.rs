use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Message, MessagePayload, MessageType};
use crate::services::MessageService;
use crate::state::AppState;
use crate::store::MessageQuery;

#[derive(Deserialize)]
pub struct SendRequest {
    pub sender_id: Uuid,
    pub message_type: MessageType,
    pub payload: MessagePayload,
}

pub async fn send(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Json(request): Json<SendRequest>,
) -> AppResult<Json<Message>> {
    let message = MessageService::send(
        &state,
        conversation_id,
        request.sender_id,
        request.message_type,
        request.payload,
    )
    .await?;
    Ok(Json(message))
}

#[derive(Deserialize)]
pub struct HistoryParams {
    pub before: Option<chrono::DateTime<chrono::Utc>>,
    pub after: Option<chrono::DateTime<chrono::Utc>>,
    pub message_type: Option<String>,
    pub limit: Option<i64>,
    /// "desc" for most recent first; default ascending creation order.
    pub order: Option<String>,
}

pub async fn history(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
) -> AppResult<Json<Vec<Message>>> {
    let message_type = params
        .message_type
        .as_deref()
        .map(MessageType::parse)
        .transpose()?;
    let query = MessageQuery {
        before: params.before,
        after: params.after,
        message_type,
        limit: params.limit.unwrap_or(50),
        newest_first: params.order.as_deref() == Some("desc"),
        include_deleted: false,
    };
    Ok(Json(
        MessageService::history(&state, conversation_id, &query).await?,
    ))
}

#[derive(Deserialize)]
pub struct ReceiptRequest {
    pub user_id: Uuid,
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Json(request): Json<ReceiptRequest>,
) -> AppResult<Json<Value>> {
    let advanced = MessageService::mark_read(&state, message_id, request.user_id).await?;
    Ok(Json(json!({ "updated": advanced })))
}

pub async fn mark_delivered(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Json(request): Json<ReceiptRequest>,
) -> AppResult<Json<Value>> {
    let advanced = MessageService::mark_delivered(&state, message_id, request.user_id).await?;
    Ok(Json(json!({ "updated": advanced })))
}

#[derive(Deserialize)]
pub struct DeleteParams {
    pub requester_id: Option<Uuid>,
}

pub async fn delete(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Query(params): Query<DeleteParams>,
) -> AppResult<Json<Value>> {
    let requester_id = params
        .requester_id
        .ok_or_else(|| AppError::Validation("requester_id is required".into()))?;
    MessageService::delete(&state, message_id, requester_id).await?;
    Ok(Json(json!({ "deleted": true })))
}
