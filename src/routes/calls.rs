use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Call, CandidateSide, ConnectivityCandidate};
use crate::services::CallService;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct InitiateRequest {
    pub caller_id: Uuid,
    pub offer_sdp: String,
}

pub async fn initiate(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Json(request): Json<InitiateRequest>,
) -> AppResult<Json<Call>> {
    Ok(Json(
        CallService::initiate(&state, match_id, request.caller_id, request.offer_sdp).await?,
    ))
}

pub async fn get(
    State(state): State<AppState>,
    Path(call_id): Path<Uuid>,
) -> AppResult<Json<Call>> {
    Ok(Json(CallService::get(&state, call_id).await?))
}

#[derive(Deserialize)]
pub struct ParticipantRequest {
    pub user_id: Uuid,
}

pub async fn ring(
    State(state): State<AppState>,
    Path(call_id): Path<Uuid>,
    Json(request): Json<ParticipantRequest>,
) -> AppResult<Json<Call>> {
    Ok(Json(CallService::ring(&state, call_id, request.user_id).await?))
}

#[derive(Deserialize)]
pub struct AnswerRequest {
    pub user_id: Uuid,
    pub answer_sdp: String,
}

pub async fn answer(
    State(state): State<AppState>,
    Path(call_id): Path<Uuid>,
    Json(request): Json<AnswerRequest>,
) -> AppResult<Json<Call>> {
    Ok(Json(
        CallService::answer(&state, call_id, request.user_id, request.answer_sdp).await?,
    ))
}

#[derive(Deserialize)]
pub struct CandidateRequest {
    pub user_id: Uuid,
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<i32>,
}

pub async fn add_candidate(
    State(state): State<AppState>,
    Path(call_id): Path<Uuid>,
    Json(request): Json<CandidateRequest>,
) -> AppResult<Json<ConnectivityCandidate>> {
    Ok(Json(
        CallService::add_candidate(
            &state,
            call_id,
            request.user_id,
            request.candidate,
            request.sdp_mid,
            request.sdp_mline_index,
        )
        .await?,
    ))
}

#[derive(Deserialize)]
pub struct CandidateParams {
    pub side: Option<String>,
}

pub async fn list_candidates(
    State(state): State<AppState>,
    Path(call_id): Path<Uuid>,
    Query(params): Query<CandidateParams>,
) -> AppResult<Json<Vec<ConnectivityCandidate>>> {
    let side = params
        .side
        .as_deref()
        .map(CandidateSide::parse)
        .transpose()?;
    Ok(Json(CallService::candidates(&state, call_id, side).await?))
}

pub async fn connected(
    State(state): State<AppState>,
    Path(call_id): Path<Uuid>,
) -> AppResult<Json<Call>> {
    Ok(Json(CallService::transport_connected(&state, call_id).await?))
}

pub async fn end(
    State(state): State<AppState>,
    Path(call_id): Path<Uuid>,
    Json(request): Json<ParticipantRequest>,
) -> AppResult<Json<Call>> {
    Ok(Json(CallService::end(&state, call_id, request.user_id).await?))
}

pub async fn reject(
    State(state): State<AppState>,
    Path(call_id): Path<Uuid>,
    Json(request): Json<ParticipantRequest>,
) -> AppResult<Json<Call>> {
    Ok(Json(CallService::reject(&state, call_id, request.user_id).await?))
}

pub async fn pending(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<Call>>> {
    Ok(Json(CallService::pending_for_user(&state, user_id).await?))
}

#[derive(Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
}

pub async fn history(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<HistoryParams>,
) -> AppResult<Json<Vec<Call>>> {
    let limit = params.limit.unwrap_or(50);
    if limit < 1 {
        return Err(AppError::Validation("limit must be >= 1".into()));
    }
    Ok(Json(
        CallService::history_for_user(&state, user_id, limit).await?,
    ))
}
