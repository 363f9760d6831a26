use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::Match;
use crate::services::MatchService;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LikeRequest {
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
}

#[derive(Serialize)]
pub struct LikeResponse {
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_record: Option<Match>,
}

pub async fn like(
    State(state): State<AppState>,
    Json(request): Json<LikeRequest>,
) -> AppResult<Json<LikeResponse>> {
    let outcome = MatchService::like(&state, request.from_user_id, request.to_user_id).await?;
    Ok(Json(LikeResponse {
        matched: outcome.matched,
        match_record: outcome.match_record,
    }))
}

pub async fn get_match(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
) -> AppResult<Json<Match>> {
    Ok(Json(MatchService::get(&state, match_id).await?))
}

#[derive(Deserialize)]
pub struct AdvanceLevelRequest {
    pub level: i32,
}

pub async fn advance_level(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Json(request): Json<AdvanceLevelRequest>,
) -> AppResult<Json<Match>> {
    Ok(Json(
        MatchService::advance_level(&state, match_id, request.level).await?,
    ))
}

pub async fn unmatch(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    MatchService::unmatch(&state, match_id).await?;
    Ok(Json(json!({ "deactivated": true })))
}

#[derive(Deserialize)]
pub struct CompatibilityRequest {
    pub interests_a: Vec<String>,
    pub interests_b: Vec<String>,
}

pub async fn compatibility(
    Json(request): Json<CompatibilityRequest>,
) -> Json<Value> {
    let score = MatchService::compatibility_score(&request.interests_a, &request.interests_b);
    Json(json!({ "score": score }))
}
