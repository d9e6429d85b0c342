use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::middleware::session::AppState;
use crate::error::{AppError, Result};
use crate::models::{belt_history::MemberBeltHistory, member::Member};
use crate::services::{
    belts::{self, BeltInfo, BeltTrack, EligibilityReport, PromotionError},
    promotions::{self, PromotionRequest},
};

async fn belt_catalog() -> Json<Vec<BeltInfo>> {
    Json(belts::catalog())
}

#[derive(Debug, Deserialize)]
pub struct NextBeltQuery {
    pub belt: String,
    #[serde(default = "default_track")]
    pub track: BeltTrack,
}

fn default_track() -> BeltTrack {
    BeltTrack::Adult
}

#[derive(Debug, Serialize)]
pub struct NextBeltResponse {
    pub current: String,
    pub next: Option<String>,
    pub next_display_name: Option<String>,
}

async fn next_belt(Query(query): Query<NextBeltQuery>) -> Result<Json<NextBeltResponse>> {
    if belts::belt_index(&query.belt, query.track).is_none() {
        return Err(PromotionError::UnknownBelt(query.belt).into());
    }
    let next = belts::next_belt(&query.belt, query.track);

    Ok(Json(NextBeltResponse {
        current: query.belt,
        next: next.map(str::to_string),
        next_display_name: next.map(belts::display_name),
    }))
}

async fn load_member(state: &AppState, id: Uuid) -> Result<Member> {
    Member::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Member not found".to_string()))
}

/// Rank history, newest first
async fn belt_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<MemberBeltHistory>>> {
    let member = load_member(&state, id).await?;
    let history = MemberBeltHistory::list_by_member(&state.pool, member.id).await?;

    Ok(Json(history))
}

async fn promotion_eligibility(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<EligibilityReport>> {
    let member = load_member(&state, id).await?;
    let report = promotions::eligibility(&state.pool, &member).await?;

    Ok(Json(report))
}

async fn promote_member(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PromotionRequest>,
) -> Result<(StatusCode, Json<MemberBeltHistory>)> {
    let member = load_member(&state, id).await?;
    let email = state.config.email_client();

    let entry =
        promotions::promote(&state.pool, email.as_ref(), &state.config.gym_name, &member, req).await?;

    Ok((StatusCode::CREATED, Json(entry)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/belts", get(belt_catalog))
        .route("/api/belts/next", get(next_belt))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/api/members/:id/belts", get(belt_history))
        .route(
            "/api/members/:id/promotion-eligibility",
            get(promotion_eligibility),
        )
        .route("/api/members/:id/promotions", post(promote_member))
}
