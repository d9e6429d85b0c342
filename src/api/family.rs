use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::middleware::session::AppState;
use crate::error::{AppError, Result};
use crate::models::{
    family_account::FamilyAccount,
    member::{Member, MemberType},
};
use crate::services::{
    family,
    pricing::{self, FamilyPrice},
};

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub members: Vec<MemberType>,
}

/// Pricing preview for a prospective household
async fn quote(Json(req): Json<QuoteRequest>) -> Result<Json<FamilyPrice>> {
    if req.members.is_empty() {
        return Err(AppError::Validation(
            "At least one member is required".to_string(),
        ));
    }
    Ok(Json(pricing::calculate_family_price(&req.members)))
}

#[derive(Debug, Deserialize)]
pub struct CreateFamilyRequest {
    pub primary_member_id: Uuid,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FamilyResponse {
    pub account: FamilyAccount,
    pub members: Vec<Member>,
    pub price: FamilyPrice,
}

async fn family_response(state: &AppState, id: Uuid) -> Result<FamilyResponse> {
    let account = FamilyAccount::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Family account not found".to_string()))?;
    let members = Member::list_by_family(&state.pool, id).await?;
    let types: Vec<_> = members.iter().map(|m| m.member_type()).collect();

    Ok(FamilyResponse {
        account,
        price: pricing::calculate_family_price(&types),
        members,
    })
}

async fn create_family(
    State(state): State<AppState>,
    Json(req): Json<CreateFamilyRequest>,
) -> Result<(StatusCode, Json<FamilyResponse>)> {
    let account = family::create_account(&state.pool, req.primary_member_id, req.name).await?;
    tracing::info!(family_account_id = %account.id, "Family account created");

    Ok((StatusCode::CREATED, Json(family_response(&state, account.id).await?)))
}

async fn get_family(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FamilyResponse>> {
    Ok(Json(family_response(&state, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct AddFamilyMemberRequest {
    pub member_id: Uuid,
}

async fn add_family_member(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddFamilyMemberRequest>,
) -> Result<Json<FamilyResponse>> {
    family::add_member(&state.pool, id, req.member_id).await?;
    tracing::info!(family_account_id = %id, member_id = %req.member_id, "Member added to family");

    Ok(Json(family_response(&state, id).await?))
}

async fn remove_family_member(
    State(state): State<AppState>,
    Path((id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<FamilyResponse>> {
    family::remove_member(&state.pool, id, member_id).await?;
    tracing::info!(family_account_id = %id, member_id = %member_id, "Member removed from family");

    Ok(Json(family_response(&state, id).await?))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/family/quote", post(quote))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/api/family", post(create_family))
        .route("/api/family/:id", get(get_family))
        .route("/api/family/:id/members", post(add_family_member))
        .route(
            "/api/family/:id/members/:member_id",
            delete(remove_family_member),
        )
}
