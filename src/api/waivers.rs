use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::middleware::session::AppState;
use crate::error::{AppError, Result};
use crate::models::{
    member::Member,
    waiver::{CreateWaiverData, Waiver},
};
use crate::services::{
    enrollment::{self, WaiverSignature},
    signature,
    waivers::{self, WaiverStatus},
};

#[derive(Debug, Deserialize)]
pub struct SignWaiverRequest {
    pub member_id: Uuid,
    /// Kiosk PIN, proves the signer has the member's card
    pub pin: String,
    #[serde(flatten)]
    pub waiver: WaiverSignature,
}

async fn load_member(state: &AppState, id: Uuid) -> Result<Member> {
    Member::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Member not found".to_string()))
}

/// Signs or renews a waiver from the kiosk
async fn sign_waiver(
    State(state): State<AppState>,
    Json(req): Json<SignWaiverRequest>,
) -> Result<(StatusCode, Json<Waiver>)> {
    let member = load_member(&state, req.member_id).await?;

    let key = state.config.session_secret.expose_secret().as_bytes();
    if !signature::secrets_match(req.pin.trim(), &member.check_in_pin, key) {
        tracing::warn!(member_id = %member.id, "Waiver signing rejected: PIN mismatch");
        return Err(AppError::Unauthorized);
    }

    let now = Utc::now();
    let age = waivers::age_on(member.date_of_birth, now.date_naive());
    enrollment::validate_waiver(&req.waiver, age)?;

    let waiver = Waiver::create(
        &state.pool,
        CreateWaiverData {
            member_id: member.id,
            signer_name: req.waiver.signer_name.trim().to_string(),
            signer_relationship: req.waiver.relationship,
            signer_email: req.waiver.signer_email.clone(),
            signature_text: req.waiver.signature_text.trim().to_string(),
            member_age_at_signing: age,
            signed_at: now,
        },
    )
    .await?;

    tracing::info!(
        member_id = %member.id,
        relationship = req.waiver.relationship.as_str(),
        "Waiver signed"
    );

    Ok((StatusCode::CREATED, Json(waiver)))
}

/// Signing history, newest first
async fn list_member_waivers(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Waiver>>> {
    let member = load_member(&state, id).await?;
    let waivers = Waiver::list_by_member(&state.pool, member.id).await?;

    Ok(Json(waivers))
}

async fn member_waiver_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WaiverStatus>> {
    let member = load_member(&state, id).await?;
    let latest = Waiver::find_latest_for_member(&state.pool, member.id).await?;

    Ok(Json(waivers::waiver_status(
        latest.map(|w| (w.signed_at, w.relationship())),
        member.date_of_birth,
        Utc::now(),
    )))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/waivers", post(sign_waiver))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/api/members/:id/waivers", get(list_member_waivers))
        .route("/api/members/:id/waiver-status", get(member_waiver_status))
}
