use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tower_sessions::Session;

use crate::api::middleware::session::{AppState, SESSION_KEY_ADMIN, SESSION_KEY_LOGGED_IN_AT};
use crate::error::{AppError, Result};
use crate::models::{
    check_in::CheckIn,
    family_account::FamilyAccount,
    member::{Member, MemberStatus},
    waiver::Waiver,
};
use crate::services::{
    signature,
    waivers::{self, WaiverState},
};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>> {
    let key = state.config.session_secret.expose_secret().as_bytes();
    if !signature::secrets_match(&req.password, state.config.admin_password.expose_secret(), key) {
        tracing::warn!("Failed staff login attempt");
        return Err(AppError::Unauthorized);
    }

    // Rotate the session id on privilege change
    session.cycle_id().await?;
    session.insert(SESSION_KEY_ADMIN, true).await?;
    session
        .insert(SESSION_KEY_LOGGED_IN_AT, Utc::now().timestamp())
        .await?;

    tracing::info!("Staff logged in");

    Ok(Json(serde_json::json!({ "authenticated": true })))
}

async fn logout(session: Session) -> Result<StatusCode> {
    session.flush().await?;
    tracing::info!("Staff logged out");

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Serialize)]
pub struct WaiverCounts {
    pub valid: usize,
    pub expiring_soon: usize,
    pub expired: usize,
    pub needs_adult_waiver: usize,
    pub missing: usize,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub members_by_status: BTreeMap<&'static str, i64>,
    pub check_ins_today: i64,
    pub check_ins_last_7_days: i64,
    pub waivers: WaiverCounts,
    pub monthly_recurring_revenue: i64,
}

async fn dashboard(State(state): State<AppState>) -> Result<Json<Dashboard>> {
    let now = Utc::now();
    let today = now.date_naive();

    let mut members_by_status = BTreeMap::new();
    for status in MemberStatus::ALL {
        members_by_status.insert(
            status.as_str(),
            Member::count_by_status(&state.pool, status).await?,
        );
    }

    let check_ins_today = CheckIn::count_between(&state.pool, today, today).await?;
    let check_ins_last_7_days =
        CheckIn::count_between(&state.pool, today - Duration::days(6), today).await?;

    let latest: HashMap<_, _> = Waiver::latest_for_training_members(&state.pool)
        .await?
        .into_iter()
        .map(|w| (w.member_id, (w.signed_at, w.relationship())))
        .collect();
    let training = Member::list_training(&state.pool).await?;

    let mut waivers = WaiverCounts::default();
    for member in &training {
        let signed = latest.get(&member.id).copied();
        match waivers::waiver_status(signed, member.date_of_birth, now).state {
            WaiverState::Valid => waivers.valid += 1,
            WaiverState::ExpiringSoon => waivers.expiring_soon += 1,
            WaiverState::Expired => waivers.expired += 1,
            WaiverState::NeedsAdultWaiver => waivers.needs_adult_waiver += 1,
            WaiverState::Missing => waivers.missing += 1,
        }
    }

    let monthly_recurring_revenue = FamilyAccount::monthly_recurring_revenue(&state.pool).await?;

    Ok(Json(Dashboard {
        members_by_status,
        check_ins_today,
        check_ins_last_7_days,
        waivers,
        monthly_recurring_revenue,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/login", post(login))
        .route("/api/admin/logout", post(logout))
}

pub fn admin_router() -> Router<AppState> {
    Router::new().route("/api/admin/dashboard", get(dashboard))
}
