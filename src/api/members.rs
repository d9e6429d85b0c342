use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::middleware::session::AppState;
use crate::error::{AppError, Result};
use crate::models::member::{Member, MemberStatus, UpdateMemberData};
use crate::services::{
    credentials, enrollment, family,
    qr_generator::{self, QrFormat},
};

#[derive(Debug, Deserialize)]
pub struct ListMembersQuery {
    pub status: Option<String>,
    pub q: Option<String>,
}

fn parse_status(value: &str) -> Result<MemberStatus> {
    value.parse().map_err(AppError::Validation)
}

async fn load_member(state: &AppState, id: Uuid) -> Result<Member> {
    Member::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Member not found".to_string()))
}

async fn list_members(
    State(state): State<AppState>,
    Query(query): Query<ListMembersQuery>,
) -> Result<Json<Vec<Member>>> {
    let status = query.status.as_deref().map(parse_status).transpose()?;
    let search = query.q.as_deref().filter(|q| !q.trim().is_empty());

    let members = Member::list(&state.pool, status, search).await?;
    Ok(Json(members))
}

async fn get_member(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Member>> {
    Ok(Json(load_member(&state, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRequest {
    #[serde(flatten)]
    pub profile: UpdateMemberData,
    pub status: Option<String>,
}

/// Updates profile fields and, optionally, moves the member to a new status
async fn update_member(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateMemberRequest>,
) -> Result<Json<Member>> {
    let member = load_member(&state, id).await?;

    if let Some(email) = &req.profile.email {
        if !enrollment::is_plausible_email(email) {
            return Err(AppError::Validation(
                "A valid email address is required".to_string(),
            ));
        }
    }
    for (value, field) in [
        (&req.profile.first_name, "First name"),
        (&req.profile.last_name, "Last name"),
        (&req.profile.program, "Program"),
    ] {
        if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(AppError::Validation(format!("{} cannot be blank", field)));
        }
    }

    if let Some(next) = req.status.as_deref().map(parse_status).transpose()? {
        let current = member.status();
        if !current.can_transition_to(next) {
            return Err(AppError::Validation(format!(
                "Cannot change status from {} to {}",
                current, next
            )));
        }
        if current != next {
            Member::set_status(&state.pool, id, next).await?;
            tracing::info!(member_id = %id, from = %current, to = %next, "Member status changed");
            if let Some(account_id) = member.family_account_id {
                family::refresh_rate(&state.pool, account_id).await?;
            }
        }
    }

    let updated = Member::update_profile(&state.pool, id, req.profile)
        .await?
        .ok_or_else(|| AppError::NotFound("Member not found".to_string()))?;

    Ok(Json(updated))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled_member_ids: Vec<Uuid>,
    pub subscription_cancelled: bool,
}

/// Cancels a membership, ending the payment subscription when there is one.
/// Members sharing the subscription (a family) are cancelled together.
async fn cancel_member(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelResponse>> {
    let member = load_member(&state, id).await?;
    if !member.status().can_transition_to(MemberStatus::Cancelled) {
        return Err(AppError::Validation(format!(
            "Cannot cancel a member who is {}",
            member.status()
        )));
    }

    let mut subscription_cancelled = false;
    let mut affected = vec![member.clone()];

    if let Some(subscription_id) = member.stripe_subscription_id.as_deref() {
        match state.config.stripe_client() {
            Some(stripe) => {
                stripe.cancel_subscription(subscription_id).await?;
                subscription_cancelled = true;
                affected = Member::list_by_subscription(&state.pool, subscription_id).await?;
            }
            None => {
                tracing::warn!(member_id = %id, "Stripe not configured, subscription left running");
            }
        }
    }

    let mut cancelled_member_ids = Vec::new();
    let mut families = Vec::new();
    for m in affected {
        if m.status().can_transition_to(MemberStatus::Cancelled) {
            Member::set_status(&state.pool, m.id, MemberStatus::Cancelled).await?;
            cancelled_member_ids.push(m.id);
            if let Some(account_id) = m.family_account_id.filter(|id| !families.contains(id)) {
                families.push(account_id);
            }
        }
    }
    for account_id in families {
        family::refresh_rate(&state.pool, account_id).await?;
    }

    tracing::info!(
        member_id = %id,
        cancelled = cancelled_member_ids.len(),
        subscription_cancelled,
        "Membership cancelled"
    );

    Ok(Json(CancelResponse {
        cancelled_member_ids,
        subscription_cancelled,
    }))
}

#[derive(Debug, Serialize)]
pub struct PinResponse {
    pub member_id: Uuid,
    pub pin: String,
}

/// Issues a fresh kiosk PIN
async fn reset_pin(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<PinResponse>> {
    let member = load_member(&state, id).await?;
    let pin = credentials::generate_unique_pin(&state.pool).await?;
    Member::set_pin(&state.pool, member.id, &pin).await?;

    tracing::info!(member_id = %member.id, "Check-in PIN reset");

    Ok(Json(PinResponse {
        member_id: member.id,
        pin,
    }))
}

#[derive(Debug, Deserialize)]
pub struct QrQuery {
    #[serde(default)]
    pub format: QrFormat,
}

/// The member's check-in QR code as SVG or PNG
async fn member_qr(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<QrQuery>,
) -> Result<Response> {
    let member = load_member(&state, id).await?;

    let response = match query.format {
        QrFormat::Svg => {
            let svg = qr_generator::generate_qr_svg(&member.qr_token)?;
            ([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response()
        }
        QrFormat::Png => {
            let png = qr_generator::generate_qr_png(&member.qr_token)?;
            ([(header::CONTENT_TYPE, "image/png")], png).into_response()
        }
    };

    Ok(response)
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/api/members", get(list_members))
        .route("/api/members/:id", get(get_member).put(update_member))
        .route("/api/members/:id/cancel", post(cancel_member))
        .route("/api/members/:id/pin", post(reset_pin))
        .route("/api/members/:id/qr", get(member_qr))
}
