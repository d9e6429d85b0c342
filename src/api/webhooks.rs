use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde_json::{json, Value as JsonValue};

use crate::api::middleware::session::AppState;
use crate::error::{AppError, Result};
use crate::services::{
    billing::{self, WebhookOutcome},
    stripe::{self, WebhookEvent},
};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Receives payment events. The raw body is needed for signature checks,
/// so it is taken as a string and parsed afterwards.
async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<JsonValue>> {
    let secret = state
        .config
        .stripe_webhook_secret
        .as_ref()
        .ok_or_else(|| AppError::Config("Stripe webhook secret is not configured".to_string()))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Validation("Missing Stripe-Signature header".to_string()))?;

    if let Err(e) = stripe::verify_webhook_signature(
        &body,
        signature,
        secret.expose_secret(),
        Utc::now().timestamp(),
    ) {
        tracing::warn!(error = %e, "Rejected webhook with invalid signature");
        return Err(AppError::Validation(e.to_string()));
    }

    let event: WebhookEvent = serde_json::from_str(&body)
        .map_err(|e| AppError::Validation(format!("Malformed event payload: {}", e)))?;

    let outcome = billing::apply_webhook_event(&state.pool, &event).await?;

    let status = match outcome {
        WebhookOutcome::Applied { .. } => "processed",
        WebhookOutcome::Duplicate => "duplicate",
        WebhookOutcome::Ignored => "ignored",
    };

    Ok(Json(json!({ "received": true, "status": status })))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/webhooks/stripe", post(stripe_webhook))
}
