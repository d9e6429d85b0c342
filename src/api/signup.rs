use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

use crate::api::middleware::session::AppState;
use crate::error::Result;
use crate::services::enrollment::{self, EnrollmentContext, EnrollmentResult, SignupRequest};

/// Public self-service signup
async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<EnrollmentResult>)> {
    let stripe = state.config.stripe_client();
    let email = state.config.email_client();

    let ctx = EnrollmentContext {
        stripe: stripe.as_ref(),
        email: email.as_ref(),
        base_url: &state.config.base_url,
        gym_name: &state.config.gym_name,
    };

    let result = enrollment::enroll(&state.pool, &ctx, req).await?;

    tracing::info!(
        members = result.members.len(),
        monthly_total = result.price.monthly_total,
        checkout = result.checkout_url.is_some(),
        "Signup completed"
    );

    Ok((StatusCode::CREATED, Json(result)))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/signup", post(signup))
}
