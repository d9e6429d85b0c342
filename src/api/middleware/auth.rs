use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tower_sessions::Session;

use super::session::SESSION_KEY_ADMIN;

/// Authentication error responses
#[derive(Debug)]
pub enum AuthError {
    Unauthorized,
    SessionError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::Unauthorized => (StatusCode::UNAUTHORIZED, "Staff login required"),
            AuthError::SessionError => (StatusCode::INTERNAL_SERVER_ERROR, "Session error occurred"),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Middleware that requires a staff session
pub async fn require_admin(
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if !is_admin(&session).await? {
        tracing::warn!(path = %request.uri().path(), "Rejected unauthenticated admin request");
        return Err(AuthError::Unauthorized);
    }

    Ok(next.run(request).await)
}

pub async fn is_admin(session: &Session) -> Result<bool, AuthError> {
    let flag: Option<bool> = session
        .get(SESSION_KEY_ADMIN)
        .await
        .map_err(|_| AuthError::SessionError)?;

    Ok(flag.unwrap_or(false))
}
