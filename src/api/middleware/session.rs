use axum::extract::FromRef;
use sqlx::PgPool;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

/// Session keys used in the application
pub const SESSION_KEY_ADMIN: &str = "is_admin";
pub const SESSION_KEY_LOGGED_IN_AT: &str = "logged_in_at";

/// Creates a session layer for Axum
pub async fn create_session_layer(
    pool: PgPool,
    base_url: &str,
) -> Result<SessionManagerLayer<PostgresStore>, sqlx::Error> {
    // Create the session store backed by PostgreSQL
    let session_store = PostgresStore::new(pool);
    session_store.migrate().await?;

    // Plain-http deployments (local development) cannot use secure cookies
    let secure = base_url.starts_with("https://");

    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(secure)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(12)));

    Ok(session_layer)
}

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: crate::config::Config,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> PgPool {
        state.pool.clone()
    }
}
