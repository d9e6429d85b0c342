// API module - HTTP endpoints

pub mod admin;
pub mod belts;
pub mod checkins;
pub mod classes;
pub mod family;
pub mod health;
pub mod members;
pub mod middleware;
pub mod signup;
pub mod waivers;
pub mod webhooks;

use axum::{routing::get, Router};

use middleware::{auth::require_admin, session::AppState};

/// Builds the application router. The session layer is added by the caller
/// so tests can substitute an in-memory store.
pub fn app(state: AppState) -> Router {
    let staff_routes = Router::new()
        .merge(admin::admin_router())
        .merge(members::admin_router())
        .merge(waivers::admin_router())
        .merge(checkins::admin_router())
        .merge(belts::admin_router())
        .merge(classes::admin_router())
        .merge(family::admin_router())
        .route_layer(axum::middleware::from_fn(require_admin));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(signup::router())
        .merge(checkins::router())
        .merge(waivers::router())
        .merge(classes::router())
        .merge(belts::router())
        .merge(family::router())
        .merge(webhooks::router())
        .merge(admin::router())
        .merge(staff_routes)
        .with_state(state)
}
