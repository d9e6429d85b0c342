use axum::http::{header, HeaderValue, Method};
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dojo::api::middleware::session::{create_session_layer, AppState};
use dojo::config::Config;
use dojo::db;
use dojo::jobs::waiver_reminders;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dojo=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting dojo server...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(
        payments = config.stripe_secret_key.is_some(),
        email = config.email_api_key.is_some(),
        "Configuration loaded successfully"
    );

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Create session layer
    let session_layer = create_session_layer(pool.clone(), &config.base_url).await?;
    tracing::info!("Session layer initialized");

    // Background jobs; the scheduler handle must outlive the server
    let _scheduler = waiver_reminders::start_scheduler(pool.clone(), config.clone()).await?;

    let cors = CorsLayer::new()
        .allow_origin(config.base_url.trim_end_matches('/').parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    // Build application state
    let state = AppState {
        pool: pool.clone(),
        config,
    };

    // Build router
    let app = dojo::api::app(state)
        .layer(session_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, cleaning up...");
}
