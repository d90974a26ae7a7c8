//! Contest portal notification API server binary entrypoint.

use std::net::SocketAddr;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use portal_common::config::AppConfig;
use portal_common::db::{wait_for_database, watch_database};

use portal_api::routes::create_router;
use portal_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("portal_api=debug,portal_notifier=debug,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting portal notification API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Create database connection pool
    let pool = wait_for_database(&config.database_url, config.db_max_connections).await;

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // Background liveness ping
    tokio::spawn(watch_database(pool.clone(), Duration::from_secs(1)));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));

    // Build application state
    let state = AppState::new(pool, config)?;

    // Load the VAPID key up front so a bad key shows up in the startup logs
    if state.keys.keypair().await.is_none() {
        tracing::warn!("Starting without web push; notifications are poll-only");
    }

    // Build router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Received shutdown signal, stopping gracefully...");
        })
        .await?;

    Ok(())
}
