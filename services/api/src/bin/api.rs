//! services/api/src/bin/api.rs

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tax_analysis_core::AnalysisSessionManager;
use tax_api_lib::{
    adapters::{DbAdapter, LocalBlobAdapter},
    config::Config,
    error::ApiError,
    sweeper::spawn_session_sweeper,
    web::{self, rest::ApiDoc, state::AppState},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    tokio::fs::create_dir_all(&config.storage_root).await?;
    let blob_adapter = Arc::new(LocalBlobAdapter::new(
        config.storage_root.clone(),
        config.storage_public_url.clone(),
    ));
    let manager = AnalysisSessionManager::new(db_adapter, config.manager_config());

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        manager: manager.clone(),
        blob: blob_adapter,
        config: config.clone(),
    });

    // --- 5. Start the Expired-Session Sweeper ---
    let shutdown = CancellationToken::new();
    let sweeper = spawn_session_sweeper(
        manager,
        Duration::from_secs(config.cleanup_interval_secs.max(1)),
        shutdown.clone(),
    );

    // --- 6. Create the Web Router ---
    let app = Router::new()
        .merge(web::router(app_state)?)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received.");
            signal_token.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        error!("Session sweeper ended abnormally: {}", e);
    }
    info!("Server stopped.");
    Ok(())
}
