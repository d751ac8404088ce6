//! services/api/src/bin/api.rs

use api_lib::{
    adapters::spawn_probe,
    config::Config,
    error::ApiError,
    web::{rest::ApiDoc, state::AppState, status_handler, ws_handler},
};
use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
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

    let missing = config.backend.missing();
    if !missing.is_empty() {
        warn!("Missing backend client settings: {}", missing.join(", "));
    }

    // --- 2. Connect the Backend & Build the Shared AppState ---
    let app_state = Arc::new(AppState::from_config(config.clone()).await?);
    info!("Serving data from the {} backend", app_state.identity.name());

    // --- 3. Start the Reachability Probe ---
    let shutdown = CancellationToken::new();
    let probe = spawn_probe(
        app_state.store.clone(),
        app_state.connectivity.clone(),
        config.probe_interval,
        shutdown.clone(),
    );

    // --- 4. Create the Web Router ---
    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS origin '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    let api_router = Router::new()
        .route("/status", get(status_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for the shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = probe.await {
        error!("Reachability probe ended abnormally: {:?}", e);
    }
    info!("Server stopped.");
    Ok(())
}
