use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use scout_client::{Settings, build_orchestrator};
use scout_server::routes;
use scout_server::state::{AppState, OrchestratorService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("scout=info".parse()?))
        .with_target(false)
        .init();

    let api_key = std::env::var("SCOUT_SERVER_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
        .context("SCOUT_SERVER_API_KEY must be set")?;
    let port = std::env::var("SCOUT_SERVER_PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{port}");

    let settings = Settings::from_env().context("Invalid configuration")?;
    let orchestrator = Arc::new(build_orchestrator(&settings)?);

    let state = Arc::new(AppState {
        service: Arc::new(OrchestratorService::new(orchestrator)),
        api_key,
    });

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("Starting server on {addr}");
    let listener = TcpListener::bind(&addr).await?;
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
    tracing::info!("Shutdown signal received");
}
