//! HTTP surface
//!
//! Two routes: a health probe and the run endpoint, which answers with a
//! server-sent event stream for the lifetime of one run.

pub mod error;
pub mod handlers;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::app::AppConfig;
use crate::error::{Error, Result};
use crate::run::RunController;

pub use error::ApiError;

/// Shared handler state
#[derive(Clone)]
pub struct ServerState {
    pub controller: RunController,
}

/// Build the API router with CORS for `cors_origin`.
pub fn build_router(controller: RunController, cors_origin: &str) -> Result<Router> {
    let state = ServerState { controller };

    Ok(Router::new()
        .route("/api/health", get(handlers::health_check))
        .route("/api/playground/run", post(handlers::run_playground))
        .layer(cors_layer(cors_origin)?)
        .with_state(state))
}

fn cors_layer(origin: &str) -> Result<CorsLayer> {
    let origin = origin
        .parse::<HeaderValue>()
        .map_err(|e| Error::Config(format!("Invalid CORS origin {}: {}", origin, e)))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CACHE_CONTROL,
            HeaderName::from_static("x-requested-with"),
        ])
        .allow_credentials(true))
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve_with_shutdown<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Start the server described by `config` and run until Ctrl-C.
pub async fn serve(config: &AppConfig) -> Result<()> {
    let addr = config.socket_addr().await?;
    let controller = RunController::new(config.tool.clone(), config.exit_policy);
    let router = build_router(controller, &config.cors_origin)?;

    let listener = TcpListener::bind(addr).await?;
    info!(
        "Playground API listening on {} (tool: {})",
        listener.local_addr()?,
        config.tool.program
    );

    serve_with_shutdown(listener, router, shutdown_signal()).await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
