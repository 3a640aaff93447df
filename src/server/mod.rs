use crate::config::Config;
use crate::coordinator::Coordinator;
use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    Router,
};
use reelpipe_av::ToolRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod error;
pub mod openapi;
pub mod routes_api;
pub mod routes_jobs;
pub mod routes_sse;

pub use error::AppError;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub coordinator: Arc<Coordinator>,
    pub config: Arc<Config>,
    pub tools: Arc<ToolRegistry>,
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .merge(routes_api::api_routes())
        .merge(routes_jobs::job_routes())
        .merge(routes_sse::sse_routes())
        .merge(openapi::openapi_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Start the HTTP server and run until a shutdown signal arrives
pub async fn start_server(ctx: AppContext) -> Result<()> {
    let server = &ctx.config.server;
    let addr: SocketAddr = format!("{}:{}", server.host, server.port)
        .parse()
        .context("Invalid server address")?;

    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
