//! Server lifecycle: bind, serve, drain on shutdown.

use anyhow::{Context, Result};
use tracing::info;

use crate::api;
use crate::state::AppState;

/// Serve until SIGINT/SIGTERM, then drain the worker pool.
pub async fn run(state: AppState) -> Result<()> {
    let app = api::router(state.clone());

    let addr = format!("0.0.0.0:{}", state.config.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("🎷 Jamboree ready!");
    info!("   Generate: POST http://{addr}/v1/generate");
    info!("   Health: GET http://{addr}/health");
    info!("   Metrics: GET http://{addr}/metrics");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Draining workers");
    state.shutdown.cancel();
    state.pool.stop().await;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate()).expect("Failed to setup SIGTERM");
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
