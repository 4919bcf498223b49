//! Execution server run inside each skillpod environment.

pub mod error;
pub mod events;
pub mod process;
pub mod routes;

use std::future::Future;

use anyhow::Context;
use skillpod_core::config::ServerConfig;

pub use routes::{router, AppState};

/// Bind and serve until `shutdown` resolves.
pub async fn serve<F>(config: ServerConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(
        addr = %addr,
        workdir = %config.workdir.display(),
        "execution server listening"
    );
    axum::serve(listener, router(AppState::new(config)))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")
}
