//! HTTP/WebSocket adapters over the streaming core.

pub mod routes;
pub mod socket;

pub use routes::router;

use tokio::net::TcpListener;

use crate::FlowtailEngine;

/// Serves until the engine's shutdown token fires.
pub async fn serve(listener: TcpListener, engine: FlowtailEngine) -> std::io::Result<()> {
    let shutdown = engine.shutdown.clone();
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
