use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use flowtail::config::Config;
use flowtail::{server, FlowtailEngine};

#[tokio::main]
async fn main() {
    let config = Config::global();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.server.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let engine = FlowtailEngine::new(config);
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("🚀 Flowtail listening on {}", addr);

    let shutdown = engine.shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested, closing sessions");
                shutdown.cancel();
            }
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    if let Err(e) = server::serve(listener, engine).await {
        tracing::error!("Server error: {}", e);
    }
}
