//! # Leaderboard API Server
//!
//! Binary entry point for the leaderboard REST service.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leaderboard_api::{AppState, Config, StoreBackend, build_router, cors_layer};
use leaderboard_persistence::{MemoryStore, Pool, RedisConnector, StoreLeaderboardRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(
        version = leaderboard_api::VERSION,
        "Starting Leaderboard API"
    );

    let pool_config = config.redis.pool_config();
    let (state, close_pool) = match config.backend {
        StoreBackend::Redis => {
            tracing::info!(
                url = %config.redis.url,
                pool_size = pool_config.capacity,
                "Using Redis store"
            );
            let pool = Pool::new(RedisConnector::new(&config.redis.url)?, pool_config);
            let closer = pool.clone();
            (
                AppState::new(StoreLeaderboardRepository::new(pool)),
                Box::new(move || closer.close()) as Box<dyn FnOnce() + Send>,
            )
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, scores are lost on exit");
            let pool = Pool::new(MemoryStore::new(), pool_config);
            let closer = pool.clone();
            (
                AppState::new(StoreLeaderboardRepository::new(pool)),
                Box::new(move || closer.close()) as Box<dyn FnOnce() + Send>,
            )
        }
    };

    // Build router
    let app = build_router(state, cors_layer(&config.cors_origins));

    // Start server
    let addr = config.server_addr;
    tracing::info!(%addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    close_pool();
    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
